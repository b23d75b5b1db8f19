use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::db::{PrincipalId, PrincipalStore};
use crate::error::AuthError;

/// Hands out sparse, non-sequential identifiers from a persisted counter.
///
/// The linear transform alone does not guarantee uniqueness; every candidate
/// is checked against the store before it is issued.
pub struct IdAllocator {
    store: Arc<dyn PrincipalStore>,
    max_attempts: u32,
    lock: Mutex<()>,
}

impl IdAllocator {
    pub fn new(store: Arc<dyn PrincipalStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts,
            lock: Mutex::new(()),
        }
    }

    pub async fn allocate(&self, namespace: &str) -> Result<PrincipalId, AuthError> {
        let _guard = self.lock.lock().await;

        let mut counter = self.store.load_counter(namespace).await?;

        for _ in 0..self.max_attempts {
            let candidate = counter.advance();
            if candidate == 0 {
                continue;
            }
            if self.store.principal_exists(candidate).await? {
                debug!(namespace, candidate, "identifier already taken, skipping");
                continue;
            }

            self.store.store_counter(namespace, counter.count).await?;
            return Ok(candidate);
        }

        warn!(namespace, attempts = self.max_attempts, "identifier allocation exhausted");
        Err(AuthError::Exhausted(namespace.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{IdCounter, MemoryStore, MockPrincipalStore, Principal};
    use crate::error::DatabaseError;
    use std::collections::HashSet;

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_counter("users", IdCounter::new(25173, 13849)))
    }

    async fn register(store: &MemoryStore, id: PrincipalId) {
        let principal = Principal::new(id, format!("user_{}", id), "hash".to_string());
        store.insert_principal(&principal).await.unwrap();
    }

    #[tokio::test]
    async fn test_allocations_are_distinct_and_nonzero() {
        let store = store();
        let allocator = IdAllocator::new(store.clone(), 65536);

        let mut seen = HashSet::new();
        for _ in 0..500 {
            let id = allocator.allocate("users").await.unwrap();
            assert_ne!(id, 0);
            assert!(seen.insert(id), "identifier {} issued twice", id);
            register(&store, id).await;
        }
    }

    #[tokio::test]
    async fn test_counter_persisted_after_allocation() {
        let store = store();
        let allocator = IdAllocator::new(store.clone(), 65536);

        allocator.allocate("users").await.unwrap();
        allocator.allocate("users").await.unwrap();

        assert_eq!(store.load_counter("users").await.unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_skips_externally_inserted_identifier() {
        let store = store();
        let allocator = IdAllocator::new(store.clone(), 65536);

        let mut preview = store.load_counter("users").await.unwrap();
        let next = preview.advance();
        let after = preview.advance();
        register(&store, next).await;

        let id = allocator.allocate("users").await.unwrap();
        assert_eq!(id, after);
        assert_eq!(store.load_counter("users").await.unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_never_issues_zero() {
        // count=1 maps to (1 * 1 + 65535) mod 65536 == 0
        let store = Arc::new(MemoryStore::with_counter("users", IdCounter::new(1, 65535)));
        let allocator = IdAllocator::new(store.clone(), 16);

        assert_eq!(allocator.allocate("users").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_namespace_fails() {
        // scale 0 keeps producing the same residue
        let store = Arc::new(MemoryStore::with_counter("users", IdCounter::new(0, 9)));
        register(&store, 9).await;
        let allocator = IdAllocator::new(store.clone(), 32);

        let err = allocator.allocate("users").await.unwrap_err();
        assert!(matches!(err, AuthError::Exhausted(ref ns) if ns == "users"));
        assert_eq!(store.load_counter("users").await.unwrap().count, 0);
    }

    #[tokio::test]
    async fn test_missing_namespace_is_upstream_error() {
        let allocator = IdAllocator::new(store(), 16);
        let err = allocator.allocate("games").await.unwrap_err();
        assert!(matches!(err, AuthError::Upstream(DatabaseError::NotFound)));
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let mut mock = MockPrincipalStore::new();
        mock.expect_load_counter()
            .returning(|_| Ok(IdCounter::new(3, 1)));
        mock.expect_principal_exists()
            .times(1)
            .returning(|_| Err(DatabaseError::ConnectionError("connection refused".into())));
        mock.expect_store_counter().never();

        let allocator = IdAllocator::new(Arc::new(mock), 16);
        let err = allocator.allocate("users").await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Upstream(DatabaseError::ConnectionError(_))
        ));
    }
}
