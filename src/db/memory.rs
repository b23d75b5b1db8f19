//! In-process principal store for single-node runs and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::db::models::{IdCounter, Principal, PrincipalId};
use crate::db::store::PrincipalStore;
use crate::error::DatabaseError;

#[derive(Debug, Default)]
pub struct MemoryStore {
    principals: RwLock<HashMap<PrincipalId, Principal>>,
    counters: RwLock<HashMap<String, IdCounter>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with one counter namespace.
    pub fn with_counter(namespace: &str, counter: IdCounter) -> Self {
        let mut counters = HashMap::new();
        counters.insert(namespace.to_string(), counter);
        Self {
            principals: RwLock::new(HashMap::new()),
            counters: RwLock::new(counters),
        }
    }

    pub async fn len(&self) -> usize {
        self.principals.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.principals.read().await.is_empty()
    }
}

#[async_trait]
impl PrincipalStore for MemoryStore {
    async fn principal_exists(&self, id: PrincipalId) -> Result<bool, DatabaseError> {
        Ok(self.principals.read().await.contains_key(&id))
    }

    async fn insert_principal(&self, principal: &Principal) -> Result<(), DatabaseError> {
        let mut principals = self.principals.write().await;
        if principals.contains_key(&principal.id)
            || principals.values().any(|p| p.name == principal.name)
        {
            return Err(DatabaseError::Duplicate);
        }
        principals.insert(principal.id, principal.clone());
        Ok(())
    }

    async fn find_id_by_name(&self, name: &str) -> Result<Option<PrincipalId>, DatabaseError> {
        Ok(self
            .principals
            .read()
            .await
            .values()
            .find(|p| p.name == name)
            .map(|p| p.id))
    }

    async fn find_name_by_id(&self, id: PrincipalId) -> Result<Option<String>, DatabaseError> {
        Ok(self.principals.read().await.get(&id).map(|p| p.name.clone()))
    }

    async fn find_password_hash(&self, id: PrincipalId) -> Result<Option<String>, DatabaseError> {
        Ok(self
            .principals
            .read()
            .await
            .get(&id)
            .map(|p| p.password_hash.clone()))
    }

    async fn load_counter(&self, namespace: &str) -> Result<IdCounter, DatabaseError> {
        self.counters
            .read()
            .await
            .get(namespace)
            .copied()
            .ok_or(DatabaseError::NotFound)
    }

    async fn store_counter(&self, namespace: &str, count: u64) -> Result<(), DatabaseError> {
        let mut counters = self.counters.write().await;
        let counter = counters.get_mut(namespace).ok_or(DatabaseError::NotFound)?;
        counter.count = count;
        Ok(())
    }
}
