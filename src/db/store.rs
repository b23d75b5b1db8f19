use async_trait::async_trait;

use crate::db::models::{IdCounter, Principal, PrincipalId};
use crate::error::DatabaseError;

/// Persistence the authentication core needs from the principal store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    async fn principal_exists(&self, id: PrincipalId) -> Result<bool, DatabaseError>;

    async fn insert_principal(&self, principal: &Principal) -> Result<(), DatabaseError>;

    async fn find_id_by_name(&self, name: &str) -> Result<Option<PrincipalId>, DatabaseError>;

    async fn find_name_by_id(&self, id: PrincipalId) -> Result<Option<String>, DatabaseError>;

    async fn find_password_hash(&self, id: PrincipalId) -> Result<Option<String>, DatabaseError>;

    /// Fails with `DatabaseError::NotFound` when the namespace has no counter row.
    async fn load_counter(&self, namespace: &str) -> Result<IdCounter, DatabaseError>;

    async fn store_counter(&self, namespace: &str, count: u64) -> Result<(), DatabaseError>;
}
