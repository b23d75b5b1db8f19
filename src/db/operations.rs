use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::db::models::{IdCounter, IdCounterRow, Principal, PrincipalId};
use crate::db::store::PrincipalStore;
use crate::error::DatabaseError;

/// Postgres-backed principal store.
pub struct DbOperations {
    pool: Arc<PgPool>,
}

impl DbOperations {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn new_with_options(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

        Ok(Self { pool: Arc::new(pool) })
    }

    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        sqlx::migrate!("./migrations")
            .run(self.pool.as_ref())
            .await
            .map_err(|e| DatabaseError::MigrationError(e.to_string()))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl PrincipalStore for DbOperations {
    async fn principal_exists(&self, id: PrincipalId) -> Result<bool, DatabaseError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE userid = $1)")
                .bind(i32::from(id))
                .fetch_one(self.pool.as_ref())
                .await?;

        Ok(exists)
    }

    async fn insert_principal(&self, principal: &Principal) -> Result<(), DatabaseError> {
        sqlx::query("INSERT INTO users (userid, name, salthash) VALUES ($1, $2, $3)")
            .bind(i32::from(principal.id))
            .bind(&principal.name)
            .bind(&principal.password_hash)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn find_id_by_name(&self, name: &str) -> Result<Option<PrincipalId>, DatabaseError> {
        let id: Option<i32> = sqlx::query_scalar("SELECT userid FROM users WHERE name = $1")
            .bind(name)
            .fetch_optional(self.pool.as_ref())
            .await?;

        id.map(|id| {
            PrincipalId::try_from(id)
                .map_err(|_| DatabaseError::QueryError(format!("userid {} out of range", id)))
        })
        .transpose()
    }

    async fn find_name_by_id(&self, id: PrincipalId) -> Result<Option<String>, DatabaseError> {
        let name = sqlx::query_scalar("SELECT name FROM users WHERE userid = $1")
            .bind(i32::from(id))
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(name)
    }

    async fn find_password_hash(&self, id: PrincipalId) -> Result<Option<String>, DatabaseError> {
        let hash = sqlx::query_scalar("SELECT salthash FROM users WHERE userid = $1")
            .bind(i32::from(id))
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(hash)
    }

    async fn load_counter(&self, namespace: &str) -> Result<IdCounter, DatabaseError> {
        let row = sqlx::query_as::<_, IdCounterRow>(
            "SELECT count, scale, add_const FROM id_counters WHERE namespace = $1",
        )
        .bind(namespace)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(row.into())
    }

    async fn store_counter(&self, namespace: &str, count: u64) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE id_counters SET count = $1 WHERE namespace = $2")
            .bind(count as i64)
            .bind(namespace)
            .execute(self.pool.as_ref())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }

        Ok(())
    }
}
