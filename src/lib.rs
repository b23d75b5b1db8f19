pub mod auth;
pub mod config;
pub mod db;
pub mod error;

use std::sync::Arc;
use std::time::Duration;
use actix_web::{web, HttpResponse};

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use auth::{AuthService, SecretManager, SessionGrant};
pub use db::{DbOperations, MemoryStore, PrincipalStore};

/// Health check endpoint handler
/// Returns a JSON response with server status, timestamp and live session count
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let active_sessions = state.auth_service.secrets().active_count().await;

    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "active_sessions": active_sessions,
    }))
}

/// Application state shared across all workers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub auth_service: Arc<AuthService>,
}

impl AppState {
    /// Connects to Postgres and applies pending migrations.
    pub async fn new(config: Settings) -> Result<Self> {
        let db = DbOperations::new_with_options(
            &config.database.url,
            config.database.max_connections,
            Duration::from_secs(config.database.acquire_timeout_secs),
        )
        .await?;
        db.run_migrations().await?;

        Ok(Self::with_store(config, Arc::new(db)))
    }

    pub fn with_store(config: Settings, store: Arc<dyn PrincipalStore>) -> Self {
        let auth_service = AuthService::new(store, &config.auth);

        Self {
            config: Arc::new(config),
            auth_service: Arc::new(auth_service),
        }
    }
}
