use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use regex::Regex;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::allocator::IdAllocator;
use crate::db::{Principal, PrincipalId, PrincipalStore};
use crate::error::{AuthError, DatabaseError};

/// Names take part in store lookups, so anything outside `[A-Za-z0-9_]` is refused.
pub fn validate_name(name: &str) -> Result<(), AuthError> {
    if Regex::new(r"^[A-Za-z0-9_]+$").is_ok_and(|re| re.is_match(name)) {
        Ok(())
    } else {
        Err(AuthError::InvalidInput("invalid user name".to_string()))
    }
}

fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Internal(format!("password hashing failed: {e}")))
}

/// Mismatches and unparseable stored hashes are indistinguishable to the caller.
fn password_matches(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("stored password hash is malformed: {}", e);
            false
        }
    }
}

/// Registers principals and checks their passwords against the store.
pub struct CredentialVerifier {
    store: Arc<dyn PrincipalStore>,
    allocator: IdAllocator,
    namespace: String,
}

impl CredentialVerifier {
    pub fn new(store: Arc<dyn PrincipalStore>, allocator: IdAllocator, namespace: String) -> Self {
        Self {
            store,
            allocator,
            namespace,
        }
    }

    pub async fn register(&self, name: &str, password: &str) -> Result<PrincipalId, AuthError> {
        validate_name(name)?;
        if password.is_empty() {
            return Err(AuthError::InvalidInput("password must not be empty".to_string()));
        }

        if self.store.find_id_by_name(name).await?.is_some() {
            return Err(AuthError::AlreadyExists);
        }

        let id = self.allocator.allocate(&self.namespace).await?;

        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))??;

        // A concurrent registration may claim the name between check and insert
        match self
            .store
            .insert_principal(&Principal::new(id, name.to_string(), password_hash))
            .await
        {
            Ok(()) => {}
            Err(DatabaseError::Duplicate) => {
                if self.store.find_id_by_name(name).await?.is_some() {
                    warn!(user_id = id, "name {} was registered concurrently", name);
                    return Err(AuthError::AlreadyExists);
                }
                return Err(DatabaseError::Duplicate.into());
            }
            Err(e) => return Err(e.into()),
        }

        info!(user_id = id, "registered principal {}", name);
        Ok(id)
    }

    pub async fn verify(&self, name: &str, password: &str) -> Result<PrincipalId, AuthError> {
        let id = self.lookup_id(name).await?;

        let stored = self
            .store
            .find_password_hash(id)
            .await?
            .ok_or(AuthError::NotFound)?;

        let password = password.to_string();
        let matches = tokio::task::spawn_blocking(move || password_matches(&password, &stored))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        if !matches {
            warn!(user_id = id, "password check failed");
            return Err(AuthError::AuthFailed);
        }

        Ok(id)
    }

    pub async fn lookup_id(&self, name: &str) -> Result<PrincipalId, AuthError> {
        validate_name(name)?;
        self.store
            .find_id_by_name(name)
            .await?
            .ok_or(AuthError::NotFound)
    }

    pub async fn lookup_name(&self, id: PrincipalId) -> Result<String, AuthError> {
        self.store
            .find_name_by_id(id)
            .await?
            .ok_or(AuthError::NotFound)
    }
}
