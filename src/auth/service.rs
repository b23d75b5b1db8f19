use chrono::Duration;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::allocator::IdAllocator;
use crate::auth::credentials::CredentialVerifier;
use crate::auth::request::{RequestAuthenticator, SignedRequest};
use crate::auth::secrets::{Secret, SecretManager};
use crate::config::AuthConfig;
use crate::db::{PrincipalId, PrincipalStore};
use crate::error::AuthError;

/// A principal together with its current session secret.
#[derive(Debug, Clone)]
pub struct SessionGrant {
    pub user_id: PrincipalId,
    pub secret: Secret,
}

/// Entry point tying credentials, secrets and request signing together.
pub struct AuthService {
    credentials: CredentialVerifier,
    secrets: Arc<SecretManager>,
    authenticator: RequestAuthenticator,
}

impl AuthService {
    pub fn new(store: Arc<dyn PrincipalStore>, config: &AuthConfig) -> Self {
        let allocator = IdAllocator::new(store.clone(), config.max_allocation_attempts);
        let credentials =
            CredentialVerifier::new(store, allocator, config.user_namespace.clone());
        let secrets = Arc::new(SecretManager::new(Duration::minutes(config.secret_ttl_minutes)));
        let authenticator = RequestAuthenticator::new(
            secrets.clone(),
            Duration::seconds(config.max_clock_skew_secs),
            config.refresh_on_request,
        );

        Self {
            credentials,
            secrets,
            authenticator,
        }
    }

    pub fn secrets(&self) -> &Arc<SecretManager> {
        &self.secrets
    }

    pub async fn register(&self, name: &str, password: &str) -> Result<PrincipalId, AuthError> {
        self.credentials.register(name, password).await
    }

    /// Checks the password, then issues a secret or refreshes the live one.
    pub async fn login(&self, name: &str, password: &str) -> Result<SessionGrant, AuthError> {
        let user_id = self.credentials.verify(name, password).await?;
        let secret = self.secrets.issue_or_refresh(user_id).await;

        info!(user_id, "login successful for {}", name);
        Ok(SessionGrant { user_id, secret })
    }

    /// Confirms a presented secret by principal name and slides its expiration.
    pub async fn verify_secret(&self, name: &str, presented: &str) -> Result<SessionGrant, AuthError> {
        let user_id = self.credentials.lookup_id(name).await?;

        if !self.secrets.validate_and_refresh(user_id, presented).await {
            warn!(user_id, "secret verification failed");
            return Err(AuthError::AuthFailed);
        }

        let secret = self.secrets.peek(user_id).await.ok_or(AuthError::AuthFailed)?;
        Ok(SessionGrant { user_id, secret })
    }

    pub async fn authenticate_request<R: SignedRequest + ?Sized>(
        &self,
        request: &R,
        claimed: PrincipalId,
    ) -> Result<(), AuthError> {
        self.authenticator.authenticate(request, claimed).await
    }

    pub async fn username(&self, id: PrincipalId) -> Result<String, AuthError> {
        self.credentials.lookup_name(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::request::{compute_hmac, signing_message, HMAC_HEADER, TIME_SENT_HEADER};
    use crate::config::Settings;
    use crate::db::{IdCounter, MemoryStore};
    use actix_web::test::TestRequest;
    use chrono::Utc;

    fn service() -> AuthService {
        let settings = Settings::new_for_test().expect("Failed to load test config");
        let store = Arc::new(MemoryStore::with_counter("users", IdCounter::new(25173, 13849)));
        AuthService::new(store, &settings.auth)
    }

    #[test_log::test(tokio::test)]
    async fn test_auth_flow() {
        let service = service();
        let id = service.register("alice", "hunter2").await.unwrap();

        let grant = service.login("alice", "hunter2").await.unwrap();
        assert_eq!(grant.user_id, id);

        let time = Utc::now().timestamp().to_string();
        let sig = compute_hmac(grant.secret.encoded(), &signing_message(&time, "/games?id=3")).unwrap();
        let req = TestRequest::get()
            .uri("/games?id=3")
            .insert_header((TIME_SENT_HEADER, time))
            .insert_header((HMAC_HEADER, hex::encode(sig)))
            .to_http_request();
        assert!(service.authenticate_request(&req, id).await.is_ok());
        assert!(matches!(
            service.authenticate_request(&req, id.wrapping_add(1)).await,
            Err(AuthError::AuthFailed)
        ));

        assert_eq!(service.username(id).await.unwrap(), "alice");
    }

    #[tokio::test]
    async fn test_repeat_login_keeps_secret() {
        let service = service();
        service.register("alice", "hunter2").await.unwrap();

        let first = service.login("alice", "hunter2").await.unwrap();
        let second = service.login("alice", "hunter2").await.unwrap();
        assert_eq!(first.secret.encoded(), second.secret.encoded());
        assert!(second.secret.expires_at() >= first.secret.expires_at());
    }

    #[tokio::test]
    async fn test_bad_login_issues_no_secret() {
        let service = service();
        let id = service.register("alice", "hunter2").await.unwrap();

        assert!(matches!(
            service.login("alice", "wrong").await,
            Err(AuthError::AuthFailed)
        ));
        assert!(service.secrets().peek(id).await.is_none());
    }

    #[tokio::test]
    async fn test_verify_secret() {
        let service = service();
        service.register("alice", "hunter2").await.unwrap();
        let grant = service.login("alice", "hunter2").await.unwrap();

        let verified = service
            .verify_secret("alice", grant.secret.encoded())
            .await
            .unwrap();
        assert_eq!(verified.user_id, grant.user_id);
        assert_eq!(verified.secret.encoded(), grant.secret.encoded());
        assert!(verified.secret.expires_at() >= grant.secret.expires_at());

        assert!(matches!(
            service.verify_secret("alice", "not-the-secret").await,
            Err(AuthError::AuthFailed)
        ));
        assert!(matches!(
            service.verify_secret("bob", grant.secret.encoded()).await,
            Err(AuthError::NotFound)
        ));
        assert!(matches!(
            service.verify_secret("bad name", grant.secret.encoded()).await,
            Err(AuthError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_username() {
        let service = service();
        assert!(matches!(service.username(77).await, Err(AuthError::NotFound)));
    }
}
