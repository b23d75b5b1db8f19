use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;
use tracing::debug;

use crate::db::PrincipalId;

/// Size of a session secret in bytes (512 bits).
pub const SECRET_BYTES: usize = 64;

/// Session secret of one principal.
///
/// The value is a uniformly random integer below 2^512 carried as standard
/// base64 of its minimal big-endian bytes. Clients use that base64 text as
/// their HMAC key.
#[derive(Clone)]
pub struct Secret {
    encoded: String,
    expires_at: DateTime<Utc>,
}

impl Secret {
    fn generate(now: DateTime<Utc>, ttl: Duration) -> Self {
        let mut bytes = [0u8; SECRET_BYTES];
        OsRng.fill_bytes(&mut bytes);

        // An integer's byte form carries no leading zero bytes
        let start = bytes.iter().position(|b| *b != 0).unwrap_or(SECRET_BYTES);

        Self {
            encoded: STANDARD.encode(&bytes[start..]),
            expires_at: now + ttl,
        }
    }

    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn expiration_utc(&self) -> String {
        self.expires_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// Usable while `now <= expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Compares digests so timing does not reveal a matching prefix.
    fn matches(&self, presented: &str) -> bool {
        Sha256::digest(self.encoded.as_bytes()) == Sha256::digest(presented.as_bytes())
    }

    fn refresh(&mut self, now: DateTime<Utc>, ttl: Duration) {
        self.expires_at = now + ttl;
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("encoded", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Process-wide table of live session secrets, at most one per principal.
///
/// Expiry is checked lazily on access; nothing sweeps the table.
pub struct SecretManager {
    secrets: RwLock<HashMap<PrincipalId, Secret>>,
    ttl: Duration,
}

impl SecretManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            secrets: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn issue_or_refresh(&self, id: PrincipalId) -> Secret {
        self.issue_or_refresh_at(id, Utc::now()).await
    }

    /// Keeps a live secret's value and slides its expiration; replaces a
    /// missing or expired one with a fresh random value.
    pub async fn issue_or_refresh_at(&self, id: PrincipalId, now: DateTime<Utc>) -> Secret {
        let mut secrets = self.secrets.write().await;

        if let Some(secret) = secrets.get_mut(&id).filter(|s| !s.is_expired_at(now)) {
            debug!(user_id = id, "refreshing live secret");
            secret.refresh(now, self.ttl);
            return secret.clone();
        }

        debug!(user_id = id, "issuing new secret");
        let secret = Secret::generate(now, self.ttl);
        secrets.insert(id, secret.clone());
        secret
    }

    /// Returns the stored secret, expired or not.
    pub async fn peek(&self, id: PrincipalId) -> Option<Secret> {
        self.secrets.read().await.get(&id).cloned()
    }

    pub async fn validate_and_refresh(&self, id: PrincipalId, presented: &str) -> bool {
        self.validate_and_refresh_at(id, presented, Utc::now()).await
    }

    pub async fn validate_and_refresh_at(
        &self,
        id: PrincipalId,
        presented: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let mut secrets = self.secrets.write().await;

        let Some(secret) = secrets.get_mut(&id) else {
            debug!(user_id = id, "no secret found");
            return false;
        };
        if secret.is_expired_at(now) {
            debug!(user_id = id, "secret has expired");
            return false;
        }
        if !secret.matches(presented) {
            debug!(user_id = id, "secrets do not match");
            return false;
        }

        secret.refresh(now, self.ttl);
        true
    }

    /// Slides the expiration of a live secret without checking its value.
    pub async fn touch_at(&self, id: PrincipalId, now: DateTime<Utc>) -> bool {
        let mut secrets = self.secrets.write().await;
        match secrets.get_mut(&id) {
            Some(secret) if !secret.is_expired_at(now) => {
                secret.refresh(now, self.ttl);
                true
            }
            _ => false,
        }
    }

    pub async fn active_count(&self) -> usize {
        let now = Utc::now();
        self.secrets
            .read()
            .await
            .values()
            .filter(|s| !s.is_expired_at(now))
            .count()
    }
}
