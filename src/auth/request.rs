//! Stateless request authentication.
//!
//! A signed request carries three headers:
//!
//! * `Time-Sent` - decimal seconds since the Unix epoch
//! * `Hmac` - HMAC-SHA256 of `<Time-Sent>:<path and query>`, keyed with the
//!   principal's base64 secret text
//! * `Encoding` - optional encoding of `Hmac`, hex by default

use actix_web::HttpRequest;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::secrets::SecretManager;
use crate::db::PrincipalId;
use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

pub const TIME_SENT_HEADER: &str = "Time-Sent";
pub const HMAC_HEADER: &str = "Hmac";
pub const ENCODING_HEADER: &str = "Encoding";

/// The parts of an inbound request that take part in signing.
pub trait SignedRequest {
    fn header(&self, name: &str) -> Option<&str>;

    /// Path and query exactly as the client sent them.
    fn target(&self) -> String;
}

impl SignedRequest for HttpRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name).and_then(|v| v.to_str().ok())
    }

    fn target(&self) -> String {
        self.uri().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureEncoding {
    Hex,
    Base64,
    // Recognized, but no decoder exists for these
    Binary,
    Decimal,
    Other(String),
}

impl SignatureEncoding {
    /// Resolves the `Encoding` header; absence means hex.
    pub fn from_header(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return SignatureEncoding::Hex;
        };

        match value.to_ascii_lowercase().as_str() {
            "base64" | "64" => SignatureEncoding::Base64,
            "hex" | "hexadecimal" => SignatureEncoding::Hex,
            "binary" | "bits" => SignatureEncoding::Binary,
            "decimal" => SignatureEncoding::Decimal,
            _ => SignatureEncoding::Other(value.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SignatureEncoding::Hex => "hex",
            SignatureEncoding::Base64 => "base64",
            SignatureEncoding::Binary => "binary",
            SignatureEncoding::Decimal => "decimal",
            SignatureEncoding::Other(raw) => raw,
        }
    }

    pub fn decode(&self, signature: &str) -> Result<Vec<u8>, AuthError> {
        match self {
            SignatureEncoding::Hex => hex::decode(signature)
                .map_err(|e| AuthError::InvalidInput(format!("malformed hex signature: {e}"))),
            SignatureEncoding::Base64 => STANDARD
                .decode(signature)
                .map_err(|e| AuthError::InvalidInput(format!("malformed base64 signature: {e}"))),
            _ => Err(AuthError::Unsupported(self.name().to_string())),
        }
    }
}

/// HMAC-SHA256 of `message`, keyed with the raw bytes of `key`.
pub fn compute_hmac(key: &str, message: &str) -> Result<Vec<u8>, AuthError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key.as_bytes())
        .map_err(|e| AuthError::Internal(e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// The exact byte sequence a client signs.
pub fn signing_message(time_sent: &str, target: &str) -> String {
    format!("{}:{}", time_sent, target)
}

struct ParsedRequest {
    time_sent: String,
    message: String,
    signature: Vec<u8>,
}

fn parse_request<R: SignedRequest + ?Sized>(request: &R) -> Result<ParsedRequest, AuthError> {
    let time_sent = request
        .header(TIME_SENT_HEADER)
        .ok_or_else(|| AuthError::InvalidInput("no timestamp".to_string()))?
        .to_string();

    let signature = request
        .header(HMAC_HEADER)
        .ok_or_else(|| AuthError::InvalidInput("no signature".to_string()))?;

    let encoding = SignatureEncoding::from_header(request.header(ENCODING_HEADER));
    let signature = encoding.decode(signature)?;

    let message = signing_message(&time_sent, &request.target());

    Ok(ParsedRequest {
        time_sent,
        message,
        signature,
    })
}

/// Verifies time-bounded HMAC signatures against the principal's live secret.
pub struct RequestAuthenticator {
    secrets: Arc<SecretManager>,
    max_skew: Duration,
    refresh_on_success: bool,
}

impl RequestAuthenticator {
    pub fn new(secrets: Arc<SecretManager>, max_skew: Duration, refresh_on_success: bool) -> Self {
        Self {
            secrets,
            max_skew,
            refresh_on_success,
        }
    }

    pub async fn authenticate<R: SignedRequest + ?Sized>(
        &self,
        request: &R,
        claimed: PrincipalId,
    ) -> Result<(), AuthError> {
        self.authenticate_at(request, claimed, Utc::now()).await
    }

    pub async fn authenticate_at<R: SignedRequest + ?Sized>(
        &self,
        request: &R,
        claimed: PrincipalId,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let parsed = parse_request(request)?;

        let sent: i64 = parsed.time_sent.parse().map_err(|_| {
            AuthError::InvalidInput("error parsing time (seconds since epoch)".to_string())
        })?;

        // Window is inclusive on both sides; an overflowing difference is stale
        let fresh = sent
            .checked_sub(now.timestamp())
            .is_some_and(|delay| delay.unsigned_abs() <= self.max_skew.num_seconds().unsigned_abs());
        if !fresh {
            debug!(user_id = claimed, sent, "request outside freshness window");
            return Err(AuthError::Stale);
        }

        let secret = match self.secrets.peek(claimed).await {
            Some(secret) if !secret.is_expired_at(now) => secret,
            Some(_) => {
                warn!(user_id = claimed, "request signed with an expired secret");
                return Err(AuthError::AuthFailed);
            }
            None => {
                warn!(user_id = claimed, "no secret for that user");
                return Err(AuthError::AuthFailed);
            }
        };

        let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.encoded().as_bytes())
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        mac.update(parsed.message.as_bytes());
        if mac.verify_slice(&parsed.signature).is_err() {
            warn!(user_id = claimed, "signature mismatch");
            return Err(AuthError::AuthFailed);
        }

        if self.refresh_on_success {
            self.secrets.touch_at(claimed, now).await;
        }

        Ok(())
    }
}
