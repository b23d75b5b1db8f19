//! Authentication module for the TT2 auth server
//!
//! This module handles identifier allocation, password login,
//! per-principal session secrets and signed request checks.

pub mod allocator;
pub mod credentials;
pub mod handlers;
pub mod request;
pub mod secrets;
mod service;

pub use allocator::IdAllocator;
pub use credentials::CredentialVerifier;
pub use request::{RequestAuthenticator, SignatureEncoding, SignedRequest};
pub use secrets::{Secret, SecretManager};
pub use service::{AuthService, SessionGrant};
