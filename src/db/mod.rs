//! Database module for the TT2 auth server
//!
//! This module holds the principal store abstraction the authentication
//! core talks to, with Postgres and in-memory implementations.

pub mod memory;
pub mod models;
pub mod operations;
pub mod store;

pub use memory::MemoryStore;
pub use models::{IdCounter, Principal, PrincipalId};
pub use operations::DbOperations;
pub use store::PrincipalStore;
#[cfg(test)]
pub use store::MockPrincipalStore;
