use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Short public identifier of a principal, never zero.
pub type PrincipalId = u16;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
}

impl Principal {
    pub fn new(id: PrincipalId, name: String, password_hash: String) -> Self {
        Self {
            id,
            name,
            password_hash,
        }
    }
}

/// Persisted state of an identifier namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdCounter {
    pub count: u64,
    pub scale: u64,
    pub add_const: u64,
}

impl IdCounter {
    pub fn new(scale: u64, add_const: u64) -> Self {
        Self {
            count: 0,
            scale,
            add_const,
        }
    }

    /// Steps the counter and returns `(count * scale + add_const) mod 65536`.
    pub fn advance(&mut self) -> u16 {
        self.count = self.count.wrapping_add(1);
        (self
            .count
            .wrapping_mul(self.scale)
            .wrapping_add(self.add_const)
            % 65536) as u16
    }
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct IdCounterRow {
    pub count: i64,
    pub scale: i64,
    pub add_const: i64,
}

impl From<IdCounterRow> for IdCounter {
    fn from(row: IdCounterRow) -> Self {
        Self {
            count: row.count as u64,
            scale: row.scale as u64,
            add_const: row.add_const as u64,
        }
    }
}
