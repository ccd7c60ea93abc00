//! Storage collaborators
//!
//! The auth core only talks to these traits. PostgreSQL (`sqlx`) and
//! in-memory implementations are provided.

pub mod memory;
pub mod session;
pub mod user;

use thiserror::Error;

pub use memory::{MemorySessionStore, MemoryUserDirectory};
pub use session::{NewSession, PgSessionStore, Session, SessionStore};
pub use user::{PgUserDirectory, UserDirectory, UserRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            _ => StoreError::Unexpected(err.into()),
        }
    }
}
