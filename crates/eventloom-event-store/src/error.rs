//! Store-level failures and their mapping onto `DomainError`.

use eventloom_core::error::DomainError;
use thiserror::Error;

/// Errors raised inside the stores before they reach the engine.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database rejected a statement or the connection failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A state snapshot could not be encoded or decoded.
    #[error("snapshot codec error: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// An in-memory store's lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Snapshot(inner) => DomainError::Serialization(inner.to_string()),
            other => DomainError::Infrastructure(other.to_string()),
        }
    }
}
