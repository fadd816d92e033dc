//! Domain error types.

use thiserror::Error;

use crate::validation::ValidationMessage;

/// Top-level error type for the engine and its stores.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Another writer already appended at one of the versions this save
    /// tried to claim.
    #[error("concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        aggregate_id: String,
        /// The version the writer based its events on.
        expected: i64,
        /// The version found in the store.
        actual: i64,
    },

    /// The aggregate state failed validation and the manager is configured
    /// to reject invalid saves.
    #[error("validation failed: {}", join_messages(.0))]
    Validation(Vec<ValidationMessage>),

    /// An event could not be encoded for storage.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A store or builder was configured with unusable settings.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

fn join_messages(messages: &[ValidationMessage]) -> String {
    messages
        .iter()
        .map(ValidationMessage::as_str)
        .collect::<Vec<_>>()
        .join("; ")
}
