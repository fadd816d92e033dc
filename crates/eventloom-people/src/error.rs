//! Eventloom People: demo error types.

use eventloom_core::error::DomainError;
use thiserror::Error;

/// Startup and runtime errors for the demo binary.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The engine or a store reported a failure.
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
}
