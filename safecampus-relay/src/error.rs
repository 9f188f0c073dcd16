//! Error types for safecampus-relay
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. Note that a duplicate submission is NOT represented here:
//! it is a distinguished non-error outcome of the intake pipeline so the
//! submitter can be told apart from a genuine failure.

use thiserror::Error;

/// Main error type for safecampus-relay
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Missing or malformed submitter input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Verification attempts exhausted
    #[error("Attempts exhausted: {0}")]
    Lockout(String),

    /// External classifier failure
    #[error("Classifier error: {0}")]
    Classifier(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<safecampus_common::Error> for Error {
    fn from(err: safecampus_common::Error) -> Self {
        match err {
            safecampus_common::Error::Config(msg) => Error::Config(msg),
            safecampus_common::Error::NotFound(msg) => Error::NotFound(msg),
            safecampus_common::Error::InvalidInput(msg) => Error::Validation(msg),
            safecampus_common::Error::Internal(msg) => Error::Internal(msg),
        }
    }
}

/// Convenience Result type using safecampus-relay Error
pub type Result<T> = std::result::Result<T, Error>;
