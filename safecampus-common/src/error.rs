//! Common error types for SafeCampus

use thiserror::Error;

/// Common result type for SafeCampus operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across SafeCampus services
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}
