//! Common error types for PhysioCoach

use thiserror::Error;

/// Common result type for PhysioCoach operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the PhysioCoach crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input or malformed data from a collaborator
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
