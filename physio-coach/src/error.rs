//! Error types for physio-coach
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//! Network failures on the capture path are not errors: they surface as
//! `PoseResult::Error` values. This enum covers everything else.

use thiserror::Error;

/// Main error type for physio-coach
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP transport errors (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Backend answered with a non-success status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Frame acquisition or compression errors
    #[error("Capture error: {0}")]
    Capture(String),

    /// Guarded transition attempted before its precondition holds
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Operation not valid in the current session phase
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the common library
    #[error(transparent)]
    Common(#[from] physio_common::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e.to_string())
    }
}

/// Convenience Result type using physio-coach Error
pub type Result<T> = std::result::Result<T, Error>;
