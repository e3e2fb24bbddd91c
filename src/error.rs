//! Error types for the reqlimit crate.

use thiserror::Error;

use crate::identity::AddressParseError;

/// Main error type for reqlimit operations.
#[derive(Error, Debug)]
pub enum ReqlimitError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The client identity could not be derived from a request
    #[error("Identity extraction error: {0}")]
    AddressParse(#[from] AddressParseError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for reqlimit operations.
pub type Result<T> = std::result::Result<T, ReqlimitError>;
