//! Error types
//!
//! Errors here never reach HTTP callers. The facade swallows publish failures
//! after logging them; these types exist for configuration loading and for
//! [`LogSink`](crate::publisher::LogSink) implementations.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Crate error type
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Message bus error (connection, publish or acknowledgement)
    #[error("Message bus error: {0}")]
    Bus(String),

    /// Record could not be encoded as JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Delivery was not confirmed in time
    #[error("Timed out after {0:?} waiting for delivery")]
    Timeout(Duration),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a later attempt could succeed without changing the input
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Bus(_) | Error::Timeout(_))
    }
}

// Manual From implementation for the boxed error
impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}
