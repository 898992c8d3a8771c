//! Shared error model.

use thiserror::Error;

/// Result type used by the core crate.
pub type CoreResult<T> = Result<T, CoreError>;

/// Core-level error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A configuration value was rejected.
    #[error("invalid configuration for {key}: {message}")]
    Config { key: &'static str, message: String },
}

impl CoreError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn config(key: &'static str, message: impl Into<String>) -> Self {
        Self::Config {
            key,
            message: message.into(),
        }
    }
}
