//! Error types shared by flatload crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Errors raised by the shared utilities
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid identifier '{name}': {reason}")]
    InvalidIdentifier { name: String, reason: String },

    #[error("Invalid value '{value}' for {key}")]
    InvalidSetting { key: String, value: String },

    #[error("Logging initialization failed: {0}")]
    Logging(String),
}

impl CommonError {
    pub fn invalid_identifier(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_setting(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidSetting {
            key: key.into(),
            value: value.into(),
        }
    }
}
