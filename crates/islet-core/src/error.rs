//! Error type shared by all Islet crates.
//!
//! Scheduling itself never fails: unsupported host primitives, late
//! callbacks and undelivered signals degrade silently. These variants cover
//! caller mistakes at registration time and file loading.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IsletError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid boundary '{id}': {reason}")]
    InvalidBoundary { id: String, reason: String },

    #[error("Boundary id already registered: {0}")]
    DuplicateId(String),

    #[error("Scenario error: {0}")]
    Scenario(String),
}

pub type Result<T> = std::result::Result<T, IsletError>;

impl IsletError {
    pub fn invalid(id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidBoundary {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}
