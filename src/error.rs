use std::io;
use thiserror::Error;

/// Custom error type for the DevBot diagnostics library
#[derive(Error, Debug)]
pub enum DevbotError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Result type alias for DevBot operations
pub type Result<T> = std::result::Result<T, DevbotError>;

impl DevbotError {
    /// Create a storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        DevbotError::Storage(msg.into())
    }

    /// Create a runtime error
    pub fn runtime<S: Into<String>>(msg: S) -> Self {
        DevbotError::Runtime(msg.into())
    }
}
