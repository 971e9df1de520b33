//! Error types and handling for the MCP server.
//!
//! Each domain has its own error enum; this module folds them into one type
//! for code that spans domains (startup, transports, the CLI).

use thiserror::Error;

use crate::domains::protocols::{LifecycleError, LoadError};
use crate::domains::submissions::SubmissionError;
use crate::domains::tools::ToolError;

/// A specialized Result type for MCP server operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the MCP server.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Protocol load error: {0}")]
    Load(#[from] LoadError),

    #[error("Protocol lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Submission error: {0}")]
    Submission(#[from] SubmissionError),

    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors from file operations or network communication.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal server errors that should not occur under normal operation.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_convert() {
        let error: Error = LifecycleError::NotFound("weather-api".to_string()).into();
        assert_eq!(
            error.to_string(),
            "Protocol lifecycle error: protocol not found: weather-api"
        );

        let error: Error = SubmissionError::Signature.into();
        assert!(matches!(error, Error::Submission(_)));
    }
}
