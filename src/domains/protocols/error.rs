//! Protocol loading and lifecycle errors.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::validator::ValidationReport;
use crate::core::security::UrlSecurityError;

/// Why a source could not be turned into a compiled artifact.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("insecure protocol source: {0}")]
    InsecureSource(#[from] UrlSecurityError),

    #[error("{origin} exceeds the {limit} byte limit")]
    TooLarge { origin: String, limit: usize },

    #[error("{origin} is not valid JSON: {message}")]
    MalformedJson { origin: String, message: String },

    #[error("loading {origin} timed out after {}s", .after.as_secs())]
    Timeout { origin: String, after: Duration },

    #[error("{origin} failed validation with {} error(s)", .report.errors.len())]
    Validation {
        origin: String,
        protocol_name: Option<String>,
        report: ValidationReport,
    },

    #[error("failed to compile tools for {protocol} ({origin}): {message}")]
    Compile {
        origin: String,
        protocol: String,
        message: String,
    },

    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

impl LoadError {
    /// Protocol name, when the document got far enough to declare one.
    pub fn protocol_name(&self) -> Option<&str> {
        match self {
            Self::Validation { protocol_name, .. } => protocol_name.as_deref(),
            Self::Compile { protocol, .. } => Some(protocol),
            _ => None,
        }
    }

    /// Human-readable error lines, one per finding.
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::Validation { report, .. } => report.error_messages(),
            other => vec![other.to_string()],
        }
    }
}

/// Failures of registry-level operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("protocol {protocol} collides with registered tools: {}", .tools.join(", "))]
    ToolNameCollision { protocol: String, tools: Vec<String> },

    #[error("protocol not found: {0}")]
    NotFound(String),

    #[error("source for {expected} now declares protocol {found}")]
    NameMismatch { expected: String, found: String },

    /// A later request for the same protocol completed first.
    #[error("a newer operation on protocol {0} completed first")]
    Superseded(String),
}

impl LifecycleError {
    /// Human-readable error lines, one per finding.
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::Load(error) => error.messages(),
            other => vec![other.to_string()],
        }
    }
}
