//! Tool invocation error types.
//!
//! Every failure a generated tool can produce is one of these variants. They
//! never cross the invocation boundary as panics; the MCP surface renders
//! them through [`ToolError::payload`].

use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::domains::protocols::RateWindow;

/// One argument that failed schema validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterViolation {
    /// JSON pointer into the arguments, `""` for the root object.
    pub instance_path: String,
    pub message: String,
}

impl fmt::Display for ParameterViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.instance_path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.instance_path, self.message)
        }
    }
}

fn joined(violations: &[ParameterViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn whole_secs(duration: &Duration) -> u64 {
    duration.as_secs()
}

/// Errors that can occur while invoking a generated tool.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ToolError {
    /// The requested tool is not registered.
    #[error("Tool not found: {0}")]
    NotFound(String),

    /// Arguments did not match the tool's input schema.
    #[error("Invalid arguments for {tool}: {}", joined(.violations))]
    ParameterValidation {
        tool: String,
        violations: Vec<ParameterViolation>,
    },

    /// The endpoint's request budget for the current window is spent.
    #[error("Rate limit exceeded for {tool}: {limit} requests per {window}, retry in {}s", whole_secs(.retry_after).max(1))]
    RateLimitExceeded {
        tool: String,
        limit: u32,
        window: RateWindow,
        retry_after: Duration,
    },

    /// No credential is configured for an authenticated endpoint.
    #[error("Missing {scheme} credential for protocol {protocol}")]
    MissingCredential {
        protocol: String,
        scheme: &'static str,
    },

    /// The upstream call failed or answered with an error status.
    #[error("Invocation of {tool} failed: {message}")]
    Invocation {
        tool: String,
        message: String,
        status: Option<u16>,
        body: Option<Value>,
    },

    /// The upstream call did not complete in time.
    #[error("Invocation of {tool} timed out after {}s", whole_secs(.after))]
    Timeout { tool: String, after: Duration },

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolError {
    /// Create a new "not found" error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    /// Create a new "internal" error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an invocation failure without an upstream response.
    pub fn invocation(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invocation {
            tool: tool.into(),
            message: message.into(),
            status: None,
            body: None,
        }
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::ParameterValidation { .. } => "parameter_validation",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::MissingCredential { .. } => "missing_credential",
            Self::Invocation { .. } => "invocation_failed",
            Self::Timeout { .. } => "timeout",
            Self::Internal(_) => "internal",
        }
    }

    /// Structured body returned to the calling agent.
    pub fn payload(&self) -> Value {
        let mut payload = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        let details = match self {
            Self::ParameterValidation { violations, .. } => json!({ "violations": violations }),
            Self::RateLimitExceeded {
                limit,
                window,
                retry_after,
                ..
            } => json!({
                "limit": limit,
                "window": window,
                "retryAfterMs": u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
            }),
            Self::Invocation { status, body, .. } => json!({ "status": status, "body": body }),
            _ => return payload,
        };
        if let (Some(target), Value::Object(extra)) = (payload.as_object_mut(), details) {
            target.extend(extra);
        }
        payload
    }
}
