//! Submission gateway errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("failed to fetch {path} at {reference}: {message}")]
    Fetch {
        path: String,
        reference: String,
        message: String,
    },

    #[error("repository API error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Api { status: Option<u16>, message: String },

    #[error("webhook signature is missing or invalid")]
    Signature,

    #[error("malformed webhook payload: {0}")]
    Payload(String),

    #[error("submissions are not configured: {0}")]
    NotConfigured(&'static str),
}

impl SubmissionError {
    pub(crate) fn api(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }
}
