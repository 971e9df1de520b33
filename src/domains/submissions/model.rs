//! Submission records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a submitted protocol file stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Validated,
    Rejected,
    Merged,
}

/// One protocol file proposed in a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionEvent {
    pub pull_request_number: u64,
    pub author: String,
    pub protocol_file_path: String,
    /// Commit the file is read at.
    pub head_sha: String,
}

/// Outcome of processing a [`SubmissionEvent`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub pull_request_number: u64,
    pub author: String,
    pub protocol_file_path: String,
    pub head_sha: String,
    pub status: SubmissionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_name: Option<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub processed_at: DateTime<Utc>,
}

impl Submission {
    /// A fresh record for `event`, not yet validated.
    pub fn pending(event: &SubmissionEvent) -> Self {
        Self {
            pull_request_number: event.pull_request_number,
            author: event.author.clone(),
            protocol_file_path: event.protocol_file_path.clone(),
            head_sha: event.head_sha.clone(),
            status: SubmissionStatus::Pending,
            protocol_name: None,
            errors: Vec::new(),
            warnings: Vec::new(),
            processed_at: Utc::now(),
        }
    }

    /// Mark as rejected with `errors`.
    pub fn reject(mut self, errors: Vec<String>) -> Self {
        self.status = SubmissionStatus::Rejected;
        self.errors = errors;
        self.processed_at = Utc::now();
        self
    }

    /// Markdown validation report posted back to the pull request.
    pub fn report_markdown(&self) -> String {
        let verdict = match self.status {
            SubmissionStatus::Merged => "✅ Protocol validated and merged",
            SubmissionStatus::Validated => "✅ Protocol validated",
            SubmissionStatus::Rejected => "❌ Protocol rejected",
            SubmissionStatus::Pending => "⏳ Validation pending",
        };

        let mut out = format!("### {verdict}\n\n`{}`", self.protocol_file_path);
        if let Some(name) = &self.protocol_name {
            out.push_str(&format!(" declares protocol **{name}**"));
        }
        out.push_str(&format!(" at {}.\n", short_sha(&self.head_sha)));

        if !self.errors.is_empty() {
            out.push_str("\n#### Errors\n\n");
            for error in &self.errors {
                out.push_str(&format!("- {error}\n"));
            }
        }
        if !self.warnings.is_empty() {
            out.push_str("\n#### Warnings\n\n");
            for warning in &self.warnings {
                out.push_str(&format!("- {warning}\n"));
            }
        }
        out
    }
}

fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> SubmissionEvent {
        SubmissionEvent {
            pull_request_number: 42,
            author: "octocat".to_string(),
            protocol_file_path: "protocols/weather-api.json".to_string(),
            head_sha: "0123456789abcdef".to_string(),
        }
    }

    #[test]
    fn test_pending_then_rejected() {
        let submission = Submission::pending(&event());
        assert_eq!(submission.status, SubmissionStatus::Pending);

        let rejected = submission.reject(vec!["bad".to_string()]);
        assert_eq!(rejected.status, SubmissionStatus::Rejected);
        assert_eq!(rejected.errors, vec!["bad"]);
    }

    #[test]
    fn test_report_lists_findings() {
        let mut submission = Submission::pending(&event()).reject(vec![
            "[SecurityError] endpoints[0].path: HTTPS required".to_string(),
        ]);
        submission.warnings.push("[PerformanceWarning] rateLimit: none".to_string());
        submission.protocol_name = Some("weather-api".to_string());

        let report = submission.report_markdown();
        assert!(report.contains("Protocol rejected"));
        assert!(report.contains("**weather-api**"));
        assert!(report.contains("0123456"));
        assert!(report.contains("- [SecurityError]"));
        assert!(report.contains("#### Warnings"));
    }

    #[test]
    fn test_event_wire_format() {
        let event: SubmissionEvent = serde_json::from_value(serde_json::json!({
            "pullRequestNumber": 7,
            "author": "a",
            "protocolFilePath": "protocols/x.json",
            "headSha": "abc"
        }))
        .unwrap();
        assert_eq!(event.pull_request_number, 7);
    }
}
