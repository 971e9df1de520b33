//! Repository access used by the gateway.

use async_trait::async_trait;

use super::error::SubmissionError;

/// The repository that receives protocol pull requests.
#[async_trait]
pub trait SubmissionSource: Send + Sync {
    /// Raw content of `path` at commit `reference`.
    async fn fetch_file(&self, path: &str, reference: &str) -> Result<String, SubmissionError>;

    /// Paths added or modified by the pull request. Removed files are left out.
    async fn changed_files(&self, pull_request: u64) -> Result<Vec<String>, SubmissionError>;

    /// Post `body` as a comment on the pull request.
    async fn comment(&self, pull_request: u64, body: &str) -> Result<(), SubmissionError>;

    /// Merge the pull request, provided its head is still `head_sha`.
    async fn merge(&self, pull_request: u64, head_sha: &str) -> Result<(), SubmissionError>;
}
