//! GitHub REST implementation of [`SubmissionSource`].

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::error::SubmissionError;
use super::source::SubmissionSource;
use crate::core::config::SubmissionConfig;
use crate::domains::tools::executor::read_limited;

const API_VERSION: &str = "2022-11-28";
const PAGE_SIZE: usize = 100;
// GitHub stops listing pull-request files after 3000 entries.
const MAX_PAGES: usize = 30;

#[derive(Debug, Deserialize)]
struct PullRequestFile {
    filename: String,
    status: String,
}

/// Talks to `api_url` on behalf of one repository.
#[derive(Clone)]
pub struct GitHubSource {
    client: Client,
    api_url: String,
    repository: String,
    token: String,
    max_file_bytes: usize,
}

impl GitHubSource {
    pub fn new(
        api_url: impl Into<String>,
        repository: impl Into<String>,
        token: impl Into<String>,
        max_file_bytes: usize,
    ) -> Result<Self, SubmissionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("protocol-mcp-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SubmissionError::api(None, e.to_string()))?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            repository: repository.into(),
            token: token.into(),
            max_file_bytes,
        })
    }

    /// Build from configuration; fails when repository or token is missing.
    pub fn from_config(config: &SubmissionConfig, max_file_bytes: usize) -> Result<Self, SubmissionError> {
        let repository = config
            .repository
            .as_deref()
            .ok_or(SubmissionError::NotConfigured("repository"))?;
        let token = config
            .token
            .as_deref()
            .ok_or(SubmissionError::NotConfigured("token"))?;
        Self::new(&config.api_url, repository, token, max_file_bytes)
    }

    fn repo_url(&self, tail: &str) -> String {
        format!("{}/repos/{}/{}", self.api_url, self.repository, tail)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.token)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, SubmissionError> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| SubmissionError::api(None, e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or_else(|| status.to_string());
        Err(SubmissionError::api(Some(status.as_u16()), message))
    }
}

impl std::fmt::Debug for GitHubSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubSource")
            .field("api_url", &self.api_url)
            .field("repository", &self.repository)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl SubmissionSource for GitHubSource {
    async fn fetch_file(&self, path: &str, reference: &str) -> Result<String, SubmissionError> {
        let fetch_error = |message: String| SubmissionError::Fetch {
            path: path.to_string(),
            reference: reference.to_string(),
            message,
        };

        let url = self.repo_url(&format!(
            "contents/{}?ref={}",
            encode_path(path),
            urlencoding::encode(reference)
        ));
        let response = self
            .send(
                self.client
                    .get(url)
                    .header("Accept", "application/vnd.github.raw+json"),
            )
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let bytes = read_limited(response, self.max_file_bytes)
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        String::from_utf8(bytes).map_err(|_| fetch_error("file is not valid UTF-8".to_string()))
    }

    async fn changed_files(&self, pull_request: u64) -> Result<Vec<String>, SubmissionError> {
        let mut files = Vec::new();
        for page in 1..=MAX_PAGES {
            let url = self.repo_url(&format!(
                "pulls/{pull_request}/files?per_page={PAGE_SIZE}&page={page}"
            ));
            let batch: Vec<PullRequestFile> = self
                .send(self.client.get(url).header("Accept", "application/vnd.github+json"))
                .await?
                .json()
                .await
                .map_err(|e| SubmissionError::api(None, e.to_string()))?;

            let last = batch.len() < PAGE_SIZE;
            files.extend(
                batch
                    .into_iter()
                    .filter(|f| f.status != "removed")
                    .map(|f| f.filename),
            );
            if last {
                break;
            }
        }
        debug!(pull_request, count = files.len(), "Listed changed files");
        Ok(files)
    }

    async fn comment(&self, pull_request: u64, body: &str) -> Result<(), SubmissionError> {
        let url = self.repo_url(&format!("issues/{pull_request}/comments"));
        self.send(self.client.post(url).json(&json!({ "body": body })))
            .await
            .map(drop)
    }

    async fn merge(&self, pull_request: u64, head_sha: &str) -> Result<(), SubmissionError> {
        let url = self.repo_url(&format!("pulls/{pull_request}/merge"));
        self.send(self.client.put(url).json(&json!({
            "sha": head_sha,
            "merge_method": "squash",
        })))
        .await
        .map(drop)
    }
}

/// Percent-encode each segment of a repository path.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_path_keeps_separators() {
        assert_eq!(encode_path("protocols/weather api.json"), "protocols/weather%20api.json");
    }

    #[test]
    fn test_from_config_requires_repository_and_token() {
        let mut config = SubmissionConfig::default();
        assert!(matches!(
            GitHubSource::from_config(&config, 1024),
            Err(SubmissionError::NotConfigured("repository"))
        ));

        config.repository = Some("acme/protocols".to_string());
        assert!(matches!(
            GitHubSource::from_config(&config, 1024),
            Err(SubmissionError::NotConfigured("token"))
        ));

        config.token = Some("ghp_secret".to_string());
        let source = GitHubSource::from_config(&config, 1024).unwrap();
        assert_eq!(
            source.repo_url("pulls/1/files"),
            "https://api.github.com/repos/acme/protocols/pulls/1/files"
        );
        assert!(!format!("{source:?}").contains("ghp_secret"));
    }
}
