//! Submission Gateway: validates protocol files proposed in pull requests.
//!
//! A submitted file is fetched at the pull-request head and compiled by the
//! loader exactly as an installed protocol would be, without touching the
//! live registry. Clean submissions may be merged automatically; a merged
//! protocol is then installed.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::error::SubmissionError;
use super::model::{Submission, SubmissionEvent, SubmissionStatus};
use super::source::SubmissionSource;
use super::webhook::{PullRequestUpdate, parse_pull_request_event, verify_signature};
use crate::core::config::SubmissionConfig;
use crate::domains::protocols::{LifecycleEvent, LifecycleManager, LoadError, LoadedArtifact, ProtocolSource};

pub struct SubmissionGateway {
    source: Arc<dyn SubmissionSource>,
    lifecycle: Arc<LifecycleManager>,
    config: SubmissionConfig,
}

impl SubmissionGateway {
    pub fn new(
        source: Arc<dyn SubmissionSource>,
        lifecycle: Arc<LifecycleManager>,
        config: SubmissionConfig,
    ) -> Self {
        Self {
            source,
            lifecycle,
            config,
        }
    }

    pub fn config(&self) -> &SubmissionConfig {
        &self.config
    }

    /// Validate one submitted file, report back and merge when allowed.
    ///
    /// Never fails: every problem ends up in the returned record.
    #[instrument(skip_all, fields(pr = event.pull_request_number, path = %event.protocol_file_path))]
    pub async fn process(&self, event: SubmissionEvent) -> Submission {
        let mut submission = Submission::pending(&event);

        match self.validate(&event).await {
            Ok(artifact) => {
                submission.status = SubmissionStatus::Validated;
                submission.protocol_name = Some(artifact.name().to_string());
                submission.warnings = artifact.report.warning_messages();
                if self.config.auto_merge {
                    self.merge(&event, artifact, &mut submission).await;
                }
            }
            Err(Rejection {
                protocol_name,
                errors,
                warnings,
            }) => {
                submission = submission.reject(errors);
                submission.protocol_name = protocol_name;
                submission.warnings = warnings;
            }
        }

        if let Err(error) = self
            .source
            .comment(event.pull_request_number, &submission.report_markdown())
            .await
        {
            warn!("Could not post validation report: {}", error);
        }

        submission.processed_at = chrono::Utc::now();
        info!(
            status = ?submission.status,
            errors = submission.errors.len(),
            warnings = submission.warnings.len(),
            "Processed submission"
        );
        self.lifecycle
            .events()
            .publish(LifecycleEvent::SubmissionProcessed(submission.clone()));
        submission
    }

    /// Process every protocol file the pull request adds or modifies.
    pub async fn process_pull_request(
        &self,
        update: PullRequestUpdate,
    ) -> Result<Vec<Submission>, SubmissionError> {
        let files = self.source.changed_files(update.number).await?;
        let mut submissions = Vec::new();
        for path in files.into_iter().filter(|p| self.is_protocol_file(p)) {
            let event = SubmissionEvent {
                pull_request_number: update.number,
                author: update.author.clone(),
                protocol_file_path: path,
                head_sha: update.head_sha.clone(),
            };
            submissions.push(self.process(event).await);
        }
        if submissions.is_empty() {
            info!(pr = update.number, "Pull request touches no protocol files");
        }
        Ok(submissions)
    }

    /// Authenticate and handle one webhook delivery.
    pub async fn handle_webhook(
        &self,
        event: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<Vec<Submission>, SubmissionError> {
        let secret = self
            .config
            .webhook_secret
            .as_deref()
            .ok_or(SubmissionError::NotConfigured("webhook secret"))?;
        verify_signature(secret, body, signature)?;

        match parse_pull_request_event(event, body)? {
            Some(update) => self.process_pull_request(update).await,
            None => Ok(Vec::new()),
        }
    }

    fn is_protocol_file(&self, path: &str) -> bool {
        path.starts_with(&self.config.protocols_path_prefix) && path.ends_with(".json")
    }

    async fn validate(&self, event: &SubmissionEvent) -> Result<LoadedArtifact, Rejection> {
        let content = self
            .source
            .fetch_file(&event.protocol_file_path, &event.head_sha)
            .await
            .map_err(|e| Rejection::from_errors(vec![e.to_string()]))?;

        let origin = format!("pr-{}:{}", event.pull_request_number, event.protocol_file_path);
        let artifact = self
            .lifecycle
            .loader()
            .load(&ProtocolSource::inline(origin, content))
            .await
            .map_err(Rejection::from)?;

        // Tool names owned by a different protocol would collide on install.
        let snapshot = self.lifecycle.registry().snapshot();
        let taken: Vec<String> = snapshot
            .iter()
            .filter(|registered| registered.category != artifact.name())
            .map(|registered| registered.tool.name().to_string())
            .filter(|name| artifact.tools.iter().any(|t| t.name() == name.as_str()))
            .collect();
        if !taken.is_empty() {
            return Err(Rejection {
                protocol_name: Some(artifact.name().to_string()),
                errors: vec![format!(
                    "tool names already provided by another protocol: {}",
                    taken.join(", ")
                )],
                warnings: artifact.report.warning_messages(),
            });
        }

        Ok(artifact)
    }

    async fn merge(&self, event: &SubmissionEvent, artifact: LoadedArtifact, submission: &mut Submission) {
        if let Err(error) = self.source.merge(event.pull_request_number, &event.head_sha).await {
            warn!("Auto-merge failed: {}", error);
            submission.warnings.push(format!("auto-merge failed: {error}"));
            return;
        }
        submission.status = SubmissionStatus::Merged;

        if let Err(error) = self.lifecycle.install(artifact).await {
            warn!("Merged protocol could not be activated: {}", error);
            submission
                .warnings
                .push(format!("merged but not activated: {error}"));
        }
    }
}

impl std::fmt::Debug for SubmissionGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionGateway")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

struct Rejection {
    protocol_name: Option<String>,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl Rejection {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            protocol_name: None,
            errors,
            warnings: Vec::new(),
        }
    }
}

impl From<LoadError> for Rejection {
    fn from(error: LoadError) -> Self {
        let warnings = match &error {
            LoadError::Validation { report, .. } => report.warning_messages(),
            _ => Vec::new(),
        };
        Self {
            protocol_name: error.protocol_name().map(str::to_string),
            errors: error.messages(),
            warnings,
        }
    }
}
