//! Submissions domain module.
//!
//! Protocols can be proposed as pull requests against a repository. The
//! gateway validates each proposed protocol file, reports the result on the
//! pull request and optionally merges and activates clean submissions.
//!
//! ## Architecture
//!
//! - `model.rs` - submission events and records
//! - `gateway.rs` - validation, reporting and auto-merge
//! - `source.rs` - repository collaborator trait
//! - `github.rs` - GitHub REST implementation
//! - `webhook.rs` - signed pull-request webhook intake
//! - `error.rs` - submission errors

mod error;
mod gateway;
pub mod github;
mod model;
pub mod source;
pub mod webhook;

pub use error::SubmissionError;
pub use gateway::SubmissionGateway;
pub use github::GitHubSource;
pub use model::{Submission, SubmissionEvent, SubmissionStatus};
pub use source::SubmissionSource;
pub use webhook::{PullRequestUpdate, parse_pull_request_event, verify_signature};
