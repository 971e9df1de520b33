//! Pull-request webhook intake.
//!
//! Deliveries are authenticated with `X-Hub-Signature-256`: an HMAC-SHA256
//! of the raw body keyed with the shared secret, hex encoded and prefixed
//! with `sha256=`.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::error::SubmissionError;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const EVENT_HEADER: &str = "x-github-event";

const SIGNATURE_PREFIX: &str = "sha256=";
const HANDLED_ACTIONS: [&str; 3] = ["opened", "synchronize", "reopened"];

type HmacSha256 = Hmac<Sha256>;

/// `sha256=<hex>` signature of `body`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, SubmissionError> {
    Ok(format!("{SIGNATURE_PREFIX}{}", hex::encode(digest(secret, body)?)))
}

/// Check a delivery signature in constant time.
pub fn verify_signature(secret: &str, body: &[u8], signature: Option<&str>) -> Result<(), SubmissionError> {
    let provided = signature
        .and_then(|s| s.strip_prefix(SIGNATURE_PREFIX))
        .and_then(|hex_digest| hex::decode(hex_digest).ok())
        .ok_or(SubmissionError::Signature)?;

    let expected = digest(secret, body)?;
    if bool::from(expected.as_slice().ct_eq(provided.as_slice())) {
        Ok(())
    } else {
        Err(SubmissionError::Signature)
    }
}

fn digest(secret: &str, body: &[u8]) -> Result<Vec<u8>, SubmissionError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .map_err(|_| SubmissionError::Signature)?;
    mac.update(body);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// A pull request whose files should be (re)validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestUpdate {
    pub number: u64,
    pub author: String,
    pub head_sha: String,
}

#[derive(Debug, Deserialize)]
struct PullRequestPayload {
    action: String,
    number: u64,
    pull_request: PullRequest,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    user: User,
    head: Head,
}

#[derive(Debug, Deserialize)]
struct User {
    login: String,
}

#[derive(Debug, Deserialize)]
struct Head {
    sha: String,
}

/// Extract the pull request from a delivery.
///
/// Returns `None` for other event types and for actions that do not change
/// the proposed files (e.g. `closed`, `labeled`).
pub fn parse_pull_request_event(
    event: Option<&str>,
    body: &[u8],
) -> Result<Option<PullRequestUpdate>, SubmissionError> {
    if event != Some("pull_request") {
        return Ok(None);
    }

    let payload: PullRequestPayload =
        serde_json::from_slice(body).map_err(|e| SubmissionError::Payload(e.to_string()))?;
    if !HANDLED_ACTIONS.contains(&payload.action.as_str()) {
        return Ok(None);
    }

    Ok(Some(PullRequestUpdate {
        number: payload.number,
        author: payload.pull_request.user.login,
        head_sha: payload.pull_request.head.sha,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn payload(action: &str) -> Vec<u8> {
        json!({
            "action": action,
            "number": 12,
            "pull_request": {
                "user": { "login": "octocat" },
                "head": { "sha": "abc123" }
            }
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn test_signature_round_trip() {
        let body = payload("opened");
        let signature = sign("s3cret", &body).unwrap();
        assert!(signature.starts_with("sha256="));
        assert_ok!(verify_signature("s3cret", &body, Some(&signature)));
    }

    #[test]
    fn test_signature_rejects_tampering() {
        let body = payload("opened");
        let signature = sign("s3cret", &body).unwrap();

        assert_err!(verify_signature("other", &body, Some(&signature)));
        assert_err!(verify_signature("s3cret", b"{}", Some(&signature)));
        assert_err!(verify_signature("s3cret", &body, None));
        assert_err!(verify_signature("s3cret", &body, Some("sha1=deadbeef")));
        assert_err!(verify_signature("s3cret", &body, Some("sha256=zz")));
    }

    #[test]
    fn test_known_digest() {
        // Reference value from GitHub's webhook documentation.
        assert_eq!(
            sign("It's a Secret to Everybody", b"Hello, World!").unwrap(),
            "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17"
        );
    }

    #[test]
    fn test_parses_handled_actions() {
        for action in ["opened", "synchronize", "reopened"] {
            let update = parse_pull_request_event(Some("pull_request"), &payload(action))
                .unwrap()
                .unwrap();
            assert_eq!(update.number, 12);
            assert_eq!(update.author, "octocat");
            assert_eq!(update.head_sha, "abc123");
        }
    }

    #[test]
    fn test_ignores_other_events_and_actions() {
        assert_eq!(parse_pull_request_event(Some("push"), &payload("opened")).unwrap(), None);
        assert_eq!(parse_pull_request_event(None, &payload("opened")).unwrap(), None);
        assert_eq!(
            parse_pull_request_event(Some("pull_request"), &payload("closed")).unwrap(),
            None
        );
    }

    #[test]
    fn test_malformed_payload() {
        assert!(matches!(
            parse_pull_request_event(Some("pull_request"), b"not json"),
            Err(SubmissionError::Payload(_))
        ));
    }
}
