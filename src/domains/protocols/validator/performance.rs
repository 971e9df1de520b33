//! Performance layer: advisory heuristics. Produces warnings only.

use serde_json::Value;

use super::{ValidationCategory, ValidationIssue, endpoint_path};
use crate::domains::protocols::model::{ProtocolDefinition, RateLimit};

/// Sustained rate above which a limit is considered aggressive.
const MAX_REQUESTS_PER_SECOND: f64 = 100.0;
const LARGE_PROTOCOL_ENDPOINTS: usize = 30;
const MANY_PARAMETERS: usize = 20;
const DEEP_NESTING: usize = 4;
/// Milliseconds.
const MAX_TIMEOUT_MS: u64 = 30_000;
/// Bytes.
const MAX_RESPONSE_SIZE: u64 = 10 * 1024 * 1024;

pub(super) fn check(protocol: &ProtocolDefinition) -> Vec<ValidationIssue> {
    let mut warnings = Vec::new();
    let mut warn = |path: String, message: String| {
        warnings.push(ValidationIssue::new(ValidationCategory::Performance, path, message));
    };

    if let Some(limit) = protocol.rate_limit
        && let Some(message) = aggressive(limit)
    {
        warn("rateLimit".into(), message);
    }

    let unlimited: Vec<&str> = protocol
        .endpoints
        .iter()
        .filter(|e| protocol.effective_rate_limit(e).is_none())
        .map(|e| e.name.as_str())
        .collect();
    if !unlimited.is_empty() {
        warn(
            "rateLimit".into(),
            format!("no rate limit declared for: {}", unlimited.join(", ")),
        );
    }

    if protocol.endpoints.len() > LARGE_PROTOCOL_ENDPOINTS {
        warn(
            "endpoints".into(),
            format!(
                "{} endpoints; consider splitting protocols above {LARGE_PROTOCOL_ENDPOINTS}",
                protocol.endpoints.len()
            ),
        );
    }

    for (index, endpoint) in protocol.endpoints.iter().enumerate() {
        if let Some(limit) = endpoint.rate_limit
            && let Some(message) = aggressive(limit)
        {
            warn(endpoint_path(index, "rateLimit"), message);
        }

        if endpoint.parameters.len() > MANY_PARAMETERS {
            warn(
                endpoint_path(index, "parameters"),
                format!("{} parameters; large input schemas degrade tool selection", endpoint.parameters.len()),
            );
        }

        if let Some(depth) = endpoint.parameters.iter().map(|p| p.depth()).max()
            && depth > DEEP_NESTING
        {
            warn(
                endpoint_path(index, "parameters"),
                format!("parameters nest {depth} levels deep (recommended at most {DEEP_NESTING})"),
            );
        }
    }

    if let Some(metadata) = &protocol.metadata {
        if let Some(timeout) = metadata.get("timeout").and_then(Value::as_u64)
            && timeout > MAX_TIMEOUT_MS
        {
            warn(
                "metadata.timeout".into(),
                format!("timeout of {timeout}ms exceeds the recommended {MAX_TIMEOUT_MS}ms"),
            );
        }
        if let Some(size) = metadata.get("maxResponseSize").and_then(Value::as_u64)
            && size > MAX_RESPONSE_SIZE
        {
            warn(
                "metadata.maxResponseSize".into(),
                format!("responses up to {size} bytes exceed the recommended {MAX_RESPONSE_SIZE} bytes"),
            );
        }
    }

    warnings
}

fn aggressive(limit: RateLimit) -> Option<String> {
    let per_second = f64::from(limit.requests) / limit.window.as_secs() as f64;
    (per_second > MAX_REQUESTS_PER_SECOND).then(|| {
        format!(
            "{} requests per {} (~{per_second:.0}/s) exceeds the recommended {MAX_REQUESTS_PER_SECOND}/s",
            limit.requests, limit.window
        )
    })
}
