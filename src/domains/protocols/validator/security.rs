//! Security layer: outbound URL policy for every declared URL.

use super::{ValidationCategory, ValidationIssue, ValidatorConfig, endpoint_path};
use crate::core::security::url_violations;
use crate::domains::protocols::model::{Authentication, ProtocolDefinition};

pub(super) fn check(protocol: &ProtocolDefinition, config: &ValidatorConfig) -> Vec<ValidationIssue> {
    // The allow-list only binds in strict mode.
    let allowed: &[String] = if config.strict_mode {
        &config.allowed_domains
    } else {
        &[]
    };

    let mut issues = Vec::new();

    for (index, endpoint) in protocol.endpoints.iter().enumerate() {
        for violation in url_violations(&endpoint.path, allowed) {
            issues.push(ValidationIssue::new(
                ValidationCategory::Security,
                endpoint_path(index, "path"),
                violation.to_string(),
            ));
        }
    }

    if let Some(Authentication::OAuth2 { token_url, .. }) = &protocol.authentication {
        for violation in url_violations(token_url, allowed) {
            issues.push(ValidationIssue::new(
                ValidationCategory::Security,
                "authentication.tokenUrl",
                violation.to_string(),
            ));
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::protocols::validator::fixtures::weather;
    use serde_json::json;

    fn protocol(raw: serde_json::Value) -> ProtocolDefinition {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_https_endpoint_passes() {
        assert!(check(&protocol(weather()), &ValidatorConfig::default()).is_empty());
    }

    #[test]
    fn test_http_endpoint_references_path() {
        let mut raw = weather();
        raw["endpoints"][0]["path"] = json!("http://api.weather.example/current");
        let issues = check(&protocol(raw), &ValidatorConfig::default());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "endpoints[0].path");
        assert!(issues[0].message.contains("HTTPS"));
    }

    #[test]
    fn test_embedded_key_rejected() {
        let mut raw = weather();
        raw["endpoints"][0]["path"] = json!("https://api.weather.example/current?apikey=deadbeef42");
        let issues = check(&protocol(raw), &ValidatorConfig::default());
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("credential"));
    }

    #[test]
    fn test_allowed_domains_only_in_strict_mode() {
        let lenient = ValidatorConfig {
            strict_mode: false,
            allowed_domains: vec!["example.com".to_string()],
            ..Default::default()
        };
        assert!(check(&protocol(weather()), &lenient).is_empty());

        let strict = ValidatorConfig {
            strict_mode: true,
            ..lenient
        };
        let issues = check(&protocol(weather()), &strict);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("allowed domain"));
    }

    #[test]
    fn test_oauth_token_url_must_be_https() {
        let mut raw = weather();
        raw["authentication"] = json!({ "type": "oauth2", "tokenUrl": "http://auth.weather.example/token" });
        let issues = check(&protocol(raw), &ValidatorConfig::default());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "authentication.tokenUrl");
    }
}
