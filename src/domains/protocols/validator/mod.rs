//! Protocol Validator.
//!
//! Runs four ordered rule layers over a raw protocol document:
//!
//! 1. **schema** - structure, types, identifiers, constraint legality
//! 2. **business** - endpoint count, duplicates, placeholders
//! 3. **security** - HTTPS, embedded credentials, host allow-list
//! 4. **performance** - advisory heuristics, warnings only
//!
//! Layers 2-4 run on the typed model, so they only run once the schema
//! layer has passed. Validation is pure: the same input always yields the
//! same report, and nothing is registered or generated here.

mod business;
mod performance;
mod schema;
mod security;

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::model::ProtocolDefinition;
use crate::core::config::ProtocolsConfig;

/// Default maximum number of endpoints in one protocol.
pub const DEFAULT_MAX_ENDPOINTS: usize = 50;

/// Rule layer that produced an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationCategory {
    Schema,
    BusinessLogic,
    Security,
    Performance,
}

impl fmt::Display for ValidationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Schema => "SchemaError",
            Self::BusinessLogic => "BusinessLogicError",
            Self::Security => "SecurityError",
            Self::Performance => "PerformanceWarning",
        })
    }
}

/// One finding, located by a JSON path such as `endpoints[0].path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub category: ValidationCategory,
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(category: ValidationCategory, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.category, self.path, self.message)
    }
}

/// Aggregated outcome of validating one protocol document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    fn from_issues(errors: Vec<ValidationIssue>, warnings: Vec<ValidationIssue>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Errors rendered as strings.
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    /// Warnings rendered as strings.
    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(ToString::to_string).collect()
    }

    /// Whether any error belongs to `category`.
    pub fn has_error(&self, category: ValidationCategory) -> bool {
        self.errors.iter().any(|e| e.category == category)
    }
}

/// A protocol that passed every blocking layer.
///
/// Only the validator constructs this, so tool generation cannot be called
/// on an unvalidated definition.
#[derive(Debug, Clone)]
pub struct ValidatedProtocol {
    definition: Arc<ProtocolDefinition>,
}

impl ValidatedProtocol {
    pub fn definition(&self) -> &Arc<ProtocolDefinition> {
        &self.definition
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }
}

/// Validator settings.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Enforces `allowed_domains` when set.
    pub strict_mode: bool,
    pub max_endpoints: usize,
    pub allowed_domains: Vec<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            max_endpoints: DEFAULT_MAX_ENDPOINTS,
            allowed_domains: Vec::new(),
        }
    }
}

impl From<&ProtocolsConfig> for ValidatorConfig {
    fn from(config: &ProtocolsConfig) -> Self {
        Self {
            strict_mode: config.strict_mode,
            max_endpoints: config.max_endpoints,
            allowed_domains: config.allowed_domains.clone(),
        }
    }
}

/// Runs the rule layers over raw protocol documents.
#[derive(Debug, Clone, Default)]
pub struct ProtocolValidator {
    config: ValidatorConfig,
}

impl ProtocolValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate a raw document and report every finding.
    pub fn validate(&self, raw: &Value) -> ValidationReport {
        match self.check(raw) {
            Ok((_, report)) | Err(report) => report,
        }
    }

    /// Validate a raw document and, if it passes, return the typed protocol.
    pub fn validate_protocol(
        &self,
        raw: &Value,
    ) -> Result<(ValidatedProtocol, ValidationReport), ValidationReport> {
        self.check(raw)
    }

    fn check(&self, raw: &Value) -> Result<(ValidatedProtocol, ValidationReport), ValidationReport> {
        let schema_errors = schema::check(raw);
        if !schema_errors.is_empty() {
            debug!(errors = schema_errors.len(), "Schema layer rejected protocol");
            return Err(ValidationReport::from_issues(schema_errors, Vec::new()));
        }

        let protocol: ProtocolDefinition = match serde_json::from_value(raw.clone()) {
            Ok(p) => p,
            Err(e) => {
                let issue = ValidationIssue::new(ValidationCategory::Schema, "$", e.to_string());
                return Err(ValidationReport::from_issues(vec![issue], Vec::new()));
            }
        };

        let mut errors = business::check(&protocol, &self.config);
        errors.extend(security::check(&protocol, &self.config));
        let warnings = performance::check(&protocol);

        let report = ValidationReport::from_issues(errors, warnings);
        debug!(
            protocol = %protocol.name,
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "Protocol validated"
        );

        if report.valid {
            let validated = ValidatedProtocol {
                definition: Arc::new(protocol),
            };
            Ok((validated, report))
        } else {
            Err(report)
        }
    }
}

/// Path of an endpoint field, e.g. `endpoints[2].path`.
pub(crate) fn endpoint_path(index: usize, field: &str) -> String {
    format!("endpoints[{index}].{field}")
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::{Value, json};

    /// The reference weather protocol.
    pub fn weather() -> Value {
        json!({
            "name": "weather-api",
            "version": "1.0.0",
            "description": "Weather data",
            "author": "X",
            "license": "MIT",
            "rateLimit": { "requests": 60, "window": "1m" },
            "endpoints": [{
                "name": "getCurrent",
                "method": "GET",
                "path": "https://api.weather.example/current",
                "description": "Get current weather",
                "parameters": [
                    { "name": "city", "type": "string", "description": "City", "required": true }
                ]
            }]
        })
    }

    /// A protocol with `count` distinct GET endpoints.
    pub fn with_endpoints(count: usize) -> Value {
        let endpoints: Vec<Value> = (0..count)
            .map(|i| {
                json!({
                    "name": format!("op{i}"),
                    "method": "GET",
                    "path": format!("https://api.example.com/op/{i}"),
                    "description": format!("Operation {i}")
                })
            })
            .collect();
        json!({
            "name": "many-ops",
            "version": "1.0.0",
            "description": "Many operations",
            "author": "X",
            "license": "MIT",
            "rateLimit": { "requests": 10, "window": "1s" },
            "endpoints": endpoints
        })
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{weather, with_endpoints};
    use super::*;
    use serde_json::json;

    #[test]
    fn test_weather_protocol_is_valid() {
        let report = ProtocolValidator::default().validate(&weather());
        assert!(report.valid, "unexpected errors: {:?}", report.errors);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_validation_is_idempotent() {
        let validator = ProtocolValidator::default();
        let mut raw = weather();
        raw["endpoints"][0]["path"] = json!("http://api.weather.example/current");
        assert_eq!(validator.validate(&raw), validator.validate(&raw));
    }

    #[test]
    fn test_plain_http_fails_with_security_error() {
        let mut raw = weather();
        raw["endpoints"][0]["path"] = json!("http://api.weather.example/current");
        let report = ProtocolValidator::default().validate(&raw);
        assert!(!report.valid);
        let error = &report.errors[0];
        assert_eq!(error.category, ValidationCategory::Security);
        assert_eq!(error.path, "endpoints[0].path");
        assert!(error.to_string().starts_with("[SecurityError]"));
    }

    #[test]
    fn test_duplicate_endpoint_names_fail_with_business_error() {
        let mut raw = weather();
        let mut second = raw["endpoints"][0].clone();
        second["path"] = json!("https://api.weather.example/current/v2");
        raw["endpoints"].as_array_mut().unwrap().push(second);

        let report = ProtocolValidator::default().validate(&raw);
        assert!(!report.valid);
        assert!(report.has_error(ValidationCategory::BusinessLogic));
        assert!(report.errors.iter().any(|e| e.message.contains("duplicate endpoint name")));
    }

    #[test]
    fn test_endpoint_count_boundary() {
        let validator = ProtocolValidator::default();
        assert!(validator.validate(&with_endpoints(50)).valid);

        let report = validator.validate(&with_endpoints(51));
        assert!(!report.valid);
        assert!(report.has_error(ValidationCategory::BusinessLogic));
    }

    #[test]
    fn test_configured_endpoint_maximum() {
        let validator = ProtocolValidator::new(ValidatorConfig {
            max_endpoints: 3,
            ..Default::default()
        });
        assert!(validator.validate(&with_endpoints(3)).valid);
        assert!(!validator.validate(&with_endpoints(4)).valid);
    }

    #[test]
    fn test_schema_failure_skips_later_layers() {
        let mut raw = weather();
        raw["version"] = json!("one");
        raw["endpoints"][0]["path"] = json!("http://insecure.example");
        let report = ProtocolValidator::default().validate(&raw);
        assert!(!report.valid);
        assert!(report.errors.iter().all(|e| e.category == ValidationCategory::Schema));
    }

    #[test]
    fn test_warnings_do_not_block() {
        let mut raw = weather();
        raw.as_object_mut().unwrap().remove("rateLimit");
        let report = ProtocolValidator::default().validate(&raw);
        assert!(report.valid);
        assert!(!report.warnings.is_empty());
    }

    #[test]
    fn test_validated_round_trip_revalidates() {
        let validator = ProtocolValidator::default();
        let (validated, _) = validator.validate_protocol(&weather()).unwrap();
        let text = serde_json::to_string(validated.definition().as_ref()).unwrap();
        let reparsed: Value = serde_json::from_str(&text).unwrap();

        let (again, report) = validator.validate_protocol(&reparsed).unwrap();
        assert!(report.valid);
        assert_eq!(validated.definition(), again.definition());
    }

    #[test]
    fn test_arbitrary_json_never_panics() {
        let validator = ProtocolValidator::default();
        for raw in [
            json!(null),
            json!(42),
            json!("protocol"),
            json!([1, 2, 3]),
            json!({ "endpoints": "nope" }),
            json!({ "endpoints": [null, 1, { "parameters": [null] }] }),
        ] {
            let report = validator.validate(&raw);
            assert!(!report.valid);
            assert!(!report.errors.is_empty());
        }
    }
}
