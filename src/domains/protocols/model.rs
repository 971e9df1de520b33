//! Typed model of a declarative protocol definition.
//!
//! The wire format is camelCase JSON. Every configurable shape is a closed
//! variant: authentication schemes, HTTP methods, rate-limit windows and
//! parameter types. A parameter variant only carries the constraint fields
//! that are legal for its type.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use super::naming;

// ============================================================================
// Protocol
// ============================================================================

/// A declarative description of an external API surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolDefinition {
    /// Unique kebab-case identifier.
    pub name: String,

    /// Semantic version of the definition.
    pub version: String,

    pub description: String,
    pub author: String,
    pub license: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,

    /// Default authentication for every endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Authentication>,

    /// Default rate limit for every endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,

    #[serde(default)]
    pub endpoints: Vec<EndpointDefinition>,

    /// Free-form metadata. Only read by advisory heuristics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl ProtocolDefinition {
    /// Name of the tool generated for `endpoint`.
    pub fn tool_name(&self, endpoint: &EndpointDefinition) -> String {
        naming::tool_name(&self.name, &endpoint.name)
    }

    /// Authentication applied to `endpoint`.
    ///
    /// An endpoint with `authentication: false` opts out of the protocol
    /// default; otherwise the protocol default applies.
    pub fn effective_authentication(&self, endpoint: &EndpointDefinition) -> Option<&Authentication> {
        match endpoint.authentication {
            Some(false) => None,
            _ => self.authentication.as_ref(),
        }
    }

    /// Rate limit applied to `endpoint` (endpoint override, else protocol default).
    pub fn effective_rate_limit(&self, endpoint: &EndpointDefinition) -> Option<RateLimit> {
        endpoint.rate_limit.or(self.rate_limit)
    }

    /// Look up an endpoint by name.
    pub fn endpoint(&self, name: &str) -> Option<&EndpointDefinition> {
        self.endpoints.iter().find(|e| e.name == name)
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Authentication scheme, keyed by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Authentication {
    /// Static API key sent in a header, query parameter or cookie.
    ApiKey { location: ApiKeyLocation, name: String },

    /// `Authorization: Bearer <token>`.
    BearerToken,

    /// HTTP basic authentication.
    Basic,

    /// OAuth2 access token obtained from `tokenUrl`.
    #[serde(rename = "oauth2", rename_all = "camelCase")]
    OAuth2 {
        token_url: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        scopes: Vec<String>,
    },
}

impl Authentication {
    /// Wire name of the scheme.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::ApiKey { .. } => "api_key",
            Self::BearerToken => "bearer_token",
            Self::Basic => "basic",
            Self::OAuth2 { .. } => "oauth2",
        }
    }
}

/// Where an API key is injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    Header,
    Query,
    Cookie,
}

// ============================================================================
// Rate limits
// ============================================================================

/// Request ceiling over a fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub requests: u32,
    pub window: RateWindow,
}

/// Supported rate-limit windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RateWindow {
    #[serde(rename = "1s")]
    Second,
    #[serde(rename = "1m")]
    Minute,
    #[serde(rename = "1h")]
    Hour,
    #[serde(rename = "1d")]
    Day,
}

impl RateWindow {
    pub const ALL: [&'static str; 4] = ["1s", "1m", "1h", "1d"];

    pub fn duration(self) -> Duration {
        Duration::from_secs(self.as_secs())
    }

    pub fn as_secs(self) -> u64 {
        match self {
            Self::Second => 1,
            Self::Minute => 60,
            Self::Hour => 3_600,
            Self::Day => 86_400,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Second => "1s",
            Self::Minute => "1m",
            Self::Hour => "1h",
            Self::Day => "1d",
        }
    }
}

impl fmt::Display for RateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Endpoints
// ============================================================================

/// HTTP methods an endpoint may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub const ALL: [&'static str; 5] = ["GET", "POST", "PUT", "DELETE", "PATCH"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
        }
    }

    /// Whether arguments travel in the request body rather than the query string.
    pub fn has_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One operation within a protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDefinition {
    /// camelCase name, unique within the protocol.
    pub name: String,

    pub method: HttpMethod,

    /// Absolute HTTPS URL, possibly containing `{param}` placeholders.
    pub path: String,

    pub description: String,

    /// `false` disables the protocol-level authentication for this endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,

    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,

    /// Response schema descriptor. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

impl EndpointDefinition {
    /// Placeholder names embedded in the path, in order of appearance.
    pub fn placeholders(&self) -> Vec<String> {
        naming::path_placeholders(&self.path)
    }

    /// Whether this endpoint follows the single-URL GraphQL pattern.
    pub fn is_graphql(&self) -> bool {
        self.method == HttpMethod::Post && naming::is_graphql_path(&self.path)
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// A typed, constrained input to an endpoint.
///
/// Nested definitions (array `items`, object `properties`) may leave `name`
/// and `description` empty; properties are named by their map key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(flatten)]
    pub kind: ParameterKind,
}

impl ParameterDefinition {
    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Depth of the deepest nested definition, counting this one as 1.
    pub fn depth(&self) -> usize {
        1 + match &self.kind {
            ParameterKind::Array(array) => array.items.depth(),
            ParameterKind::Object(object) => object
                .properties
                .values()
                .map(ParameterDefinition::depth)
                .max()
                .unwrap_or(0),
            _ => 0,
        }
    }
}

/// Parameter type with its legal constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParameterKind {
    String(StringConstraints),
    Number(NumberConstraints),
    Boolean,
    Array(ArrayConstraints),
    Object(ObjectConstraints),
}

impl ParameterKind {
    pub const ALL: [&'static str; 5] = ["string", "number", "boolean", "array", "object"];

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Number(_) => "number",
            Self::Boolean => "boolean",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    /// Constraint keys a definition of `type_name` may carry.
    pub fn allowed_constraints(type_name: &str) -> &'static [&'static str] {
        match type_name {
            "string" => &["minLength", "maxLength", "pattern", "enum"],
            "number" => &[
                "minimum",
                "maximum",
                "exclusiveMinimum",
                "exclusiveMaximum",
                "multipleOf",
            ],
            "array" => &["items", "minItems", "maxItems", "uniqueItems"],
            "object" => &["properties", "additionalProperties"],
            _ => &[],
        }
    }

    /// Every constraint key known for any type.
    pub const CONSTRAINT_KEYS: [&'static str; 15] = [
        "minLength",
        "maxLength",
        "pattern",
        "enum",
        "minimum",
        "maximum",
        "exclusiveMinimum",
        "exclusiveMaximum",
        "multipleOf",
        "items",
        "minItems",
        "maxItems",
        "uniqueItems",
        "properties",
        "additionalProperties",
    ];
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StringConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiple_of: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayConstraints {
    pub items: Box<ParameterDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_items: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectConstraints {
    #[serde(default)]
    pub properties: BTreeMap<String, ParameterDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<bool>,
}
