//! Identifier rules and tool naming.

use regex::Regex;
use std::sync::LazyLock;

/// Protocol names: lowercase kebab-case.
pub static PROTOCOL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9]*(-[a-z0-9]+)*$").expect("valid regex"));

/// Endpoint names: camelCase.
pub static ENDPOINT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-zA-Z0-9]*$").expect("valid regex"));

/// Parameter and property names.
pub static PARAMETER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

/// Semantic version 2.0.0.
pub static SEMVER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(?:-((?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*)(?:\.(?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*))*))?(?:\+([0-9a-zA-Z-]+(?:\.[0-9a-zA-Z-]+)*))?$",
    )
    .expect("valid regex")
});

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}/?&=]+)\}").expect("valid regex"));

pub const PROTOCOL_NAME_MIN: usize = 3;
pub const PROTOCOL_NAME_MAX: usize = 50;

/// Whether `name` is a well-formed protocol name (pattern and length).
pub fn is_protocol_name(name: &str) -> bool {
    (PROTOCOL_NAME_MIN..=PROTOCOL_NAME_MAX).contains(&name.len()) && PROTOCOL_NAME.is_match(name)
}

/// Convert a kebab-case protocol name to camelCase (`weather-api` -> `weatherApi`).
pub fn camel_case(kebab: &str) -> String {
    let mut out = String::with_capacity(kebab.len());
    for (i, part) in kebab.split('-').filter(|p| !p.is_empty()).enumerate() {
        if i == 0 {
            out.push_str(part);
            continue;
        }
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

/// Generated tool name for an endpoint: `${camelCase(protocol)}_${endpoint}`.
pub fn tool_name(protocol: &str, endpoint: &str) -> String {
    format!("{}_{}", camel_case(protocol), endpoint)
}

/// Names of `{placeholder}` segments in a path, in order, without duplicates.
pub fn path_placeholders(path: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for cap in PLACEHOLDER.captures_iter(path) {
        let name = cap[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Whether the last path segment is `graphql`.
pub fn is_graphql_path(path: &str) -> bool {
    let without_query = path.split(['?', '#']).next().unwrap_or(path);
    without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .is_some_and(|segment| segment.eq_ignore_ascii_case("graphql"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("weather-api"), "weatherApi");
        assert_eq!(camel_case("binance"), "binance");
        assert_eq!(camel_case("a-b-1"), "aB1");
        assert_eq!(camel_case("coin-gecko-v3"), "coinGeckoV3");
    }

    #[test]
    fn test_tool_name() {
        assert_eq!(tool_name("weather-api", "getCurrent"), "weatherApi_getCurrent");
    }

    #[test]
    fn test_identifier_patterns() {
        assert!(PROTOCOL_NAME.is_match("weather-api"));
        assert!(!PROTOCOL_NAME.is_match("Weather-api"));
        assert!(!PROTOCOL_NAME.is_match("weather--api"));
        assert!(!PROTOCOL_NAME.is_match("-weather"));

        assert!(ENDPOINT_NAME.is_match("getCurrent"));
        assert!(!ENDPOINT_NAME.is_match("GetCurrent"));
        assert!(!ENDPOINT_NAME.is_match("get_current"));

        assert!(SEMVER.is_match("1.0.0"));
        assert!(SEMVER.is_match("2.1.3-beta.1+build.5"));
        assert!(!SEMVER.is_match("1.0"));
        assert!(!SEMVER.is_match("01.0.0"));
    }

    #[test]
    fn test_protocol_name_check_includes_length() {
        assert!(is_protocol_name("weather-api"));
        assert!(!is_protocol_name("ab"));
        assert!(!is_protocol_name(&"a".repeat(51)));
        assert!(!is_protocol_name("Not A Valid Name"));
    }

    #[test]
    fn test_path_placeholders() {
        assert_eq!(
            path_placeholders("https://api.example.com/users/{id}/posts/{postId}?v={id}"),
            vec!["id".to_string(), "postId".to_string()]
        );
        assert!(path_placeholders("https://api.example.com/plain").is_empty());
    }

    #[test]
    fn test_graphql_detection() {
        assert!(is_graphql_path("https://api.example.com/graphql"));
        assert!(is_graphql_path("https://api.example.com/v2/GraphQL/"));
        assert!(!is_graphql_path("https://api.example.com/graphql/schema"));
    }
}
