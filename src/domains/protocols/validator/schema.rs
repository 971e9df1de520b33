//! Schema layer: structural correctness of the raw document.

use regex::Regex;
use serde_json::{Map, Value};

use super::{ValidationCategory, ValidationIssue, endpoint_path};
use crate::domains::protocols::model::{HttpMethod, ParameterKind, RateWindow};
use crate::domains::protocols::naming::{
    ENDPOINT_NAME, PARAMETER_NAME, PROTOCOL_NAME, PROTOCOL_NAME_MAX, PROTOCOL_NAME_MIN, SEMVER,
};

/// Nested parameter definitions deeper than this are rejected outright.
const MAX_PARAMETER_DEPTH: usize = 8;

const AUTH_TYPES: [&str; 4] = ["api_key", "bearer_token", "basic", "oauth2"];
const API_KEY_LOCATIONS: [&str; 3] = ["header", "query", "cookie"];

/// Collects structural errors. An empty result means the document
/// deserializes into the typed model.
pub(super) fn check(raw: &Value) -> Vec<ValidationIssue> {
    let mut issues = Issues::default();

    let Some(root) = raw.as_object() else {
        issues.push("$", "protocol must be a JSON object");
        return issues.0;
    };

    for field in ["name", "version", "description", "author", "license"] {
        issues.required_string(root, field, field);
    }

    if let Some(name) = root.get("name").and_then(Value::as_str) {
        let len = name.chars().count();
        if !(PROTOCOL_NAME_MIN..=PROTOCOL_NAME_MAX).contains(&len) {
            issues.push(
                "name",
                format!("must be {PROTOCOL_NAME_MIN}-{PROTOCOL_NAME_MAX} characters (found {len})"),
            );
        }
        if !PROTOCOL_NAME.is_match(name) {
            issues.push("name", format!("'{name}' must be lowercase kebab-case"));
        }
    }

    if let Some(version) = root.get("version").and_then(Value::as_str)
        && !SEMVER.is_match(version)
    {
        issues.push("version", format!("'{version}' is not a semantic version"));
    }

    for field in ["repository", "homepage"] {
        issues.optional_string(root, field, field);
    }

    if let Some(auth) = root.get("authentication") {
        check_authentication(auth, "authentication", &mut issues);
    }

    if let Some(limit) = root.get("rateLimit") {
        check_rate_limit(limit, "rateLimit", &mut issues);
    }

    if let Some(metadata) = root.get("metadata")
        && !metadata.is_object()
    {
        issues.push("metadata", "must be an object");
    }

    match root.get("endpoints") {
        None => {}
        Some(Value::Array(endpoints)) => {
            for (index, endpoint) in endpoints.iter().enumerate() {
                check_endpoint(endpoint, index, &mut issues);
            }
        }
        Some(_) => issues.push("endpoints", "must be an array"),
    }

    issues.0
}

fn check_authentication(auth: &Value, path: &str, issues: &mut Issues) {
    let Some(obj) = auth.as_object() else {
        issues.push(path, "must be an object");
        return;
    };

    let Some(kind) = obj.get("type").and_then(Value::as_str) else {
        issues.push(format!("{path}.type"), "is required and must be a string");
        return;
    };

    match kind {
        "api_key" => {
            match obj.get("location").and_then(Value::as_str) {
                Some(loc) if API_KEY_LOCATIONS.contains(&loc) => {}
                Some(loc) => issues.push(
                    format!("{path}.location"),
                    format!("'{loc}' must be one of {}", API_KEY_LOCATIONS.join(", ")),
                ),
                None => issues.push(format!("{path}.location"), "is required for api_key"),
            }
            match obj.get("name").and_then(Value::as_str) {
                Some(name) if !name.trim().is_empty() => {}
                _ => issues.push(format!("{path}.name"), "is required for api_key"),
            }
        }
        "oauth2" => {
            match obj.get("tokenUrl").and_then(Value::as_str) {
                Some(url) if !url.trim().is_empty() => {}
                _ => issues.push(format!("{path}.tokenUrl"), "is required for oauth2"),
            }
            if let Some(scopes) = obj.get("scopes")
                && !scopes
                    .as_array()
                    .is_some_and(|s| s.iter().all(Value::is_string))
            {
                issues.push(format!("{path}.scopes"), "must be an array of strings");
            }
        }
        "bearer_token" | "basic" => {}
        other => issues.push(
            format!("{path}.type"),
            format!("'{other}' must be one of {}", AUTH_TYPES.join(", ")),
        ),
    }
}

fn check_rate_limit(limit: &Value, path: &str, issues: &mut Issues) {
    let Some(obj) = limit.as_object() else {
        issues.push(path, "must be an object");
        return;
    };

    match obj.get("requests") {
        Some(Value::Number(n)) if n.as_u64().is_some_and(|v| v > 0 && v <= u64::from(u32::MAX)) => {}
        Some(_) => issues.push(format!("{path}.requests"), "must be a positive integer"),
        None => issues.push(format!("{path}.requests"), "is required"),
    }

    match obj.get("window").and_then(Value::as_str) {
        Some(w) if RateWindow::ALL.contains(&w) => {}
        Some(w) => issues.push(
            format!("{path}.window"),
            format!("'{w}' must be one of {}", RateWindow::ALL.join(", ")),
        ),
        None => issues.push(format!("{path}.window"), "is required"),
    }
}

fn check_endpoint(endpoint: &Value, index: usize, issues: &mut Issues) {
    let base = format!("endpoints[{index}]");
    let Some(obj) = endpoint.as_object() else {
        issues.push(base, "must be an object");
        return;
    };

    for field in ["name", "method", "path", "description"] {
        issues.required_string(obj, field, &endpoint_path(index, field));
    }

    if let Some(name) = obj.get("name").and_then(Value::as_str)
        && !ENDPOINT_NAME.is_match(name)
    {
        issues.push(endpoint_path(index, "name"), format!("'{name}' must be camelCase"));
    }

    if let Some(method) = obj.get("method").and_then(Value::as_str)
        && !HttpMethod::ALL.contains(&method)
    {
        issues.push(
            endpoint_path(index, "method"),
            format!("'{method}' must be one of {}", HttpMethod::ALL.join(", ")),
        );
    }

    if let Some(auth) = obj.get("authentication")
        && !auth.is_boolean()
    {
        issues.push(endpoint_path(index, "authentication"), "must be a boolean");
    }

    if let Some(limit) = obj.get("rateLimit") {
        check_rate_limit(limit, &endpoint_path(index, "rateLimit"), issues);
    }

    if let Some(response) = obj.get("response")
        && !response.is_object()
    {
        issues.push(endpoint_path(index, "response"), "must be an object");
    }

    match obj.get("parameters") {
        None => {}
        Some(Value::Array(params)) => {
            for (i, param) in params.iter().enumerate() {
                let path = format!("{base}.parameters[{i}]");
                check_parameter(param, &path, true, 1, issues);
            }
        }
        Some(_) => issues.push(endpoint_path(index, "parameters"), "must be an array"),
    }
}

/// Validates one parameter definition. `top_level` definitions must carry
/// their own name and description; nested ones may omit them.
fn check_parameter(param: &Value, path: &str, top_level: bool, depth: usize, issues: &mut Issues) {
    if depth > MAX_PARAMETER_DEPTH {
        issues.push(path, format!("nesting exceeds the maximum depth of {MAX_PARAMETER_DEPTH}"));
        return;
    }

    let Some(obj) = param.as_object() else {
        issues.push(path, "must be an object");
        return;
    };

    if top_level {
        issues.required_string(obj, "name", &format!("{path}.name"));
        issues.required_string(obj, "description", &format!("{path}.description"));
    } else {
        issues.optional_string(obj, "name", &format!("{path}.name"));
        issues.optional_string(obj, "description", &format!("{path}.description"));
    }

    if let Some(name) = obj.get("name").and_then(Value::as_str)
        && !PARAMETER_NAME.is_match(name)
    {
        issues.push(format!("{path}.name"), format!("'{name}' is not a valid parameter name"));
    }

    if let Some(required) = obj.get("required")
        && !required.is_boolean()
    {
        issues.push(format!("{path}.required"), "must be a boolean");
    }

    let Some(kind) = obj.get("type").and_then(Value::as_str) else {
        issues.push(format!("{path}.type"), "is required and must be a string");
        return;
    };
    if !ParameterKind::ALL.contains(&kind) {
        issues.push(
            format!("{path}.type"),
            format!("'{kind}' must be one of {}", ParameterKind::ALL.join(", ")),
        );
        return;
    }

    let allowed = ParameterKind::allowed_constraints(kind);
    for key in ParameterKind::CONSTRAINT_KEYS {
        if obj.contains_key(key) && !allowed.contains(&key) {
            issues.push(
                format!("{path}.{key}"),
                format!("constraint '{key}' is not allowed for parameter type '{kind}'"),
            );
        }
    }

    if let Some(default) = obj.get("default")
        && !value_matches_type(default, kind)
    {
        issues.push(format!("{path}.default"), format!("must be of type '{kind}'"));
    }

    match kind {
        "string" => check_string_constraints(obj, path, issues),
        "number" => check_number_constraints(obj, path, issues),
        "array" => {
            match obj.get("items") {
                Some(items) => check_parameter(items, &format!("{path}.items"), false, depth + 1, issues),
                None => issues.push(format!("{path}.items"), "is required for array parameters"),
            }
            check_bounds(obj, path, "minItems", "maxItems", issues);
            if let Some(unique) = obj.get("uniqueItems")
                && !unique.is_boolean()
            {
                issues.push(format!("{path}.uniqueItems"), "must be a boolean");
            }
        }
        "object" => {
            match obj.get("properties") {
                None => {}
                Some(Value::Object(props)) => {
                    for (key, prop) in props {
                        let prop_path = format!("{path}.properties.{key}");
                        if !PARAMETER_NAME.is_match(key) {
                            issues.push(&prop_path, format!("'{key}' is not a valid property name"));
                        }
                        check_parameter(prop, &prop_path, false, depth + 1, issues);
                    }
                }
                Some(_) => issues.push(format!("{path}.properties"), "must be an object"),
            }
            if let Some(additional) = obj.get("additionalProperties")
                && !additional.is_boolean()
            {
                issues.push(format!("{path}.additionalProperties"), "must be a boolean");
            }
        }
        _ => {}
    }
}

fn check_string_constraints(obj: &Map<String, Value>, path: &str, issues: &mut Issues) {
    check_bounds(obj, path, "minLength", "maxLength", issues);

    if let Some(pattern) = obj.get("pattern") {
        match pattern.as_str() {
            Some(p) => {
                if let Err(e) = Regex::new(p) {
                    issues.push(format!("{path}.pattern"), format!("invalid regular expression: {e}"));
                }
            }
            None => issues.push(format!("{path}.pattern"), "must be a string"),
        }
    }

    if let Some(values) = obj.get("enum") {
        match values.as_array() {
            Some(items) if !items.is_empty() && items.iter().all(Value::is_string) => {}
            _ => issues.push(format!("{path}.enum"), "must be a non-empty array of strings"),
        }
    }
}

fn check_number_constraints(obj: &Map<String, Value>, path: &str, issues: &mut Issues) {
    for key in ["minimum", "maximum", "exclusiveMinimum", "exclusiveMaximum", "multipleOf"] {
        if let Some(value) = obj.get(key)
            && !value.is_number()
        {
            issues.push(format!("{path}.{key}"), "must be a number");
        }
    }

    let number = |key: &str| obj.get(key).and_then(Value::as_f64);

    if let Some(step) = number("multipleOf")
        && step <= 0.0
    {
        issues.push(format!("{path}.multipleOf"), "must be greater than zero");
    }

    let lower = number("minimum").or(number("exclusiveMinimum"));
    let upper = number("maximum").or(number("exclusiveMaximum"));
    if let (Some(lo), Some(hi)) = (lower, upper)
        && lo > hi
    {
        issues.push(path, format!("lower bound {lo} exceeds upper bound {hi}"));
    }
}

/// Checks a non-negative integer min/max pair.
fn check_bounds(obj: &Map<String, Value>, path: &str, min_key: &str, max_key: &str, issues: &mut Issues) {
    let mut read = |key: &str| match obj.get(key) {
        None => None,
        Some(v) => match v.as_u64() {
            Some(n) => Some(n),
            None => {
                issues.push(format!("{path}.{key}"), "must be a non-negative integer");
                None
            }
        },
    };
    let min = read(min_key);
    let max = read(max_key);
    if let (Some(min), Some(max)) = (min, max)
        && min > max
    {
        issues.push(path, format!("{min_key} {min} exceeds {max_key} {max}"));
    }
}

fn value_matches_type(value: &Value, kind: &str) -> bool {
    match kind {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => false,
    }
}

#[derive(Default)]
struct Issues(Vec<ValidationIssue>);

impl Issues {
    fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0
            .push(ValidationIssue::new(ValidationCategory::Schema, path, message));
    }

    fn required_string(&mut self, obj: &Map<String, Value>, field: &str, path: &str) {
        match obj.get(field) {
            Some(Value::String(s)) if !s.trim().is_empty() => {}
            Some(Value::String(_)) => self.push(path, "must not be empty"),
            Some(_) => self.push(path, "must be a string"),
            None => self.push(path, "is required"),
        }
    }

    fn optional_string(&mut self, obj: &Map<String, Value>, field: &str, path: &str) {
        if let Some(value) = obj.get(field)
            && !value.is_string()
        {
            self.push(path, "must be a string");
        }
    }
}
