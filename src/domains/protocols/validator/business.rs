//! Business-logic layer: limits, duplicates and cross-references.

use std::collections::HashMap;

use super::{ValidationCategory, ValidationIssue, ValidatorConfig, endpoint_path};
use crate::domains::protocols::model::{HttpMethod, ProtocolDefinition};

pub(super) fn check(protocol: &ProtocolDefinition, config: &ValidatorConfig) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut push = |path: String, message: String| {
        issues.push(ValidationIssue::new(ValidationCategory::BusinessLogic, path, message));
    };

    let count = protocol.endpoints.len();
    if count == 0 {
        push("endpoints".into(), "protocol must declare at least one endpoint".into());
    }
    if count > config.max_endpoints {
        push(
            "endpoints".into(),
            format!("protocol declares {count} endpoints, maximum is {}", config.max_endpoints),
        );
    }

    let mut names: HashMap<&str, usize> = HashMap::new();
    let mut routes: HashMap<(&str, HttpMethod), usize> = HashMap::new();

    for (index, endpoint) in protocol.endpoints.iter().enumerate() {
        if let Some(first) = names.insert(&endpoint.name, index) {
            push(
                endpoint_path(index, "name"),
                format!(
                    "duplicate endpoint name '{}' (first declared at endpoints[{first}])",
                    endpoint.name
                ),
            );
            names.insert(&endpoint.name, first);
        }

        let route = (endpoint.path.as_str(), endpoint.method);
        match routes.get(&route) {
            Some(&first) if !(endpoint.is_graphql() && protocol.endpoints[first].is_graphql()) => {
                push(
                    endpoint_path(index, "path"),
                    format!(
                        "duplicate route {} {} (first declared at endpoints[{first}])",
                        endpoint.method, endpoint.path
                    ),
                );
            }
            Some(_) => {}
            None => {
                routes.insert(route, index);
            }
        }

        let mut params: HashMap<&str, usize> = HashMap::new();
        for (i, param) in endpoint.parameters.iter().enumerate() {
            if let Some(first) = params.insert(&param.name, i) {
                push(
                    format!("endpoints[{index}].parameters[{i}].name"),
                    format!(
                        "duplicate parameter name '{}' (first declared at parameters[{first}])",
                        param.name
                    ),
                );
                params.insert(&param.name, first);
            }
        }

        for placeholder in endpoint.placeholders() {
            match endpoint.parameters.iter().find(|p| p.name == placeholder) {
                None => push(
                    endpoint_path(index, "path"),
                    format!("placeholder '{{{placeholder}}}' has no matching parameter"),
                ),
                Some(param) if !param.required => push(
                    endpoint_path(index, "path"),
                    format!("path parameter '{placeholder}' must be required"),
                ),
                Some(_) => {}
            }
        }

        if endpoint.authentication == Some(true) && protocol.authentication.is_none() {
            push(
                endpoint_path(index, "authentication"),
                "endpoint requires authentication but the protocol declares none".into(),
            );
        }
    }

    issues
}
