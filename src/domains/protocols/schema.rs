//! Schema Generator: parameter definitions to JSON Schema.
//!
//! Translation is deterministic and preserves every constraint, so the
//! compiled schema accepts exactly the values the definitions describe.

use serde_json::{Map, Value, json};

use super::model::{ParameterDefinition, ParameterKind};

/// Compile an endpoint's parameters into an object input schema.
///
/// Unknown arguments are rejected (`additionalProperties: false`).
pub fn generate_input_schema(parameters: &[ParameterDefinition]) -> Map<String, Value> {
    let entries = parameters.iter().map(|p| (p.name.as_str(), p));
    object_schema(entries, false)
}

/// Compile a single parameter definition.
pub fn generate_parameter_schema(param: &ParameterDefinition) -> Value {
    let mut schema = Map::new();
    schema.insert("type".into(), json!(param.type_name()));

    if !param.description.is_empty() {
        schema.insert("description".into(), json!(param.description));
    }

    match &param.kind {
        ParameterKind::String(c) => {
            insert_opt(&mut schema, "minLength", c.min_length.map(Value::from));
            insert_opt(&mut schema, "maxLength", c.max_length.map(Value::from));
            insert_opt(&mut schema, "pattern", c.pattern.clone().map(Value::from));
            insert_opt(&mut schema, "enum", c.allowed.clone().map(Value::from));
        }
        ParameterKind::Number(c) => {
            insert_opt(&mut schema, "minimum", c.minimum.map(Value::from));
            insert_opt(&mut schema, "maximum", c.maximum.map(Value::from));
            insert_opt(&mut schema, "exclusiveMinimum", c.exclusive_minimum.map(Value::from));
            insert_opt(&mut schema, "exclusiveMaximum", c.exclusive_maximum.map(Value::from));
            insert_opt(&mut schema, "multipleOf", c.multiple_of.map(Value::from));
        }
        ParameterKind::Boolean => {}
        ParameterKind::Array(c) => {
            schema.insert("items".into(), generate_parameter_schema(&c.items));
            insert_opt(&mut schema, "minItems", c.min_items.map(Value::from));
            insert_opt(&mut schema, "maxItems", c.max_items.map(Value::from));
            insert_opt(&mut schema, "uniqueItems", c.unique_items.map(Value::from));
        }
        ParameterKind::Object(c) => {
            let entries = c.properties.iter().map(|(k, v)| (k.as_str(), v));
            let nested = object_schema(entries, c.additional_properties.unwrap_or(true));
            schema.extend(nested.into_iter().filter(|(k, _)| k != "type"));
        }
    }

    if let Some(default) = &param.default {
        schema.insert("default".into(), default.clone());
    }

    Value::Object(schema)
}

fn object_schema<'a>(
    entries: impl Iterator<Item = (&'a str, &'a ParameterDefinition)>,
    additional_properties: bool,
) -> Map<String, Value> {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for (name, param) in entries {
        if param.required {
            required.push(json!(name));
        }
        properties.insert(name.to_string(), generate_parameter_schema(param));
    }

    let mut schema = Map::new();
    schema.insert("type".into(), json!("object"));
    schema.insert("properties".into(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".into(), Value::Array(required));
    }
    schema.insert("additionalProperties".into(), json!(additional_properties));
    schema
}

fn insert_opt(schema: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        schema.insert(key.to_string(), value);
    }
}
