//! Binding JSON Schema documents to output contracts.
//!
//! Supported keywords: `type`, `properties`, `required`, `description`, `title`,
//! `enum`, `pattern`, `minimum`, `maximum`, `minLength`, `maxLength`, `minItems`,
//! `maxItems`. Two extensions are recognised:
//!
//! - `x-validators`: `[{ "name": ..., "config": ..., "on_fail": ... }]` attached to
//!   a property (or to the root of a scalar schema).
//! - `x-on-fail`: failure policy for the constraints derived from standard keywords
//!   on that property. `x-parse-policy` at the root sets the parse policy.

use serde_json::{json, Map, Value};

use super::contract::{ContractBuilder, OutputContract};
use super::types::{FieldSpec, FieldType, OnFail, ValidatorRef};
use crate::errors::ContractError;
use crate::validators::{RegexMatch, ValidChoices, ValidLength, ValidRange, ValidatorRegistry};

impl ContractBuilder {
    /// Creates a builder from a JSON Schema document.
    ///
    /// An `object` root yields a structured contract; a scalar root type yields a
    /// single-scalar contract carrying the root's constraints.
    pub fn from_schema(schema: &Value) -> Result<Self, ContractError> {
        let root = schema
            .as_object()
            .ok_or_else(|| ContractError::binding("schema must be a JSON object"))?;

        let (root_type, _) = schema_type(root, None)?;
        let mut builder = match root_type {
            FieldType::Object => structured_from(root)?,
            FieldType::Array => {
                return Err(ContractError::binding(
                    "array schemas are not supported at the root",
                ));
            }
            scalar => {
                let mut builder = ContractBuilder::scalar(scalar);
                for validator in field_validators(root, None)? {
                    builder = builder.validator(None, validator);
                }
                builder
            }
        };

        if let Some(title) = root.get("title").and_then(Value::as_str) {
            builder = builder.named(title);
        }
        if let Some(policy) = root.get("x-parse-policy") {
            builder = builder.parse_policy(parse_on_fail(policy, None)?);
        }
        Ok(builder)
    }
}

impl OutputContract {
    /// Builds a contract from a JSON Schema document against `registry`.
    pub fn for_schema(schema: &Value, registry: &ValidatorRegistry) -> Result<Self, ContractError> {
        ContractBuilder::from_schema(schema)?.build(registry)
    }
}

fn structured_from(root: &Map<String, Value>) -> Result<ContractBuilder, ContractError> {
    let properties = root
        .get("properties")
        .and_then(Value::as_object)
        .ok_or_else(|| ContractError::binding("object schema has no properties"))?;

    let required: Vec<&str> = match root.get("required") {
        None => Vec::new(),
        Some(Value::Array(names)) => names.iter().filter_map(Value::as_str).collect(),
        Some(_) => return Err(ContractError::binding("'required' must be an array")),
    };

    let mut builder = ContractBuilder::structured();
    for (name, property) in properties {
        let property = property
            .as_object()
            .ok_or_else(|| ContractError::binding_for(name, "property schema must be an object"))?;
        let (field_type, nullable) = schema_type(property, Some(name))?;

        let mut field = FieldSpec::new(name.clone(), field_type);
        if nullable || !required.contains(&name.as_str()) {
            field = field.optional();
        }
        if let Some(description) = property.get("description").and_then(Value::as_str) {
            field = field.describe(description);
        }
        for validator in field_validators(property, Some(name))? {
            field = field.validator(validator);
        }
        builder = builder.field(field);
    }
    Ok(builder)
}

/// Reads `type`, accepting `["<type>", "null"]` as a nullable type.
fn schema_type(
    schema: &Map<String, Value>,
    field: Option<&str>,
) -> Result<(FieldType, bool), ContractError> {
    let error = |message: String| match field {
        Some(f) => ContractError::binding_for(f, message),
        None => ContractError::binding(message),
    };

    match schema.get("type") {
        Some(Value::String(name)) => Ok((name.parse().map_err(error)?, false)),
        Some(Value::Array(names)) => {
            let names: Vec<&str> = names.iter().filter_map(Value::as_str).collect();
            let nullable = names.contains(&"null");
            match names.iter().filter(|n| **n != "null").collect::<Vec<_>>().as_slice() {
                [single] => Ok((single.parse().map_err(error)?, nullable)),
                _ => Err(error(format!("union type {names:?} is not supported"))),
            }
        }
        Some(other) => Err(error(format!("invalid type declaration {other}"))),
        None if schema.contains_key("properties") => Ok((FieldType::Object, false)),
        None => Err(error("missing 'type'".to_string())),
    }
}

fn field_validators(
    schema: &Map<String, Value>,
    field: Option<&str>,
) -> Result<Vec<ValidatorRef>, ContractError> {
    let on_fail = match schema.get("x-on-fail") {
        Some(policy) => parse_on_fail(policy, field)?,
        None => OnFail::Exception,
    };
    let derived = |name: &str, config: Value| ValidatorRef::new(name, config).on_fail(on_fail);

    let mut validators = Vec::new();
    if let Some(choices) = schema.get("enum") {
        validators.push(derived(ValidChoices::NAME, json!({ "choices": choices })));
    }
    if let Some(pattern) = schema.get("pattern") {
        validators.push(derived(
            RegexMatch::NAME,
            json!({ "regex": pattern, "match_type": "search" }),
        ));
    }

    let min = schema.get("minimum");
    let max = schema.get("maximum");
    if min.is_some() || max.is_some() {
        validators.push(derived(ValidRange::NAME, json!({ "min": min, "max": max })));
    }

    let min_len = schema.get("minLength").or_else(|| schema.get("minItems"));
    let max_len = schema.get("maxLength").or_else(|| schema.get("maxItems"));
    if min_len.is_some() || max_len.is_some() {
        validators.push(derived(ValidLength::NAME, json!({ "min": min_len, "max": max_len })));
    }

    if let Some(extra) = schema.get("x-validators") {
        let extra: Vec<ValidatorRef> = serde_json::from_value(extra.clone()).map_err(|e| {
            let message = format!("invalid x-validators: {e}");
            match field {
                Some(f) => ContractError::binding_for(f, message),
                None => ContractError::binding(message),
            }
        })?;
        validators.extend(extra);
    }
    Ok(validators)
}

fn parse_on_fail(policy: &Value, field: Option<&str>) -> Result<OnFail, ContractError> {
    let message = || format!("invalid failure policy {policy}");
    let parsed = policy.as_str().and_then(|p| p.parse::<OnFail>().ok());
    parsed.ok_or_else(|| match field {
        Some(f) => ContractError::binding_for(f, message()),
        None => ContractError::binding(message()),
    })
}
