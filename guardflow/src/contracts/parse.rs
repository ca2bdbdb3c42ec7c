//! Parsing raw candidates into field values.
//!
//! Parse failures are never returned to the caller directly: a candidate-level
//! failure and every field-level failure are handed to the dispatcher, which applies
//! the contract's parse policy.

use serde_json::Value;

use super::contract::{ContractMode, OutputContract};
use super::types::FieldType;
use crate::errors::SchemaParseError;

/// The parsed value of one declared field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSlot {
    /// The field is present and has the declared type.
    Present(Value),
    /// An optional field is missing or null.
    Absent,
    /// The field is missing, null or mistyped.
    Invalid(SchemaParseError),
}

/// A candidate parsed against a contract.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCandidate {
    /// The parsed value: the JSON object, or the scalar.
    pub value: Value,
    /// One slot per contract field, in declaration order.
    pub slots: Vec<FieldSlot>,
}

/// Removes a surrounding Markdown code fence, if any.
///
/// ```
/// use guardflow::contracts::strip_code_fences;
///
/// assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
/// assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
/// ```
#[must_use]
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // The first line after the opening fence is the language tag.
    match body.find('\n') {
        Some(newline) => body[newline + 1..].trim(),
        None => body.trim(),
    }
}

/// Parses `raw` against `contract`.
///
/// Returns `Err` only when the candidate as a whole cannot be read; field-level
/// problems are reported through [`FieldSlot::Invalid`].
pub fn parse_candidate(
    contract: &OutputContract,
    raw: &str,
    strip_fences: bool,
) -> Result<ParsedCandidate, SchemaParseError> {
    match contract.mode() {
        ContractMode::Scalar => {
            let field = &contract.fields()[0];
            let slot = parse_scalar(field.name(), field.field_type(), raw);
            let value = match &slot {
                FieldSlot::Present(value) => value.clone(),
                _ => Value::String(raw.to_string()),
            };
            Ok(ParsedCandidate {
                value,
                slots: vec![slot],
            })
        }
        ContractMode::Structured => {
            let text = if strip_fences { strip_code_fences(raw) } else { raw.trim() };
            let value: Value = serde_json::from_str(text)
                .map_err(|e| SchemaParseError::candidate(format!("Output is not valid JSON: {e}")))?;
            let object = value.as_object().ok_or_else(|| {
                SchemaParseError::candidate(format!(
                    "Expected a JSON object, found {}",
                    FieldType::describe_value(&value)
                ))
            })?;

            let slots = contract
                .fields()
                .iter()
                .map(|field| match object.get(field.name()) {
                    None | Some(Value::Null) if !field.required() => FieldSlot::Absent,
                    None => FieldSlot::Invalid(SchemaParseError::for_field(
                        field.name(),
                        "Required field is missing",
                    )),
                    Some(Value::Null) => FieldSlot::Invalid(SchemaParseError::for_field(
                        field.name(),
                        "Required field is null",
                    )),
                    Some(found) if field.field_type().matches(found) => {
                        FieldSlot::Present(found.clone())
                    }
                    Some(found) => FieldSlot::Invalid(SchemaParseError::for_field(
                        field.name(),
                        format!(
                            "Expected {}, found {}",
                            field.field_type(),
                            FieldType::describe_value(found)
                        ),
                    )),
                })
                .collect();

            Ok(ParsedCandidate { value, slots })
        }
    }
}

fn parse_scalar(field: &str, field_type: FieldType, raw: &str) -> FieldSlot {
    if field_type == FieldType::String {
        return FieldSlot::Present(Value::String(raw.to_string()));
    }

    let text = raw.trim();
    let parsed = match field_type {
        FieldType::Integer => text.parse::<i64>().ok().map(Value::from),
        FieldType::Number => text
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(|n| match text.parse::<i64>() {
                Ok(i) => Value::from(i),
                Err(_) => Value::Number(n),
            }),
        FieldType::Boolean => match text.to_ascii_lowercase().as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        FieldType::Array | FieldType::Object => serde_json::from_str::<Value>(text)
            .ok()
            .filter(|value| field_type.matches(value)),
        FieldType::String => None,
    };

    match parsed {
        Some(value) => FieldSlot::Present(value),
        None => FieldSlot::Invalid(SchemaParseError::for_field(
            field,
            format!("Expected {field_type}, could not parse '{text}'"),
        )),
    }
}
