//! Field types, failure policies and field declarations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The JSON type a field's value must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// A JSON string.
    String,
    /// A JSON number without a fractional part.
    Integer,
    /// Any JSON number.
    Number,
    /// A JSON boolean.
    Boolean,
    /// A JSON array.
    Array,
    /// A JSON object.
    Object,
}

impl FieldType {
    /// Returns true if `value` has this type.
    #[must_use]
    pub fn matches(self, value: &serde_json::Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }

    /// Returns the JSON type name of a value, for error messages.
    #[must_use]
    pub fn describe_value(value: &serde_json::Value) -> &'static str {
        match value {
            serde_json::Value::Null => "null",
            serde_json::Value::Bool(_) => "boolean",
            serde_json::Value::Number(n) if n.is_f64() => "number",
            serde_json::Value::Number(_) => "integer",
            serde_json::Value::String(_) => "string",
            serde_json::Value::Array(_) => "array",
            serde_json::Value::Object(_) => "object",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Integer => write!(f, "integer"),
            Self::Number => write!(f, "number"),
            Self::Boolean => write!(f, "boolean"),
            Self::Array => write!(f, "array"),
            Self::Object => write!(f, "object"),
        }
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(Self::String),
            "integer" => Ok(Self::Integer),
            "number" => Ok(Self::Number),
            "boolean" => Ok(Self::Boolean),
            "array" => Ok(Self::Array),
            "object" => Ok(Self::Object),
            other => Err(format!("unsupported field type '{other}'")),
        }
    }
}

/// What happens when a validator fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnFail {
    /// Terminate the session with a validation failure.
    #[default]
    Exception,
    /// Ask the generation backend for a corrected candidate.
    Reask,
    /// Substitute the validator's fixed value and re-validate the field once.
    Fix,
    /// Record the failure and treat the field as passed.
    Noop,
}

impl fmt::Display for OnFail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exception => write!(f, "exception"),
            Self::Reask => write!(f, "reask"),
            Self::Fix => write!(f, "fix"),
            Self::Noop => write!(f, "noop"),
        }
    }
}

impl FromStr for OnFail {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exception" => Ok(Self::Exception),
            "reask" => Ok(Self::Reask),
            "fix" => Ok(Self::Fix),
            "noop" => Ok(Self::Noop),
            other => Err(format!("unknown on_fail policy '{other}'")),
        }
    }
}

/// A validator reference: registry name, configuration and failure policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorRef {
    /// Registered validator name.
    pub name: String,
    /// Validator configuration, checked by the factory at build time.
    #[serde(default)]
    pub config: serde_json::Value,
    /// Policy applied when this validator fails.
    #[serde(default)]
    pub on_fail: OnFail,
    /// Policy applied when `fix` cannot produce a passing value.
    #[serde(default)]
    pub fix_fallback: OnFail,
}

impl ValidatorRef {
    /// Creates a reference with the default `exception` policy.
    #[must_use]
    pub fn new(name: impl Into<String>, config: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            config,
            on_fail: OnFail::Exception,
            fix_fallback: OnFail::Exception,
        }
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn on_fail(mut self, on_fail: OnFail) -> Self {
        self.on_fail = on_fail;
        self
    }

    /// Sets the policy used when a `fix` does not yield a passing value.
    #[must_use]
    pub fn fix_fallback(mut self, fallback: OnFail) -> Self {
        self.fix_fallback = fallback;
        self
    }
}

/// Declaration of one named, typed, constrained field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name.
    pub name: String,
    /// Expected type.
    pub field_type: FieldType,
    /// Optional description, used in corrective prompts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the field must be present.
    pub required: bool,
    /// Validators in the order they run.
    #[serde(default)]
    pub validators: Vec<ValidatorRef>,
}

impl FieldSpec {
    /// Creates a required field.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            description: None,
            required: true,
            validators: Vec::new(),
        }
    }

    /// Marks the field optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Appends a validator.
    #[must_use]
    pub fn validator(mut self, validator: ValidatorRef) -> Self {
        self.validators.push(validator);
        self
    }
}
