//! The validator capability contract.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Caller-supplied metadata visible to validators.
pub type Metadata = HashMap<String, serde_json::Value>;

/// Verdict of a single validator invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the value passed.
    pub passed: bool,
    /// Human-readable reason for a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// A corrected value the `fix` policy may substitute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_value: Option<serde_json::Value>,
}

impl ValidationResult {
    /// Creates a passing result.
    #[must_use]
    pub fn pass() -> Self {
        Self {
            passed: true,
            reason: None,
            fixed_value: None,
        }
    }

    /// Creates a failing result.
    #[must_use]
    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: Some(reason.into()),
            fixed_value: None,
        }
    }

    /// Creates a failing result that proposes a corrected value.
    #[must_use]
    pub fn fail_with_fix(reason: impl Into<String>, fixed_value: serde_json::Value) -> Self {
        Self {
            passed: false,
            reason: Some(reason.into()),
            fixed_value: Some(fixed_value),
        }
    }

    /// Returns the reason, or an empty string when none was given.
    #[must_use]
    pub fn reason_or_empty(&self) -> &str {
        self.reason.as_deref().unwrap_or("")
    }
}

/// Read-only context handed to a validator.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    /// The field being validated.
    pub field: &'a str,
    /// Caller metadata for this run.
    pub metadata: &'a Metadata,
}

impl<'a> ValidationContext<'a> {
    /// Creates a new validation context.
    #[must_use]
    pub fn new(field: &'a str, metadata: &'a Metadata) -> Self {
        Self { field, metadata }
    }

    /// Looks up a metadata entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&'a serde_json::Value> {
        self.metadata.get(key)
    }
}

/// A pluggable check over one value.
///
/// Implementations must not mutate shared state: the same unit is shared by every
/// session that runs against a contract, possibly from many threads.
pub trait ValidatorUnit: Send + Sync {
    /// Returns the registered validator name.
    fn name(&self) -> &str;

    /// Checks a value.
    fn check(&self, value: &serde_json::Value, ctx: &ValidationContext<'_>) -> ValidationResult;

    /// Describes the constraint, used when composing corrective prompts.
    fn describe(&self) -> Option<String> {
        None
    }
}

impl std::fmt::Debug for dyn ValidatorUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorUnit")
            .field("name", &self.name())
            .finish()
    }
}

/// Renders a value for a failure reason: strings unquoted, everything else as JSON.
pub(crate) fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_constructors() {
        let pass = ValidationResult::pass();
        assert!(pass.passed);
        assert_eq!(pass.reason_or_empty(), "");

        let fail = ValidationResult::fail("too long");
        assert!(!fail.passed);
        assert_eq!(fail.reason.as_deref(), Some("too long"));
        assert!(fail.fixed_value.is_none());

        let fixed = ValidationResult::fail_with_fix("upper case", serde_json::json!("hello"));
        assert_eq!(fixed.fixed_value, Some(serde_json::json!("hello")));
    }

    #[test]
    fn test_result_serialization_skips_empty() {
        let json = serde_json::to_value(ValidationResult::pass()).unwrap();
        assert_eq!(json, serde_json::json!({"passed": true}));
    }

    #[test]
    fn test_context_lookup() {
        let mut metadata = Metadata::new();
        metadata.insert("choices".to_string(), serde_json::json!(["a"]));
        let ctx = ValidationContext::new("field", &metadata);
        assert_eq!(ctx.get("choices"), Some(&serde_json::json!(["a"])));
        assert!(ctx.get("missing").is_none());
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&serde_json::json!("green")), "green");
        assert_eq!(display_value(&serde_json::json!(1.5)), "1.5");
    }
}
