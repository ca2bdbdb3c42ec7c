//! Tool definitions and I/O types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::errors::GuardError;
use crate::guard::ValidationOutcome;
use crate::validators::Metadata;

/// Definition of a tool whose output is guarded.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    /// The tool name.
    pub name: String,
    /// Description of what the tool does.
    pub description: String,
    /// JSON Schema for the tool's input.
    pub input_schema: serde_json::Value,
    /// JSON Schema the tool's output must satisfy.
    pub output_schema: serde_json::Value,
}

impl ToolDefinition {
    /// Creates a new tool definition.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            input_schema: serde_json::json!({}),
            output_schema: serde_json::json!({}),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Sets the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Sets the output schema.
    #[must_use]
    pub fn with_output_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = schema;
        self
    }
}

/// Input to a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    /// Unique ID of this call.
    pub action_id: Uuid,
    /// The tool name.
    pub tool_name: String,
    /// The input payload.
    pub payload: serde_json::Value,
    /// Metadata forwarded to generation and validators.
    #[serde(default)]
    pub metadata: Metadata,
}

impl ToolInput {
    /// Creates a new tool input.
    #[must_use]
    pub fn new(tool_name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            action_id: Uuid::now_v7(),
            tool_name: tool_name.into(),
            payload,
            metadata: Metadata::new(),
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns a string field of the payload.
    #[must_use]
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(serde_json::Value::as_str)
    }
}

/// Output handed back to the agent runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Whether the guarded output was accepted.
    pub success: bool,
    /// The validated payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Error message if the call failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable error kind (see [`GuardError::kind`]).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// Number of attempts the guard made.
    pub attempts: usize,
    /// The serialized session audit trail.
    pub audit: serde_json::Value,
}

impl ToolOutput {
    /// Converts a guard result into a tool output.
    #[must_use]
    pub fn from_result(result: Result<ValidationOutcome, GuardError>) -> Self {
        match result {
            Ok(outcome) => {
                let (data, session) = outcome.into_parts();
                Self {
                    success: true,
                    data: Some(data),
                    error: None,
                    error_kind: None,
                    attempts: session.attempts().len(),
                    audit: serde_json::to_value(&session).unwrap_or_default(),
                }
            }
            Err(error) => Self {
                success: false,
                data: None,
                error: Some(error.to_string()),
                error_kind: Some(error.kind().to_string()),
                attempts: error.session().attempts().len(),
                audit: serde_json::to_value(error.session()).unwrap_or_default(),
            },
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("success".to_string(), serde_json::json!(self.success));
        map.insert("attempts".to_string(), serde_json::json!(self.attempts));

        if let Some(ref data) = self.data {
            map.insert("data".to_string(), data.clone());
        }
        if let Some(ref error) = self.error {
            map.insert("error".to_string(), serde_json::json!(error));
        }
        if let Some(ref kind) = self.error_kind {
            map.insert("error_kind".to_string(), serde_json::json!(kind));
        }

        map
    }
}
