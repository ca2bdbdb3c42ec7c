//! Error types for the guardflow crate.
//!
//! Construction-time errors (`RegistryError`, `ContractError`, `ConfigError`) always
//! surface to the caller immediately. Run-time errors (`GuardError`) are terminal for
//! the session that produced them and carry its full audit trail.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::guard::{FailingField, GuardSession};

/// The main error type for guardflow operations.
#[derive(Debug, Error)]
pub enum GuardflowError {
    /// A validator registry error occurred.
    #[error("{0}")]
    Registry(#[from] RegistryError),

    /// An output contract could not be built.
    #[error("{0}")]
    Contract(#[from] ContractError),

    /// The guard configuration is invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A guard session ended in a terminal error.
    #[error("{0}")]
    Guard(#[from] GuardError),
}

/// Metadata about a construction error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "GUARD-002-UNKNOWN").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Errors raised by the validator registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A validator with this name is already registered.
    #[error("Validator '{name}' is already registered")]
    DuplicateValidator {
        /// The validator name.
        name: String,
    },

    /// No validator is registered under this name.
    #[error("Unknown validator '{name}'")]
    UnknownValidator {
        /// The validator name.
        name: String,
    },

    /// The configuration does not match the validator's declared shape.
    #[error("Invalid config for validator '{name}': {message}")]
    InvalidConfig {
        /// The validator name.
        name: String,
        /// What was wrong with the configuration.
        message: String,
    },
}

impl RegistryError {
    /// Creates a duplicate validator error.
    #[must_use]
    pub fn duplicate(name: impl Into<String>) -> Self {
        Self::DuplicateValidator { name: name.into() }
    }

    /// Creates an unknown validator error.
    #[must_use]
    pub fn unknown(name: impl Into<String>) -> Self {
        Self::UnknownValidator { name: name.into() }
    }

    /// Creates an invalid config error.
    #[must_use]
    pub fn invalid_config(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Returns structured diagnostics for this error.
    #[must_use]
    pub fn error_info(&self) -> ContractErrorInfo {
        match self {
            Self::DuplicateValidator { name } => {
                ContractErrorInfo::new("GUARD-001-DUPLICATE", self.to_string())
                    .with_fix_hint("Use register_override to replace an existing validator.")
                    .with_context_entry("validator", name)
            }
            Self::UnknownValidator { name } => {
                ContractErrorInfo::new("GUARD-002-UNKNOWN", self.to_string())
                    .with_fix_hint("Register the validator before freezing the registry.")
                    .with_context_entry("validator", name)
            }
            Self::InvalidConfig { name, .. } => {
                ContractErrorInfo::new("GUARD-003-CONFIG", self.to_string())
                    .with_context_entry("validator", name)
            }
        }
    }
}

/// Errors raised while building an output contract.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContractError {
    /// The contract shape cannot be bound (unsupported type, bad field layout, ...).
    #[error("Schema binding error{}: {message}", field.as_ref().map(|f| format!(" for field '{f}'")).unwrap_or_default())]
    SchemaBinding {
        /// The offending field, if any.
        field: Option<String>,
        /// The error message.
        message: String,
    },

    /// A validator attached to a field failed to resolve.
    #[error("Validator config error for field '{field}': {source}")]
    ValidatorConfig {
        /// The field the validator is attached to.
        field: String,
        /// The underlying registry error.
        #[source]
        source: RegistryError,
    },

    /// A validator was attached to a field the contract does not declare.
    #[error("No field '{field}' to attach validator '{validator}' to")]
    UnknownTarget {
        /// The requested target field.
        field: String,
        /// The validator being attached.
        validator: String,
    },
}

impl ContractError {
    /// Creates a schema binding error not tied to a field.
    #[must_use]
    pub fn binding(message: impl Into<String>) -> Self {
        Self::SchemaBinding {
            field: None,
            message: message.into(),
        }
    }

    /// Creates a schema binding error for a field.
    #[must_use]
    pub fn binding_for(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaBinding {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Creates a validator config error.
    #[must_use]
    pub fn validator_config(field: impl Into<String>, source: RegistryError) -> Self {
        Self::ValidatorConfig {
            field: field.into(),
            source,
        }
    }

    /// Returns structured diagnostics for this error.
    #[must_use]
    pub fn error_info(&self) -> ContractErrorInfo {
        match self {
            Self::SchemaBinding { field, .. } => {
                let info = ContractErrorInfo::new("GUARD-004-BINDING", self.to_string());
                match field {
                    Some(f) => info.with_context_entry("field", f),
                    None => info,
                }
            }
            Self::ValidatorConfig { field, source } => {
                let mut info = source.error_info();
                info.summary = self.to_string();
                info.with_context_entry("field", field)
            }
            Self::UnknownTarget { field, validator } => {
                ContractErrorInfo::new("GUARD-005-TARGET", self.to_string())
                    .with_fix_hint("Declare the field before attaching validators to it.")
                    .with_context_entry("field", field)
                    .with_context_entry("validator", validator)
            }
        }
    }
}

/// A candidate (or one of its fields) does not match the expected shape.
///
/// This is never returned as an `Err` from the guard: it becomes a field-level
/// failure that the failure action dispatcher handles like any other.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct SchemaParseError {
    /// The field that failed to parse, or `None` for the whole candidate.
    pub field: Option<String>,
    /// The error message.
    pub message: String,
}

impl SchemaParseError {
    /// Creates a parse error for the whole candidate.
    #[must_use]
    pub fn candidate(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }

    /// Creates a parse error for a single field.
    #[must_use]
    pub fn for_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
        }
    }
}

/// Failure reported by a generation backend.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The provider rejected or failed the request.
    #[error("Provider error: {message}")]
    Provider {
        /// The provider's message.
        message: String,
    },

    /// The call was cancelled by the caller's cancellation signal.
    #[error("Generation cancelled: {reason}")]
    Cancelled {
        /// The cancellation reason.
        reason: String,
    },

    /// Any other backend failure.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl GenerationError {
    /// Creates a provider error.
    #[must_use]
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }

    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }
}

/// Terminal outcome of a guard session that did not succeed.
#[derive(Debug, Error)]
pub enum GuardError {
    /// An `exception`-policy field failed.
    #[error("Validation failed for field '{field}': {reason}")]
    ValidationFailure {
        /// The failing field.
        field: String,
        /// The failure reason.
        reason: String,
        /// The session audit trail.
        session: Box<GuardSession>,
    },

    /// The reask budget was consumed without a passing candidate.
    #[error(
        "Reask budget exhausted after {} attempt(s); failing fields: {}",
        .session.attempts().len(),
        .failing_fields.iter().map(|f| f.name.as_str()).collect::<Vec<_>>().join(", ")
    )]
    ReaskExhausted {
        /// The fields still failing on the last attempt.
        failing_fields: Vec<FailingField>,
        /// The session audit trail.
        session: Box<GuardSession>,
    },

    /// The generation backend failed; this always aborts the session.
    #[error("Generation failed: {source}")]
    Generation {
        /// The backend error, unchanged.
        #[source]
        source: GenerationError,
        /// The session audit trail.
        session: Box<GuardSession>,
    },

    /// The session was cancelled between attempts.
    #[error("Guard session cancelled: {reason}")]
    Cancelled {
        /// The cancellation reason.
        reason: String,
        /// The session audit trail.
        session: Box<GuardSession>,
    },
}

impl GuardError {
    /// Returns the audit trail of the session that ended in this error.
    #[must_use]
    pub fn session(&self) -> &GuardSession {
        match self {
            Self::ValidationFailure { session, .. }
            | Self::ReaskExhausted { session, .. }
            | Self::Generation { session, .. }
            | Self::Cancelled { session, .. } => session,
        }
    }

    /// Consumes the error, returning its session.
    #[must_use]
    pub fn into_session(self) -> GuardSession {
        match self {
            Self::ValidationFailure { session, .. }
            | Self::ReaskExhausted { session, .. }
            | Self::Generation { session, .. }
            | Self::Cancelled { session, .. } => *session,
        }
    }

    /// Short machine-readable kind, used in tool outputs and events.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ValidationFailure { .. } => "validation_failure",
            Self::ReaskExhausted { .. } => "reask_exhausted",
            Self::Generation { .. } => "generation_error",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

/// Errors raised while loading or checking a guard configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration could not be deserialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The configuration values are inconsistent.
    #[error("Invalid guard config: {0}")]
    Invalid(String),
}
