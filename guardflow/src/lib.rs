//! # Guardflow
//!
//! Structured-output validation and correction for generative backends.
//!
//! A [`Guard`](guard::Guard) checks a candidate output against an output contract
//! (a single constrained string, or an object of typed, constrained fields) and
//! applies a per-validator failure policy:
//!
//! - **Validator registry**: named, configurable validator units resolved once and frozen
//! - **Output contracts**: built fluently or bound from a JSON Schema
//! - **Failure actions**: `exception`, `reask`, `fix` or `noop` per validator
//! - **Bounded reask**: corrective prompts fed back to a generation backend with backoff
//! - **Audit trail**: every attempt recorded in a serializable `GuardSession`
//!
//! ## Quick Start
//!
//! ```rust
//! use guardflow::prelude::*;
//! use serde_json::json;
//!
//! let guard = Guard::builder(default_registry())
//!     .use_validator("regex-match", json!({"regex": "^[A-Z]+$", "match_type": "fullmatch"}), None, OnFail::Exception)
//!     .build()?;
//!
//! let outcome = guard.validate("ABC")?;
//! assert_eq!(outcome.validated_output(), &json!("ABC"));
//! assert!(guard.validate("abc").is_err());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod backend;
pub mod cancellation;
pub mod config;
pub mod contracts;
pub mod errors;
pub mod events;
pub mod guard;
pub mod observability;
pub mod testing;
pub mod tools;
pub mod utils;
pub mod validators;

pub use backend::{GenerationBackend, GenerationRequest};
pub use config::GuardConfig;
pub use errors::{GenerationError, GuardError, GuardflowError};
pub use guard::{Guard, GuardBuilder, GuardSession, ValidationOutcome};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::backend::{GenerationBackend, GenerationRequest};
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::GuardConfig;
    pub use crate::contracts::{
        ContractBuilder, FieldSpec, FieldType, OnFail, OutputContract, ValidatorRef,
    };
    pub use crate::errors::{
        ConfigError, ContractError, ContractErrorInfo, GenerationError, GuardError,
        GuardflowError, RegistryError, SchemaParseError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::guard::{
        BackoffConfig, BackoffStrategy, FieldOutcome, Guard, GuardBuilder, GuardSession,
        JitterStrategy, ReaskController, SessionStatus, ValidationOutcome,
    };
    pub use crate::tools::{GuardedTool, ToolBody, ToolDefinition, ToolInput, ToolOutput};
    pub use crate::utils::Timestamp;
    pub use crate::validators::{
        default_registry, Metadata, ValidationContext, ValidationResult, ValidatorRegistry,
        ValidatorRegistryBuilder, ValidatorUnit,
    };
}
