//! Fluent guard construction.

use std::sync::Arc;

use super::executor::Guard;
use crate::config::GuardConfig;
use crate::contracts::{ContractBuilder, OnFail, ValidatorRef};
use crate::errors::{ContractError, GuardflowError};
use crate::events::{EventSink, NoOpEventSink};
use crate::validators::ValidatorRegistry;

/// Builder for a [`Guard`].
///
/// Errors from individual steps (such as an unreadable schema) are kept and
/// reported by [`GuardBuilder::build`], so the chain stays fluent.
///
/// ```
/// use guardflow::prelude::*;
/// use serde_json::json;
///
/// let guard = Guard::builder(default_registry())
///     .use_validator("valid-choices", json!({"choices": ["red", "blue"]}), None, OnFail::Exception)
///     .build()
///     .unwrap();
///
/// assert!(guard.validate("blue").is_ok());
/// assert!(guard.validate("green").is_err());
/// ```
pub struct GuardBuilder {
    registry: Arc<ValidatorRegistry>,
    contract: ContractBuilder,
    pending_error: Option<ContractError>,
    config: GuardConfig,
    event_sink: Arc<dyn EventSink>,
}

impl GuardBuilder {
    /// Creates a builder for a single-string contract.
    #[must_use]
    pub fn new(registry: Arc<ValidatorRegistry>) -> Self {
        Self {
            registry,
            contract: ContractBuilder::string(),
            pending_error: None,
            config: GuardConfig::default(),
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    /// Replaces the contract being built.
    #[must_use]
    pub fn contract(mut self, contract: ContractBuilder) -> Self {
        self.contract = contract;
        self
    }

    /// Replaces the contract with one bound from a JSON Schema.
    #[must_use]
    pub fn for_schema(mut self, schema: &serde_json::Value) -> Self {
        match ContractBuilder::from_schema(schema) {
            Ok(contract) => self.contract = contract,
            Err(e) => {
                self.pending_error.get_or_insert(e);
            }
        }
        self
    }

    /// Attaches a registered validator.
    ///
    /// `applies_to` names the target field; `None` targets the scalar field.
    #[must_use]
    pub fn use_validator(
        self,
        name: impl Into<String>,
        config: serde_json::Value,
        applies_to: Option<&str>,
        on_fail: OnFail,
    ) -> Self {
        self.use_validator_ref(applies_to, ValidatorRef::new(name, config).on_fail(on_fail))
    }

    /// Attaches a fully specified validator reference.
    #[must_use]
    pub fn use_validator_ref(mut self, applies_to: Option<&str>, validator: ValidatorRef) -> Self {
        self.contract = self.contract.validator(applies_to, validator);
        self
    }

    /// Sets the guard configuration.
    #[must_use]
    pub fn with_config(mut self, config: GuardConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the reask budget used by reask controllers created from this guard.
    ///
    /// The budget is carried by [`Guard::reask_controller`]; a controller created
    /// directly with [`ReaskController::new`](crate::guard::ReaskController::new)
    /// keeps its own default.
    #[must_use]
    pub fn with_max_reasks(mut self, max_reasks: usize) -> Self {
        self.config.max_reasks = max_reasks;
        self
    }

    /// Sets the sink receiving lifecycle events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Resolves every validator and produces the guard.
    ///
    /// # Errors
    ///
    /// Returns a contract error if the contract cannot be bound or a validator does
    /// not resolve, or a config error if the configuration is inconsistent.
    pub fn build(self) -> Result<Guard, GuardflowError> {
        if let Some(error) = self.pending_error {
            return Err(error.into());
        }
        self.config.validate()?;
        let contract = self.contract.build(&self.registry)?;
        Ok(Guard::new(Arc::new(contract), self.config, self.event_sink))
    }
}

impl std::fmt::Debug for GuardBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardBuilder")
            .field("contract", &self.contract)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{FieldSpec, FieldType};
    use crate::errors::RegistryError;
    use crate::validators::ValidatorRegistryBuilder;
    use serde_json::json;

    fn registry() -> Arc<ValidatorRegistry> {
        ValidatorRegistryBuilder::with_builtins().freeze()
    }

    #[test]
    fn test_structured_guard_with_targeted_validators() {
        let guard = GuardBuilder::new(registry())
            .contract(
                ContractBuilder::structured()
                    .field(FieldSpec::new("sentiment", FieldType::String))
                    .field(FieldSpec::new("summary", FieldType::String)),
            )
            .use_validator(
                "valid-choices",
                json!({"choices": ["positivo", "negativo"]}),
                Some("sentiment"),
                OnFail::Reask,
            )
            .use_validator("valid-length", json!({"max": 280}), Some("summary"), OnFail::Fix)
            .with_max_reasks(3)
            .build()
            .unwrap();

        assert_eq!(guard.contract().fields().len(), 2);
        assert_eq!(guard.config().max_reasks, 3);

        let backend: Arc<dyn crate::backend::GenerationBackend> =
            Arc::new(crate::testing::ScriptedBackend::always("ok"));
        assert_eq!(guard.reask_controller(Arc::clone(&backend)).max_reasks(), 3);
        assert_eq!(crate::guard::ReaskController::new(backend).max_reasks(), 1);
        assert_eq!(
            guard.contract().field("summary").unwrap().validators()[0].on_fail(),
            OnFail::Fix
        );
    }

    #[test]
    fn test_unknown_validator_fails_at_build() {
        let err = GuardBuilder::new(registry())
            .use_validator("toxic-language", json!(null), None, OnFail::Exception)
            .build()
            .unwrap_err();

        match err {
            GuardflowError::Contract(ContractError::ValidatorConfig { source, .. }) => {
                assert_eq!(source, RegistryError::unknown("toxic-language"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_schema_error_is_deferred_to_build() {
        let err = GuardBuilder::new(registry())
            .for_schema(&json!({"type": "object", "properties": {"x": {"type": "date"}}}))
            .with_max_reasks(1)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            GuardflowError::Contract(ContractError::SchemaBinding { .. })
        ));
    }

    #[test]
    fn test_invalid_config_fails_at_build() {
        let mut config = GuardConfig::default();
        config.backoff.base_delay_ms = 10;
        config.backoff.max_delay_ms = 1;

        let err = GuardBuilder::new(registry())
            .with_config(config)
            .build()
            .unwrap_err();
        assert!(matches!(err, GuardflowError::Config(_)));
    }
}
