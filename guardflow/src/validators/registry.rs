//! Name-keyed validator registry.
//!
//! Registration happens on a [`ValidatorRegistryBuilder`] during initialization;
//! [`ValidatorRegistryBuilder::freeze`] produces an immutable [`ValidatorRegistry`]
//! that can be shared across threads and resolved from without locking.

use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use super::builtin;
use super::unit::ValidatorUnit;
use crate::errors::RegistryError;

/// Factory that builds a validator unit from its JSON configuration.
///
/// Returning `Err(message)` signals that the configuration does not satisfy the
/// factory's declared shape.
pub type ValidatorFactory =
    Arc<dyn Fn(&serde_json::Value) -> Result<Arc<dyn ValidatorUnit>, String> + Send + Sync>;

/// Wraps a constructor taking a typed, deserializable configuration.
///
/// A `null` configuration is treated as an empty object so that validators whose
/// options all have defaults can be used without a config.
pub fn config_factory<C, V, F>(build: F) -> ValidatorFactory
where
    C: DeserializeOwned,
    V: ValidatorUnit + 'static,
    F: Fn(C) -> Result<V, String> + Send + Sync + 'static,
{
    Arc::new(move |config: &serde_json::Value| {
        let config = if config.is_null() {
            serde_json::json!({})
        } else {
            config.clone()
        };
        let typed: C = serde_json::from_value(config).map_err(|e| e.to_string())?;
        let unit = build(typed)?;
        Ok(Arc::new(unit) as Arc<dyn ValidatorUnit>)
    })
}

/// Mutable registry used during initialization.
#[derive(Default)]
pub struct ValidatorRegistryBuilder {
    factories: HashMap<String, ValidatorFactory>,
}

impl ValidatorRegistryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder pre-populated with the built-in validators.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut builder = Self::new();
        for (name, factory) in builtin::builtin_factories() {
            builder.factories.insert(name.to_string(), factory);
        }
        builder
    }

    /// Registers a validator factory.
    ///
    /// Fails if the name is already bound; use [`Self::register_override`] to replace.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: ValidatorFactory,
    ) -> Result<&mut Self, RegistryError> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(RegistryError::duplicate(name));
        }
        tracing::debug!(validator = %name, "Registered validator");
        self.factories.insert(name, factory);
        Ok(self)
    }

    /// Registers a validator factory, replacing any existing binding.
    pub fn register_override(
        &mut self,
        name: impl Into<String>,
        factory: ValidatorFactory,
    ) -> &mut Self {
        let name = name.into();
        if self.factories.insert(name.clone(), factory).is_some() {
            tracing::debug!(validator = %name, "Overrode validator");
        }
        self
    }

    /// Returns true if a name is bound.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Freezes the registry. No further registration is possible.
    #[must_use]
    pub fn freeze(self) -> Arc<ValidatorRegistry> {
        Arc::new(ValidatorRegistry {
            factories: self.factories,
        })
    }
}

impl std::fmt::Debug for ValidatorRegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorRegistryBuilder")
            .field("factory_count", &self.factories.len())
            .finish()
    }
}

/// Frozen, read-only validator registry.
pub struct ValidatorRegistry {
    factories: HashMap<String, ValidatorFactory>,
}

impl ValidatorRegistry {
    /// Builds a unit for `name` from `config`.
    pub fn resolve(
        &self,
        name: &str,
        config: &serde_json::Value,
    ) -> Result<Arc<dyn ValidatorUnit>, RegistryError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RegistryError::unknown(name))?;
        factory(config).map_err(|message| RegistryError::invalid_config(name, message))
    }

    /// Returns true if a name is bound.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Lists registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of registered validators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns true if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorRegistry")
            .field("validators", &self.names())
            .finish()
    }
}

static DEFAULT_REGISTRY: OnceLock<Arc<ValidatorRegistry>> = OnceLock::new();

/// Installs the process-wide default registry.
///
/// Must run during initialization, before any call to [`default_registry`]. Returns
/// the rejected registry if a default is already in place.
pub fn install_default_registry(
    registry: Arc<ValidatorRegistry>,
) -> Result<(), Arc<ValidatorRegistry>> {
    DEFAULT_REGISTRY.set(registry)
}

/// Returns the process-wide default registry (built-ins only unless one was installed).
pub fn default_registry() -> Arc<ValidatorRegistry> {
    DEFAULT_REGISTRY
        .get_or_init(|| ValidatorRegistryBuilder::with_builtins().freeze())
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::{ValidationContext, ValidationResult};
    use serde::Deserialize;

    #[derive(Debug)]
    struct AlwaysPass;

    impl ValidatorUnit for AlwaysPass {
        fn name(&self) -> &str {
            "always-pass"
        }

        fn check(&self, _value: &serde_json::Value, _ctx: &ValidationContext<'_>) -> ValidationResult {
            ValidationResult::pass()
        }
    }

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    struct MinConfig {
        min: i64,
    }

    fn always_pass_factory() -> ValidatorFactory {
        Arc::new(|_config: &serde_json::Value| Ok(Arc::new(AlwaysPass) as Arc<dyn ValidatorUnit>))
    }

    #[test]
    fn test_register_and_resolve() {
        let mut builder = ValidatorRegistryBuilder::new();
        builder.register("always-pass", always_pass_factory()).unwrap();
        let registry = builder.freeze();

        let unit = registry.resolve("always-pass", &serde_json::Value::Null).unwrap();
        assert_eq!(unit.name(), "always-pass");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut builder = ValidatorRegistryBuilder::new();
        builder.register("always-pass", always_pass_factory()).unwrap();
        let err = builder
            .register("always-pass", always_pass_factory())
            .unwrap_err();
        assert_eq!(err, RegistryError::duplicate("always-pass"));
    }

    #[test]
    fn test_override_replaces_binding() {
        let mut builder = ValidatorRegistryBuilder::with_builtins();
        assert!(builder.contains("lower-case"));
        builder.register_override("lower-case", always_pass_factory());
        let registry = builder.freeze();

        let unit = registry.resolve("lower-case", &serde_json::Value::Null).unwrap();
        assert_eq!(unit.name(), "always-pass");
    }

    #[test]
    fn test_unknown_validator() {
        let registry = ValidatorRegistryBuilder::new().freeze();
        let err = registry.resolve("missing", &serde_json::Value::Null).unwrap_err();
        assert_eq!(err, RegistryError::unknown("missing"));
    }

    #[test]
    fn test_config_factory_rejects_bad_shape() {
        let mut builder = ValidatorRegistryBuilder::new();
        builder
            .register(
                "min",
                config_factory(|_config: MinConfig| Ok(AlwaysPass)),
            )
            .unwrap();
        let registry = builder.freeze();

        assert!(registry.resolve("min", &serde_json::json!({"min": 3})).is_ok());

        let err = registry
            .resolve("min", &serde_json::json!({"minimum": 3}))
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidConfig { ref name, .. } if name == "min"));
    }

    #[test]
    fn test_concurrent_resolution() {
        let registry = ValidatorRegistryBuilder::with_builtins().freeze();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry
                        .resolve("valid-choices", &serde_json::json!({"choices": ["a", "b"]}))
                        .is_ok()
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }

    #[test]
    fn test_default_registry_has_builtins() {
        let registry = default_registry();
        assert!(registry.contains("regex-match"));
        assert!(registry.contains("valid-choices"));
    }
}
