//! Validator units and the registry that resolves them by name.
//!
//! This module provides:
//! - The `ValidatorUnit` capability contract
//! - A populate-then-freeze `ValidatorRegistry`
//! - Built-in units (pattern, substring, choices, range, length, case, sentences, classifier)

mod builtin;
mod registry;
mod unit;

pub use builtin::{
    ClassifierUnit, ContainsString, ExactSentenceCount, LowerCase, MatchType, RegexMatch, Scorer,
    ValidChoices, ValidLength, ValidRange,
};
pub use registry::{
    config_factory, default_registry, install_default_registry, ValidatorFactory,
    ValidatorRegistry, ValidatorRegistryBuilder,
};
pub use unit::{Metadata, ValidationContext, ValidationResult, ValidatorUnit};
pub(crate) use unit::display_value;
