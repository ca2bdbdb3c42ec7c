//! Output contract construction and the immutable, resolved contract.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use super::types::{FieldSpec, FieldType, OnFail, ValidatorRef};
use crate::errors::ContractError;
use crate::validators::{ValidatorRegistry, ValidatorUnit};

/// Name of the implicit field of a single-scalar contract.
pub const SCALAR_FIELD: &str = "output";

/// Pseudo-field used in the audit trail when the whole candidate fails to parse.
pub const CANDIDATE_FIELD: &str = "$candidate";

/// Whether a contract constrains one scalar or a set of named fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractMode {
    /// One implicit field holding the whole candidate.
    Scalar,
    /// A JSON object with named fields.
    Structured,
}

/// A validator reference resolved against a registry.
#[derive(Clone)]
pub struct BoundValidator {
    reference: ValidatorRef,
    unit: Arc<dyn ValidatorUnit>,
}

impl BoundValidator {
    /// Returns the reference this unit was resolved from.
    #[must_use]
    pub fn reference(&self) -> &ValidatorRef {
        &self.reference
    }

    /// Returns the resolved unit.
    #[must_use]
    pub fn unit(&self) -> &dyn ValidatorUnit {
        self.unit.as_ref()
    }

    /// Returns the registered name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.reference.name
    }

    /// Returns the failure policy.
    #[must_use]
    pub fn on_fail(&self) -> OnFail {
        self.reference.on_fail
    }

    /// Returns the policy used when a fix does not pass.
    #[must_use]
    pub fn fix_fallback(&self) -> OnFail {
        self.reference.fix_fallback
    }
}

impl std::fmt::Debug for BoundValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundValidator")
            .field("name", &self.reference.name)
            .field("on_fail", &self.reference.on_fail)
            .finish_non_exhaustive()
    }
}

/// A field with its resolved validators.
#[derive(Debug, Clone)]
pub struct BoundField {
    spec: FieldSpec,
    validators: Vec<BoundValidator>,
}

impl BoundField {
    /// Returns the field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Returns the expected type.
    #[must_use]
    pub fn field_type(&self) -> FieldType {
        self.spec.field_type
    }

    /// Returns true if the field must be present.
    #[must_use]
    pub fn required(&self) -> bool {
        self.spec.required
    }

    /// Returns the field declaration.
    #[must_use]
    pub fn spec(&self) -> &FieldSpec {
        &self.spec
    }

    /// Returns the validators in run order.
    #[must_use]
    pub fn validators(&self) -> &[BoundValidator] {
        &self.validators
    }
}

/// An immutable, fully resolved output contract.
#[derive(Debug, Clone)]
pub struct OutputContract {
    name: String,
    mode: ContractMode,
    fields: Vec<BoundField>,
    parse_policy: OnFail,
}

impl OutputContract {
    /// Returns the contract name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the contract mode.
    #[must_use]
    pub fn mode(&self) -> ContractMode {
        self.mode
    }

    /// Returns true for single-scalar contracts.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        self.mode == ContractMode::Scalar
    }

    /// Returns the fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[BoundField] {
        &self.fields
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&BoundField> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Returns the policy applied to parse failures.
    #[must_use]
    pub fn parse_policy(&self) -> OnFail {
        self.parse_policy
    }

    /// Describes a field's constraints for corrective prompts.
    #[must_use]
    pub fn constraint_description(&self, field: &str) -> Option<String> {
        if field == CANDIDATE_FIELD {
            return Some(match self.mode {
                ContractMode::Structured => format!(
                    "must be a JSON object with fields: {}",
                    self.fields
                        .iter()
                        .map(|f| format!("{} ({})", f.name(), f.field_type()))
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                ContractMode::Scalar => format!("must be a {}", self.fields[0].field_type()),
            });
        }

        let bound = self.field(field)?;
        let mut parts = Vec::new();
        if let Some(ref description) = bound.spec.description {
            parts.push(description.clone());
        }
        parts.push(format!("type {}", bound.field_type()));
        parts.extend(bound.validators.iter().filter_map(|v| v.unit().describe()));
        Some(parts.join("; "))
    }
}

/// Builder producing a validated [`OutputContract`].
#[derive(Debug, Clone)]
pub struct ContractBuilder {
    name: String,
    mode: ContractMode,
    fields: Vec<FieldSpec>,
    parse_policy: OnFail,
    attachments: Vec<(Option<String>, ValidatorRef)>,
}

impl ContractBuilder {
    /// Starts a single-scalar contract.
    #[must_use]
    pub fn scalar(field_type: FieldType) -> Self {
        Self {
            name: "scalar".to_string(),
            mode: ContractMode::Scalar,
            fields: vec![FieldSpec::new(SCALAR_FIELD, field_type)],
            parse_policy: OnFail::Exception,
            attachments: Vec::new(),
        }
    }

    /// Starts a single-string contract.
    #[must_use]
    pub fn string() -> Self {
        Self::scalar(FieldType::String)
    }

    /// Starts a structured contract.
    #[must_use]
    pub fn structured() -> Self {
        Self {
            name: "structured".to_string(),
            mode: ContractMode::Structured,
            fields: Vec::new(),
            parse_policy: OnFail::Exception,
            attachments: Vec::new(),
        }
    }

    /// Sets the contract name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds a field to a structured contract.
    #[must_use]
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Sets the policy for parse failures (`exception` or `reask`).
    #[must_use]
    pub fn parse_policy(mut self, policy: OnFail) -> Self {
        self.parse_policy = policy;
        self
    }

    /// Attaches a validator to a field; `None` targets the scalar field.
    #[must_use]
    pub fn validator(mut self, applies_to: Option<&str>, validator: ValidatorRef) -> Self {
        self.attachments.push((applies_to.map(String::from), validator));
        self
    }

    /// Returns the contract mode being built.
    #[must_use]
    pub fn mode(&self) -> ContractMode {
        self.mode
    }

    /// Validates the layout and resolves every validator against `registry`.
    pub fn build(self, registry: &ValidatorRegistry) -> Result<OutputContract, ContractError> {
        if !matches!(self.parse_policy, OnFail::Exception | OnFail::Reask) {
            return Err(ContractError::binding(format!(
                "parse policy must be 'exception' or 'reask', got '{}'",
                self.parse_policy
            )));
        }

        match self.mode {
            ContractMode::Scalar if self.fields.len() != 1 => {
                return Err(ContractError::binding(
                    "a scalar contract has exactly one implicit field",
                ));
            }
            ContractMode::Structured if self.fields.is_empty() => {
                return Err(ContractError::binding(
                    "a structured contract needs at least one field",
                ));
            }
            _ => {}
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() || field.name == CANDIDATE_FIELD {
                return Err(ContractError::binding_for(
                    &field.name,
                    "field name is empty or reserved",
                ));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(ContractError::binding_for(&field.name, "duplicate field"));
            }
        }

        let mut fields = self.fields;
        for (target, validator) in self.attachments {
            let index = match (self.mode, target) {
                (ContractMode::Scalar, None) => 0,
                (ContractMode::Structured, None) => {
                    return Err(ContractError::binding(format!(
                        "validator '{}' needs a target field on a structured contract",
                        validator.name
                    )));
                }
                (_, Some(name)) => fields.iter().position(|f| f.name == name).ok_or_else(|| {
                    ContractError::UnknownTarget {
                        field: name.clone(),
                        validator: validator.name.clone(),
                    }
                })?,
            };
            fields[index].validators.push(validator);
        }

        let mut bound = Vec::with_capacity(fields.len());
        for spec in fields {
            let mut validators = Vec::with_capacity(spec.validators.len());
            for reference in &spec.validators {
                if reference.fix_fallback == OnFail::Fix {
                    return Err(ContractError::binding_for(
                        &spec.name,
                        format!("validator '{}' cannot fall back to 'fix'", reference.name),
                    ));
                }
                let unit = registry
                    .resolve(&reference.name, &reference.config)
                    .map_err(|e| ContractError::validator_config(&spec.name, e))?;
                validators.push(BoundValidator {
                    reference: reference.clone(),
                    unit,
                });
            }
            bound.push(BoundField { spec, validators });
        }

        tracing::debug!(
            contract = %self.name,
            mode = ?self.mode,
            fields = bound.len(),
            "Built output contract"
        );

        Ok(OutputContract {
            name: self.name,
            mode: self.mode,
            fields: bound,
            parse_policy: self.parse_policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::ValidatorRegistryBuilder;
    use serde_json::json;

    fn registry() -> Arc<ValidatorRegistry> {
        ValidatorRegistryBuilder::with_builtins().freeze()
    }

    #[test]
    fn test_scalar_contract() {
        let contract = ContractBuilder::string()
            .validator(
                None,
                ValidatorRef::new("regex-match", json!({"regex": "^[A-Z]{3}$"})),
            )
            .build(&registry())
            .unwrap();

        assert!(contract.is_scalar());
        assert_eq!(contract.fields().len(), 1);
        assert_eq!(contract.fields()[0].name(), SCALAR_FIELD);
        assert_eq!(contract.fields()[0].validators()[0].name(), "regex-match");
    }

    #[test]
    fn test_structured_contract_keeps_declaration_order() {
        let contract = ContractBuilder::structured()
            .named("sentiment_analysis")
            .field(FieldSpec::new("sentiment", FieldType::String))
            .field(FieldSpec::new("summary", FieldType::String))
            .field(FieldSpec::new("confidence_score", FieldType::Number).optional())
            .build(&registry())
            .unwrap();

        let names: Vec<_> = contract.fields().iter().map(BoundField::name).collect();
        assert_eq!(names, vec!["sentiment", "summary", "confidence_score"]);
        assert_eq!(contract.name(), "sentiment_analysis");
    }

    #[test]
    fn test_unknown_validator_is_construction_error() {
        let err = ContractBuilder::string()
            .validator(None, ValidatorRef::new("nope", json!(null)))
            .build(&registry())
            .unwrap_err();
        assert!(matches!(err, ContractError::ValidatorConfig { ref field, .. } if field == SCALAR_FIELD));
    }

    #[test]
    fn test_invalid_validator_config_is_construction_error() {
        let err = ContractBuilder::structured()
            .field(
                FieldSpec::new("sentiment", FieldType::String)
                    .validator(ValidatorRef::new("valid-choices", json!({"choices": "red"}))),
            )
            .build(&registry())
            .unwrap_err();
        assert!(matches!(err, ContractError::ValidatorConfig { ref field, .. } if field == "sentiment"));
    }

    #[test]
    fn test_layout_errors() {
        let registry = registry();

        assert!(ContractBuilder::structured().build(&registry).is_err());

        let duplicate = ContractBuilder::structured()
            .field(FieldSpec::new("a", FieldType::String))
            .field(FieldSpec::new("a", FieldType::Number))
            .build(&registry);
        assert!(duplicate.is_err());

        let reserved = ContractBuilder::structured()
            .field(FieldSpec::new(CANDIDATE_FIELD, FieldType::String))
            .build(&registry);
        assert!(reserved.is_err());

        let bad_policy = ContractBuilder::string()
            .parse_policy(OnFail::Noop)
            .build(&registry);
        assert!(bad_policy.is_err());

        let untargeted = ContractBuilder::structured()
            .field(FieldSpec::new("a", FieldType::String))
            .validator(None, ValidatorRef::new("lower-case", json!(null)))
            .build(&registry);
        assert!(untargeted.is_err());

        let missing_target = ContractBuilder::structured()
            .field(FieldSpec::new("a", FieldType::String))
            .validator(Some("b"), ValidatorRef::new("lower-case", json!(null)))
            .build(&registry);
        let err = missing_target.unwrap_err();
        assert_eq!(err.error_info().code, "GUARD-005-TARGET");

        let fix_to_fix = ContractBuilder::string()
            .validator(
                None,
                ValidatorRef::new("lower-case", json!(null))
                    .on_fail(OnFail::Fix)
                    .fix_fallback(OnFail::Fix),
            )
            .build(&registry);
        assert!(fix_to_fix.is_err());
    }

    #[test]
    fn test_constraint_description() {
        let contract = ContractBuilder::structured()
            .field(
                FieldSpec::new("sentiment", FieldType::String)
                    .describe("overall sentiment")
                    .validator(ValidatorRef::new(
                        "valid-choices",
                        json!({"choices": ["positivo", "negativo"]}),
                    )),
            )
            .build(&registry())
            .unwrap();

        let description = contract.constraint_description("sentiment").unwrap();
        assert!(description.starts_with("overall sentiment; type string"));
        assert!(description.contains("must be one of"));

        let candidate = contract.constraint_description(CANDIDATE_FIELD).unwrap();
        assert!(candidate.contains("sentiment (string)"));
        assert!(contract.constraint_description("missing").is_none());
    }
}
