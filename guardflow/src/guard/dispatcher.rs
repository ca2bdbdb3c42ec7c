//! Failure action dispatch.
//!
//! Runs each field's validator chain, applies the failing validator's `on_fail`
//! policy, and reduces an attempt's field results to a single decision.

use serde_json::Value;

use super::reask::FailingField;
use super::session::{FieldOutcome, FieldResult};
use crate::contracts::{
    parse_candidate, BoundField, FieldSlot, OnFail, OutputContract, CANDIDATE_FIELD,
};
use crate::validators::{Metadata, ValidationContext, ValidationResult};

/// What the guard does after an attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Every field counts as passed.
    Succeeded,
    /// An `exception`-policy field failed; the first in declaration order wins.
    Raise {
        /// The failing field.
        field: String,
        /// Its failure reason.
        reason: String,
    },
    /// Every remaining failure is reask-eligible.
    Reask(Vec<FailingField>),
}

/// Fields of one evaluated candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// The parsed value with fixes applied; `None` if the candidate did not parse.
    pub parsed_value: Option<Value>,
    /// Per-field results in declaration order.
    pub field_results: Vec<FieldResult>,
}

/// Parses `raw` and evaluates every field of `contract`.
pub fn evaluate_candidate(
    contract: &OutputContract,
    raw: &str,
    metadata: &Metadata,
    strip_fences: bool,
) -> Evaluation {
    let parsed = match parse_candidate(contract, raw, strip_fences) {
        Ok(parsed) => parsed,
        Err(error) => {
            return Evaluation {
                parsed_value: None,
                field_results: vec![parse_failure(
                    CANDIDATE_FIELD,
                    &error.message,
                    contract.parse_policy(),
                )],
            };
        }
    };

    let mut parsed_value = parsed.value;
    let mut field_results = Vec::with_capacity(contract.fields().len());
    for (field, slot) in contract.fields().iter().zip(parsed.slots) {
        let result = match slot {
            FieldSlot::Absent => FieldResult::skipped(field.name()),
            FieldSlot::Invalid(error) => {
                parse_failure(field.name(), &error.message, contract.parse_policy())
            }
            FieldSlot::Present(value) => evaluate_field(field, value, metadata),
        };

        if result.outcome == FieldOutcome::Fixed {
            if let Some(ref fixed) = result.value {
                substitute(&mut parsed_value, contract, field.name(), fixed.clone());
            }
        }
        field_results.push(result);
    }

    Evaluation {
        parsed_value: Some(parsed_value),
        field_results,
    }
}

/// Runs one field's chain and resolves a failure by policy.
pub fn evaluate_field(field: &BoundField, value: Value, metadata: &Metadata) -> FieldResult {
    let Some((index, failure)) = run_chain(field, &value, metadata) else {
        return FieldResult::passed(field.name(), value);
    };
    let validator = &field.validators()[index];

    let policy = match validator.on_fail() {
        OnFail::Fix => {
            let fixed = failure
                .fixed_value
                .clone()
                .filter(|fixed| {
                    field.field_type().matches(fixed) && run_chain(field, fixed, metadata).is_none()
                });
            if let Some(fixed) = fixed {
                tracing::debug!(
                    field = field.name(),
                    validator = validator.name(),
                    "Applied fixed value"
                );
                return FieldResult {
                    field: field.name().to_string(),
                    outcome: FieldOutcome::Fixed,
                    result: failure,
                    validator: Some(validator.name().to_string()),
                    policy: Some(OnFail::Fix),
                    value: Some(fixed),
                    original_value: Some(value),
                };
            }
            validator.fix_fallback()
        }
        other => other,
    };

    let outcome = if policy == OnFail::Noop {
        FieldOutcome::Ignored
    } else {
        FieldOutcome::Failed
    };
    FieldResult {
        field: field.name().to_string(),
        outcome,
        result: failure,
        validator: Some(validator.name().to_string()),
        policy: Some(policy),
        value: Some(value),
        original_value: None,
    }
}

/// Returns the index and verdict of the first failing validator, short-circuiting.
fn run_chain(
    field: &BoundField,
    value: &Value,
    metadata: &Metadata,
) -> Option<(usize, ValidationResult)> {
    let ctx = ValidationContext::new(field.name(), metadata);
    field
        .validators()
        .iter()
        .enumerate()
        .map(|(index, validator)| (index, validator.unit().check(value, &ctx)))
        .find(|(_, result)| !result.passed)
}

fn parse_failure(field: &str, message: &str, policy: OnFail) -> FieldResult {
    FieldResult {
        field: field.to_string(),
        outcome: FieldOutcome::Failed,
        result: ValidationResult::fail(message),
        validator: None,
        policy: Some(policy),
        value: None,
        original_value: None,
    }
}

fn substitute(target: &mut Value, contract: &OutputContract, field: &str, fixed: Value) {
    if contract.is_scalar() {
        *target = fixed;
    } else if let Some(object) = target.as_object_mut() {
        object.insert(field.to_string(), fixed);
    }
}

/// Reduces an attempt's field results to a decision.
#[must_use]
pub fn decide(contract: &OutputContract, field_results: &[FieldResult]) -> Decision {
    let failures: Vec<&FieldResult> = field_results
        .iter()
        .filter(|r| r.outcome == FieldOutcome::Failed)
        .collect();

    if let Some(raised) = failures
        .iter()
        .find(|r| r.policy != Some(OnFail::Reask))
    {
        return Decision::Raise {
            field: raised.field.clone(),
            reason: raised.result.reason_or_empty().to_string(),
        };
    }

    if failures.is_empty() {
        return Decision::Succeeded;
    }

    Decision::Reask(
        failures
            .into_iter()
            .map(|r| FailingField {
                name: r.field.clone(),
                reason: r.result.reason_or_empty().to_string(),
                constraint: contract.constraint_description(&r.field),
                value: r.value.clone(),
            })
            .collect(),
    )
}
