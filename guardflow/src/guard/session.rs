//! Guard sessions and their audit trail.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::contracts::{OnFail, OutputContract};
use crate::observability::SessionSpanAttributes;
use crate::utils::{generate_session_id, now_utc, Timestamp};
use crate::validators::ValidationResult;

/// Why a session failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// An `exception`-policy field failed.
    Raised,
    /// The generation backend failed.
    Generation,
    /// The caller cancelled the session between attempts.
    Cancelled,
}

/// Lifecycle state of a session.
///
/// Transitions only move forward:
/// `Pending → Validating → (Succeeded | Failed | Exhausted | Reasking → Validating …)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "kind", rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, no candidate yet.
    Pending,
    /// A candidate is being validated.
    Validating,
    /// Waiting for a corrected candidate.
    Reasking,
    /// Every field passed. Terminal.
    Succeeded,
    /// Terminal failure.
    Failed(FailureKind),
    /// The reask budget ran out. Terminal.
    Exhausted,
}

impl SessionStatus {
    /// Returns true for terminal states.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_) | Self::Exhausted)
    }

    /// Returns true if moving to `next` respects the session state machine.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Pending | Self::Reasking, Self::Validating | Self::Failed(_))
            | (
                Self::Validating,
                Self::Succeeded | Self::Failed(_) | Self::Exhausted | Self::Reasking,
            ) => true,
            _ => false,
        }
    }

    /// Short name used in logs and events.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Validating => "validating",
            Self::Reasking => "reasking",
            Self::Succeeded => "succeeded",
            Self::Failed(_) => "failed",
            Self::Exhausted => "exhausted",
        }
    }
}

/// How a field ended up in one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOutcome {
    /// Every validator passed.
    Passed,
    /// A validator failed and its fixed value passed the chain.
    Fixed,
    /// The field failed; `policy` says what happened next.
    Failed,
    /// The field failed under `noop` and counts as passed.
    Ignored,
    /// An optional field was absent; no validators ran.
    Skipped,
}

impl FieldOutcome {
    /// Returns true if the field counts as passed for the attempt.
    #[must_use]
    pub fn counts_as_passed(self) -> bool {
        !matches!(self, Self::Failed)
    }
}

/// The result of one field in one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldResult {
    /// Field name.
    pub field: String,
    /// Outcome.
    pub outcome: FieldOutcome,
    /// The verdict that decided the outcome. For a fixed field this is the
    /// original failure, carrying the fixed value.
    pub result: ValidationResult,
    /// The validator that failed, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,
    /// The policy that was applied to a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<OnFail>,
    /// The field's final value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// The value before a fix was substituted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_value: Option<serde_json::Value>,
}

impl FieldResult {
    /// Creates a passing result.
    #[must_use]
    pub fn passed(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            field: field.into(),
            outcome: FieldOutcome::Passed,
            result: ValidationResult::pass(),
            validator: None,
            policy: None,
            value: Some(value),
            original_value: None,
        }
    }

    /// Creates a result for an absent optional field.
    #[must_use]
    pub fn skipped(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            outcome: FieldOutcome::Skipped,
            result: ValidationResult::pass(),
            validator: None,
            policy: None,
            value: None,
            original_value: None,
        }
    }

    /// Returns the failure reason, if the field failed.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.result.reason.as_deref()
    }
}

/// One validation pass over one raw candidate. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// Zero-based position in the session.
    pub index: usize,
    /// The candidate as received.
    pub raw_output: String,
    /// SHA-256 of `raw_output`, hex encoded.
    pub output_digest: String,
    /// The parsed value with fixes applied, if the candidate parsed.
    pub parsed_value: Option<serde_json::Value>,
    /// Per-field results in declaration order.
    pub field_results: Vec<FieldResult>,
    /// When validation of this attempt finished.
    pub timestamp: Timestamp,
    /// Validation time in milliseconds.
    pub duration_ms: f64,
}

impl Attempt {
    pub(crate) fn new(
        index: usize,
        raw_output: String,
        parsed_value: Option<serde_json::Value>,
        field_results: Vec<FieldResult>,
        duration_ms: f64,
    ) -> Self {
        let output_digest = digest(&raw_output);
        Self {
            index,
            raw_output,
            output_digest,
            parsed_value,
            field_results,
            timestamp: now_utc(),
            duration_ms,
        }
    }

    /// Looks up a field's result.
    #[must_use]
    pub fn field_result(&self, field: &str) -> Option<&FieldResult> {
        self.field_results.iter().find(|r| r.field == field)
    }

    /// Returns true if every field counts as passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.field_results.iter().all(|r| r.outcome.counts_as_passed())
    }

    /// Returns the results of failed fields.
    pub fn failures(&self) -> impl Iterator<Item = &FieldResult> {
        self.field_results
            .iter()
            .filter(|r| r.outcome == FieldOutcome::Failed)
    }
}

fn digest(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// The state of one guarded validation: its attempts and lifecycle status.
///
/// Owned by the call that created it and never shared between concurrent runs.
#[derive(Debug, Clone, Serialize)]
pub struct GuardSession {
    id: Uuid,
    #[serde(skip)]
    contract: Arc<OutputContract>,
    contract_name: String,
    attempts: Vec<Attempt>,
    max_reasks: usize,
    status: SessionStatus,
    started_at: Timestamp,
    finished_at: Option<Timestamp>,
}

impl GuardSession {
    pub(crate) fn new(contract: Arc<OutputContract>, max_reasks: usize) -> Self {
        Self {
            id: generate_session_id(),
            contract_name: contract.name().to_string(),
            contract,
            attempts: Vec::new(),
            max_reasks,
            status: SessionStatus::Pending,
            started_at: now_utc(),
            finished_at: None,
        }
    }

    /// Returns the session ID.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the contract this session validates against.
    #[must_use]
    pub fn contract(&self) -> &OutputContract {
        &self.contract
    }

    /// Returns the attempts in order.
    #[must_use]
    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    /// Returns the latest attempt.
    #[must_use]
    pub fn last_attempt(&self) -> Option<&Attempt> {
        self.attempts.last()
    }

    /// Returns the number of reasks issued.
    #[must_use]
    pub fn reask_count(&self) -> usize {
        self.attempts.len().saturating_sub(1)
    }

    /// Returns the reask budget.
    #[must_use]
    pub fn max_reasks(&self) -> usize {
        self.max_reasks
    }

    /// Returns true while reasks remain.
    #[must_use]
    pub fn can_reask(&self) -> bool {
        self.reask_count() < self.max_reasks
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Returns when the session started.
    #[must_use]
    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    /// Returns when the session reached a terminal state.
    #[must_use]
    pub fn finished_at(&self) -> Option<Timestamp> {
        self.finished_at
    }

    /// Returns span attributes summarizing the session.
    #[must_use]
    pub fn span_attributes(&self) -> SessionSpanAttributes {
        let mut attrs = SessionSpanAttributes::new()
            .with_session_id(self.id.to_string())
            .with_contract(self.contract_name.as_str())
            .with_attempts(self.attempts.len())
            .with_status(self.status.as_str());
        if let Some(finished) = self.finished_at {
            #[allow(clippy::cast_precision_loss)]
            let elapsed = (finished - self.started_at).num_microseconds().unwrap_or(0) as f64;
            attrs = attrs.with_duration_ms(elapsed / 1000.0);
        }
        attrs
    }

    /// Serializes the audit trail as pretty JSON.
    pub fn to_audit_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub(crate) fn push_attempt(&mut self, attempt: Attempt) {
        debug_assert!(self.attempts.len() <= self.max_reasks);
        debug_assert_eq!(attempt.index, self.attempts.len());
        self.attempts.push(attempt);
    }

    pub(crate) fn transition(&mut self, next: SessionStatus) {
        if !self.status.can_transition_to(next) {
            tracing::warn!(
                session_id = %self.id,
                from = self.status.as_str(),
                to = next.as_str(),
                "Ignored backward session transition"
            );
            return;
        }
        self.status = next;
        if next.is_terminal() {
            self.finished_at = Some(now_utc());
        }
    }
}
