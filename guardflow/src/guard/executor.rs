//! The guard: runs sessions of validate, dispatch and reask.

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;

use super::builder::GuardBuilder;
use super::dispatcher::{decide, evaluate_candidate, Decision};
use super::reask::{FailingField, ReaskController};
use super::session::{Attempt, FailureKind, FieldOutcome, GuardSession, SessionStatus};
use crate::backend::{GenerationBackend, GenerationRequest};
use crate::config::GuardConfig;
use crate::contracts::OutputContract;
use crate::errors::{GenerationError, GuardError};
use crate::events::{EventSink, GuardEvent, NoOpEventSink};
use crate::observability::SpanTimer;
use crate::validators::{Metadata, ValidatorRegistry};

/// A successful session: the validated output and its audit trail.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    validated_output: Value,
    session: GuardSession,
}

impl ValidationOutcome {
    /// Returns the validated output, with any fixes applied.
    #[must_use]
    pub fn validated_output(&self) -> &Value {
        &self.validated_output
    }

    /// Returns the raw candidate that passed.
    #[must_use]
    pub fn raw_output(&self) -> &str {
        self.session
            .last_attempt()
            .map_or("", |attempt| attempt.raw_output.as_str())
    }

    /// Returns the session audit trail.
    #[must_use]
    pub fn session(&self) -> &GuardSession {
        &self.session
    }

    /// Returns the number of reasks that were needed.
    #[must_use]
    pub fn reask_count(&self) -> usize {
        self.session.reask_count()
    }

    /// Splits the outcome into the validated output and the session.
    #[must_use]
    pub fn into_parts(self) -> (Value, GuardSession) {
        (self.validated_output, self.session)
    }

    /// Deserializes the validated output into a caller type.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.validated_output)
    }
}

/// Runs candidates through an output contract.
///
/// A guard is immutable and can be shared across tasks; each call creates its own
/// [`GuardSession`].
pub struct Guard {
    contract: Arc<OutputContract>,
    config: GuardConfig,
    event_sink: Arc<dyn EventSink>,
}

impl Guard {
    pub(crate) fn new(
        contract: Arc<OutputContract>,
        config: GuardConfig,
        event_sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            contract,
            config,
            event_sink,
        }
    }

    /// Starts building a guard whose validators resolve against `registry`.
    #[must_use]
    pub fn builder(registry: Arc<ValidatorRegistry>) -> GuardBuilder {
        GuardBuilder::new(registry)
    }

    /// Creates a guard for an already built contract.
    #[must_use]
    pub fn for_contract(contract: OutputContract) -> Self {
        Self::new(
            Arc::new(contract),
            GuardConfig::default(),
            Arc::new(NoOpEventSink),
        )
    }

    /// Returns the contract.
    #[must_use]
    pub fn contract(&self) -> &OutputContract {
        &self.contract
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Creates a reask controller using this guard's reask settings.
    #[must_use]
    pub fn reask_controller(&self, backend: Arc<dyn GenerationBackend>) -> ReaskController {
        ReaskController::from_config(backend, &self.config)
    }

    /// Validates a candidate once, without reasking.
    ///
    /// A reask-eligible failure ends the session as `Exhausted`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailure` or `ReaskExhausted`, carrying the session.
    pub fn validate(&self, raw_output: &str) -> Result<ValidationOutcome, GuardError> {
        self.validate_with_metadata(raw_output, &Metadata::new())
    }

    /// Validates a candidate once, exposing `metadata` to validators.
    ///
    /// # Errors
    ///
    /// See [`Guard::validate`].
    pub fn validate_with_metadata(
        &self,
        raw_output: &str,
        metadata: &Metadata,
    ) -> Result<ValidationOutcome, GuardError> {
        let mut session = self.start_session(0);
        match self.run_attempt(&mut session, raw_output.to_string(), metadata) {
            Decision::Succeeded => Ok(self.succeed(session)),
            Decision::Raise { field, reason } => Err(self.raise(session, field, reason)),
            Decision::Reask(failing) => Err(self.exhaust(session, failing)),
        }
    }

    /// Validates a candidate, reasking through `controller` while budget remains.
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailure`, `ReaskExhausted`, `Generation` or `Cancelled`,
    /// each carrying the session.
    pub async fn validate_with_reask(
        &self,
        raw_output: impl Into<String>,
        request: &GenerationRequest,
        controller: &ReaskController,
    ) -> Result<ValidationOutcome, GuardError> {
        let session = self.start_session(controller.max_reasks());
        self.run(session, raw_output.into(), request, controller).await
    }

    /// Generates the first candidate through `controller`, then validates it with reasks.
    ///
    /// # Errors
    ///
    /// See [`Guard::validate_with_reask`].
    pub async fn generate_and_validate(
        &self,
        request: &GenerationRequest,
        controller: &ReaskController,
    ) -> Result<ValidationOutcome, GuardError> {
        let session = self.start_session(controller.max_reasks());
        match controller.generate(request).await {
            Ok(raw) => self.run(session, raw, request, controller).await,
            Err(error) => Err(self.generation_failed(session, error)),
        }
    }

    /// Validates independent candidates concurrently, one session each.
    ///
    /// Results are returned in input order.
    pub async fn validate_all(
        &self,
        candidates: Vec<(String, GenerationRequest)>,
        controller: &ReaskController,
    ) -> Vec<Result<ValidationOutcome, GuardError>> {
        join_all(candidates.into_iter().map(|(raw, request)| async move {
            self.validate_with_reask(raw, &request, controller).await
        }))
        .await
    }

    async fn run(
        &self,
        mut session: GuardSession,
        first: String,
        request: &GenerationRequest,
        controller: &ReaskController,
    ) -> Result<ValidationOutcome, GuardError> {
        let mut raw = first;
        loop {
            let failing = match self.run_attempt(&mut session, raw, &request.metadata) {
                Decision::Succeeded => return Ok(self.succeed(session)),
                Decision::Raise { field, reason } => return Err(self.raise(session, field, reason)),
                Decision::Reask(failing) if !session.can_reask() => {
                    return Err(self.exhaust(session, failing));
                }
                Decision::Reask(failing) => failing,
            };

            session.transition(SessionStatus::Reasking);
            self.emit(
                GuardEvent::ReaskRequested,
                json!({
                    "session_id": session.id(),
                    "reask": session.reask_count() + 1,
                    "max_reasks": session.max_reasks(),
                    "failing_fields": failing.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
                }),
            );

            raw = match controller.reask(&session, request, &failing).await {
                Ok(next) => next,
                Err(error) => return Err(self.generation_failed(session, error)),
            };
        }
    }

    fn start_session(&self, max_reasks: usize) -> GuardSession {
        let session = GuardSession::new(Arc::clone(&self.contract), max_reasks);
        tracing::debug!(
            session_id = %session.id(),
            contract = self.contract.name(),
            max_reasks,
            "Guard session started"
        );
        self.emit(
            GuardEvent::SessionStarted,
            json!({
                "session_id": session.id(),
                "contract": self.contract.name(),
                "max_reasks": max_reasks,
            }),
        );
        session
    }

    fn run_attempt(&self, session: &mut GuardSession, raw: String, metadata: &Metadata) -> Decision {
        session.transition(SessionStatus::Validating);
        let timer = SpanTimer::start("guard.attempt");

        let evaluation =
            evaluate_candidate(&self.contract, &raw, metadata, self.config.strip_code_fences);
        let decision = decide(&self.contract, &evaluation.field_results);
        let index = session.attempts().len();

        for fixed in evaluation
            .field_results
            .iter()
            .filter(|r| r.outcome == FieldOutcome::Fixed)
        {
            self.emit(
                GuardEvent::FieldFixed,
                json!({
                    "session_id": session.id(),
                    "attempt": index,
                    "field": fixed.field,
                    "validator": fixed.validator,
                }),
            );
        }

        let attempt = Attempt::new(
            index,
            raw,
            evaluation.parsed_value,
            evaluation.field_results,
            timer.finish(),
        );
        let failed: Vec<&str> = attempt.failures().map(|r| r.field.as_str()).collect();
        tracing::debug!(
            session_id = %session.id(),
            attempt = index,
            failed = ?failed,
            duration_ms = attempt.duration_ms,
            "Attempt validated"
        );
        self.emit(
            GuardEvent::AttemptCompleted,
            json!({
                "session_id": session.id(),
                "attempt": index,
                "passed": failed.is_empty(),
                "failed_fields": failed,
                "output_digest": attempt.output_digest,
            }),
        );

        session.push_attempt(attempt);
        decision
    }

    fn succeed(&self, mut session: GuardSession) -> ValidationOutcome {
        session.transition(SessionStatus::Succeeded);
        tracing::info!(
            attributes = ?session.span_attributes().to_attributes(),
            "Guard session succeeded"
        );
        self.emit(
            GuardEvent::SessionSucceeded,
            json!({ "session_id": session.id(), "attempts": session.attempts().len() }),
        );

        let validated_output = session
            .last_attempt()
            .and_then(|attempt| attempt.parsed_value.clone())
            .unwrap_or(Value::Null);
        ValidationOutcome {
            validated_output,
            session,
        }
    }

    fn raise(&self, mut session: GuardSession, field: String, reason: String) -> GuardError {
        session.transition(SessionStatus::Failed(FailureKind::Raised));
        tracing::warn!(
            session_id = %session.id(),
            field = %field,
            reason = %reason,
            "Guard session failed validation"
        );
        self.emit(
            GuardEvent::SessionFailed,
            json!({
                "session_id": session.id(),
                "kind": "validation_failure",
                "field": field,
                "reason": reason,
            }),
        );
        GuardError::ValidationFailure {
            field,
            reason,
            session: Box::new(session),
        }
    }

    fn exhaust(&self, mut session: GuardSession, failing_fields: Vec<FailingField>) -> GuardError {
        session.transition(SessionStatus::Exhausted);
        tracing::warn!(
            attributes = ?session.span_attributes().to_attributes(),
            failing = failing_fields.len(),
            "Guard session exhausted its reask budget"
        );
        self.emit(
            GuardEvent::SessionExhausted,
            json!({
                "session_id": session.id(),
                "attempts": session.attempts().len(),
                "failing_fields": failing_fields.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
            }),
        );
        GuardError::ReaskExhausted {
            failing_fields,
            session: Box::new(session),
        }
    }

    fn generation_failed(&self, mut session: GuardSession, error: GenerationError) -> GuardError {
        let (kind, label) = match error {
            GenerationError::Cancelled { .. } => (FailureKind::Cancelled, "cancelled"),
            _ => (FailureKind::Generation, "generation_error"),
        };
        session.transition(SessionStatus::Failed(kind));
        tracing::warn!(
            session_id = %session.id(),
            error = %error,
            "Guard session aborted"
        );
        self.emit(
            GuardEvent::SessionFailed,
            json!({
                "session_id": session.id(),
                "kind": label,
                "error": error.to_string(),
            }),
        );

        let session = Box::new(session);
        match error {
            GenerationError::Cancelled { reason } => GuardError::Cancelled { reason, session },
            source => GuardError::Generation { source, session },
        }
    }

    fn emit(&self, event: GuardEvent, data: Value) {
        self.event_sink.try_emit(event.as_str(), Some(data));
    }
}

impl std::fmt::Debug for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard")
            .field("contract", &self.contract.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
