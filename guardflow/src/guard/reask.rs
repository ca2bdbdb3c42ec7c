//! Corrective prompts and the reask controller.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;

use super::backoff::BackoffConfig;
use super::session::GuardSession;
use crate::backend::{GenerationBackend, GenerationRequest};
use crate::cancellation::CancellationToken;
use crate::config::GuardConfig;
use crate::contracts::CANDIDATE_FIELD;
use crate::errors::GenerationError;
use crate::validators::display_value;

/// A field that still fails and is eligible for a reask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailingField {
    /// Field name, or `$candidate` for the whole output.
    pub name: String,
    /// Failure reason.
    pub reason: String,
    /// Description of the field's constraints, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
    /// The rejected value, if the field parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

/// Builds the prompt for a reask from the original prompt and the failing fields.
///
/// ```
/// use guardflow::guard::{build_corrective_prompt, FailingField};
///
/// let prompt = build_corrective_prompt(
///     "Name a primary color.",
///     &[FailingField {
///         name: "output".to_string(),
///         reason: "Value green is not in choices [\"red\", \"blue\"]".to_string(),
///         constraint: None,
///         value: None,
///     }],
/// );
/// assert!(prompt.starts_with("Name a primary color."));
/// assert!(prompt.contains("- output: Value green is not in choices"));
/// ```
#[must_use]
pub fn build_corrective_prompt(original_prompt: &str, failing_fields: &[FailingField]) -> String {
    let mut prompt = String::from(original_prompt.trim_end());
    prompt.push_str(
        "\n\nYour previous response did not satisfy the required output format. \
         Fix the following problems:\n",
    );

    for field in failing_fields {
        let label = if field.name == CANDIDATE_FIELD {
            "entire response"
        } else {
            field.name.as_str()
        };
        let _ = write!(prompt, "- {label}: {}", field.reason);
        if let Some(ref value) = field.value {
            let _ = write!(prompt, " (got: {})", display_value(value));
        }
        if let Some(ref constraint) = field.constraint {
            let _ = write!(prompt, "; expected: {constraint}");
        }
        prompt.push('\n');
    }

    prompt.push_str("\nRespond again with the complete corrected output only.");
    prompt
}

fn with_previous_output(prompt: String, previous: &str) -> String {
    format!("{prompt}\n\nYour previous response was:\n{previous}")
}

/// Issues reasks against a generation backend, bounded by `max_reasks`.
#[derive(Clone)]
pub struct ReaskController {
    backend: Arc<dyn GenerationBackend>,
    max_reasks: usize,
    backoff: BackoffConfig,
    include_previous_output: bool,
    cancellation: Option<Arc<CancellationToken>>,
}

impl ReaskController {
    /// Creates a controller with the default [`GuardConfig`] (one reask).
    ///
    /// This does not see a guard's configuration; use
    /// [`Guard::reask_controller`](crate::guard::Guard::reask_controller) to inherit
    /// the budget, backoff and prompt settings a guard was built with.
    #[must_use]
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self::from_config(backend, &GuardConfig::default())
    }

    /// Creates a controller using the reask settings of `config`.
    #[must_use]
    pub fn from_config(backend: Arc<dyn GenerationBackend>, config: &GuardConfig) -> Self {
        Self {
            backend,
            max_reasks: config.max_reasks,
            backoff: config.backoff.clone(),
            include_previous_output: config.include_previous_output,
            cancellation: None,
        }
    }

    /// Sets the reask budget.
    #[must_use]
    pub fn with_max_reasks(mut self, max_reasks: usize) -> Self {
        self.max_reasks = max_reasks;
        self
    }

    /// Sets the delay policy between reasks.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Controls whether the rejected candidate is repeated in corrective prompts.
    #[must_use]
    pub fn with_include_previous_output(mut self, include: bool) -> Self {
        self.include_previous_output = include;
        self
    }

    /// Attaches a cancellation token, checked before every generation call.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Returns the reask budget.
    #[must_use]
    pub fn max_reasks(&self) -> usize {
        self.max_reasks
    }

    /// Returns the backend.
    #[must_use]
    pub fn backend(&self) -> &dyn GenerationBackend {
        self.backend.as_ref()
    }

    /// Returns the cancellation reason, if the token was cancelled.
    #[must_use]
    pub fn cancelled_reason(&self) -> Option<String> {
        self.cancellation
            .as_ref()
            .filter(|token| token.is_cancelled())
            .map(|token| token.reason().unwrap_or_default())
    }

    /// Requests the first candidate for `request`.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        if let Some(reason) = self.cancelled_reason() {
            return Err(GenerationError::cancelled(reason));
        }
        self.backend.generate(request).await
    }

    /// Asks the backend for a corrected candidate.
    ///
    /// Waits out the configured backoff first. The caller is responsible for
    /// checking the budget with [`GuardSession::can_reask`].
    pub async fn reask(
        &self,
        session: &GuardSession,
        request: &GenerationRequest,
        failing_fields: &[FailingField],
    ) -> Result<String, GenerationError> {
        let reask_index = session.reask_count();
        let delay = self.backoff.delay_for(reask_index);
        if !delay.is_zero() {
            match self.cancellation {
                Some(ref token) => {
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = token.cancelled() => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
        }
        if let Some(reason) = self.cancelled_reason() {
            return Err(GenerationError::cancelled(reason));
        }

        let mut prompt = build_corrective_prompt(&request.prompt, failing_fields);
        if self.include_previous_output {
            if let Some(previous) = session.last_attempt() {
                prompt = with_previous_output(prompt, &previous.raw_output);
            }
        }

        tracing::info!(
            session_id = %session.id(),
            reask = reask_index + 1,
            max_reasks = self.max_reasks,
            failing = failing_fields.len(),
            "Requesting corrected candidate"
        );

        let next = request.for_attempt(prompt, session.attempts().len());
        self.backend.generate(&next).await
    }
}

impl std::fmt::Debug for ReaskController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaskController")
            .field("max_reasks", &self.max_reasks)
            .field("backoff", &self.backoff)
            .field("include_previous_output", &self.include_previous_output)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockGenerationBackend;
    use crate::contracts::ContractBuilder;
    use crate::guard::session::{Attempt, SessionStatus};
    use crate::validators::ValidatorRegistryBuilder;
    use serde_json::json;

    fn failing(name: &str, reason: &str) -> FailingField {
        FailingField {
            name: name.to_string(),
            reason: reason.to_string(),
            constraint: None,
            value: None,
        }
    }

    fn session_with_attempt(raw: &str) -> GuardSession {
        let contract = ContractBuilder::string()
            .build(&ValidatorRegistryBuilder::new().freeze())
            .unwrap();
        let mut session = GuardSession::new(Arc::new(contract), 2);
        session.transition(SessionStatus::Validating);
        session.push_attempt(Attempt::new(0, raw.to_string(), None, Vec::new(), 0.0));
        session.transition(SessionStatus::Reasking);
        session
    }

    #[test]
    fn test_prompt_lists_every_field() {
        let mut sentiment = failing("sentiment", "Value green is not in choices [\"positivo\"]");
        sentiment.value = Some(json!("green"));
        sentiment.constraint = Some("must be one of [\"positivo\"]".to_string());

        let prompt = build_corrective_prompt(
            "Analyse the review.\n",
            &[sentiment, failing("summary", "Length 400 is greater than max length 280")],
        );

        assert!(prompt.starts_with("Analyse the review.\n\n"));
        assert!(prompt.contains(
            "- sentiment: Value green is not in choices [\"positivo\"] (got: green); expected: must be one of [\"positivo\"]\n"
        ));
        assert!(prompt.contains("- summary: Length 400 is greater than max length 280\n"));
    }

    #[test]
    fn test_prompt_is_pure() {
        let fields = [failing("output", "bad")];
        assert_eq!(
            build_corrective_prompt("p", &fields),
            build_corrective_prompt("p", &fields)
        );
    }

    #[test]
    fn test_candidate_failure_label() {
        let prompt = build_corrective_prompt("p", &[failing(CANDIDATE_FIELD, "Output is not valid JSON")]);
        assert!(prompt.contains("- entire response: Output is not valid JSON"));
    }

    #[tokio::test]
    async fn test_reask_sends_corrective_prompt() {
        let mut backend = MockGenerationBackend::new();
        backend
            .expect_generate()
            .withf(|request| {
                request.attempt == 1
                    && request.prompt.contains("- output: Result must match ^[A-Z]{3}$")
                    && request.prompt.ends_with("Your previous response was:\nabc")
            })
            .times(1)
            .returning(|_| Ok("ABC".to_string()));

        let controller = ReaskController::new(Arc::new(backend));
        let session = session_with_attempt("abc");
        let output = controller
            .reask(
                &session,
                &GenerationRequest::new("Give a code"),
                &[failing("output", "Result must match ^[A-Z]{3}$")],
            )
            .await
            .unwrap();

        assert_eq!(output, "ABC");
    }

    #[tokio::test]
    async fn test_reask_without_previous_output() {
        let mut backend = MockGenerationBackend::new();
        backend
            .expect_generate()
            .withf(|request| !request.prompt.contains("previous response was"))
            .times(1)
            .returning(|_| Ok("ABC".to_string()));

        let controller =
            ReaskController::new(Arc::new(backend)).with_include_previous_output(false);
        let session = session_with_attempt("abc");
        controller
            .reask(&session, &GenerationRequest::new("p"), &[failing("output", "bad")])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_before_generation() {
        let mut backend = MockGenerationBackend::new();
        backend.expect_generate().times(0);

        let token = Arc::new(CancellationToken::new());
        token.cancel("user aborted");
        let controller = ReaskController::new(Arc::new(backend)).with_cancellation(token);

        let err = controller
            .generate(&GenerationRequest::new("p"))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Cancelled { ref reason } if reason == "user aborted"));

        let session = session_with_attempt("abc");
        let err = controller
            .reask(&session, &GenerationRequest::new("p"), &[failing("output", "bad")])
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_backoff() {
        let mut backend = MockGenerationBackend::new();
        backend.expect_generate().times(0);

        let token = Arc::new(CancellationToken::new());
        let controller = ReaskController::new(Arc::new(backend))
            .with_backoff(BackoffConfig::new().with_base_delay_ms(60_000))
            .with_cancellation(Arc::clone(&token));

        let canceller = {
            let token = Arc::clone(&token);
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                token.cancel("shutdown");
            })
        };

        let session = session_with_attempt("abc");
        let err = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            controller.reask(&session, &GenerationRequest::new("p"), &[failing("output", "bad")]),
        )
        .await
        .unwrap()
        .unwrap_err();

        assert!(matches!(err, GenerationError::Cancelled { ref reason } if reason == "shutdown"));
        canceller.await.unwrap();
    }
}
