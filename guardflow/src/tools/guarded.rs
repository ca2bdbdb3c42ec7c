//! Tools whose returned payload is checked by a guard before it leaves the tool.

use async_trait::async_trait;
use std::sync::Arc;

use super::definitions::{ToolDefinition, ToolInput, ToolOutput};
use crate::backend::{GenerationBackend, GenerationRequest};
use crate::cancellation::CancellationToken;
use crate::config::GuardConfig;
use crate::errors::{GenerationError, GuardError, GuardflowError};
use crate::events::EventSink;
use crate::guard::{Guard, ReaskController, ValidationOutcome};
use crate::validators::ValidatorRegistry;

/// The body of a guarded tool.
///
/// `generate` is called for the first candidate and again for every reask, with
/// the corrective prompt in `request.prompt`.
#[async_trait]
pub trait ToolBody: Send + Sync {
    /// Returns the tool definition. Its `output_schema` becomes the contract.
    fn definition(&self) -> ToolDefinition;

    /// Builds the initial prompt for `input`.
    fn prompt(&self, input: &ToolInput) -> String;

    /// Produces one raw candidate.
    async fn generate(
        &self,
        input: &ToolInput,
        request: &GenerationRequest,
    ) -> Result<String, GenerationError>;
}

/// Binds a tool body to a single call's input.
struct BodyBackend<B: ToolBody> {
    body: Arc<B>,
    input: ToolInput,
}

#[async_trait]
impl<B: ToolBody> GenerationBackend for BodyBackend<B> {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.body.generate(&self.input, request).await
    }
}

/// A tool that validates its own output, reasking from inside the tool body.
pub struct GuardedTool<B: ToolBody + 'static> {
    body: Arc<B>,
    guard: Arc<Guard>,
    cancellation: Option<Arc<CancellationToken>>,
}

impl<B: ToolBody + 'static> GuardedTool<B> {
    /// Wraps `body` with an existing guard.
    #[must_use]
    pub fn new(body: B, guard: Arc<Guard>) -> Self {
        Self {
            body: Arc::new(body),
            guard,
            cancellation: None,
        }
    }

    /// Wraps `body` with a guard bound from its definition's output schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the output schema cannot be bound or the config is invalid.
    pub fn for_schema(
        body: B,
        registry: Arc<ValidatorRegistry>,
        config: GuardConfig,
    ) -> Result<Self, GuardflowError> {
        Self::for_schema_with_sink(body, registry, config, None)
    }

    /// Like [`GuardedTool::for_schema`], also routing guard events to `sink`.
    ///
    /// # Errors
    ///
    /// See [`GuardedTool::for_schema`].
    pub fn for_schema_with_sink(
        body: B,
        registry: Arc<ValidatorRegistry>,
        config: GuardConfig,
        sink: Option<Arc<dyn EventSink>>,
    ) -> Result<Self, GuardflowError> {
        let definition = body.definition();
        let mut builder = Guard::builder(registry)
            .for_schema(&definition.output_schema)
            .with_config(config);
        if let Some(sink) = sink {
            builder = builder.with_event_sink(sink);
        }
        let guard = builder.build()?;

        tracing::debug!(tool = %definition.name, "Guarded tool created");
        Ok(Self::new(body, Arc::new(guard)))
    }

    /// Attaches a cancellation token checked before each generation.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Returns the tool definition.
    #[must_use]
    pub fn definition(&self) -> ToolDefinition {
        self.body.definition()
    }

    /// Returns the guard.
    #[must_use]
    pub fn guard(&self) -> &Guard {
        &self.guard
    }

    /// Runs the tool body and guards its output.
    ///
    /// # Errors
    ///
    /// Returns the terminal [`GuardError`] of the session.
    pub async fn run(&self, input: ToolInput) -> Result<ValidationOutcome, GuardError> {
        let request = GenerationRequest {
            prompt: self.body.prompt(&input),
            metadata: input.metadata.clone(),
            attempt: 0,
        };
        let tool_name = input.tool_name.clone();
        let action_id = input.action_id;

        let backend: Arc<dyn GenerationBackend> = Arc::new(BodyBackend {
            body: Arc::clone(&self.body),
            input,
        });
        let mut controller = self.guard.reask_controller(backend);
        if let Some(ref token) = self.cancellation {
            controller = controller.with_cancellation(Arc::clone(token));
        }

        let result = self.guard.generate_and_validate(&request, &controller).await;
        match &result {
            Ok(outcome) => tracing::info!(
                tool = %tool_name,
                action_id = %action_id,
                attempts = outcome.session().attempts().len(),
                "Guarded tool call succeeded"
            ),
            Err(error) => tracing::warn!(
                tool = %tool_name,
                action_id = %action_id,
                kind = error.kind(),
                "Guarded tool call failed"
            ),
        }
        result
    }

    /// Runs the tool and packages the result for the agent runner.
    pub async fn call(&self, input: ToolInput) -> ToolOutput {
        ToolOutput::from_result(self.run(input).await)
    }
}

impl<B: ToolBody + 'static> std::fmt::Debug for GuardedTool<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedTool")
            .field("tool", &self.body.definition().name)
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::SessionStatus;
    use crate::validators::default_registry;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;

    struct ColorTool {
        replies: Mutex<VecDeque<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ColorTool {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|s| (*s).to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ToolBody for ColorTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("pick_color").with_output_schema(json!({
                "type": "object",
                "properties": {
                    "color": {"type": "string", "enum": ["red", "blue", "green"], "x-on-fail": "reask"},
                    "reason": {"type": "string"}
                },
                "required": ["color"]
            }))
        }

        fn prompt(&self, input: &ToolInput) -> String {
            format!("Pick a color for {}", input.payload_str("item").unwrap_or("it"))
        }

        async fn generate(
            &self,
            _input: &ToolInput,
            request: &GenerationRequest,
        ) -> Result<String, GenerationError> {
            self.prompts.lock().push(request.prompt.clone());
            self.replies
                .lock()
                .pop_front()
                .ok_or_else(|| GenerationError::provider("no more replies"))
        }
    }

    #[tokio::test]
    async fn test_reask_originates_inside_tool() {
        let tool = GuardedTool::for_schema(
            ColorTool::new(&[r#"{"color": "purple"}"#, r#"{"color": "blue", "reason": "calm"}"#]),
            default_registry(),
            GuardConfig::default().with_max_reasks(2),
        )
        .unwrap();

        let outcome = tool
            .run(ToolInput::new("pick_color", json!({"item": "sky"})))
            .await
            .unwrap();

        assert_eq!(outcome.validated_output()["color"], json!("blue"));
        assert_eq!(outcome.session().attempts().len(), 2);
        assert_eq!(outcome.reask_count(), 1);

        let prompts = tool.body.prompts.lock().clone();
        assert_eq!(prompts[0], "Pick a color for sky");
        assert!(prompts[1].contains("color"));
        assert!(prompts[1].contains("purple"));
    }

    #[tokio::test]
    async fn test_call_reports_exhaustion() {
        let tool = GuardedTool::for_schema(
            ColorTool::new(&[r#"{"color": "pink"}"#, r#"{"color": "teal"}"#]),
            default_registry(),
            GuardConfig::default().with_max_reasks(1),
        )
        .unwrap();

        let output = tool.call(ToolInput::new("pick_color", json!({}))).await;
        assert!(!output.success);
        assert_eq!(output.error_kind.as_deref(), Some("reask_exhausted"));
        assert_eq!(output.attempts, 2);
    }

    #[tokio::test]
    async fn test_body_error_aborts() {
        let tool = GuardedTool::for_schema(
            ColorTool::new(&[]),
            default_registry(),
            GuardConfig::default(),
        )
        .unwrap();

        let err = tool
            .run(ToolInput::new("pick_color", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "generation_error");
        assert!(err.session().attempts().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_tool_never_generates() {
        let token = Arc::new(CancellationToken::new());
        token.cancel("shutdown");
        let tool = GuardedTool::for_schema(
            ColorTool::new(&[r#"{"color": "red"}"#]),
            default_registry(),
            GuardConfig::default(),
        )
        .unwrap()
        .with_cancellation(token);

        let err = tool
            .run(ToolInput::new("pick_color", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::Cancelled { .. }));
        assert!(matches!(err.session().status(), SessionStatus::Failed(_)));
        assert!(tool.body.prompts.lock().is_empty());
    }

    #[test]
    fn test_bad_output_schema_is_rejected() {
        struct ArrayTool;

        #[async_trait]
        impl ToolBody for ArrayTool {
            fn definition(&self) -> ToolDefinition {
                ToolDefinition::new("list").with_output_schema(json!({"type": "array"}))
            }
            fn prompt(&self, _input: &ToolInput) -> String {
                String::new()
            }
            async fn generate(
                &self,
                _input: &ToolInput,
                _request: &GenerationRequest,
            ) -> Result<String, GenerationError> {
                Ok("[]".to_string())
            }
        }

        let err = GuardedTool::for_schema(ArrayTool, default_registry(), GuardConfig::default())
            .unwrap_err();
        assert!(matches!(err, GuardflowError::Contract(_)));
    }
}
