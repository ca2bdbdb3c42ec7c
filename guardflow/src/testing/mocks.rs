//! Generation backends for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::backend::{GenerationBackend, GenerationRequest};
use crate::errors::GenerationError;

/// A backend that replays a fixed list of responses and records every request.
///
/// Once the script runs out the last response is repeated; an empty script fails
/// with a provider error.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedBackend {
    /// Creates a backend replaying `responses` in order.
    #[must_use]
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Creates a backend that always returns `response`.
    #[must_use]
    pub fn always(response: impl Into<String>) -> Self {
        Self::new([response.into()])
    }

    /// Returns the number of generate calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Returns every request received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }

    /// Returns the prompts received, in order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.prompt.clone()).collect()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.requests.lock().push(request.clone());

        let next = self.responses.lock().pop_front();
        let mut last = self.last.lock();
        if let Some(response) = next {
            *last = Some(response);
        }
        last.clone()
            .ok_or_else(|| GenerationError::provider("scripted backend has no responses"))
    }
}

/// A backend whose every call fails.
#[derive(Debug)]
pub struct FailingBackend {
    message: String,
    calls: Mutex<usize>,
}

impl FailingBackend {
    /// Creates a backend failing with a provider error carrying `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            calls: Mutex::new(0),
        }
    }

    /// Returns the number of generate calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl GenerationBackend for FailingBackend {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
        *self.calls.lock() += 1;
        Err(GenerationError::provider(self.message.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_backend_replays_then_repeats() {
        let backend = ScriptedBackend::new(["first", "second"]);
        let request = GenerationRequest::new("p");

        assert_eq!(backend.generate(&request).await.unwrap(), "first");
        assert_eq!(backend.generate(&request).await.unwrap(), "second");
        assert_eq!(backend.generate(&request).await.unwrap(), "second");
        assert_eq!(backend.call_count(), 3);
        assert_eq!(backend.prompts(), vec!["p", "p", "p"]);
    }

    #[tokio::test]
    async fn test_empty_script_fails() {
        let backend = ScriptedBackend::new(Vec::<String>::new());
        let err = backend
            .generate(&GenerationRequest::new("p"))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Provider { .. }));
    }

    #[test]
    fn test_failing_backend() {
        let backend = FailingBackend::new("rate limited");
        let err = tokio_test::block_on(backend.generate(&GenerationRequest::new("p"))).unwrap_err();
        assert_eq!(err.to_string(), "Provider error: rate limited");
        assert_eq!(backend.call_count(), 1);
    }
}
