//! The generation backend abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::GenerationError;
use crate::validators::Metadata;

/// A request for one candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The prompt text.
    pub prompt: String,
    /// Caller metadata forwarded to the backend and to validators.
    #[serde(default)]
    pub metadata: Metadata,
    /// Zero-based attempt index within the session.
    #[serde(default)]
    pub attempt: usize,
}

impl GenerationRequest {
    /// Creates a request for the first attempt.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            metadata: Metadata::new(),
            attempt: 0,
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns a copy of this request with a new prompt for a later attempt.
    #[must_use]
    pub fn for_attempt(&self, prompt: impl Into<String>, attempt: usize) -> Self {
        Self {
            prompt: prompt.into(),
            metadata: self.metadata.clone(),
            attempt,
        }
    }
}

/// Produces raw candidates from prompts.
///
/// Errors are propagated to the caller unchanged and end the session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generates one raw candidate.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}
