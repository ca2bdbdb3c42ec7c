//! Guard configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::ConfigError;
use crate::guard::BackoffConfig;

fn default_max_reasks() -> usize {
    1
}

fn default_true() -> bool {
    true
}

/// Runtime settings for a [`Guard`](crate::guard::Guard).
///
/// ```
/// use guardflow::config::GuardConfig;
///
/// let config = GuardConfig::from_json_str(r#"{"max_reasks": 3}"#).unwrap();
/// assert_eq!(config.max_reasks, 3);
/// assert!(config.strip_code_fences);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Maximum number of reasks per session.
    #[serde(default = "default_max_reasks")]
    pub max_reasks: usize,
    /// Remove Markdown code fences before parsing structured candidates.
    #[serde(default = "default_true")]
    pub strip_code_fences: bool,
    /// Include the rejected candidate in corrective prompts.
    #[serde(default = "default_true")]
    pub include_previous_output: bool,
    /// Delay policy between reasks.
    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_reasks: default_max_reasks(),
            strip_code_fences: true,
            include_previous_output: true,
            backoff: BackoffConfig::default(),
        }
    }
}

impl GuardConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the reask budget.
    #[must_use]
    pub fn with_max_reasks(mut self, max_reasks: usize) -> Self {
        self.max_reasks = max_reasks;
        self
    }

    /// Enables or disables code fence stripping.
    #[must_use]
    pub fn with_strip_code_fences(mut self, strip: bool) -> Self {
        self.strip_code_fences = strip;
        self
    }

    /// Controls whether corrective prompts repeat the rejected candidate.
    #[must_use]
    pub fn with_include_previous_output(mut self, include: bool) -> Self {
        self.include_previous_output = include;
        self
    }

    /// Sets the reask backoff.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Checks the values for consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backoff.max_delay_ms < self.backoff.base_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "backoff.max_delay_ms ({}) must be >= backoff.base_delay_ms ({})",
                self.backoff.max_delay_ms, self.backoff.base_delay_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::BackoffStrategy;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = GuardConfig::default();
        assert_eq!(config.max_reasks, 1);
        assert!(config.strip_code_fences);
        assert!(config.include_previous_output);
        assert_eq!(config.backoff, BackoffConfig::default());
        assert_eq!(GuardConfig::from_json_str("{}").unwrap(), config);
    }

    #[test]
    fn test_builder_setters() {
        let config = GuardConfig::new()
            .with_max_reasks(0)
            .with_strip_code_fences(false)
            .with_include_previous_output(false)
            .with_backoff(BackoffConfig::new().with_base_delay_ms(5));

        assert_eq!(config.max_reasks, 0);
        assert!(!config.strip_code_fences);
        assert!(!config.include_previous_output);
        assert_eq!(config.backoff.base_delay_ms, 5);
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"max_reasks": 2, "backoff": {{"base_delay_ms": 50, "strategy": "linear"}}}}"#
        )
        .unwrap();

        let config = GuardConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.max_reasks, 2);
        assert_eq!(config.backoff.strategy, BackoffStrategy::Linear);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(matches!(
            GuardConfig::from_json_str(r#"{"max_reasks": -1}"#),
            Err(ConfigError::Serialization(_))
        ));
        assert!(matches!(
            GuardConfig::from_json_str(r#"{"backoff": {"base_delay_ms": 100, "max_delay_ms": 10}}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            GuardConfig::from_json_file("/nonexistent/guardflow.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
