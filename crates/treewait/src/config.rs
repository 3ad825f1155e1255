//! Session configuration.
//!
//! Loaded from code via builder methods or from YAML, the same way the
//! rest of the harness describes its settings with serde.

use crate::result::{HarnessError, HarnessResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default timeout for self-timing waits (500ms)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 500;

/// Attribute carrying spec ids on rendered nodes
pub const DEFAULT_SPEC_ATTRIBUTE: &str = "data-spec";

/// Configuration bound to a [`Session`](crate::Session)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Timeout for `poll_for`, `wait_for` and `wait_for_spec` in milliseconds
    pub wait_timeout_ms: u64,
    /// Attribute name used by spec id lookups
    pub spec_attribute: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            spec_attribute: DEFAULT_SPEC_ATTRIBUTE.to_string(),
        }
    }
}

impl SessionConfig {
    /// Create a config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set wait timeout in milliseconds
    #[must_use]
    pub const fn with_wait_timeout(mut self, timeout_ms: u64) -> Self {
        self.wait_timeout_ms = timeout_ms;
        self
    }

    /// Set the spec id attribute name
    #[must_use]
    pub fn with_spec_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.spec_attribute = attribute.into();
        self
    }

    /// Get wait timeout as Duration
    #[must_use]
    pub const fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    /// Parse a config from YAML; missing keys take their defaults
    pub fn from_yaml(yaml: &str) -> HarnessResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no session can work with
    pub fn validate(&self) -> HarnessResult<()> {
        let attr = self.spec_attribute.trim();
        if attr.is_empty() {
            return Err(HarnessError::Config {
                message: "spec_attribute must not be empty".to_string(),
            });
        }
        if attr.contains(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '[' | ']' | '=')) {
            return Err(HarnessError::Config {
                message: format!("spec_attribute {attr:?} is not a valid attribute name"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let config = SessionConfig::default();
        assert_eq!(config.wait_timeout_ms, 500);
        assert_eq!(config.spec_attribute, "data-spec");
        assert_eq!(config.wait_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_builder() {
        let config = SessionConfig::new()
            .with_wait_timeout(1_000)
            .with_spec_attribute("data-test");
        assert_eq!(config.wait_timeout_ms, 1_000);
        assert_eq!(config.spec_attribute, "data-test");
    }

    #[test]
    fn test_from_yaml_partial() {
        let config = SessionConfig::from_yaml("wait_timeout_ms: 250\n").unwrap();
        assert_eq!(config.wait_timeout_ms, 250);
        assert_eq!(config.spec_attribute, DEFAULT_SPEC_ATTRIBUTE);
    }

    #[test]
    fn test_from_yaml_rejects_empty_attribute() {
        let err = SessionConfig::from_yaml("spec_attribute: ''\n").unwrap_err();
        assert!(matches!(err, HarnessError::Config { .. }));
    }

    #[test]
    fn test_from_yaml_malformed() {
        let err = SessionConfig::from_yaml("wait_timeout_ms: [").unwrap_err();
        assert!(matches!(err, HarnessError::Yaml(_)));
    }

    #[test]
    fn test_validate_rejects_bracket() {
        let config = SessionConfig::new().with_spec_attribute("data[spec]");
        assert!(config.validate().is_err());
    }
}
