//! Result and error types for Treewait.

use thiserror::Error;

/// Result type for Treewait operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors that can occur in Treewait
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Network mock is unusable as a collaborator
    #[error("Invalid network mock: {reason}")]
    InvalidNetworkMock {
        /// Why the mock was rejected
        reason: String,
    },

    /// Component tree is unusable as a collaborator
    #[error("Invalid component tree: {reason}")]
    InvalidComponent {
        /// Why the tree was rejected
        reason: String,
    },

    /// Selector could not be parsed
    #[error("Invalid selector {selector:?}: {reason}")]
    InvalidSelector {
        /// Offending selector
        selector: String,
        /// Parse failure
        reason: String,
    },

    /// Spec id is unusable
    #[error("Invalid spec id {spec_id:?}: {reason}")]
    InvalidSpecId {
        /// Offending spec id
        spec_id: String,
        /// Why it was rejected
        reason: String,
    },

    /// Spec path is unusable
    #[error("Invalid spec path: {reason}")]
    InvalidSpecPath {
        /// Why it was rejected
        reason: String,
    },

    /// Endpoint pattern could not be compiled
    #[error("Invalid endpoint pattern {pattern:?}: {reason}")]
    InvalidEndpointPattern {
        /// Offending pattern
        pattern: String,
        /// Compile failure
        reason: String,
    },

    /// Predicate never became true
    #[error("Timed out after {elapsed_ms}ms waiting for {description}")]
    PollTimeout {
        /// What was waited for
        description: String,
        /// Accumulated wait time
        elapsed_ms: u64,
    },

    /// Selector or spec id never matched a node
    #[error("Element {target} not found after {elapsed_ms}ms")]
    ElementNotFound {
        /// Selector or spec id that was awaited
        target: String,
        /// Accumulated wait time
        elapsed_ms: u64,
    },

    /// Interaction target did not resolve to exactly one node
    #[error("Expected exactly one node for {selector:?}, found {found}")]
    NodeCount {
        /// Selector used for the interaction
        selector: String,
        /// Number of nodes resolved
        found: usize,
    },

    /// Mocked app issued a call no route answers
    #[error("Unmocked network call: {method} {url}")]
    UnmockedCall {
        /// HTTP method of the call
        method: String,
        /// URL of the call
        url: String,
    },

    /// Tree refused an event
    #[error("Event dispatch failed: {message}")]
    Dispatch {
        /// Error message
        message: String,
    },

    /// No async runtime available for a background task
    #[error("Runtime unavailable: {message}")]
    Runtime {
        /// Error message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl HarnessError {
    /// Whether this error came from a wait running out of time
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::PollTimeout { .. } | Self::ElementNotFound { .. })
    }

    /// Elapsed wait time carried by timeout errors
    #[must_use]
    pub const fn elapsed_ms(&self) -> Option<u64> {
        match self {
            Self::PollTimeout { elapsed_ms, .. } | Self::ElementNotFound { elapsed_ms, .. } => {
                Some(*elapsed_ms)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_timeout_message() {
        let err = HarnessError::PollTimeout {
            description: "list to load".to_string(),
            elapsed_ms: 550,
        };
        assert_eq!(
            err.to_string(),
            "Timed out after 550ms waiting for list to load"
        );
        assert!(err.is_timeout());
        assert_eq!(err.elapsed_ms(), Some(550));
    }

    #[test]
    fn test_element_not_found_names_target() {
        let err = HarnessError::ElementNotFound {
            target: ".never-appears".to_string(),
            elapsed_ms: 150,
        };
        let msg = err.to_string();
        assert!(msg.contains(".never-appears"));
        assert!(msg.contains("150ms"));
    }

    #[test]
    fn test_unmocked_call_names_method_and_url() {
        let err = HarnessError::UnmockedCall {
            method: "POST".to_string(),
            url: "/api/unexpected".to_string(),
        };
        assert_eq!(err.to_string(), "Unmocked network call: POST /api/unexpected");
        assert!(!err.is_timeout());
        assert_eq!(err.elapsed_ms(), None);
    }

    #[test]
    fn test_json_error_from() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: HarnessError = parse.into();
        assert!(err.to_string().starts_with("JSON error"));
    }
}
