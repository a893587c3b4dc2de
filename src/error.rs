//! Error types for the TaskRouter SDK

/// Stable error name attached to rejections originating from the routing
/// backend.
pub const TASKROUTER_ERROR: &str = "TASKROUTER_ERROR";

/// Main error type for the TaskRouter SDK
///
/// The taxonomy follows three propagation rules:
/// usage errors are raised synchronously and never touch the network,
/// remote errors leave the entity's prior state intact, and transport
/// errors are absorbed by the signaling channel's reconnect budget and
/// surface only as lifecycle events.
#[derive(Debug, thiserror::Error)]
pub enum TaskRouterError {
    /// A required parameter was not provided.
    #[error("{name} is a required parameter")]
    MissingParameter { name: &'static str },

    /// A provided parameter has the wrong type or an invalid value.
    #[error("{name} does not meet the required type: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// The routing backend rejected a request. Carries the stable error
    /// name and the human-readable message sourced from the response.
    #[error("{name}: {message}")]
    Remote { name: String, message: String },

    /// The signaling transport failed.
    #[error("signaling transport error: {0}")]
    Transport(String),

    /// An inbound frame or response payload could not be interpreted.
    #[error("malformed payload: {0}")]
    Payload(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl TaskRouterError {
    /// Builds a remote error with the default routing-backend error name.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            name: TASKROUTER_ERROR.to_string(),
            message: message.into(),
        }
    }

    /// Builds a remote error with an explicit error name.
    pub fn remote_named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Returns true for errors raised before any network attempt.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Self::MissingParameter { .. } | Self::InvalidParameter { .. }
        )
    }

    /// Returns the stable error name for remote errors, if any.
    pub fn remote_name(&self) -> Option<&str> {
        match self {
            Self::Remote { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// Result type alias for TaskRouter SDK operations
pub type Result<T> = std::result::Result<T, TaskRouterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TaskRouterError::MissingParameter { name: "reason" };
        assert_eq!(err.to_string(), "reason is a required parameter");

        let err = TaskRouterError::InvalidParameter {
            name: "hold",
            reason: "expected a boolean".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "hold does not meet the required type: expected a boolean"
        );

        let err = TaskRouterError::remote("Failed to parse JSON.");
        assert_eq!(err.to_string(), "TASKROUTER_ERROR: Failed to parse JSON.");
    }

    #[test]
    fn test_is_usage() {
        assert!(TaskRouterError::MissingParameter { name: "to" }.is_usage());
        assert!(TaskRouterError::InvalidParameter {
            name: "hold",
            reason: "expected a boolean".to_string(),
        }
        .is_usage());
        assert!(!TaskRouterError::remote("boom").is_usage());
        assert!(!TaskRouterError::Transport("gone".to_string()).is_usage());
    }

    #[test]
    fn test_remote_name() {
        let err = TaskRouterError::remote_named("WORKSPACE_ERROR", "nope");
        assert_eq!(err.remote_name(), Some("WORKSPACE_ERROR"));
        assert_eq!(
            TaskRouterError::Transport("gone".to_string()).remote_name(),
            None
        );
    }

    #[test]
    fn test_error_from_serde_json() {
        let result: std::result::Result<serde_json::Value, serde_json::Error> =
            serde_json::from_str("not json");
        let err: TaskRouterError = result.unwrap_err().into();
        assert!(matches!(err, TaskRouterError::Serialization(_)));
    }
}
