//! Error types for the release registry

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Stage of a release operation that can fail or time out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Manifest rendering
    Render,
    /// Edge controller API call
    Controller,
    /// Broker publish
    Publish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Render => f.write_str("render"),
            Stage::Controller => f.write_str("controller"),
            Stage::Publish => f.write_str("publish"),
        }
    }
}

/// Release registry error type
#[derive(Error, Debug)]
pub enum Error {
    /// Manifest templating failed
    #[error("Failed to render manifest for release {release}: {message}")]
    Render {
        /// Release being rendered
        release: String,
        /// Renderer output
        message: String,
    },

    /// Edge controller rejected the request
    #[error("Controller rejected release {release} with status {status}")]
    Controller {
        /// Release the request was about
        release: String,
        /// HTTP status code returned by the controller
        status: u16,
    },

    /// Edge controller could not be reached
    #[error("Controller request for release {release} failed: {message}")]
    ControllerRequest {
        /// Release the request was about
        release: String,
        /// Underlying failure
        message: String,
    },

    /// Release not found
    #[error("Release not found: {0}")]
    NotFound(String),

    /// Release name or chart reference rejected before any remote call
    #[error("Invalid release {release}: {reason}")]
    InvalidRelease {
        /// Offending release name
        release: String,
        /// Why it was rejected
        reason: String,
    },

    /// Another first install of the same release is still in flight
    #[error("Release {release} is already being installed")]
    Conflict {
        /// Contended release name
        release: String,
    },

    /// A bounded call did not complete in time
    #[error("{stage} stage timed out after {after:?} for release {release}")]
    Timeout {
        /// Release the call was about
        release: String,
        /// Stage that timed out
        stage: Stage,
        /// Configured bound
        after: Duration,
    },

    /// Broker publish failed
    #[error("Publish to topic {topic} failed: {message}")]
    Transport {
        /// Destination topic
        topic: String,
        /// Underlying failure
        message: String,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Operator-facing error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Render { .. } => "RenderError",
            Error::Controller { .. } | Error::ControllerRequest { .. } => "ControllerError",
            Error::NotFound(_) => "NotFoundError",
            Error::InvalidRelease { .. } => "InvalidReleaseError",
            Error::Conflict { .. } => "ConflictError",
            Error::Timeout { .. } => "TimeoutError",
            Error::Transport { .. } => "TransportError",
            Error::Config(_) => "ConfigError",
            Error::WebSocket(_) | Error::Io(_) => "IoError",
            Error::Json(_) | Error::Yaml(_) => "SerializationError",
        }
    }

    /// Release the error is about, if any
    pub fn release(&self) -> Option<&str> {
        match self {
            Error::Render { release, .. }
            | Error::Controller { release, .. }
            | Error::ControllerRequest { release, .. }
            | Error::InvalidRelease { release, .. }
            | Error::Conflict { release }
            | Error::Timeout { release, .. } => Some(release),
            Error::NotFound(name) => Some(name),
            _ => None,
        }
    }

    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout { .. }
                | Error::Conflict { .. }
                | Error::ControllerRequest { .. }
                | Error::Transport { .. }
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_release() {
        let err = Error::Controller {
            release: "app1".to_string(),
            status: 500,
        };
        assert_eq!(err.kind(), "ControllerError");
        assert_eq!(err.release(), Some("app1"));
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("500"));

        let err = Error::NotFound("ghost".to_string());
        assert_eq!(err.kind(), "NotFoundError");
        assert_eq!(err.release(), Some("ghost"));
    }

    #[test]
    fn test_timeout_is_retryable() {
        let err = Error::Timeout {
            release: "app1".to_string(),
            stage: Stage::Controller,
            after: Duration::from_secs(5),
        };
        assert!(err.is_retryable());
        assert!(err.to_string().starts_with("controller stage timed out"));
    }

    #[test]
    fn test_conflict_is_retryable() {
        let err = Error::Conflict {
            release: "app1".to_string(),
        };
        assert_eq!(err.kind(), "ConflictError");
        assert_eq!(err.release(), Some("app1"));
        assert!(err.is_retryable());
    }
}
