//! Protocol types for daemon communication

use release_registry::{InstallRequest, Release, ReleaseSummary, Snapshot, Values};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Request messages from client to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// List every release
    ListReleases,

    /// Install or upgrade a release
    Install {
        /// Release name
        name: String,
        /// Chart reference
        chart: String,
        /// Controller host or node alias
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host: Option<String>,
        /// Chart directory override
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chart_dir: Option<PathBuf>,
        /// Update an existing release
        #[serde(default)]
        upgrade: bool,
    },

    /// Remove a release
    Uninstall {
        /// Release name
        name: String,
    },

    /// Summary of one release
    Status {
        /// Release name
        name: String,
    },

    /// Full record of one release
    Get {
        /// Release name
        name: String,
    },

    /// Chart values of one release
    GetValues {
        /// Release name
        name: String,
    },

    /// Drain publish queues and stop the daemon
    Shutdown,
}

/// Response messages from daemon to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    /// Operation succeeded
    Success,

    /// Operation failed
    Error {
        /// Error kind, e.g. `RenderError`
        kind: String,
        /// Release the error is about
        #[serde(default, skip_serializing_if = "Option::is_none")]
        release: Option<String>,
        /// Human-readable message
        message: String,
    },

    /// All releases
    Releases {
        /// Release summaries
        releases: Vec<ReleaseSummary>,
    },

    /// Install committed
    Installed {
        /// Committed release
        release: Release,
        /// Topic the snapshot was queued on
        topic: String,
        /// Queued snapshot
        snapshot: Snapshot,
    },

    /// Uninstall committed
    Uninstalled {
        /// Removed release
        release: Release,
    },

    /// Release summary
    Status {
        /// Summary
        release: ReleaseSummary,
    },

    /// Full release record
    Release {
        /// Release
        release: Release,
    },

    /// Chart values
    Values {
        /// Values mapping
        values: Values,
    },
}

impl Request {
    /// Build an install request
    pub fn install(request: &InstallRequest) -> Self {
        Request::Install {
            name: request.name.clone(),
            chart: request.chart_ref.clone(),
            host: request.controller_host.clone(),
            chart_dir: request.chart_dir.clone(),
            upgrade: request.upgrade,
        }
    }
}

impl From<&release_registry::Error> for Response {
    fn from(error: &release_registry::Error) -> Self {
        Response::Error {
            kind: error.kind().to_string(),
            release: error.release().map(str::to_string),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let request: Request =
            serde_json::from_str(r#"{"type":"Install","name":"app1","chart":"nginx"}"#).unwrap();
        match request {
            Request::Install {
                name,
                chart,
                host,
                upgrade,
                ..
            } => {
                assert_eq!(name, "app1");
                assert_eq!(chart, "nginx");
                assert!(host.is_none());
                assert!(!upgrade);
            }
            other => panic!("unexpected request {:?}", other),
        }

        let json = serde_json::to_string(&Request::ListReleases).unwrap();
        assert_eq!(json, r#"{"type":"ListReleases"}"#);
    }

    #[test]
    fn test_error_response_carries_kind() {
        let error = release_registry::Error::Controller {
            release: "app1".to_string(),
            status: 500,
        };
        let json = serde_json::to_value(Response::from(&error)).unwrap();
        assert_eq!(json["type"], "Error");
        assert_eq!(json["kind"], "ControllerError");
        assert_eq!(json["release"], "app1");
    }
}
