//! Edge controller client
//!
//! The controller schedules the rendered workload and reports the pod
//! addresses it allocated.

mod http;

pub use http::EdgeControllerClient;

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Raw controller reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: String,
}

/// Remote edge controller API
///
/// Implementations report transport failures as errors and leave status
/// interpretation to the caller.
#[async_trait]
pub trait ControllerClient: Send + Sync {
    /// Create the application
    async fn create(
        &self,
        host: &str,
        release: &str,
        documents: &[serde_json::Value],
    ) -> Result<ControllerResponse>;

    /// Update an existing application
    async fn update(
        &self,
        host: &str,
        release: &str,
        documents: &[serde_json::Value],
    ) -> Result<ControllerResponse>;

    /// Delete the application, returning the HTTP status
    async fn delete(&self, host: &str, release: &str) -> Result<u16>;

    /// Chart values the release was rendered with, as YAML text
    async fn show_values(&self, release: &str, chart_dir: &Path) -> Result<String>;
}

impl ControllerResponse {
    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Address of the release's pod
    ///
    /// The body is a list of `{pod name: pod address}` objects; the first pod
    /// whose name contains the release name wins.
    pub fn address_of(&self, release: &str) -> Option<String> {
        extract_address(release, &self.body)
    }
}

/// Find a release's pod address in a controller reply body
pub fn extract_address(release: &str, body: &str) -> Option<String> {
    let entries: Vec<serde_json::Map<String, serde_json::Value>> =
        serde_json::from_str(body).ok()?;

    entries
        .iter()
        .flat_map(|entry| entry.iter())
        .find(|(pod, _)| pod.contains(release))
        .and_then(|(_, address)| address.as_str())
        .map(str::to_string)
}
