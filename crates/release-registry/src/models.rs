//! Data models for the release registry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A deployed application instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    /// Unique release name
    pub name: String,

    /// Chart the release was installed from
    pub chart_ref: String,

    /// Directory the chart was rendered from
    pub chart_dir: PathBuf,

    /// Edge controller that owns the release, bound on first install
    pub controller_host: String,

    /// Broker topic resolved on first install, reused for every publish
    pub topic: String,

    /// Network address reported by the controller
    pub address: Option<String>,

    /// Current status
    pub status: ReleaseStatus,

    /// Rendered manifest, kept for status and debugging
    pub manifest: String,

    /// Number of successful installs and upgrades
    pub revision: u32,

    /// When the release was first installed
    pub installed_at: DateTime<Utc>,

    /// Last successful install or upgrade
    pub updated_at: DateTime<Utc>,
}

/// Release status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStatus {
    /// Present in the registry
    Deployed,
    /// Removed by an uninstall
    Deleted,
}

/// Short view of a release, as returned by list and status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSummary {
    /// Release name
    pub name: String,
    /// Release status
    pub status: ReleaseStatus,
    /// Chart reference
    pub chart_ref: String,
    /// Network address, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Broker topic
    pub topic: String,
}

/// Parameters of an install or upgrade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallRequest {
    /// Release name
    pub name: String,
    /// Chart reference
    pub chart_ref: String,
    /// Chart directory, defaults to the configured charts directory
    #[serde(default)]
    pub chart_dir: Option<PathBuf>,
    /// Controller host, defaults to the configured controller
    #[serde(default)]
    pub controller_host: Option<String>,
    /// Update an existing release instead of creating one
    #[serde(default)]
    pub upgrade: bool,
}

/// Result of a committed install
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallOutcome {
    /// Release as committed to the registry
    pub release: Release,
    /// Topic the snapshot was queued on
    pub topic: String,
    /// Snapshot queued for publication
    pub snapshot: Snapshot,
}

/// Full membership of one topic
///
/// A snapshot supersedes every earlier snapshot on the same topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Routed, addressable releases
    pub apps: Vec<AppEntry>,
}

/// One application in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppEntry {
    /// Release name
    #[serde(rename = "appName")]
    pub app_name: String,
    /// Chart reference
    #[serde(rename = "helm-chart")]
    pub helm_chart: String,
    /// Network address
    pub ip: String,
}

impl Release {
    /// Summarize the release
    pub fn summary(&self) -> ReleaseSummary {
        ReleaseSummary {
            name: self.name.clone(),
            status: self.status,
            chart_ref: self.chart_ref.clone(),
            address: self.address.clone(),
            topic: self.topic.clone(),
        }
    }

    /// Mark the release as removed
    ///
    /// A deleted release has no address.
    pub fn mark_deleted(&mut self) {
        self.status = ReleaseStatus::Deleted;
        self.address = None;
    }

    /// Snapshot entry for this release, if it can be routed to
    pub fn app_entry(&self) -> Option<AppEntry> {
        if self.status != ReleaseStatus::Deployed {
            return None;
        }
        self.address.as_ref().map(|ip| AppEntry {
            app_name: self.name.clone(),
            helm_chart: self.chart_ref.clone(),
            ip: ip.clone(),
        })
    }
}

impl InstallRequest {
    /// Create a first-install request
    pub fn new(name: impl Into<String>, chart_ref: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chart_ref: chart_ref.into(),
            chart_dir: None,
            controller_host: None,
            upgrade: false,
        }
    }

    /// Target a specific controller host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.controller_host = Some(host.into());
        self
    }

    /// Render from a specific chart directory
    pub fn chart_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.chart_dir = Some(dir.into());
        self
    }

    /// Update an existing release
    pub fn upgrade(mut self) -> Self {
        self.upgrade = true;
        self
    }
}

impl Snapshot {
    /// Wire payload published on the topic
    pub fn to_payload(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Number of applications in the snapshot
    pub fn len(&self) -> usize {
        self.apps.len()
    }

    /// Whether the snapshot lists no applications
    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// Find an application by release name
    pub fn get(&self, app_name: &str) -> Option<&AppEntry> {
        self.apps.iter().find(|app| app.app_name == app_name)
    }
}
