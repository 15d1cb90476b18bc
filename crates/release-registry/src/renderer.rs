//! Manifest rendering
//!
//! Releases are rendered into plain Kubernetes documents before they are sent
//! to an edge controller. The production renderer shells out to
//! `helm template`.

use crate::error::{Error, Result};
use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Rendered deployment documents for one release
#[derive(Debug, Clone, Default)]
pub struct RenderedManifest {
    /// Raw renderer output
    pub raw: String,
    /// Individual documents, in output order
    pub documents: Vec<serde_json::Value>,
}

/// Turns a release and chart into deployment documents
#[async_trait]
pub trait ManifestRenderer: Send + Sync {
    /// Render the release
    async fn render(&self, release: &str, chart_ref: &str, chart_dir: &Path)
    -> Result<RenderedManifest>;
}

impl RenderedManifest {
    /// Split multi-document YAML into documents
    ///
    /// Empty documents (a bare `---`) are skipped.
    pub fn from_yaml(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let mut documents = Vec::new();
        for document in serde_yaml::Deserializer::from_str(&raw) {
            let value = serde_json::Value::deserialize(document)?;
            if !value.is_null() {
                documents.push(value);
            }
        }
        Ok(Self { raw, documents })
    }
}

/// Thin wrapper around the helm binary
#[derive(Debug, Clone)]
pub struct HelmCli {
    binary: PathBuf,
    kubeconfig: Option<PathBuf>,
}

impl HelmCli {
    /// Create a wrapper for the given binary
    pub fn new(binary: impl Into<PathBuf>, kubeconfig: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            kubeconfig,
        }
    }

    /// Chart location for a release
    ///
    /// Charts unpacked under `<chart_dir>/<release>` win; otherwise the chart
    /// reference is handed to helm as-is.
    pub fn chart_path(release: &str, chart_ref: &str, chart_dir: &Path) -> String {
        let unpacked = chart_dir.join(release);
        if unpacked.is_dir() {
            unpacked.to_string_lossy().into_owned()
        } else {
            chart_ref.to_string()
        }
    }

    /// Run helm and return stdout
    ///
    /// On failure the error carries stderr. Dropping the future kills helm.
    pub async fn run(&self, args: &[&str]) -> std::result::Result<String, String> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args).kill_on_drop(true);
        if let Some(kubeconfig) = &self.kubeconfig {
            cmd.env("KUBECONFIG", kubeconfig);
        }

        debug!("Running {} {}", self.binary.display(), args.join(" "));
        let output = cmd
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {}", self.binary.display(), e))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(if stderr.is_empty() {
                format!("{} exited with {}", self.binary.display(), output.status)
            } else {
                stderr
            })
        }
    }
}

/// Renderer backed by `helm template`
#[derive(Debug, Clone)]
pub struct HelmRenderer {
    helm: HelmCli,
}

impl HelmRenderer {
    /// Create a renderer
    pub fn new(helm: HelmCli) -> Self {
        Self { helm }
    }
}

#[async_trait]
impl ManifestRenderer for HelmRenderer {
    async fn render(
        &self,
        release: &str,
        chart_ref: &str,
        chart_dir: &Path,
    ) -> Result<RenderedManifest> {
        let chart = HelmCli::chart_path(release, chart_ref, chart_dir);
        let raw = self
            .helm
            .run(&["template", release, chart.as_str()])
            .await
            .map_err(|message| Error::Render {
                release: release.to_string(),
                message,
            })?;

        RenderedManifest::from_yaml(raw).map_err(|e| Error::Render {
            release: release.to_string(),
            message: format!("invalid manifest: {}", e),
        })
    }
}
