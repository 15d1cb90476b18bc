//! Configuration structures for the application manager

use crate::error::{Error, Result};
use crate::router::RoutingConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application manager configuration
///
/// Every section has defaults, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppManagerConfig {
    /// Directory holding unpacked charts, one per release
    #[serde(default = "default_charts_dir")]
    pub charts_dir: PathBuf,
    /// Chart repositories allowed in `repo/chart` references (empty allows any)
    #[serde(default)]
    pub allowed_repos: Vec<String>,
    /// Helm binary settings
    #[serde(default)]
    pub helm: HelmConfig,
    /// Edge controller settings
    #[serde(default)]
    pub controller: ControllerConfig,
    /// Controller host to topic routing table
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Message broker settings
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Bounds on remote calls
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Daemon control API
    #[serde(default)]
    pub server: ServerConfig,
}

/// Helm binary settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelmConfig {
    /// Path or name of the helm binary
    #[serde(default = "default_helm_binary")]
    pub binary: PathBuf,
    /// Kubeconfig passed to helm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,
}

/// Edge controller settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Controller used when an install names no host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_host: Option<String>,
    /// Node name to controller host
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

/// Message broker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// `tcp://host:port` or `ws://host:port/path`
    #[serde(default = "default_broker_endpoint")]
    pub endpoint: String,
    /// Broker login
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    /// Broker passcode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passcode: Option<String>,
}

/// Bounds on remote calls, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Manifest rendering and show-values
    #[serde(default = "default_render_secs")]
    pub render_secs: u64,
    /// Each edge controller request
    #[serde(default = "default_controller_secs")]
    pub controller_secs: u64,
    /// Each broker delivery
    #[serde(default = "default_publish_secs")]
    pub publish_secs: u64,
}

/// Daemon control API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address (e.g., "127.0.0.1:9410")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_charts_dir() -> PathBuf {
    PathBuf::from("charts")
}

fn default_helm_binary() -> PathBuf {
    PathBuf::from("helm")
}

fn default_broker_endpoint() -> String {
    "tcp://127.0.0.1:61613".to_string()
}

fn default_render_secs() -> u64 {
    30
}

fn default_controller_secs() -> u64 {
    30
}

fn default_publish_secs() -> u64 {
    10
}

fn default_listen_addr() -> String {
    "127.0.0.1:9410".to_string()
}

impl Default for HelmConfig {
    fn default() -> Self {
        Self {
            binary: default_helm_binary(),
            kubeconfig: None,
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_broker_endpoint(),
            login: None,
            passcode: None,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            render_secs: default_render_secs(),
            controller_secs: default_controller_secs(),
            publish_secs: default_publish_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

impl TimeoutConfig {
    /// Render bound
    pub fn render(&self) -> Duration {
        Duration::from_secs(self.render_secs)
    }

    /// Controller request bound
    pub fn controller(&self) -> Duration {
        Duration::from_secs(self.controller_secs)
    }

    /// Broker delivery bound
    pub fn publish(&self) -> Duration {
        Duration::from_secs(self.publish_secs)
    }
}

impl ControllerConfig {
    /// Controller host for an install
    ///
    /// Aliases are expanded; with no host the configured default is used.
    pub fn resolve_host(&self, requested: Option<&str>) -> Option<String> {
        match requested.map(str::trim).filter(|host| !host.is_empty()) {
            Some(host) => Some(self.aliases.get(host).cloned().unwrap_or_else(|| host.to_string())),
            None => self.default_host.clone(),
        }
    }
}

impl AppManagerConfig {
    /// Load configuration from file
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        use async_fs::File;
        use futures::io::AsyncReadExt;

        let path = path.as_ref();
        let mut file = File::open(path).await.map_err(|e| {
            Error::Config(format!("Failed to open {}: {}", path.display(), e))
        })?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;

        let config = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&contents)?,
            _ => serde_json::from_str(&contents)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML configuration text
    pub fn from_yaml(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Reject settings that would only fail later
    pub fn validate(&self) -> Result<()> {
        if self.broker.endpoint.trim().is_empty() {
            return Err(Error::Config("broker.endpoint must not be empty".to_string()));
        }
        if self.routing.default_topic.trim().is_empty() {
            return Err(Error::Config(
                "routing.default_topic must not be empty".to_string(),
            ));
        }
        if let Some(rule) = self.routing.routes.iter().find(|rule| rule.topic.trim().is_empty()) {
            return Err(Error::Config(format!(
                "route {:?} has an empty topic",
                rule.matcher()
            )));
        }
        for (name, value) in [
            ("render_secs", self.timeouts.render_secs),
            ("controller_secs", self.timeouts.controller_secs),
            ("publish_secs", self.timeouts.publish_secs),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("timeouts.{} must be positive", name)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppManagerConfig::from_yaml("").unwrap();
        assert_eq!(config.charts_dir, PathBuf::from("charts"));
        assert_eq!(config.helm.binary, PathBuf::from("helm"));
        assert_eq!(config.routing.default_topic, "Domain1.NetworkServiceIP");
        assert_eq!(config.timeouts.publish(), Duration::from_secs(10));
        assert_eq!(config.server.listen_addr, "127.0.0.1:9410");
        config.validate().unwrap();
    }

    #[test]
    fn test_resolve_host() {
        let config = AppManagerConfig::from_yaml(
            r#"
controller:
  default_host: http://edge-70:8000
  aliases:
    node3: http://10.10.3.1:8000
"#,
        )
        .unwrap();

        assert_eq!(
            config.controller.resolve_host(Some("node3")).as_deref(),
            Some("http://10.10.3.1:8000")
        );
        assert_eq!(
            config.controller.resolve_host(Some("ec2-node")).as_deref(),
            Some("ec2-node")
        );
        assert_eq!(
            config.controller.resolve_host(None).as_deref(),
            Some("http://edge-70:8000")
        );
        assert_eq!(
            config.controller.resolve_host(Some("  ")).as_deref(),
            Some("http://edge-70:8000")
        );
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = AppManagerConfig::from_yaml("timeouts:\n  publish_secs: 0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
    }

    #[smol_potat::test]
    async fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            r#"charts_dir: /srv/charts
allowed_repos: [lightedge]
broker:
  endpoint: ws://broker:61614/stomp
  login: admin
  passcode: admin
routing:
  default_topic: Domain1.NetworkServiceIP
  routes:
    - exact: ec1.local
      topic: EC1.NetworkServiceIP
"#
        )
        .unwrap();

        let config = AppManagerConfig::from_file(file.path()).await.unwrap();
        assert_eq!(config.charts_dir, PathBuf::from("/srv/charts"));
        assert_eq!(config.allowed_repos, vec!["lightedge".to_string()]);
        assert_eq!(config.broker.login.as_deref(), Some("admin"));
        assert_eq!(config.routing.routes.len(), 1);
    }

    #[smol_potat::test]
    async fn test_missing_file_is_config_error() {
        let err = AppManagerConfig::from_file("/nonexistent/appmanager.yaml")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
    }
}
