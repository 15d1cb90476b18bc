//! The release registry
//!
//! All releases live in one map behind a single async lock. Remote calls
//! (rendering, the edge controller, broker delivery) run without the lock;
//! only the final commit, the snapshot read and the hand-off to the publisher
//! happen while it is held. Because the hand-off is under the same lock as
//! the commit, snapshots reach each topic's queue in the order the registry
//! states they describe were committed.

use crate::config::{AppManagerConfig, ControllerConfig, TimeoutConfig};
use crate::controller::{ControllerClient, EdgeControllerClient};
use crate::error::{Error, Result, Stage};
use crate::models::{
    InstallOutcome, InstallRequest, Release, ReleaseStatus, ReleaseSummary, Snapshot,
};
use crate::publisher::{PublishObserver, SnapshotPublisher, TracingObserver};
use crate::renderer::{HelmCli, HelmRenderer, ManifestRenderer};
use crate::router::TopicRouter;
use crate::timeout::with_timeout;
use crate::transport::{BrokerTransport, StompTransport};
use chrono::Utc;
use futures::lock::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Claim on a name whose first install is in flight, released on drop
struct InstallClaim {
    installing: Arc<std::sync::Mutex<HashSet<String>>>,
    name: String,
}

impl InstallClaim {
    fn take(installing: &Arc<std::sync::Mutex<HashSet<String>>>, name: &str) -> Result<Self> {
        let mut names = installing.lock().unwrap_or_else(PoisonError::into_inner);
        if !names.insert(name.to_string()) {
            return Err(Error::Conflict {
                release: name.to_string(),
            });
        }
        Ok(Self {
            installing: Arc::clone(installing),
            name: name.to_string(),
        })
    }
}

impl Drop for InstallClaim {
    fn drop(&mut self) {
        self.installing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
    }
}

/// Values a release was rendered with
pub type Values = serde_json::Map<String, serde_json::Value>;

/// In-memory registry of deployed releases
pub struct Registry {
    releases: Mutex<BTreeMap<String, Release>>,
    installing: Arc<std::sync::Mutex<HashSet<String>>>,
    renderer: Arc<dyn ManifestRenderer>,
    controller: Arc<dyn ControllerClient>,
    router: TopicRouter,
    publisher: SnapshotPublisher,
    hosts: ControllerConfig,
    charts_dir: PathBuf,
    allowed_repos: Vec<String>,
    timeouts: TimeoutConfig,
}

/// Builder for [`Registry`]
pub struct RegistryBuilder {
    renderer: Option<Arc<dyn ManifestRenderer>>,
    controller: Option<Arc<dyn ControllerClient>>,
    transport: Option<Arc<dyn BrokerTransport>>,
    observer: Arc<dyn PublishObserver>,
    router: TopicRouter,
    hosts: ControllerConfig,
    charts_dir: PathBuf,
    allowed_repos: Vec<String>,
    timeouts: TimeoutConfig,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        let defaults = AppManagerConfig::default();
        Self {
            renderer: None,
            controller: None,
            transport: None,
            observer: Arc::new(TracingObserver),
            router: TopicRouter::default(),
            hosts: defaults.controller,
            charts_dir: defaults.charts_dir,
            allowed_repos: defaults.allowed_repos,
            timeouts: defaults.timeouts,
        }
    }
}

impl RegistryBuilder {
    /// Start from configuration, without collaborators
    pub fn from_config(config: &AppManagerConfig) -> Self {
        Self {
            router: TopicRouter::new(config.routing.clone()),
            hosts: config.controller.clone(),
            charts_dir: config.charts_dir.clone(),
            allowed_repos: config.allowed_repos.clone(),
            timeouts: config.timeouts.clone(),
            ..Self::default()
        }
    }

    /// Set the manifest renderer
    pub fn renderer(mut self, renderer: Arc<dyn ManifestRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Set the edge controller client
    pub fn controller(mut self, controller: Arc<dyn ControllerClient>) -> Self {
        self.controller = Some(controller);
        self
    }

    /// Set the broker transport
    pub fn transport(mut self, transport: Arc<dyn BrokerTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Report publish outcomes somewhere other than the log
    pub fn observer(mut self, observer: Arc<dyn PublishObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Set the topic router
    pub fn router(mut self, router: TopicRouter) -> Self {
        self.router = router;
        self
    }

    /// Controller used when an install names no host
    pub fn default_host(mut self, host: impl Into<String>) -> Self {
        self.hosts.default_host = Some(host.into());
        self
    }

    /// Map a node name to a controller host
    pub fn alias(mut self, node: impl Into<String>, host: impl Into<String>) -> Self {
        self.hosts.aliases.insert(node.into(), host.into());
        self
    }

    /// Default chart directory
    pub fn charts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.charts_dir = dir.into();
        self
    }

    /// Restrict `repo/chart` references to these repositories
    pub fn allowed_repos(mut self, repos: Vec<String>) -> Self {
        self.allowed_repos = repos;
        self
    }

    /// Bounds on remote calls
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Build the registry
    pub fn build(self) -> Result<Registry> {
        let renderer = self
            .renderer
            .ok_or_else(|| Error::Config("registry needs a manifest renderer".to_string()))?;
        let controller = self
            .controller
            .ok_or_else(|| Error::Config("registry needs a controller client".to_string()))?;
        let transport = self
            .transport
            .ok_or_else(|| Error::Config("registry needs a broker transport".to_string()))?;

        let publisher =
            SnapshotPublisher::with_observer(transport, self.observer, self.timeouts.publish());

        Ok(Registry {
            releases: Mutex::new(BTreeMap::new()),
            installing: Arc::default(),
            renderer,
            controller,
            router: self.router,
            publisher,
            hosts: self.hosts,
            charts_dir: self.charts_dir,
            allowed_repos: self.allowed_repos,
            timeouts: self.timeouts,
        })
    }
}

impl Registry {
    /// Start building a registry
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registry wired to helm, the edge controller API and the STOMP broker
    pub fn from_config(config: &AppManagerConfig) -> Result<Self> {
        let helm = HelmCli::new(config.helm.binary.clone(), config.helm.kubeconfig.clone());
        let controller = EdgeControllerClient::new(helm.clone(), config.timeouts.controller())?;
        let transport = StompTransport::new(&config.broker.endpoint)?
            .with_credentials(config.broker.login.clone(), config.broker.passcode.clone());

        RegistryBuilder::from_config(config)
            .renderer(Arc::new(HelmRenderer::new(helm)))
            .controller(Arc::new(controller))
            .transport(Arc::new(transport))
            .build()
    }

    /// The snapshot publisher
    pub fn publisher(&self) -> &SnapshotPublisher {
        &self.publisher
    }

    /// The topic router
    pub fn router(&self) -> &TopicRouter {
        &self.router
    }

    /// Summaries of every release, ordered by name
    pub async fn list(&self) -> Vec<ReleaseSummary> {
        let releases = self.releases.lock().await;
        releases.values().map(Release::summary).collect()
    }

    /// Summary of one release
    pub async fn status(&self, name: &str) -> Result<ReleaseSummary> {
        self.get(name).await.map(|release| release.summary())
    }

    /// Full record of one release, including its rendered manifest
    pub async fn get(&self, name: &str) -> Result<Release> {
        let releases = self.releases.lock().await;
        releases
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// Current membership of a topic
    pub async fn snapshot(&self, topic: &str) -> Snapshot {
        let releases = self.releases.lock().await;
        build_snapshot(&releases, topic)
    }

    /// Install or upgrade a release
    ///
    /// Nothing is recorded unless rendering and the controller call both
    /// succeed. The controller host and topic bound by the first install are
    /// kept for the lifetime of the release. A reply without an address keeps
    /// the previous one.
    ///
    /// Only one first install of a name runs at a time; a second one fails
    /// with [`Error::Conflict`] before any remote call.
    pub async fn install(&self, request: InstallRequest) -> Result<InstallOutcome> {
        let name = request.name.as_str();
        self.validate(&request)?;

        let (existing, _claim) = {
            let releases = self.releases.lock().await;
            match releases.get(name) {
                Some(release) => (
                    Some((release.controller_host.clone(), release.topic.clone())),
                    None,
                ),
                None if request.upgrade => return Err(Error::NotFound(name.to_string())),
                None => (None, Some(InstallClaim::take(&self.installing, name)?)),
            }
        };

        let chart_dir = request
            .chart_dir
            .clone()
            .unwrap_or_else(|| self.charts_dir.clone());
        let manifest = self
            .bounded(
                name,
                Stage::Render,
                self.timeouts.render(),
                self.renderer.render(name, &request.chart_ref, &chart_dir),
            )
            .await?;

        let (controller_host, topic) = match existing {
            Some(binding) => binding,
            None => self.bind(name, request.controller_host.as_deref())?,
        };

        let call = if request.upgrade {
            self.controller
                .update(&controller_host, name, &manifest.documents)
        } else {
            self.controller
                .create(&controller_host, name, &manifest.documents)
        };
        let response = self
            .bounded(name, Stage::Controller, self.timeouts.controller(), call)
            .await?;
        if !response.is_success() {
            return Err(Error::Controller {
                release: name.to_string(),
                status: response.status,
            });
        }
        let address = response.address_of(name);
        if address.is_none() {
            debug!("Controller reported no address for {}", name);
        }

        let mut releases = self.releases.lock().await;
        let now = Utc::now();
        let release = match releases.get(name) {
            Some(previous)
                if previous.controller_host != controller_host || previous.topic != topic =>
            {
                warn!(
                    "{} was bound to {} while installing on {}, not recording",
                    name, previous.controller_host, controller_host
                );
                return Err(Error::Conflict {
                    release: name.to_string(),
                });
            }
            Some(previous) => Release {
                name: name.to_string(),
                chart_ref: request.chart_ref.clone(),
                chart_dir,
                controller_host: previous.controller_host.clone(),
                topic: previous.topic.clone(),
                address: address.or_else(|| previous.address.clone()),
                status: ReleaseStatus::Deployed,
                manifest: manifest.raw,
                revision: previous.revision + 1,
                installed_at: previous.installed_at,
                updated_at: now,
            },
            None => Release {
                name: name.to_string(),
                chart_ref: request.chart_ref.clone(),
                chart_dir,
                controller_host,
                topic,
                address,
                status: ReleaseStatus::Deployed,
                manifest: manifest.raw,
                revision: 1,
                installed_at: now,
                updated_at: now,
            },
        };
        releases.insert(release.name.clone(), release.clone());

        let snapshot = build_snapshot(&releases, &release.topic);
        self.submit(&release.topic, &snapshot);
        drop(releases);

        info!(
            "Installed {} revision {} on {} (topic {})",
            release.name, release.revision, release.controller_host, release.topic
        );
        Ok(InstallOutcome {
            topic: release.topic.clone(),
            release,
            snapshot,
        })
    }

    /// Remove a release
    ///
    /// Returns the removed release marked as deleted. The updated membership
    /// is published on the topic bound at install time.
    pub async fn uninstall(&self, name: &str) -> Result<Release> {
        let controller_host = {
            let releases = self.releases.lock().await;
            releases
                .get(name)
                .map(|release| release.controller_host.clone())
                .ok_or_else(|| Error::NotFound(name.to_string()))?
        };

        let status = self
            .bounded(
                name,
                Stage::Controller,
                self.timeouts.controller(),
                self.controller.delete(&controller_host, name),
            )
            .await?;
        if !(200..300).contains(&status) {
            return Err(Error::Controller {
                release: name.to_string(),
                status,
            });
        }

        let mut releases = self.releases.lock().await;
        // A concurrent uninstall may have won the race while the lock was released
        let mut release = releases
            .remove(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        release.mark_deleted();

        let snapshot = build_snapshot(&releases, &release.topic);
        self.submit(&release.topic, &snapshot);
        drop(releases);

        info!("Uninstalled {} (topic {})", name, release.topic);
        Ok(release)
    }

    /// Chart values of a release
    pub async fn get_values(&self, name: &str) -> Result<Values> {
        let chart_dir = self.get(name).await?.chart_dir;
        let raw = self
            .bounded(
                name,
                Stage::Render,
                self.timeouts.render(),
                self.controller.show_values(name, &chart_dir),
            )
            .await?;
        parse_values(name, &raw)
    }

    fn validate(&self, request: &InstallRequest) -> Result<()> {
        validate_name(&request.name)?;

        let invalid = |reason: String| Error::InvalidRelease {
            release: request.name.clone(),
            reason,
        };
        let chart_ref = request.chart_ref.trim();
        if chart_ref.is_empty() {
            return Err(invalid("chart reference must not be empty".to_string()));
        }
        if self.allowed_repos.is_empty() || chart_ref.starts_with(['.', '/']) {
            return Ok(());
        }
        if let Some((repo, _)) = chart_ref.split_once('/') {
            if !self.allowed_repos.iter().any(|allowed| allowed == repo) {
                return Err(invalid(format!("chart repository {} is not allowed", repo)));
            }
        }
        Ok(())
    }

    /// Controller host and topic for a first install
    ///
    /// The topic is routed on the host the release is actually created on,
    /// so a defaulted host and the same host named explicitly share a topic.
    fn bind(&self, name: &str, requested: Option<&str>) -> Result<(String, String)> {
        let controller_host = self
            .hosts
            .resolve_host(requested)
            .ok_or_else(|| Error::InvalidRelease {
                release: name.to_string(),
                reason: "no controller host given and none configured".to_string(),
            })?;
        let topic = self.router.resolve(Some(controller_host.as_str()), name);
        Ok((controller_host, topic))
    }

    fn submit(&self, topic: &str, snapshot: &Snapshot) {
        if let Err(e) = self.publisher.submit(topic, snapshot) {
            error!("Failed to queue snapshot on {}: {}", topic, e);
        }
    }

    async fn bounded<T>(
        &self,
        release: &str,
        stage: Stage,
        limit: Duration,
        future: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        with_timeout(limit, future).await.unwrap_or_else(|| {
            Err(Error::Timeout {
                release: release.to_string(),
                stage,
                after: limit,
            })
        })
    }
}

/// Check a release name
///
/// Names are non-empty and contain neither `/` nor whitespace.
pub fn validate_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "release name must not be empty"
    } else if name.contains('/') {
        "release name must not contain '/'"
    } else if name.chars().any(char::is_whitespace) {
        "release name must not contain whitespace"
    } else {
        return Ok(());
    };
    Err(Error::InvalidRelease {
        release: name.to_string(),
        reason: reason.to_string(),
    })
}

fn build_snapshot(releases: &BTreeMap<String, Release>, topic: &str) -> Snapshot {
    Snapshot {
        apps: releases
            .values()
            .filter(|release| release.topic == topic)
            .filter_map(Release::app_entry)
            .collect(),
    }
}

fn parse_values(release: &str, raw: &str) -> Result<Values> {
    if raw.trim().is_empty() {
        return Ok(Values::new());
    }
    let value: serde_json::Value = serde_yaml::from_str(raw).map_err(|e| Error::Render {
        release: release.to_string(),
        message: format!("invalid values: {}", e),
    })?;
    match value {
        serde_json::Value::Object(values) => Ok(values),
        serde_json::Value::Null => Ok(Values::new()),
        other => Err(Error::Render {
            release: release.to_string(),
            message: format!("values are not a mapping: {}", other),
        }),
    }
}
