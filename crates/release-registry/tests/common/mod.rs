//! Common test utilities for release registry integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use release_registry::{
    ControllerClient, ControllerResponse, Error, ManifestRenderer, MemoryTransport, Registry,
    RenderedManifest, Result, TopicRouter,
};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Controller host used when an install names none
pub const DEFAULT_HOST: &str = "http://edge-default:8000";

/// Renderer that produces a single Deployment and can be told to fail
#[derive(Default)]
pub struct FakeRenderer {
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeRenderer {
    /// Fail every render of `release`
    pub fn fail(&self, release: &str) {
        self.failing.lock().unwrap().insert(release.to_string());
    }

    /// Sleep before every render
    pub fn delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl ManifestRenderer for FakeRenderer {
    async fn render(
        &self,
        release: &str,
        chart_ref: &str,
        _chart_dir: &Path,
    ) -> Result<RenderedManifest> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            smol::Timer::after(delay).await;
        }
        if self.failing.lock().unwrap().contains(release) {
            return Err(Error::Render {
                release: release.to_string(),
                message: format!("Error: chart \"{}\" not found", chart_ref),
            });
        }
        RenderedManifest::from_yaml(format!(
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: {}\n  labels:\n    chart: {}\n",
            release, chart_ref
        ))
    }
}

/// One recorded controller call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerCall {
    /// `create`, `update`, `delete` or `show_values`
    pub operation: &'static str,
    /// Host the call went to
    pub host: String,
    /// Release the call was about
    pub release: String,
}

#[derive(Default)]
struct ControllerState {
    calls: Vec<ControllerCall>,
    statuses: HashMap<String, u16>,
    addresses: HashMap<String, Vec<String>>,
    values: HashMap<String, String>,
    delay: Option<Duration>,
}

/// Scripted edge controller
///
/// Replies 200 with the next scripted address for the release, if any.
#[derive(Default)]
pub struct FakeController {
    state: Mutex<ControllerState>,
}

impl FakeController {
    /// Reply with `status` to every call about `release`
    pub fn respond_with(&self, release: &str, status: u16) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(release.to_string(), status);
    }

    /// Addresses handed out to successive create/update calls for `release`
    pub fn addresses(&self, release: &str, addresses: &[&str]) {
        self.state.lock().unwrap().addresses.insert(
            release.to_string(),
            addresses.iter().map(|a| a.to_string()).collect(),
        );
    }

    /// Values text returned by show-values
    pub fn values(&self, release: &str, yaml: &str) {
        self.state
            .lock()
            .unwrap()
            .values
            .insert(release.to_string(), yaml.to_string());
    }

    /// Sleep before every call
    pub fn delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    /// Every call received so far
    pub fn calls(&self) -> Vec<ControllerCall> {
        self.state.lock().unwrap().calls.clone()
    }

    async fn record(&self, operation: &'static str, host: &str, release: &str) -> u16 {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(ControllerCall {
                operation,
                host: host.to_string(),
                release: release.to_string(),
            });
            state.delay
        };
        if let Some(delay) = delay {
            smol::Timer::after(delay).await;
        }
        self.state
            .lock()
            .unwrap()
            .statuses
            .get(release)
            .copied()
            .unwrap_or(200)
    }

    fn body(&self, release: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let address = state
            .addresses
            .get_mut(release)
            .filter(|addresses| !addresses.is_empty())
            .map(|addresses| addresses.remove(0));
        let mut pods = vec![serde_json::json!({ "unrelated-pod": "10.9.9.9" })];
        if let Some(address) = address {
            pods.push(serde_json::json!({ format!("{}-7d9f8c-xk2p1", release): address }));
        }
        serde_json::Value::Array(pods).to_string()
    }
}

#[async_trait]
impl ControllerClient for FakeController {
    async fn create(
        &self,
        host: &str,
        release: &str,
        _documents: &[serde_json::Value],
    ) -> Result<ControllerResponse> {
        let status = self.record("create", host, release).await;
        Ok(ControllerResponse {
            status,
            body: self.body(release),
        })
    }

    async fn update(
        &self,
        host: &str,
        release: &str,
        _documents: &[serde_json::Value],
    ) -> Result<ControllerResponse> {
        let status = self.record("update", host, release).await;
        Ok(ControllerResponse {
            status,
            body: self.body(release),
        })
    }

    async fn delete(&self, host: &str, release: &str) -> Result<u16> {
        Ok(self.record("delete", host, release).await)
    }

    async fn show_values(&self, release: &str, _chart_dir: &Path) -> Result<String> {
        self.record("show_values", "", release).await;
        Ok(self
            .state
            .lock()
            .unwrap()
            .values
            .get(release)
            .cloned()
            .unwrap_or_default())
    }
}

/// A registry wired to fakes
pub struct TestRegistry {
    /// Registry under test
    pub registry: Arc<Registry>,
    /// Scripted renderer
    pub renderer: Arc<FakeRenderer>,
    /// Scripted controller
    pub controller: Arc<FakeController>,
    /// Recording broker transport
    pub transport: MemoryTransport,
}

impl TestRegistry {
    /// Registry with the default routing table
    pub fn new() -> Self {
        Self::with_router(TopicRouter::default())
    }

    /// Registry with a custom routing table
    pub fn with_router(router: TopicRouter) -> Self {
        let renderer = Arc::new(FakeRenderer::default());
        let controller = Arc::new(FakeController::default());
        let transport = MemoryTransport::new();
        let registry = Registry::builder()
            .renderer(renderer.clone())
            .controller(controller.clone())
            .transport(Arc::new(transport.clone()))
            .default_host(DEFAULT_HOST)
            .router(router)
            .build()
            .expect("Failed to build registry");

        Self {
            registry: Arc::new(registry),
            renderer,
            controller,
            transport,
        }
    }
}
