//! Common test utilities for daemon integration tests

#![allow(dead_code)]

use appmanager::client::DaemonClient;
use async_net::TcpListener;
use async_trait::async_trait;
use release_registry::{
    ControllerClient, ControllerResponse, Error, ManifestRenderer, MemoryTransport, Registry,
    RenderedManifest, Result,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Renderer that fails for charts named `missing`
pub struct StubRenderer;

#[async_trait]
impl ManifestRenderer for StubRenderer {
    async fn render(
        &self,
        release: &str,
        chart_ref: &str,
        _chart_dir: &Path,
    ) -> Result<RenderedManifest> {
        if chart_ref == "missing" {
            return Err(Error::Render {
                release: release.to_string(),
                message: "chart not found".to_string(),
            });
        }
        RenderedManifest::from_yaml(format!("kind: Deployment\nmetadata:\n  name: {}\n", release))
    }
}

/// Controller that hands out 10.0.0.x addresses and can reject releases
#[derive(Default)]
pub struct StubController {
    rejected: Mutex<HashMap<String, u16>>,
    next_host: Mutex<u8>,
}

impl StubController {
    /// Reply with `status` to every call about `release`
    pub fn reject(&self, release: &str, status: u16) {
        self.rejected
            .lock()
            .unwrap()
            .insert(release.to_string(), status);
    }

    fn reply(&self, release: &str) -> ControllerResponse {
        if let Some(status) = self.rejected.lock().unwrap().get(release) {
            return ControllerResponse {
                status: *status,
                body: String::new(),
            };
        }
        let mut next = self.next_host.lock().unwrap();
        *next += 1;
        ControllerResponse {
            status: 200,
            body: format!(r#"[{{"{}-pod": "10.0.0.{}"}}]"#, release, *next),
        }
    }
}

#[async_trait]
impl ControllerClient for StubController {
    async fn create(
        &self,
        _host: &str,
        release: &str,
        _documents: &[serde_json::Value],
    ) -> Result<ControllerResponse> {
        Ok(self.reply(release))
    }

    async fn update(
        &self,
        _host: &str,
        release: &str,
        _documents: &[serde_json::Value],
    ) -> Result<ControllerResponse> {
        Ok(self.reply(release))
    }

    async fn delete(&self, _host: &str, release: &str) -> Result<u16> {
        Ok(self
            .rejected
            .lock()
            .unwrap()
            .get(release)
            .copied()
            .unwrap_or(200))
    }

    async fn show_values(&self, _release: &str, _chart_dir: &Path) -> Result<String> {
        Ok("replicaCount: 1\n".to_string())
    }
}

/// A daemon serving a registry wired to stubs
pub struct TestDaemon {
    /// Control API address
    pub addr: String,
    /// Stub controller
    pub controller: Arc<StubController>,
    /// Recording broker transport
    pub transport: MemoryTransport,
    /// Server task, resolves after shutdown
    pub server: smol::Task<anyhow::Result<()>>,
}

impl TestDaemon {
    /// Start a daemon on an ephemeral port
    pub async fn start() -> anyhow::Result<Self> {
        let controller = Arc::new(StubController::default());
        let transport = MemoryTransport::new();
        let registry = Registry::builder()
            .renderer(Arc::new(StubRenderer))
            .controller(controller.clone())
            .transport(Arc::new(transport.clone()))
            .default_host("http://edge-default:8000")
            .build()?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?.to_string();
        let server = smol::spawn(appmanager::daemon::server::serve(
            listener,
            Arc::new(registry),
        ));

        Ok(Self {
            addr,
            controller,
            transport,
            server,
        })
    }

    /// Connect a client
    pub async fn client(&self) -> anyhow::Result<DaemonClient> {
        DaemonClient::connect(&self.addr).await
    }
}
