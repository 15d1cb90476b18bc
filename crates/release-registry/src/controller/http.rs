//! HTTP client for the edge controller REST API

use super::{ControllerClient, ControllerResponse};
use crate::error::{Error, Result};
use crate::renderer::HelmCli;
use async_trait::async_trait;
use reqwest::Method;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Edge controller client speaking the `/api/v1/{create,update,delete}/app` API
#[derive(Debug, Clone)]
pub struct EdgeControllerClient {
    http: reqwest::blocking::Client,
    helm: HelmCli,
}

impl EdgeControllerClient {
    /// Create a client
    ///
    /// `request_timeout` bounds each HTTP exchange.
    pub fn new(helm: HelmCli, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http, helm })
    }

    /// Endpoint URL for an operation on a release
    pub fn app_url(host: &str, operation: &str, release: &str) -> String {
        let host = host.trim().trim_end_matches('/');
        if host.contains("://") {
            format!("{}/api/v1/{}/app/{}", host, operation, release)
        } else {
            format!("http://{}/api/v1/{}/app/{}", host, operation, release)
        }
    }

    async fn send(
        &self,
        method: Method,
        url: String,
        release: &str,
        documents: Option<Vec<serde_json::Value>>,
    ) -> Result<ControllerResponse> {
        debug!("{} {}", method, url);
        let http = self.http.clone();
        let result = smol::unblock(move || {
            let mut request = http.request(method, &url);
            if let Some(documents) = &documents {
                request = request.json(documents);
            }
            let response = request.send()?;
            let status = response.status().as_u16();
            let body = response.text()?;
            Ok::<_, reqwest::Error>(ControllerResponse { status, body })
        })
        .await;

        let response = result.map_err(|e| Error::ControllerRequest {
            release: release.to_string(),
            message: e.to_string(),
        })?;
        info!("Controller answered {} for release {}", response.status, release);
        Ok(response)
    }
}

#[async_trait]
impl ControllerClient for EdgeControllerClient {
    async fn create(
        &self,
        host: &str,
        release: &str,
        documents: &[serde_json::Value],
    ) -> Result<ControllerResponse> {
        let url = Self::app_url(host, "create", release);
        self.send(Method::POST, url, release, Some(documents.to_vec()))
            .await
    }

    async fn update(
        &self,
        host: &str,
        release: &str,
        documents: &[serde_json::Value],
    ) -> Result<ControllerResponse> {
        let url = Self::app_url(host, "update", release);
        self.send(Method::PUT, url, release, Some(documents.to_vec()))
            .await
    }

    async fn delete(&self, host: &str, release: &str) -> Result<u16> {
        let url = Self::app_url(host, "delete", release);
        let response = self.send(Method::DELETE, url, release, None).await?;
        Ok(response.status)
    }

    async fn show_values(&self, release: &str, chart_dir: &Path) -> Result<String> {
        let chart = chart_dir.join(release).to_string_lossy().into_owned();
        self.helm
            .run(&["show", "values", chart.as_str()])
            .await
            .map_err(|message| Error::Render {
                release: release.to_string(),
                message,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_url() {
        assert_eq!(
            EdgeControllerClient::app_url("ec1-node-70:8080", "create", "app1"),
            "http://ec1-node-70:8080/api/v1/create/app/app1"
        );
        assert_eq!(
            EdgeControllerClient::app_url("https://ec1.example/", "delete", "app1"),
            "https://ec1.example/api/v1/delete/app/app1"
        );
    }

    #[smol_potat::test]
    async fn test_unreachable_controller() {
        let client =
            EdgeControllerClient::new(HelmCli::new("helm", None), Duration::from_secs(2)).unwrap();
        // Port 9 (discard) on localhost is not expected to accept connections
        let err = client.delete("127.0.0.1:9", "app1").await.unwrap_err();
        assert_eq!(err.kind(), "ControllerError");
        assert!(err.is_retryable());
    }
}
