//! WebSocket request handlers for the daemon

use crate::daemon::server::DaemonState;
use crate::protocol::{Request, Response};
use release_registry::InstallRequest;
use tracing::{debug, info, warn};

/// Handle a request from a client
///
/// Registry errors become [`Response::Error`] carrying the error kind.
pub async fn handle_request(request: Request, state: &DaemonState) -> Response {
    debug!("Handling request: {:?}", request);
    let registry = &state.registry;

    let result = match request {
        Request::ListReleases => Ok(Response::Releases {
            releases: registry.list().await,
        }),

        Request::Install {
            name,
            chart,
            host,
            chart_dir,
            upgrade,
        } => {
            info!("Installing {} from {}", name, chart);
            let request = InstallRequest {
                name,
                chart_ref: chart,
                chart_dir,
                controller_host: host,
                upgrade,
            };
            registry
                .install(request)
                .await
                .map(|outcome| Response::Installed {
                    release: outcome.release,
                    topic: outcome.topic,
                    snapshot: outcome.snapshot,
                })
        }

        Request::Uninstall { name } => {
            info!("Uninstalling {}", name);
            registry
                .uninstall(&name)
                .await
                .map(|release| Response::Uninstalled { release })
        }

        Request::Status { name } => registry
            .status(&name)
            .await
            .map(|release| Response::Status { release }),

        Request::Get { name } => registry
            .get(&name)
            .await
            .map(|release| Response::Release { release }),

        Request::GetValues { name } => registry
            .get_values(&name)
            .await
            .map(|values| Response::Values { values }),

        Request::Shutdown => {
            info!("Shutdown requested");
            let _ = state.shutdown.try_send(());
            Ok(Response::Success)
        }
    };

    result.unwrap_or_else(|e| {
        warn!("Request failed: {}", e);
        Response::from(&e)
    })
}
