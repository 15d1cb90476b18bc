//! WebSocket server for the app manager daemon

use crate::daemon::handlers;
use crate::protocol::{Request, Response};
use anyhow::{Context, Result};
use async_channel::Sender;
use async_net::{TcpListener, TcpStream};
use async_tungstenite::accept_async;
use async_tungstenite::tungstenite::Message;
use futures::{SinkExt, StreamExt};
use release_registry::Registry;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Daemon state shared between connections
///
/// The registry does its own locking, so no mutex is needed here.
pub struct DaemonState {
    /// Release registry
    pub registry: Arc<Registry>,
    /// Stops the accept loop
    pub shutdown: Sender<()>,
}

/// Serve the control API on `listener` until shut down
///
/// On shutdown every queued snapshot is handed to the broker before this
/// returns.
pub async fn serve(listener: TcpListener, registry: Arc<Registry>) -> Result<()> {
    let (shutdown, shutdown_rx) = async_channel::bounded(1);
    let state = Arc::new(DaemonState {
        registry: registry.clone(),
        shutdown,
    });

    let addr = listener
        .local_addr()
        .context("Failed to read listen address")?;
    info!("App manager daemon listening on ws://{}", addr);

    loop {
        let accepted = smol::future::or(async { Some(listener.accept().await) }, async {
            let _ = shutdown_rx.recv().await;
            None
        })
        .await;

        match accepted {
            Some(Ok((stream, peer_addr))) => {
                debug!("New connection from {}", peer_addr);
                let state = state.clone();

                smol::spawn(async move {
                    if let Err(e) = handle_connection(stream, state).await {
                        error!("Connection handler error: {}", e);
                    }
                })
                .detach();
            }
            Some(Err(e)) => {
                error!("Failed to accept connection: {}", e);
            }
            None => break,
        }
    }

    info!("Shutting down, draining publish queues");
    registry.publisher().shutdown().await;
    Ok(())
}

/// Handle a WebSocket connection
async fn handle_connection(stream: TcpStream, state: Arc<DaemonState>) -> Result<()> {
    let ws_stream = accept_async(stream)
        .await
        .context("Failed to accept WebSocket connection")?;

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let response = match serde_json::from_str::<Request>(&text) {
                    Ok(request) => handlers::handle_request(request, &state).await,
                    Err(e) => {
                        error!("Failed to parse request: {}", e);
                        Response::Error {
                            kind: "InvalidRequest".to_string(),
                            release: None,
                            message: format!("Invalid request format: {}", e),
                        }
                    }
                };

                let response_text = serde_json::to_string(&response)?;
                ws_sender.send(Message::Text(response_text.into())).await?;
            }
            Ok(Message::Close(_)) => {
                debug!("Client requested close");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("WebSocket error: {}", e);
                break;
            }
        }
    }

    debug!("Connection closed");
    Ok(())
}
