//! WebSocket client for communicating with the daemon

use crate::protocol::{Request, Response};
use anyhow::{Context, Result, anyhow};
use async_net::TcpStream;
use async_tungstenite::tungstenite::Message;
use async_tungstenite::{WebSocketStream, client_async};
use futures::{SinkExt, StreamExt};
use tracing::debug;

/// Default daemon control address
pub const DEFAULT_DAEMON_ADDR: &str = "127.0.0.1:9410";

/// Daemon client for sending requests
pub struct DaemonClient {
    ws: WebSocketStream<TcpStream>,
}

impl DaemonClient {
    /// Connect to the daemon at `host:port`
    pub async fn connect(addr: &str) -> Result<Self> {
        let url = format!("ws://{}/", addr);

        let stream = TcpStream::connect(addr).await.with_context(|| {
            format!(
                "Cannot connect to appmanager daemon at {}.\n\n\
                 Start the daemon with:\n  appmanager-daemon --config <file>",
                addr
            )
        })?;

        let (ws, _) = client_async(&url, stream)
            .await
            .context("Failed to establish WebSocket connection")?;

        debug!("Connected to daemon at {}", addr);

        Ok(Self { ws })
    }

    /// Send a request to the daemon and get response
    pub async fn send_request(&mut self, request: Request) -> Result<Response> {
        let request_json = serde_json::to_string(&request)?;
        self.ws.send(Message::Text(request_json.into())).await?;

        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    let response: Response =
                        serde_json::from_str(&text).context("Failed to parse daemon response")?;
                    return Ok(response);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) => return Err(anyhow!("Connection closed by daemon")),
                Some(Ok(_)) => return Err(anyhow!("Unexpected message type from daemon")),
                Some(Err(e)) => return Err(anyhow!("WebSocket error: {}", e)),
                None => return Err(anyhow!("Connection closed unexpectedly")),
            }
        }
    }

    /// Close the connection
    pub async fn close(&mut self) -> Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}
