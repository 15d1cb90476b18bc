use anyhow::{Error, Result, anyhow};
use appmanager::client::DaemonClient;
use appmanager::protocol::{Request, Response};

/// Send one request to the daemon at `addr`
pub async fn request(addr: &str, request: Request) -> Result<Response> {
    let mut daemon = DaemonClient::connect(addr).await?;
    let response = daemon.send_request(request).await?;
    let _ = daemon.close().await;
    Ok(response)
}

/// Turn an unwanted response into an error naming its kind
pub fn unexpected(response: Response) -> Error {
    match response {
        Response::Error { kind, message, .. } => anyhow!("{}: {}", kind, message),
        other => anyhow!("Unexpected response from daemon: {:?}", other),
    }
}
