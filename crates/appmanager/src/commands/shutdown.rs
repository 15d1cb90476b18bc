use crate::commands::client;
use anyhow::Result;
use appmanager::protocol::{Request, Response};

pub async fn run(addr: &str) -> Result<()> {
    match client::request(addr, Request::Shutdown).await? {
        Response::Success => {
            println!("Daemon at {} is shutting down", addr);
            Ok(())
        }
        other => Err(client::unexpected(other)),
    }
}
