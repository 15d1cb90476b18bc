use crate::commands::client;
use anyhow::Result;
use appmanager::protocol::{Request, Response};

pub async fn run(addr: &str, name: &str) -> Result<()> {
    let request = Request::Uninstall {
        name: name.to_string(),
    };
    match client::request(addr, request).await? {
        Response::Uninstalled { release } => {
            println!("Release {} uninstalled (topic {})", release.name, release.topic);
            Ok(())
        }
        other => Err(client::unexpected(other)),
    }
}
