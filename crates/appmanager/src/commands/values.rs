use crate::commands::client;
use anyhow::Result;
use appmanager::protocol::{Request, Response};

pub async fn run(addr: &str, name: &str) -> Result<()> {
    let request = Request::GetValues {
        name: name.to_string(),
    };
    match client::request(addr, request).await? {
        Response::Values { values } => {
            println!("{}", serde_json::to_string_pretty(&values)?);
            Ok(())
        }
        other => Err(client::unexpected(other)),
    }
}
