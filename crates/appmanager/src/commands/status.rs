use crate::commands::client;
use anyhow::Result;
use appmanager::protocol::{Request, Response};

pub async fn run(addr: &str, name: &str, manifest: bool) -> Result<()> {
    let name = name.to_string();
    if !manifest {
        return match client::request(addr, Request::Status { name }).await? {
            Response::Status { release } => {
                println!("NAME:    {}", release.name);
                println!("STATUS:  {:?}", release.status);
                println!("CHART:   {}", release.chart_ref);
                println!("ADDRESS: {}", release.address.as_deref().unwrap_or("-"));
                println!("TOPIC:   {}", release.topic);
                Ok(())
            }
            other => Err(client::unexpected(other)),
        };
    }

    match client::request(addr, Request::Get { name }).await? {
        Response::Release { release } => {
            println!("NAME:       {}", release.name);
            println!("STATUS:     {:?}", release.status);
            println!("CHART:      {}", release.chart_ref);
            println!("CHART DIR:  {}", release.chart_dir.display());
            println!("CONTROLLER: {}", release.controller_host);
            println!("ADDRESS:    {}", release.address.as_deref().unwrap_or("-"));
            println!("TOPIC:      {}", release.topic);
            println!("REVISION:   {}", release.revision);
            println!("UPDATED:    {}", release.updated_at.to_rfc3339());
            println!();
            println!("MANIFEST:");
            println!("{}", release.manifest.trim_end());
            Ok(())
        }
        other => Err(client::unexpected(other)),
    }
}
