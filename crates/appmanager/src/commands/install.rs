use crate::commands::client;
use anyhow::Result;
use appmanager::protocol::{Request, Response};
use release_registry::InstallRequest;
use std::path::PathBuf;

pub async fn run(
    addr: &str,
    name: String,
    chart: String,
    host: Option<String>,
    chart_dir: Option<PathBuf>,
    upgrade: bool,
) -> Result<()> {
    let request = InstallRequest {
        name,
        chart_ref: chart,
        chart_dir,
        controller_host: host,
        upgrade,
    };

    match client::request(addr, Request::install(&request)).await? {
        Response::Installed {
            release,
            topic,
            snapshot,
        } => {
            let verb = if release.revision > 1 { "upgraded" } else { "installed" };
            println!("Release {} {} (revision {})", release.name, verb, release.revision);
            println!("  chart:      {}", release.chart_ref);
            println!("  controller: {}", release.controller_host);
            println!("  address:    {}", release.address.as_deref().unwrap_or("-"));
            println!("  topic:      {} ({} apps)", topic, snapshot.len());
            Ok(())
        }
        other => Err(client::unexpected(other)),
    }
}
