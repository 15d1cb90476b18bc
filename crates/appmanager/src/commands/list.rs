use crate::commands::client;
use anyhow::Result;
use appmanager::protocol::{Request, Response};
use comfy_table::{Cell, Color, Table};
use release_registry::{ReleaseStatus, ReleaseSummary};

pub async fn run(addr: &str, format: &str) -> Result<()> {
    if format != "table" && format != "json" {
        anyhow::bail!("Invalid format: {}. Must be 'table' or 'json'", format);
    }

    let releases = match client::request(addr, Request::ListReleases).await? {
        Response::Releases { releases } => releases,
        other => return Err(client::unexpected(other)),
    };

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&releases)?);
    } else if releases.is_empty() {
        println!("No releases");
    } else {
        println!("{}", releases_table(&releases));
    }
    Ok(())
}

fn releases_table(releases: &[ReleaseSummary]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["NAME", "STATUS", "CHART", "ADDRESS", "TOPIC"]);

    for release in releases {
        let (status_str, status_color) = match release.status {
            ReleaseStatus::Deployed => ("deployed", Color::Green),
            ReleaseStatus::Deleted => ("deleted", Color::DarkGrey),
        };
        table.add_row(vec![
            Cell::new(&release.name),
            Cell::new(status_str).fg(status_color),
            Cell::new(&release.chart_ref),
            Cell::new(release.address.as_deref().unwrap_or("-")),
            Cell::new(&release.topic),
        ]);
    }
    table
}
