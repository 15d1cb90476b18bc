//! Edge application manager
//!
//! The daemon owns a [`release_registry::Registry`] and exposes it over a
//! WebSocket control API; the `appmanager` CLI is a thin client of that API.
//!
//! # Example
//!
//! ```no_run
//! use appmanager::client::DaemonClient;
//! use appmanager::protocol::{Request, Response};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut daemon = DaemonClient::connect("127.0.0.1:9410").await?;
//! if let Response::Releases { releases } = daemon.send_request(Request::ListReleases).await? {
//!     for release in releases {
//!         println!("{} {:?}", release.name, release.status);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod daemon;
pub mod logging;
pub mod protocol;
