//! Release registry and topic-routed snapshot publisher
//!
//! This crate keeps the authoritative in-memory view of which edge
//! applications ("releases") are deployed, on which edge controller, and at
//! which network address. Every successful install or uninstall is followed
//! by a full-membership snapshot published to the broker topic the release
//! was routed to.
//!
//! # Architecture
//!
//! - [`TopicRouter`] maps a controller host to a broker topic using a
//!   configurable rule table.
//! - [`Registry`] owns the release map behind a single lock. Rendering,
//!   controller HTTP calls and broker delivery never run while it is held.
//! - [`SnapshotPublisher`] keeps one ordered queue and worker per topic, so
//!   snapshots for a topic reach the transport in the order they were built.
//!
//! The collaborators the registry drives are traits so they can be swapped
//! out in tests:
//!
//! - [`ManifestRenderer`] (`helm template`, see [`HelmRenderer`])
//! - [`ControllerClient`] (edge controller REST API, see [`EdgeControllerClient`])
//! - [`BrokerTransport`] (STOMP, see [`StompTransport`])
//!
//! # Example
//!
//! ```no_run
//! use release_registry::{AppManagerConfig, InstallRequest, Registry};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = AppManagerConfig::from_file("appmanager.yaml").await?;
//! let registry = Registry::from_config(&config)?;
//!
//! let outcome = registry
//!     .install(InstallRequest::new("app1", "lightedge/nginx").host("ec1-node-70"))
//!     .await?;
//! println!("{} -> {}", outcome.release.name, outcome.topic);
//!
//! // Wait for queued snapshots to reach the broker before exiting
//! registry.publisher().flush().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod controller;
pub mod error;
pub mod models;
pub mod publisher;
pub mod registry;
pub mod renderer;
pub mod router;
pub mod timeout;
pub mod transport;

pub use config::AppManagerConfig;
pub use controller::{ControllerClient, ControllerResponse, EdgeControllerClient};
pub use error::{Error, Result, Stage};
pub use models::*;
pub use publisher::{PublishEvent, PublishObserver, SnapshotPublisher, Submission, TracingObserver};
pub use registry::{Registry, RegistryBuilder, Values};
pub use renderer::{HelmRenderer, ManifestRenderer, RenderedManifest};
pub use router::TopicRouter;
pub use transport::{BrokerTransport, MemoryTransport, StompTransport};

/// Re-export key types for convenience
pub mod prelude {
    pub use crate::{
        AppEntry, Error, InstallOutcome, InstallRequest, Registry, Release, ReleaseStatus,
        ReleaseSummary, Result, Snapshot, TopicRouter,
    };
}
