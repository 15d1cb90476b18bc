//! Broker transports
//!
//! A transport delivers one payload to one topic. It knows nothing about
//! ordering or retries; the [`SnapshotPublisher`](crate::SnapshotPublisher)
//! serializes calls per topic and reports failures.

pub mod memory;
pub mod stomp;

pub use memory::{Delivery, MemoryTransport};
pub use stomp::StompTransport;

use crate::error::Result;
use async_trait::async_trait;

/// Sends a single message on a named topic
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// Deliver `payload` to `topic`
    async fn send(&self, topic: &str, payload: &[u8]) -> Result<()>;
}
