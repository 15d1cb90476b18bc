//! In-memory transport

use super::BrokerTransport;
use crate::error::{Error, Result};
use crate::models::Snapshot;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A payload handed to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Destination topic
    pub topic: String,
    /// Payload bytes
    pub payload: Vec<u8>,
}

#[derive(Default)]
struct MemoryState {
    deliveries: Vec<Delivery>,
    failures: HashMap<String, usize>,
    delays: HashMap<String, Vec<Duration>>,
}

/// Transport that records deliveries instead of sending them
///
/// Failures and per-delivery delays can be scripted per topic.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    /// Create an empty transport
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next `count` sends to `topic`
    pub fn fail_next(&self, topic: &str, count: usize) {
        self.state().failures.insert(topic.to_string(), count);
    }

    /// Delay successive sends to `topic` by the given durations
    pub fn delay_next(&self, topic: &str, delays: Vec<Duration>) {
        self.state().delays.insert(topic.to_string(), delays);
    }

    /// Every successful delivery, in delivery order
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.state().deliveries.clone()
    }

    /// Snapshots delivered to one topic, in delivery order
    pub fn snapshots(&self, topic: &str) -> Vec<Snapshot> {
        self.state()
            .deliveries
            .iter()
            .filter(|delivery| delivery.topic == topic)
            .filter_map(|delivery| serde_json::from_slice(&delivery.payload).ok())
            .collect()
    }

    /// Most recent snapshot delivered to a topic
    pub fn latest(&self, topic: &str) -> Option<Snapshot> {
        self.snapshots(topic).pop()
    }
}

#[async_trait]
impl BrokerTransport for MemoryTransport {
    async fn send(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let delay = {
            let mut state = self.state();
            state.delays.get_mut(topic).and_then(|delays| {
                if delays.is_empty() {
                    None
                } else {
                    Some(delays.remove(0))
                }
            })
        };
        if let Some(delay) = delay {
            smol::Timer::after(delay).await;
        }

        let mut state = self.state();
        if let Some(remaining) = state.failures.get_mut(topic) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::Transport {
                    topic: topic.to_string(),
                    message: "scripted failure".to_string(),
                });
            }
        }

        state.deliveries.push(Delivery {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}
