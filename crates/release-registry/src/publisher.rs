//! Ordered snapshot publishing
//!
//! Every topic gets its own queue and worker task. Submitting a snapshot only
//! serializes it and pushes it onto the topic's queue, so it never blocks the
//! caller on the network. The worker hands payloads to the transport strictly
//! in submission order, one at a time, each bounded by the publish timeout.
//! Failed or timed-out deliveries are reported to the observer and dropped;
//! the next snapshot on the topic supersedes them anyway.

use crate::error::{Error, Result};
use crate::models::Snapshot;
use crate::timeout::with_timeout;
use crate::transport::BrokerTransport;
use async_channel::{Receiver, Sender};
use futures::channel::oneshot;
use smol::Task;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Outcome of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishEvent {
    /// The transport accepted the snapshot
    Delivered {
        /// Destination topic
        topic: String,
        /// Per-topic submission number, starting at 1
        sequence: u64,
    },
    /// The transport reported an error
    Failed {
        /// Destination topic
        topic: String,
        /// Per-topic submission number
        sequence: u64,
        /// Transport error message
        error: String,
    },
    /// The transport did not finish within the publish timeout
    TimedOut {
        /// Destination topic
        topic: String,
        /// Per-topic submission number
        sequence: u64,
    },
}

impl PublishEvent {
    /// Destination topic
    pub fn topic(&self) -> &str {
        match self {
            PublishEvent::Delivered { topic, .. }
            | PublishEvent::Failed { topic, .. }
            | PublishEvent::TimedOut { topic, .. } => topic,
        }
    }

    /// Per-topic submission number
    pub fn sequence(&self) -> u64 {
        match self {
            PublishEvent::Delivered { sequence, .. }
            | PublishEvent::Failed { sequence, .. }
            | PublishEvent::TimedOut { sequence, .. } => *sequence,
        }
    }
}

/// Receives delivery outcomes
pub trait PublishObserver: Send + Sync {
    /// Called once per delivery attempt, from the topic's worker
    fn on_event(&self, event: &PublishEvent);
}

/// Observer that logs outcomes
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PublishObserver for TracingObserver {
    fn on_event(&self, event: &PublishEvent) {
        match event {
            PublishEvent::Delivered { topic, sequence } => {
                info!("Published snapshot #{} on {}", sequence, topic);
            }
            PublishEvent::Failed {
                topic,
                sequence,
                error,
            } => {
                error!("Failed to publish snapshot #{} on {}: {}", sequence, topic, error);
            }
            PublishEvent::TimedOut { topic, sequence } => {
                warn!("Publishing snapshot #{} on {} timed out", sequence, topic);
            }
        }
    }
}

enum Outbound {
    Snapshot { sequence: u64, payload: Vec<u8> },
    Flush(oneshot::Sender<()>),
}

struct TopicQueue {
    sender: Sender<Outbound>,
    next_sequence: u64,
    worker: Task<()>,
}

/// A snapshot accepted for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Destination topic
    pub topic: String,
    /// Per-topic submission number
    pub sequence: u64,
}

/// Per-topic ordered publisher
pub struct SnapshotPublisher {
    transport: Arc<dyn BrokerTransport>,
    observer: Arc<dyn PublishObserver>,
    timeout: Duration,
    queues: Mutex<HashMap<String, TopicQueue>>,
    closed: AtomicBool,
}

impl SnapshotPublisher {
    /// Create a publisher that logs delivery outcomes
    pub fn new(transport: Arc<dyn BrokerTransport>, timeout: Duration) -> Self {
        Self::with_observer(transport, Arc::new(TracingObserver), timeout)
    }

    /// Create a publisher reporting to a custom observer
    pub fn with_observer(
        transport: Arc<dyn BrokerTransport>,
        observer: Arc<dyn PublishObserver>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            observer,
            timeout,
            queues: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn queues(&self) -> MutexGuard<'_, HashMap<String, TopicQueue>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a snapshot for delivery on a topic
    ///
    /// Does not wait for the network. Snapshots submitted for the same topic
    /// reach the transport in submission order. Fails once the publisher has
    /// been shut down.
    pub fn submit(&self, topic: &str, snapshot: &Snapshot) -> Result<Submission> {
        let payload = snapshot.to_payload()?;
        let mut queues = self.queues();
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Transport {
                topic: topic.to_string(),
                message: "publisher is shut down".to_string(),
            });
        }

        if queues.get(topic).is_some_and(|queue| queue.sender.is_closed()) {
            queues.remove(topic);
        }
        let queue = queues
            .entry(topic.to_string())
            .or_insert_with(|| self.start_worker(topic));

        let sequence = queue.next_sequence;
        queue
            .sender
            .try_send(Outbound::Snapshot { sequence, payload })
            .map_err(|_| Error::Transport {
                topic: topic.to_string(),
                message: "publish queue closed".to_string(),
            })?;
        queue.next_sequence += 1;

        debug!(
            "Queued snapshot #{} on {} ({} apps)",
            sequence,
            topic,
            snapshot.len()
        );
        Ok(Submission {
            topic: topic.to_string(),
            sequence,
        })
    }

    fn start_worker(&self, topic: &str) -> TopicQueue {
        let (sender, receiver) = async_channel::unbounded();
        let worker = smol::spawn(drain_topic(
            topic.to_string(),
            receiver,
            self.transport.clone(),
            self.observer.clone(),
            self.timeout,
        ));
        debug!("Started publish worker for {}", topic);
        TopicQueue {
            sender,
            next_sequence: 1,
            worker,
        }
    }

    /// Topics that have had at least one submission
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.queues().keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Wait until everything submitted so far has been handed to the transport
    pub async fn flush(&self) {
        let pending: Vec<oneshot::Receiver<()>> = {
            let queues = self.queues();
            queues
                .values()
                .filter_map(|queue| {
                    let (tx, rx) = oneshot::channel();
                    queue.sender.try_send(Outbound::Flush(tx)).ok().map(|_| rx)
                })
                .collect()
        };
        for rx in pending {
            let _ = rx.await;
        }
    }

    /// Stop accepting snapshots and wait for queued ones to drain
    pub async fn shutdown(&self) {
        let queues: Vec<TopicQueue> = {
            let mut queues = self.queues();
            self.closed.store(true, Ordering::Release);
            queues.drain().map(|(_, queue)| queue).collect()
        };
        for queue in queues {
            queue.sender.close();
            queue.worker.await;
        }
        info!("Snapshot publisher stopped");
    }
}

async fn drain_topic(
    topic: String,
    receiver: Receiver<Outbound>,
    transport: Arc<dyn BrokerTransport>,
    observer: Arc<dyn PublishObserver>,
    timeout: Duration,
) {
    while let Ok(outbound) = receiver.recv().await {
        let (sequence, payload) = match outbound {
            Outbound::Snapshot { sequence, payload } => (sequence, payload),
            Outbound::Flush(done) => {
                let _ = done.send(());
                continue;
            }
        };

        let event = match with_timeout(timeout, transport.send(&topic, &payload)).await {
            Some(Ok(())) => PublishEvent::Delivered {
                topic: topic.clone(),
                sequence,
            },
            Some(Err(e)) => PublishEvent::Failed {
                topic: topic.clone(),
                sequence,
                error: e.to_string(),
            },
            None => PublishEvent::TimedOut {
                topic: topic.clone(),
                sequence,
            },
        };
        observer.on_event(&event);
    }
    debug!("Publish worker for {} exiting", topic);
}
