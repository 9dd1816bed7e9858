//! CDR event stream publishing.
//!
//! Towers hand serialized CDR snapshots to an [`EventPublisher`]. Publishing
//! only enqueues: the call returns a [`PublishReceipt`] immediately and the
//! outcome arrives later. Towers drop their receipts; failures are logged by
//! the publisher itself and never reach the protocol path.
//!
//! [`EventPublisher::flush`] is the synchronization point. Once it resolves,
//! every publish issued before it has either been accepted by the transport
//! or has failed.
//!
//! # Topics
//!
//! One topic per tower, built from a template with an `{id}` placeholder
//! (default [`DEFAULT_TOPIC_TEMPLATE`]). Records carry a payload only, and
//! order within a topic is the order of `publish` calls.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};

use telco_types::{Cdr, TowerId};
use tokio::sync::oneshot;
use tracing::warn;

use crate::error::PublishError;
use crate::nats::NatsPublisher;

/// Topic template used when none is configured.
pub const DEFAULT_TOPIC_TEMPLATE: &str = "telco:tower{id}";

/// Placeholder replaced by the tower id in a topic template.
pub const TOPIC_ID_PLACEHOLDER: &str = "{id}";

/// Substitute `tower` into `template`.
pub fn topic_for(template: &str, tower: &TowerId) -> String {
    template.replace(TOPIC_ID_PLACEHOLDER, tower.as_str())
}

/// An append-only sink for CDR snapshots.
pub trait EventPublisher: Clone + Send + Sync + 'static {
    /// Enqueue `payload` for `topic` without waiting for the transport.
    fn publish(&self, topic: &str, payload: Vec<u8>) -> PublishReceipt;

    /// Resolve once every earlier publish has been accepted or has failed.
    fn flush(&self) -> impl Future<Output = Result<(), PublishError>> + Send;
}

/// Completion handle for one publish.
///
/// Dropping the receipt is fine; the record is still sent.
#[derive(Debug)]
pub struct PublishReceipt {
    rx: oneshot::Receiver<Result<(), PublishError>>,
}

impl PublishReceipt {
    /// A receipt plus the sender that completes it.
    pub fn pending() -> (oneshot::Sender<Result<(), PublishError>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// A receipt that is already complete.
    pub fn ready(result: Result<(), PublishError>) -> Self {
        let (tx, receipt) = Self::pending();
        let _ = tx.send(result);
        receipt
    }

    /// Wait for the outcome of the publish.
    ///
    /// # Errors
    ///
    /// Returns the transport's [`PublishError`], or
    /// [`PublishError::Closed`] if the publisher went away first.
    pub async fn wait(self) -> Result<(), PublishError> {
        self.rx.await.unwrap_or(Err(PublishError::Closed))
    }
}

/// One record captured by the [`InMemoryPublisher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedRecord {
    /// Topic the record was appended to.
    pub topic: String,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
}

impl PublishedRecord {
    /// Decode the payload as a CDR snapshot.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the payload is not a CDR.
    pub fn cdr(&self) -> Result<Cdr, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

#[derive(Debug, Default)]
struct MemoryLog {
    records: VecDeque<PublishedRecord>,
    capacity: Option<usize>,
    evicted: u64,
    failing: bool,
}

/// Publisher that appends to a shared in-process log.
///
/// Clones share the same log. Used in tests and when the simulation runs
/// without a stream transport. A bounded log keeps only the newest
/// records.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPublisher {
    log: Arc<Mutex<MemoryLog>>,
}

impl InMemoryPublisher {
    /// An empty, healthy, unbounded publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// A publisher that keeps at most `capacity` records, evicting the
    /// oldest first. A capacity of zero keeps nothing.
    pub fn bounded(capacity: usize) -> Self {
        let publisher = Self::new();
        if let Ok(mut log) = publisher.log.lock() {
            log.capacity = Some(capacity);
        }
        publisher
    }

    /// Records evicted to stay within capacity.
    pub fn evicted(&self) -> u64 {
        self.log.lock().map(|log| log.evicted).unwrap_or(0)
    }

    /// A publisher whose every publish fails with a transport error.
    pub fn failing() -> Self {
        let publisher = Self::new();
        publisher.set_failing(true);
        publisher
    }

    /// Switch failure injection on or off.
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut log) = self.log.lock() {
            log.failing = failing;
        }
    }

    /// Every record still held, in append order.
    pub fn records(&self) -> Vec<PublishedRecord> {
        self.log
            .lock()
            .map(|log| log.records.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Records appended to `topic`, in append order.
    pub fn records_for(&self, topic: &str) -> Vec<PublishedRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.topic == topic)
            .collect()
    }

    /// Number of records still held.
    pub fn len(&self) -> usize {
        self.log.lock().map(|log| log.records.len()).unwrap_or(0)
    }

    /// Whether nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventPublisher for InMemoryPublisher {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> PublishReceipt {
        let result = match self.log.lock() {
            Ok(log) if log.failing => {
                Err(PublishError::Transport(String::from("injected failure")))
            }
            Ok(mut log) => {
                log.records.push_back(PublishedRecord {
                    topic: topic.to_owned(),
                    payload,
                });
                if let Some(capacity) = log.capacity {
                    while log.records.len() > capacity {
                        log.records.pop_front();
                        log.evicted = log.evicted.saturating_add(1);
                    }
                }
                Ok(())
            }
            Err(e) => Err(PublishError::Transport(format!("log poisoned: {e}"))),
        };
        if let Err(e) = &result {
            warn!(topic = topic, error = %e, "failed to publish CDR snapshot");
        }
        PublishReceipt::ready(result)
    }

    async fn flush(&self) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Runtime choice between the stream backends.
#[derive(Debug, Clone)]
pub enum StreamPublisher {
    /// Publish to a NATS server.
    Nats(NatsPublisher),
    /// Keep records in process.
    Memory(InMemoryPublisher),
}

impl EventPublisher for StreamPublisher {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> PublishReceipt {
        match self {
            Self::Nats(p) => p.publish(topic, payload),
            Self::Memory(p) => p.publish(topic, payload),
        }
    }

    async fn flush(&self) -> Result<(), PublishError> {
        match self {
            Self::Nats(p) => p.flush().await,
            Self::Memory(p) => p.flush().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_substitutes_the_tower_id() {
        let id = TowerId::from_u32(0x00c0_ffee);
        assert_eq!(topic_for(DEFAULT_TOPIC_TEMPLATE, &id), "telco:tower00c0ffee");
        assert_eq!(topic_for("cdr.{id}.events", &id), "cdr.00c0ffee.events");
    }

    #[tokio::test]
    async fn memory_publisher_appends_in_order() {
        let publisher = InMemoryPublisher::new();
        for n in 0..3_u8 {
            let receipt = publisher.publish("t", vec![n]);
            assert!(receipt.wait().await.is_ok());
        }
        let payloads: Vec<Vec<u8>> = publisher.records().into_iter().map(|r| r.payload).collect();
        assert_eq!(payloads, vec![vec![0], vec![1], vec![2]]);
        assert!(publisher.flush().await.is_ok());
    }

    #[tokio::test]
    async fn clones_share_one_log() {
        let publisher = InMemoryPublisher::new();
        let clone = publisher.clone();
        drop(clone.publish("a", Vec::new()));
        drop(publisher.publish("b", Vec::new()));
        assert_eq!(publisher.len(), 2);
        assert_eq!(clone.records_for("a").len(), 1);
    }

    #[tokio::test]
    async fn failing_publisher_reports_through_the_receipt() {
        let publisher = InMemoryPublisher::failing();
        let result = publisher.publish("t", vec![1]).wait().await;
        assert!(matches!(result, Err(PublishError::Transport(_))));
        assert!(publisher.is_empty());
    }

    #[test]
    fn bounded_publisher_keeps_the_newest_records() {
        let publisher = InMemoryPublisher::bounded(3);
        for n in 0..5_u8 {
            drop(publisher.publish("t", vec![n]));
        }
        let payloads: Vec<Vec<u8>> = publisher.records().into_iter().map(|r| r.payload).collect();
        assert_eq!(payloads, vec![vec![2], vec![3], vec![4]]);
        assert_eq!(publisher.len(), 3);
        assert_eq!(publisher.evicted(), 2);
    }

    #[test]
    fn unbounded_publisher_never_evicts() {
        let publisher = InMemoryPublisher::new();
        for n in 0..100_u8 {
            drop(publisher.publish("t", vec![n]));
        }
        assert_eq!(publisher.len(), 100);
        assert_eq!(publisher.evicted(), 0);
    }

    #[tokio::test]
    async fn dropped_sender_reads_as_closed() {
        let (tx, receipt) = PublishReceipt::pending();
        drop(tx);
        assert!(matches!(receipt.wait().await, Err(PublishError::Closed)));
    }
}
