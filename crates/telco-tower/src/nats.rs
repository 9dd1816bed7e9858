//! NATS-backed event stream publisher.
//!
//! A single worker task owns the NATS client and drains a command queue in
//! order, so records for one topic reach the server in the order towers
//! published them, and a queued flush only runs after everything queued
//! before it.
//!
//! With `flush_each_publish` enabled the worker flushes after every record.
//! That trades batching for a per-record acknowledgement point, which keeps
//! small simulations observable in real time.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{PublishError, TowerError};
use crate::publisher::{EventPublisher, PublishReceipt};

type Completion = oneshot::Sender<Result<(), PublishError>>;

#[derive(Debug)]
enum Command {
    Publish {
        subject: String,
        payload: Vec<u8>,
        done: Completion,
    },
    Flush {
        done: Completion,
    },
}

/// Publisher that appends CDR snapshots to NATS subjects.
///
/// Cheap to clone; all clones feed the same worker.
#[derive(Debug, Clone)]
pub struct NatsPublisher {
    queue: mpsc::UnboundedSender<Command>,
}

impl NatsPublisher {
    /// Connect to a NATS server and start the publishing worker.
    ///
    /// # Errors
    ///
    /// Returns [`TowerError::Initialization`] if the connection cannot be
    /// established. Towers must not be built on top of a dead publisher.
    pub async fn connect(
        url: &str,
        flush_each_publish: bool,
    ) -> Result<(Self, JoinHandle<()>), TowerError> {
        info!(url = url, "connecting to NATS server");
        let client = async_nats::connect(url)
            .await
            .map_err(|e| TowerError::Initialization {
                message: format!("failed to connect to NATS at {url}: {e}"),
            })?;
        info!("NATS connection established");
        Ok(Self::new(client, flush_each_publish))
    }

    /// Start the publishing worker on an existing client.
    ///
    /// Must be called from within a tokio runtime. The worker stops once
    /// every clone of the publisher has been dropped and the queue is empty.
    pub fn new(client: async_nats::Client, flush_each_publish: bool) -> (Self, JoinHandle<()>) {
        let (queue, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(client, rx, flush_each_publish));
        (Self { queue }, worker)
    }

    fn enqueue(&self, command: Command) {
        if let Err(mpsc::error::SendError(command)) = self.queue.send(command) {
            let done = match command {
                Command::Publish { done, .. } | Command::Flush { done } => done,
            };
            let _ = done.send(Err(PublishError::Closed));
        }
    }
}

impl EventPublisher for NatsPublisher {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> PublishReceipt {
        let (done, receipt) = PublishReceipt::pending();
        self.enqueue(Command::Publish {
            subject: topic.to_owned(),
            payload,
            done,
        });
        receipt
    }

    async fn flush(&self) -> Result<(), PublishError> {
        let (done, receipt) = PublishReceipt::pending();
        self.enqueue(Command::Flush { done });
        receipt.wait().await
    }
}

async fn run_worker(
    client: async_nats::Client,
    mut rx: mpsc::UnboundedReceiver<Command>,
    flush_each_publish: bool,
) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Publish {
                subject,
                payload,
                done,
            } => {
                let mut result = client
                    .publish(subject.clone(), payload.into())
                    .await
                    .map_err(|e| PublishError::Transport(format!("failed to publish to {subject}: {e}")));
                if result.is_ok() && flush_each_publish {
                    result = flush_client(&client).await;
                }
                match &result {
                    Ok(()) => debug!(subject = subject, "CDR snapshot published"),
                    Err(e) => warn!(subject = subject, error = %e, "failed to publish CDR snapshot"),
                }
                let _ = done.send(result);
            }
            Command::Flush { done } => {
                let result = flush_client(&client).await;
                if let Err(e) = &result {
                    warn!(error = %e, "stream flush failed");
                }
                let _ = done.send(result);
            }
        }
    }
    debug!("NATS publisher worker stopped");
}

async fn flush_client(client: &async_nats::Client) -> Result<(), PublishError> {
    client
        .flush()
        .await
        .map_err(|e| PublishError::Transport(format!("flush failed: {e}")))
}
