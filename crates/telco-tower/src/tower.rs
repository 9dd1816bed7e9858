//! The tower entity.
//!
//! A [`Tower`] keeps no per-call table. All call state travels in the CDR
//! attached to each message, and the tower acts as a transition function
//! over it:
//!
//! ```text
//! INIT --Hello--> CONNECT | RECONNECT | FAIL | (silence)
//! CONNECT/RECONNECT --Disconnect--> DISCONNECT
//! ```
//!
//! Handling a message never suspends. The signal model computation, the
//! admission draw, replies, and publish enqueues are all synchronous, so
//! [`Tower::handle`] can be driven directly in tests and from the mailbox
//! loop started by [`Tower::spawn`], which processes one message at a time
//! in arrival order.

use rand::Rng;
use serde::Deserialize;
use telco_types::{Cdr, CdrState, Position, TowerId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::admission::Admission;
use crate::error::{SignalError, TowerError};
use crate::message::{EntityRef, Message};
use crate::publisher::{DEFAULT_TOPIC_TEMPLATE, EventPublisher, TOPIC_ID_PLACEHOLDER, topic_for};
use crate::signal::SignalModel;

/// Received power at or below which a tower stays silent.
pub const MIN_RECEIVE_POWER: f64 = -100.0;

/// Radio and stream settings shared by every tower.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TowerSettings {
    /// Transmit power in linear units.
    #[serde(default = "default_transmit_power")]
    pub transmit_power: f64,

    /// Reference distance of the path loss model in meters.
    #[serde(default = "default_reference_distance")]
    pub reference_distance_m: f64,

    /// Stream topic template; `{id}` is replaced by the tower id.
    #[serde(default = "default_topic_template")]
    pub topic_template: String,
}

impl Default for TowerSettings {
    fn default() -> Self {
        Self {
            transmit_power: default_transmit_power(),
            reference_distance_m: default_reference_distance(),
            topic_template: default_topic_template(),
        }
    }
}

const fn default_transmit_power() -> f64 {
    100.0
}

const fn default_reference_distance() -> f64 {
    1.0
}

fn default_topic_template() -> String {
    String::from(DEFAULT_TOPIC_TEMPLATE)
}

/// What a tower did with one message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Handled {
    /// Answered `Setup`.
    Ready,
    /// Sent a `SignalReport`.
    Reported {
        /// Reported distance in meters.
        distance: f64,
        /// Reported received power.
        power: f64,
    },
    /// Signal too weak; stayed silent.
    OutOfRange {
        /// The computed received power.
        power: f64,
    },
    /// Admitted the call.
    Connected {
        /// Whether a second `RECONNECT` snapshot was published.
        reconnect: bool,
    },
    /// Rejected the call.
    Failed,
    /// Dropped the call request without a reply.
    Ignored,
    /// Recorded the end of a call.
    Finished,
    /// Received a message towers do not handle.
    Unhandled {
        /// Variant name of the offending message.
        kind: &'static str,
    },
}

/// A simulated base station.
#[derive(Debug)]
pub struct Tower<P, R> {
    id: TowerId,
    signal: SignalModel,
    topic: String,
    publisher: P,
    rng: R,
}

impl<P, R> Tower<P, R>
where
    P: EventPublisher,
    R: Rng + Send + 'static,
{
    /// Build a tower at `position`.
    ///
    /// The id is the first draw from `rng`; every later draw feeds call
    /// admission.
    ///
    /// # Errors
    ///
    /// Returns [`TowerError::Initialization`] for a topic template without
    /// an `{id}` placeholder, or [`TowerError::Signal`] for a non-finite
    /// position or unusable power settings.
    pub fn new(
        settings: &TowerSettings,
        position: Position,
        publisher: P,
        mut rng: R,
    ) -> Result<Self, TowerError> {
        if !settings.topic_template.contains(TOPIC_ID_PLACEHOLDER) {
            return Err(TowerError::Initialization {
                message: format!(
                    "topic template {:?} has no {TOPIC_ID_PLACEHOLDER} placeholder",
                    settings.topic_template
                ),
            });
        }

        let position = Position::new(position.x, position.y).map_err(SignalError::from)?;
        let mut signal = SignalModel::new(position);
        signal.set_power(settings.transmit_power, settings.reference_distance_m)?;

        let id = TowerId::generate(&mut rng);
        let topic = topic_for(&settings.topic_template, &id);
        debug!(
            tower_id = %id,
            x = position.x,
            y = position.y,
            topic = topic,
            "tower constructed"
        );

        Ok(Self {
            id,
            signal,
            topic,
            publisher,
            rng,
        })
    }

    /// The tower's fixed identifier.
    pub const fn id(&self) -> &TowerId {
        &self.id
    }

    /// The tower's signal model.
    pub const fn signal(&self) -> &SignalModel {
        &self.signal
    }

    /// The stream topic this tower appends to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Process one message. `me` is the address put into replies.
    pub fn handle(&mut self, message: Message, me: &EntityRef) -> Handled {
        match message {
            Message::Setup => {
                info!(tower_id = %self.id, "setup complete");
                Handled::Ready
            }
            Message::SignalReportRequest { x, y, source } => {
                self.on_signal_report_request(x, y, &source, me)
            }
            Message::Hello {
                caller,
                cdr,
                reconnect,
            } => self.on_hello(&caller, cdr, reconnect, me),
            Message::Disconnect { caller_id, cdr } => {
                info!(caller_id = %caller_id, tower_id = %self.id, "call finished");
                self.publish(&cdr);
                Handled::Finished
            }
            other => {
                let kind = other.kind();
                warn!(tower_id = %self.id, kind = kind, "protocol violation: unhandled message");
                Handled::Unhandled { kind }
            }
        }
    }

    fn on_signal_report_request(
        &self,
        x: f64,
        y: f64,
        source: &EntityRef,
        me: &EntityRef,
    ) -> Handled {
        let distance = self.signal.distance(x, y);
        let power = self.signal.power(x, y);
        if power > MIN_RECEIVE_POWER {
            let report = Message::SignalReport {
                distance,
                power,
                tower_id: self.id.clone(),
                tower_ref: me.clone(),
            };
            self.reply(source, report);
            Handled::Reported { distance, power }
        } else {
            debug!(tower_id = %self.id, power = power, "caller out of range");
            Handled::OutOfRange { power }
        }
    }

    fn on_hello(&mut self, caller: &EntityRef, cdr: Cdr, reconnect: bool, me: &EntityRef) -> Handled {
        let draw: f64 = self.rng.random();
        match Admission::from_draw(draw) {
            Admission::Connect => {
                let cdr = cdr.with_tower(self.id.clone()).with_state(CdrState::Connect);
                info!(caller_id = %cdr.caller_id, tower_id = %self.id, "call started");
                self.reply(
                    caller,
                    Message::Connect {
                        tower_id: self.id.clone(),
                        tower_ref: me.clone(),
                    },
                );
                self.publish(&cdr);
                if reconnect {
                    let cdr = cdr.with_state(CdrState::Reconnect);
                    self.publish(&cdr);
                }
                Handled::Connected { reconnect }
            }
            Admission::Fail => {
                let cdr = cdr.with_tower(self.id.clone()).with_state(CdrState::Fail);
                info!(caller_id = %cdr.caller_id, tower_id = %self.id, "call failed");
                self.publish(&cdr);
                self.reply(
                    caller,
                    Message::Fail {
                        tower_id: self.id.clone(),
                    },
                );
                Handled::Failed
            }
            Admission::Ignore => {
                debug!(caller_id = %cdr.caller_id, tower_id = %self.id, "call request ignored");
                Handled::Ignored
            }
        }
    }

    fn reply(&self, to: &EntityRef, message: Message) {
        let kind = message.kind();
        if !to.tell(message) {
            debug!(tower_id = %self.id, kind = kind, "reply dropped, recipient gone");
        }
    }

    /// Enqueue one CDR snapshot. The receipt is dropped; the publisher
    /// logs failures.
    fn publish(&self, cdr: &Cdr) {
        match serde_json::to_vec(cdr) {
            Ok(payload) => {
                debug!(tower_id = %self.id, state = %cdr.state, topic = self.topic, "CDR snapshot sent");
                drop(self.publisher.publish(&self.topic, payload));
            }
            Err(e) => {
                warn!(tower_id = %self.id, error = %e, "failed to serialize CDR snapshot");
            }
        }
    }

    /// Move the tower onto its own task.
    ///
    /// The task drains the mailbox one message at a time and ends after the
    /// last [`TowerHandle`] clone is dropped and the queue is empty.
    pub fn spawn(self) -> (TowerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = TowerHandle {
            id: self.id.clone(),
            me: EntityRef::new(&tx),
            tx,
        };
        let me = handle.me.clone();
        let task = tokio::spawn(self.run(rx, me));
        (handle, task)
    }

    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Message>, me: EntityRef) {
        while let Some(message) = inbox.recv().await {
            let outcome = self.handle(message, &me);
            debug!(tower_id = %self.id, outcome = ?outcome, "message handled");
        }
        info!(tower_id = %self.id, "tower stopped");
    }
}

/// Owning handle to a running tower.
///
/// The tower keeps running while at least one clone exists.
#[derive(Debug, Clone)]
pub struct TowerHandle {
    id: TowerId,
    me: EntityRef,
    tx: mpsc::UnboundedSender<Message>,
}

impl TowerHandle {
    /// The tower's identifier.
    pub const fn id(&self) -> &TowerId {
        &self.id
    }

    /// The tower's address.
    pub const fn address(&self) -> &EntityRef {
        &self.me
    }

    /// Deliver `message` to the tower.
    ///
    /// Returns `false` if the tower task has already stopped.
    pub fn tell(&self, message: Message) -> bool {
        self.tx.send(message).is_ok()
    }
}
