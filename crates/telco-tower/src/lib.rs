//! Cell tower protocol responder for the telco simulation.
//!
//! A [`Tower`] is a single-task entity that answers signal-strength queries
//! from callers, admits or rejects call requests with a fixed probabilistic
//! policy, and appends every CDR snapshot it produces to its own event
//! stream topic.
//!
//! # Modules
//!
//! - [`signal`] -- Deterministic free-space path loss model
//! - [`admission`] -- Connect / fail / ignore draw bands
//! - [`message`] -- Protocol envelope and entity addresses
//! - [`publisher`] -- [`EventPublisher`] contract and the in-memory backend
//! - [`nats`] -- NATS-backed [`EventPublisher`]
//! - [`tower`] -- The tower itself and its mailbox loop
//! - [`error`] -- Error types shared by the modules above

pub mod admission;
pub mod error;
pub mod message;
pub mod nats;
pub mod publisher;
pub mod signal;
pub mod tower;

pub use admission::Admission;
pub use error::{PublishError, SignalError, TowerError};
pub use message::{EntityRef, Mailbox, Message};
pub use nats::NatsPublisher;
pub use publisher::{EventPublisher, InMemoryPublisher, PublishReceipt, PublishedRecord, StreamPublisher};
pub use signal::{PowerSettings, SignalModel};
pub use tower::{Handled, Tower, TowerHandle, TowerSettings};
