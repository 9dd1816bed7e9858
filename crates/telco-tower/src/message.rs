//! Protocol envelope exchanged between callers and towers.
//!
//! Entities talk by dropping [`Message`] values into each other's mailbox.
//! An [`EntityRef`] is only an address: holding one does not keep the
//! entity alive, and telling a stopped entity simply fails.

use telco_types::{CallerId, Cdr, TowerId};
use tokio::sync::mpsc;

/// Address of an entity's mailbox.
#[derive(Debug, Clone)]
pub struct EntityRef {
    tx: mpsc::WeakUnboundedSender<Message>,
}

impl EntityRef {
    /// Address the mailbox fed by `tx`.
    pub fn new(tx: &mpsc::UnboundedSender<Message>) -> Self {
        Self { tx: tx.downgrade() }
    }

    /// Deliver `message` without waiting.
    ///
    /// Returns `false` when the addressed entity has stopped.
    pub fn tell(&self, message: Message) -> bool {
        self.tx
            .upgrade()
            .is_some_and(|tx| tx.send(message).is_ok())
    }

    /// Whether both references address the same mailbox.
    pub fn same_entity(&self, other: &Self) -> bool {
        match (self.tx.upgrade(), other.tx.upgrade()) {
            (Some(a), Some(b)) => a.same_channel(&b),
            _ => false,
        }
    }
}

/// A mailbox owned by a long-lived entity such as a caller.
///
/// The mailbox keeps its own sender, so it stays open for as long as the
/// owner holds it.
#[derive(Debug)]
pub struct Mailbox {
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl Mailbox {
    /// Open an empty mailbox.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// Address other entities can reply to.
    pub fn address(&self) -> EntityRef {
        EntityRef::new(&self.tx)
    }

    /// Wait for the next message.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Take the next message if one is already queued.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }

    /// Drop everything currently queued, returning how many were dropped.
    pub fn drain(&mut self) -> usize {
        let mut dropped = 0_usize;
        while self.rx.try_recv().is_ok() {
            dropped = dropped.saturating_add(1);
        }
        dropped
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Every message of the caller/tower protocol.
#[derive(Debug, Clone)]
pub enum Message {
    /// Tower readiness check.
    Setup,

    /// Caller asks a tower how well it hears the point `(x, y)`.
    SignalReportRequest {
        /// Caller x coordinate in meters.
        x: f64,
        /// Caller y coordinate in meters.
        y: f64,
        /// Where to send the report.
        source: EntityRef,
    },

    /// Tower answers a signal query it can serve.
    SignalReport {
        /// Distance from the tower in meters.
        distance: f64,
        /// Received power at the caller.
        power: f64,
        /// The reporting tower.
        tower_id: TowerId,
        /// Address of the reporting tower.
        tower_ref: EntityRef,
    },

    /// Caller asks a tower to carry a call.
    Hello {
        /// Where to send the admission reply.
        caller: EntityRef,
        /// The call's record as the caller sees it.
        cdr: Cdr,
        /// Whether an earlier attempt of this call did not get through.
        reconnect: bool,
    },

    /// Tower admitted the call.
    Connect {
        /// The admitting tower.
        tower_id: TowerId,
        /// Address of the admitting tower.
        tower_ref: EntityRef,
    },

    /// Tower rejected the call.
    Fail {
        /// The rejecting tower.
        tower_id: TowerId,
    },

    /// Caller hung up.
    Disconnect {
        /// The caller that hung up.
        caller_id: CallerId,
        /// The call's terminal record.
        cdr: Cdr,
    },
}

impl Message {
    /// Variant name, for logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Setup => "Setup",
            Self::SignalReportRequest { .. } => "SignalReportRequest",
            Self::SignalReport { .. } => "SignalReport",
            Self::Hello { .. } => "Hello",
            Self::Connect { .. } => "Connect",
            Self::Fail { .. } => "Fail",
            Self::Disconnect { .. } => "Disconnect",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tell_reaches_an_open_mailbox() {
        let mut mailbox = Mailbox::new();
        let address = mailbox.address();
        assert!(address.tell(Message::Setup));
        let received = mailbox.recv().await;
        assert!(matches!(received, Some(Message::Setup)));
    }

    #[test]
    fn tell_fails_once_the_mailbox_is_gone() {
        let mailbox = Mailbox::new();
        let address = mailbox.address();
        drop(mailbox);
        assert!(!address.tell(Message::Setup));
    }

    #[test]
    fn same_entity_compares_channels() {
        let a = Mailbox::new();
        let b = Mailbox::new();
        assert!(a.address().same_entity(&a.address()));
        assert!(!a.address().same_entity(&b.address()));
    }

    #[test]
    fn drain_empties_the_queue() {
        let mut mailbox = Mailbox::new();
        let address = mailbox.address();
        for _ in 0..3 {
            let _ = address.tell(Message::Setup);
        }
        assert_eq!(mailbox.drain(), 3);
        assert!(mailbox.try_recv().is_none());
    }

    #[test]
    fn kind_names_the_variant() {
        let tower_id = TowerId::from_u32(1);
        assert_eq!(Message::Setup.kind(), "Setup");
        assert_eq!(Message::Fail { tower_id }.kind(), "Fail");
    }
}
