//! Error types for the `telco-tower` crate.
//!
//! Construction problems surface as [`TowerError`] and abort the tower
//! before it ever accepts a message. [`PublishError`] only ever reaches the
//! operational log or a [`PublishReceipt`](crate::PublishReceipt); it never
//! flows back into the protocol path.

use telco_types::InvalidPositionError;

/// Errors from configuring a [`SignalModel`](crate::SignalModel).
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// The antenna position is not a finite point.
    #[error("invalid antenna position: {0}")]
    InvalidPosition(#[from] InvalidPositionError),

    /// Transmit power or reference distance is not finite and positive.
    #[error(
        "invalid power settings: transmit power {transmit_power}, \
         reference distance {reference_distance}"
    )]
    InvalidPower {
        /// The rejected transmit power.
        transmit_power: f64,
        /// The rejected reference distance.
        reference_distance: f64,
    },

    /// Power settings were already applied to this model.
    #[error("signal model power is already configured")]
    AlreadyConfigured,
}

/// Errors from appending a CDR snapshot to the event stream.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The stream transport rejected or failed the operation.
    #[error("stream transport error: {0}")]
    Transport(String),

    /// The snapshot could not be serialized.
    #[error("failed to serialize CDR snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The publisher shut down before the operation completed.
    #[error("publisher closed before completion")]
    Closed,
}

/// Errors that prevent a tower from being built.
#[derive(Debug, thiserror::Error)]
pub enum TowerError {
    /// The tower or its publisher could not be initialized.
    #[error("tower initialization failed: {message}")]
    Initialization {
        /// Description of the failure.
        message: String,
    },

    /// The signal model rejected the tower's settings.
    #[error("signal model error: {source}")]
    Signal {
        /// The underlying signal error.
        #[from]
        source: SignalError,
    },
}
