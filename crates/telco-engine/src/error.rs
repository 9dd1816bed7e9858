//! Error types for the simulation binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during startup.

/// Top-level error for the simulation binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: crate::config::ConfigError,
    },

    /// A tower or the stream publisher could not be initialized.
    #[error("tower error: {source}")]
    Tower {
        /// The underlying tower error.
        #[from]
        source: telco_tower::TowerError,
    },

    /// Waiting for the shutdown signal failed.
    #[error("signal handler error: {source}")]
    Signal {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}
