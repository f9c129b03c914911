//! Error types for the bus crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("config error: {0}")]
    Config(String),

    /// Broker-side failure that is worth retrying (connection loss,
    /// rebalance in progress, queue briefly unavailable).
    #[error("transient broker error: {0}")]
    Transient(String),

    /// Encoding or decoding a payload failed for the given topic.
    #[error("codec error on '{topic}': {reason}")]
    Codec { topic: String, reason: String },

    /// The broker or subscription has been shut down.
    #[error("bus closed")]
    Closed,
}

impl BusError {
    /// Whether a publish may be retried with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, BusError::Transient(_))
    }
}
