//! Bus configuration.

use std::time::Duration;

/// Configuration shared by publishers and subscribers.
#[derive(Clone, Debug)]
pub struct BusConfig {
    /// Broker address contract (`KAFKA_BOOTSTRAP`). The in-memory binding
    /// keeps it for parity with a networked broker deployment.
    pub bootstrap: String,
    /// Upper bound on how long a cancelled subscription may keep polling.
    pub poll_interval: Duration,
    /// Publish attempts before a transient error surfaces to the caller.
    pub publish_attempts: u32,
    /// First backoff delay; doubles per attempt.
    pub backoff_base: Duration,
    /// Backoff ceiling.
    pub backoff_cap: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            bootstrap: "kafka:9092".to_string(),
            poll_interval: Duration::from_millis(300),
            publish_attempts: 3,
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(8),
        }
    }
}

impl BusConfig {
    /// Builds the config from environment variables.
    ///
    /// Recognized vars:
    /// - `KAFKA_BOOTSTRAP` (default: `kafka:9092`)
    pub fn from_env() -> Self {
        let bootstrap =
            std::env::var("KAFKA_BOOTSTRAP").unwrap_or_else(|_| "kafka:9092".to_string());
        Self {
            bootstrap,
            ..Self::default()
        }
    }
}
