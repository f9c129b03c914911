//! Serializing publisher with transient-error backoff.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::bus::EventBus;
use crate::codec::{CodecRegistry, encode};
use crate::config::BusConfig;
use crate::errors::BusError;

/// Publishes typed payloads through the per-topic codec registry.
///
/// Transient broker errors are retried with exponential backoff
/// (base 0.5 s doubling, capped at 8 s, 3 attempts by default); anything
/// irrecoverable surfaces to the caller on the first occurrence.
#[derive(Clone)]
pub struct TypedPublisher {
    bus: Arc<dyn EventBus>,
    registry: Arc<CodecRegistry>,
    cfg: BusConfig,
}

impl TypedPublisher {
    pub fn new(bus: Arc<dyn EventBus>, registry: Arc<CodecRegistry>, cfg: BusConfig) -> Self {
        Self { bus, registry, cfg }
    }

    /// Encodes and publishes `value` on `topic`, keyed by `key`.
    pub async fn send<T: Serialize>(
        &self,
        topic: &str,
        value: &T,
        key: Option<&str>,
    ) -> Result<(), BusError> {
        let payload = encode(&self.registry, topic, value)?;

        let mut delay = self.cfg.backoff_base;
        let mut attempt = 1u32;
        loop {
            match self.bus.publish(topic, payload.clone(), key).await {
                Ok(()) => {
                    debug!(topic, key, attempt, "published");
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempt < self.cfg.publish_attempts => {
                    warn!(topic, attempt, error = %e, "transient publish failure, backing off");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.cfg.backoff_cap);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn registry(&self) -> &CodecRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Subscription;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Bus that fails transiently a fixed number of times before accepting.
    struct FlakyBus {
        failures: AtomicU32,
        accepted: AtomicU32,
    }

    #[async_trait]
    impl EventBus for FlakyBus {
        async fn publish(
            &self,
            _topic: &str,
            _payload: Vec<u8>,
            _key: Option<&str>,
        ) -> Result<(), BusError> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(BusError::Transient("broker unavailable".into()));
            }
            self.accepted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn subscribe(
            &self,
            _group: &str,
            _topics: &[&str],
        ) -> Result<Subscription, BusError> {
            unimplemented!("publish-only test double")
        }
    }

    fn fast_cfg() -> BusConfig {
        BusConfig {
            backoff_base: std::time::Duration::from_millis(1),
            backoff_cap: std::time::Duration::from_millis(4),
            ..BusConfig::default()
        }
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let bus = Arc::new(FlakyBus {
            failures: AtomicU32::new(2),
            accepted: AtomicU32::new(0),
        });
        let publisher = TypedPublisher::new(
            bus.clone(),
            Arc::new(CodecRegistry::new()),
            fast_cfg(),
        );
        publisher.send("t", &"hello", None).await.unwrap();
        assert_eq!(bus.accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_attempt_budget() {
        let bus = Arc::new(FlakyBus {
            failures: AtomicU32::new(10),
            accepted: AtomicU32::new(0),
        });
        let publisher = TypedPublisher::new(
            bus.clone(),
            Arc::new(CodecRegistry::new()),
            fast_cfg(),
        );
        let err = publisher.send("t", &"hello", None).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(bus.accepted.load(Ordering::SeqCst), 0);
    }
}
