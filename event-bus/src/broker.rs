//! In-process broker binding.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::bus::{EventBus, Message, Subscription};
use crate::errors::BusError;

/// Single-process broker with consumer groups and per-key FIFO.
///
/// Topics and groups are created on first use. Within a group, a keyed
/// message always lands on the member selected by the key hash, so one key's
/// messages are consumed in append order; unkeyed messages round-robin.
///
/// Closed members are pruned on the next publish, which is how a dropped or
/// cancelled [`Subscription`] releases its group membership.
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
}

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, TopicState>,
}

#[derive(Default)]
struct TopicState {
    groups: HashMap<String, GroupState>,
}

#[derive(Default)]
struct GroupState {
    members: Vec<mpsc::UnboundedSender<Message>>,
    round_robin: usize,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BrokerState::default()),
        }
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryBroker {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        key: Option<&str>,
    ) -> Result<(), BusError> {
        let mut state = self.state.lock().map_err(|_| BusError::Closed)?;
        let topic_state = state.topics.entry(topic.to_string()).or_default();

        trace!(topic, key, bytes = payload.len(), "publish");

        for (group, gs) in topic_state.groups.iter_mut() {
            gs.members.retain(|tx| !tx.is_closed());
            if gs.members.is_empty() {
                debug!(topic, group, "no live members, message not delivered");
                continue;
            }
            let idx = match key {
                Some(k) => {
                    let mut h = DefaultHasher::new();
                    k.hash(&mut h);
                    (h.finish() as usize) % gs.members.len()
                }
                None => {
                    gs.round_robin = (gs.round_robin + 1) % gs.members.len();
                    gs.round_robin
                }
            };
            let msg = Message {
                topic: topic.to_string(),
                key: key.map(|k| k.to_string()),
                payload: payload.clone(),
            };
            // A racing close between retain and send just drops the copy;
            // redelivery is the consumer's at-least-once burden anyway.
            let _ = gs.members[idx].send(msg);
        }
        Ok(())
    }

    async fn subscribe(&self, group: &str, topics: &[&str]) -> Result<Subscription, BusError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().map_err(|_| BusError::Closed)?;
        for topic in topics {
            state
                .topics
                .entry(topic.to_string())
                .or_default()
                .groups
                .entry(group.to_string())
                .or_default()
                .members
                .push(tx.clone());
        }
        debug!(group, ?topics, "subscription joined");
        Ok(Subscription::new(rx))
    }
}
