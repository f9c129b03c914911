//! Per-topic wire codecs.
//!
//! Two encodings coexist on the bus: schema-defined contract records ride a
//! length-prefixed binary frame, operational signals are self-describing
//! JSON. The [`CodecRegistry`] maps topic names to formats; unmapped topics
//! fall back to JSON.

use std::collections::HashMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::errors::BusError;

/// Wire encoding for a topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireFormat {
    /// u32 little-endian length prefix followed by a bincode body.
    Binary,
    /// Self-describing JSON document.
    Json,
}

/// Topic → format mapping with a JSON default.
#[derive(Clone, Debug)]
pub struct CodecRegistry {
    formats: HashMap<String, WireFormat>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self {
            formats: HashMap::new(),
        }
    }
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a topic with an explicit format.
    pub fn with(mut self, topic: &str, format: WireFormat) -> Self {
        self.formats.insert(topic.to_string(), format);
        self
    }

    /// Resolves the format for a topic (JSON when unmapped).
    pub fn format_for(&self, topic: &str) -> WireFormat {
        self.formats
            .get(topic)
            .copied()
            .unwrap_or(WireFormat::Json)
    }
}

/// Encodes a payload for the given topic format.
pub fn encode<T: Serialize>(
    registry: &CodecRegistry,
    topic: &str,
    value: &T,
) -> Result<Vec<u8>, BusError> {
    match registry.format_for(topic) {
        WireFormat::Binary => {
            let body = bincode::serialize(value).map_err(|e| BusError::Codec {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;
            let mut framed = Vec::with_capacity(4 + body.len());
            framed.extend_from_slice(&(body.len() as u32).to_le_bytes());
            framed.extend_from_slice(&body);
            Ok(framed)
        }
        WireFormat::Json => serde_json::to_vec(value).map_err(|e| BusError::Codec {
            topic: topic.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Decodes a payload received on the given topic.
pub fn decode<T: DeserializeOwned>(
    registry: &CodecRegistry,
    topic: &str,
    bytes: &[u8],
) -> Result<T, BusError> {
    match registry.format_for(topic) {
        WireFormat::Binary => {
            if bytes.len() < 4 {
                return Err(BusError::Codec {
                    topic: topic.to_string(),
                    reason: "frame shorter than length prefix".to_string(),
                });
            }
            let declared = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
            let body = &bytes[4..];
            if body.len() != declared {
                return Err(BusError::Codec {
                    topic: topic.to_string(),
                    reason: format!("length prefix {} != body {}", declared, body.len()),
                });
            }
            bincode::deserialize(body).map_err(|e| BusError::Codec {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
        }
        WireFormat::Json => serde_json::from_slice(bytes).map_err(|e| BusError::Codec {
            topic: topic.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Decodes a payload, logging and swallowing failures.
///
/// This is the poison-message rule: one undecodable payload must never halt
/// a consumer loop, so callers skip `None` and keep polling.
pub fn decode_or_skip<T: DeserializeOwned>(
    registry: &CodecRegistry,
    topic: &str,
    bytes: &[u8],
) -> Option<T> {
    match decode(registry, topic, bytes) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(topic, error = %e, "skipping undecodable message");
            None
        }
    }
}
