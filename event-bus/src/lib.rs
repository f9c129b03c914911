//! Topic-addressed event bus abstraction for the pipeline.
//!
//! This crate provides:
//! - The [`EventBus`] trait: at-least-once publish/subscribe with consumer
//!   groups and partition-keyed ordering.
//! - [`InMemoryBroker`]: the single-process broker binding used by the
//!   supervisor binary. The trait is the seam for a networked broker.
//! - Per-topic wire codecs ([`WireFormat`], [`CodecRegistry`]): schema-defined
//!   records ride a length-prefixed binary encoding, everything else is
//!   self-describing JSON.
//! - [`TypedPublisher`]: serializing publisher with capped exponential
//!   backoff on transient broker errors.
//!
//! Consumers pull messages through [`Subscription::next`], which blocks until
//! a message arrives or the subscription is cancelled. Cancellation is
//! first-class and takes effect within one poll interval.

mod broker;
mod bus;
mod codec;
mod config;
mod errors;
mod publisher;

pub use broker::InMemoryBroker;
pub use bus::{EventBus, Message, Subscription};
pub use codec::{CodecRegistry, WireFormat, decode, decode_or_skip, encode};
pub use config::BusConfig;
pub use errors::BusError;

/// Result alias for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

pub use publisher::TypedPublisher;
