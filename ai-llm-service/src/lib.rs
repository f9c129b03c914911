//! Provider-abstracted LLM gateway.
//!
//! One [`ChatProvider`] trait with three bindings (a hosted provider,
//! a local provider, and a deterministic stub for tests), selected by a
//! registry of constructors keyed on `LLM_BACKEND`. An unknown
//! backend value is a startup failure; there is no dynamic loading and no
//! lazily-initialised global provider.
//!
//! [`LlmGateway`] wraps the provider with:
//! - a content-addressed disk cache (`sha256(model ‖ messages ‖ opts)`,
//!   atomic temp-file + rename writes, immutable entries);
//! - exponential backoff on provider API errors for up to 60 s wall-clock;
//!   everything else propagates immediately.

mod cache;
mod config;
mod errors;
mod gateway;
mod message;
mod provider;
pub mod providers;

pub use cache::ChatCache;
pub use config::LlmConfig;
pub use errors::LlmError;
pub use gateway::LlmGateway;
pub use message::{ChatMessage, ChatOptions, ChatRole, LlmResponse};
pub use provider::{ChatProvider, LlmBackend, build_provider};

/// Result alias for gateway operations.
pub type Result<T> = std::result::Result<T, LlmError>;
