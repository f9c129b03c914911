//! Error types for the LLM gateway.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    /// Bad or missing configuration; fatal at startup.
    #[error("[AI LLM Service] config error: {0}")]
    Config(String),

    /// `LLM_BACKEND` named something the constructor registry doesn't know.
    #[error("[AI LLM Service] unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// Provider-side API failure (rate limit, 5xx, overload). Retryable.
    #[error("[AI LLM Service] provider API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Transport failure before an API answer existed.
    #[error("[AI LLM Service] transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Unexpected or invalid response body.
    #[error("[AI LLM Service] failed to decode response: {0}")]
    Decode(String),

    /// Disk cache I/O failure.
    #[error("[AI LLM Service] cache error: {0}")]
    Cache(#[from] std::io::Error),
}

impl LlmError {
    /// Only API errors are retried; non-API errors propagate.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Api { .. })
    }
}
