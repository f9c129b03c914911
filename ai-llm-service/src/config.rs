//! Environment-driven gateway configuration.

use std::path::PathBuf;

use crate::errors::LlmError;
use crate::provider::LlmBackend;

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    /// Ollama chat endpoint.
    pub ollama_url: String,
    /// OpenAI chat-completions endpoint.
    pub openai_url: String,
    pub openai_api_key: Option<String>,
    /// Disk cache directory; `None` disables caching.
    pub cache_dir: Option<PathBuf>,
    /// Per-call HTTP timeout.
    pub timeout_secs: u64,
    /// `MOCK_LLM=1` pins the dummy provider regardless of backend.
    pub mock: bool,
}

impl LlmConfig {
    /// Builds the config from environment variables.
    ///
    /// Recognized vars:
    /// - LLM_BACKEND = openai|ollama|dummy (default: openai)
    /// - OLLAMA_URL (default: http://ollama:11434/api/chat)
    /// - OPENAI_URL (default: https://api.openai.com/v1/chat/completions)
    /// - OPENAI_API_KEY
    /// - LLM_CACHE_DIR (default: .llm_cache; empty string disables)
    /// - MOCK_LLM = 1 forces the dummy provider
    ///
    /// # Errors
    /// [`LlmError::UnsupportedProvider`] on an unknown backend value.
    pub fn from_env() -> Result<Self, LlmError> {
        use std::env;

        let backend_raw = env::var("LLM_BACKEND").unwrap_or_else(|_| "openai".into());
        let backend = backend_raw.parse::<LlmBackend>()?;

        let cache_dir = match env::var("LLM_CACHE_DIR") {
            Ok(v) if v.trim().is_empty() => None,
            Ok(v) => Some(PathBuf::from(v)),
            Err(_) => Some(PathBuf::from(".llm_cache")),
        };

        Ok(Self {
            backend,
            ollama_url: env::var("OLLAMA_URL")
                .unwrap_or_else(|_| "http://ollama:11434/api/chat".into()),
            openai_url: env::var("OPENAI_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".into()),
            openai_api_key: env::var("OPENAI_API_KEY").ok(),
            cache_dir,
            timeout_secs: 120,
            mock: env::var("MOCK_LLM").map(|v| v == "1").unwrap_or(false),
        })
    }
}
