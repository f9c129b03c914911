//! Provider contract and the constructor registry.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::LlmConfig;
use crate::errors::LlmError;
use crate::message::{ChatMessage, ChatOptions, LlmResponse};
use crate::providers::{dummy::DummyProvider, ollama::OllamaProvider, openai::OpenAiProvider};

/// A chat-capable LLM backend.
#[async_trait]
pub trait ChatProvider: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    async fn chat(
        &self,
        messages: &[ChatMessage],
        opts: &ChatOptions,
    ) -> Result<LlmResponse, LlmError>;
}

/// Known backends; parsed from `LLM_BACKEND`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LlmBackend {
    OpenAi,
    Ollama,
    Dummy,
}

impl FromStr for LlmBackend {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(LlmBackend::OpenAi),
            "ollama" => Ok(LlmBackend::Ollama),
            "dummy" => Ok(LlmBackend::Dummy),
            other => Err(LlmError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Constructs the configured provider at process init.
///
/// `MOCK_LLM` wins over the backend selection so CI can pin the stub
/// without touching the deployment's backend variable.
pub fn build_provider(cfg: &LlmConfig) -> Result<Arc<dyn ChatProvider>, LlmError> {
    let backend = if cfg.mock { LlmBackend::Dummy } else { cfg.backend };
    let provider: Arc<dyn ChatProvider> = match backend {
        LlmBackend::Dummy => Arc::new(DummyProvider::new()),
        LlmBackend::Ollama => Arc::new(OllamaProvider::new(&cfg.ollama_url, cfg.timeout_secs)?),
        LlmBackend::OpenAi => {
            let key = cfg.openai_api_key.as_deref().ok_or_else(|| {
                LlmError::Config("OPENAI_API_KEY is required for the openai backend".into())
            })?;
            Arc::new(OpenAiProvider::new(&cfg.openai_url, key, cfg.timeout_secs)?)
        }
    };
    info!(provider = provider.name(), "LLM provider constructed");
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_parsing_rejects_unknown_values() {
        assert_eq!("ollama".parse::<LlmBackend>().unwrap(), LlmBackend::Ollama);
        assert_eq!("dummy".parse::<LlmBackend>().unwrap(), LlmBackend::Dummy);
        let err = "anthropic".parse::<LlmBackend>().unwrap_err();
        assert!(matches!(err, LlmError::UnsupportedProvider(_)));
    }

    #[test]
    fn mock_flag_forces_the_dummy_provider() {
        let cfg = LlmConfig {
            backend: LlmBackend::Ollama,
            ollama_url: "http://localhost:11434/api/chat".into(),
            openai_url: String::new(),
            openai_api_key: None,
            cache_dir: None,
            timeout_secs: 5,
            mock: true,
        };
        let provider = build_provider(&cfg).unwrap();
        assert_eq!(provider.name(), "dummy");
    }

    #[test]
    fn openai_backend_requires_a_key() {
        let cfg = LlmConfig {
            backend: LlmBackend::OpenAi,
            ollama_url: String::new(),
            openai_url: "https://api.openai.com/v1/chat/completions".into(),
            openai_api_key: None,
            cache_dir: None,
            timeout_secs: 5,
            mock: false,
        };
        assert!(matches!(
            build_provider(&cfg).unwrap_err(),
            LlmError::Config(_)
        ));
    }
}
