//! Embedding providers.
//!
//! Async because the real providers (Ollama, OpenAI) perform HTTP requests.
//! The hash embedder is the deterministic degenerate case: remote providers
//! are wrapped in [`FallbackEmbedder`] so a provider outage degrades to it
//! instead of failing ingestion or search.

use std::sync::Arc;
use std::{future::Future, pin::Pin};

use tracing::warn;

use crate::config::{EmbeddingBackend, RagConfig};
use crate::errors::RagError;

pub mod hash;
pub mod ollama;
pub mod openai;

/// Provider interface for embedding generation.
pub trait EmbeddingsProvider: Send + Sync {
    /// Async embedding function.
    fn embed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, RagError>> + Send + 'a>>;
}

/// Wraps a remote provider with the deterministic hash fallback.
pub struct FallbackEmbedder {
    inner: Arc<dyn EmbeddingsProvider>,
    fallback: hash::HashEmbedder,
}

impl FallbackEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingsProvider>, dim: usize) -> Self {
        Self {
            inner,
            fallback: hash::HashEmbedder::new(dim),
        }
    }
}

impl EmbeddingsProvider for FallbackEmbedder {
    fn embed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, RagError>> + Send + 'a>> {
        Box::pin(async move {
            match self.inner.embed(text).await {
                Ok(v) => Ok(v),
                Err(e) => {
                    warn!(error = %e, "embedding provider failed, using hash fallback");
                    self.fallback.embed(text).await
                }
            }
        })
    }
}

/// Builds the configured provider. Remote backends are wrapped with the
/// hash fallback; the hash backend is returned bare.
pub fn build_embedder(cfg: &RagConfig) -> Result<Arc<dyn EmbeddingsProvider>, RagError> {
    let provider: Arc<dyn EmbeddingsProvider> = match cfg.embedding_backend {
        EmbeddingBackend::Hash => Arc::new(hash::HashEmbedder::new(cfg.embedding_dim)),
        EmbeddingBackend::Ollama => {
            let inner = Arc::new(ollama::OllamaEmbedder::new(
                &cfg.embedding_endpoint,
                &cfg.embedding_model,
            )?);
            Arc::new(FallbackEmbedder::new(inner, cfg.embedding_dim))
        }
        EmbeddingBackend::OpenAi => {
            let key = cfg
                .openai_api_key
                .as_deref()
                .ok_or_else(|| RagError::Config("OPENAI_API_KEY is required".into()))?;
            let inner = Arc::new(openai::OpenAiEmbedder::new(&cfg.embedding_model, key)?);
            Arc::new(FallbackEmbedder::new(inner, cfg.embedding_dim))
        }
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingProvider;

    impl EmbeddingsProvider for FailingProvider {
        fn embed<'a>(
            &'a self,
            _text: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, RagError>> + Send + 'a>> {
            Box::pin(async { Err(RagError::Provider("unreachable".into())) })
        }
    }

    #[tokio::test]
    async fn fallback_kicks_in_on_provider_error() {
        let wrapped = FallbackEmbedder::new(Arc::new(FailingProvider), 768);
        let v = wrapped.embed("some text").await.unwrap();
        assert_eq!(v.len(), 768);
        // deterministic across calls
        assert_eq!(v, wrapped.embed("some text").await.unwrap());
    }
}
