//! Library configuration and embedding backends.

use crate::errors::RagError;

/// Which embedding provider the store uses.
///
/// The hash backend is fully deterministic and needs no network; remote
/// backends are wrapped so provider failures degrade to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingBackend {
    Ollama,
    OpenAi,
    Hash,
}

/// High-level configuration for the retrieval engine.
#[derive(Clone, Debug)]
pub struct RagConfig {
    /// Qdrant endpoint; `None` selects the in-memory dense index.
    pub qdrant_url: Option<String>,
    pub qdrant_api_key: Option<String>,
    pub collection: String,
    pub embedding_backend: EmbeddingBackend,
    /// Embedding endpoint for the remote backends.
    pub embedding_endpoint: String,
    pub embedding_model: String,
    pub openai_api_key: Option<String>,
    /// Expected embedding dimensionality.
    pub embedding_dim: usize,
}

impl RagConfig {
    /// Build `RagConfig` from environment variables.
    ///
    /// Recognized vars:
    /// - QDRANT_URL (optional; absent selects the memory index)
    /// - QDRANT_API_KEY (optional)
    /// - RAG_COLLECTION (default: code_chunks)
    /// - EMBEDDING_BACKEND = ollama|openai|hash (default: ollama)
    /// - EMBEDDING_ENDPOINT (default: http://ollama:11434)
    /// - EMBEDDING_MODEL (default: bge-code)
    /// - OPENAI_API_KEY (required for the openai backend)
    ///
    /// Unknown backend values are a startup failure.
    pub fn from_env() -> Result<Self, RagError> {
        use std::env;

        let backend_raw = env::var("EMBEDDING_BACKEND").unwrap_or_else(|_| "ollama".into());
        let embedding_backend = match backend_raw.as_str() {
            "ollama" => EmbeddingBackend::Ollama,
            "openai" => EmbeddingBackend::OpenAi,
            "hash" => EmbeddingBackend::Hash,
            other => {
                return Err(RagError::Config(format!(
                    "unknown EMBEDDING_BACKEND: {other}"
                )));
            }
        };

        // OpenAI's small embedding model is 1536-wide, local models 768.
        let embedding_dim = match embedding_backend {
            EmbeddingBackend::OpenAi => 1536,
            _ => 768,
        };

        let openai_api_key = env::var("OPENAI_API_KEY").ok();
        if embedding_backend == EmbeddingBackend::OpenAi && openai_api_key.is_none() {
            return Err(RagError::Config(
                "OPENAI_API_KEY is required for the openai embedding backend".into(),
            ));
        }

        Ok(Self {
            qdrant_url: env::var("QDRANT_URL").ok(),
            qdrant_api_key: env::var("QDRANT_API_KEY").ok(),
            collection: env::var("RAG_COLLECTION").unwrap_or_else(|_| "code_chunks".into()),
            embedding_backend,
            embedding_endpoint: env::var("EMBEDDING_ENDPOINT")
                .unwrap_or_else(|_| "http://ollama:11434".into()),
            embedding_model: env::var("EMBEDDING_MODEL").unwrap_or_else(|_| "bge-code".into()),
            openai_api_key,
            embedding_dim,
        })
    }

    /// Deterministic in-process configuration used by the test suites.
    pub fn for_tests() -> Self {
        Self {
            qdrant_url: None,
            qdrant_api_key: None,
            collection: "code_chunks".into(),
            embedding_backend: EmbeddingBackend::Hash,
            embedding_endpoint: String::new(),
            embedding_model: String::new(),
            openai_api_key: None,
            embedding_dim: 768,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_backend_fails_startup() {
        // from_env reads the process environment, so exercise the match arm
        // directly through a scoped variable.
        unsafe {
            std::env::set_var("EMBEDDING_BACKEND", "sentencepiece");
        }
        let err = RagConfig::from_env().unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
        unsafe {
            std::env::remove_var("EMBEDDING_BACKEND");
        }
    }
}
