//! Ollama embeddings provider (`POST {endpoint}/api/embeddings`).

use std::time::Duration;
use std::{future::Future, pin::Pin};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embed::EmbeddingsProvider;
use crate::errors::RagError;

pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(endpoint: &str, model: &str) -> Result<Self, RagError> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty()
            || !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
        {
            return Err(RagError::Config(format!(
                "invalid embedding endpoint: {endpoint}"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| RagError::Provider(e.to_string()))?;
        Ok(Self {
            client,
            url: format!("{}/api/embeddings", endpoint.trim_end_matches('/')),
            model: model.to_string(),
        })
    }
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

impl EmbeddingsProvider for OllamaEmbedder {
    fn embed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, RagError>> + Send + 'a>> {
        Box::pin(async move {
            debug!("POST {}", self.url);
            let resp = self
                .client
                .post(&self.url)
                .json(&EmbeddingsRequest {
                    model: &self.model,
                    input: text,
                })
                .send()
                .await
                .map_err(|e| RagError::Provider(e.to_string()))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                let snippet = body.chars().take(240).collect::<String>();
                return Err(RagError::Provider(format!(
                    "unexpected HTTP status {status}: {snippet}"
                )));
            }

            let out: EmbeddingsResponse = resp
                .json()
                .await
                .map_err(|e| RagError::Provider(format!("decode error: {e}")))?;
            Ok(out.embedding)
        })
    }
}
