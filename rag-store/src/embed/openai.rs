//! OpenAI embeddings provider (`POST /v1/embeddings`).

use std::time::Duration;
use std::{future::Future, pin::Pin};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embed::EmbeddingsProvider;
use crate::errors::RagError;

const EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    model: String,
    api_key: String,
}

impl OpenAiEmbedder {
    pub fn new(model: &str, api_key: &str) -> Result<Self, RagError> {
        if api_key.trim().is_empty() {
            return Err(RagError::Config("empty OpenAI api key".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| RagError::Provider(e.to_string()))?;
        Ok(Self {
            client,
            model: model.to_string(),
            api_key: api_key.to_string(),
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
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

impl EmbeddingsProvider for OpenAiEmbedder {
    fn embed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, RagError>> + Send + 'a>> {
        Box::pin(async move {
            debug!("POST {}", EMBEDDINGS_URL);
            let resp = self
                .client
                .post(EMBEDDINGS_URL)
                .bearer_auth(&self.api_key)
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
            out.data
                .into_iter()
                .next()
                .map(|item| item.embedding)
                .ok_or(RagError::MissingEmbedding)
        })
    }
}
