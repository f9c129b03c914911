//! Local Ollama chat provider (`POST {OLLAMA_URL}`, non-streaming).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::errors::LlmError;
use crate::message::{ChatMessage, ChatOptions, LlmResponse};
use crate::provider::ChatProvider;

#[derive(Debug)]
pub struct OllamaProvider {
    client: reqwest::Client,
    url: String,
}

impl OllamaProvider {
    pub fn new(url: &str, timeout_secs: u64) -> Result<Self, LlmError> {
        let url = url.trim();
        if url.is_empty() || !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(LlmError::Config(format!("invalid Ollama endpoint: {url}")));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    options: RequestOptions,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct RequestOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

#[async_trait]
impl ChatProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    #[instrument(skip_all, fields(model = %opts.model, json_mode = opts.json_mode))]
    async fn chat(
        &self,
        messages: &[ChatMessage],
        opts: &ChatOptions,
    ) -> Result<LlmResponse, LlmError> {
        let body = ChatRequest {
            model: &opts.model,
            messages,
            options: RequestOptions {
                temperature: opts.temperature,
                num_predict: opts.max_tokens,
            },
            stream: false,
            format: opts.json_mode.then_some("json"),
        };

        debug!("POST {}", self.url);
        let resp = self.client.post(&self.url).json(&body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status,
                message: text.chars().take(240).collect(),
            });
        }

        let out: ChatResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Decode(format!("serde error: {e}; ensure stream=false")))?;

        // Ollama's simple schema carries no usage accounting.
        Ok(LlmResponse::content_only(out.message.content))
    }
}
