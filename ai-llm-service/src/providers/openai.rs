//! Hosted OpenAI chat provider (`POST /v1/chat/completions`).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument};

use crate::errors::LlmError;
use crate::message::{ChatMessage, ChatOptions, LlmResponse};
use crate::provider::ChatProvider;

/// USD per 1K tokens as `(prompt, completion)`; unknown models cost 0.
const COST_TABLE: &[(&str, (f64, f64))] = &[
    ("gpt-4o-mini", (0.005, 0.015)),
    ("gpt-4o", (0.01, 0.03)),
];

fn model_cost(model: &str, prompt_tokens: u32, completion_tokens: u32) -> f64 {
    let (p, c) = COST_TABLE
        .iter()
        .find(|(m, _)| *m == model)
        .map(|(_, rates)| *rates)
        .unwrap_or((0.0, 0.0));
    (prompt_tokens as f64 / 1000.0) * p + (completion_tokens as f64 / 1000.0) * c
}

#[derive(Debug)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl OpenAiProvider {
    pub fn new(url: &str, api_key: &str, timeout_secs: u64) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::Config("empty OpenAI api key".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
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
            temperature: opts.temperature,
            max_tokens: opts.max_tokens,
            response_format: opts.json_mode.then(|| json!({"type": "json_object"})),
        };

        debug!("POST {}", self.url);
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

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
            .map_err(|e| LlmError::Decode(format!("serde error: {e}")))?;

        let content = out
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::Decode("response carried no choices".into()))?;

        let usage = out.usage.unwrap_or_default();
        Ok(LlmResponse {
            content,
            tokens_prompt: usage.prompt_tokens,
            tokens_completion: usage.completion_tokens,
            cost_usd: model_cost(&opts.model, usage.prompt_tokens, usage.completion_tokens),
        })
    }
}
