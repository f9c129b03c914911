//! Deterministic stub provider for tests and CI environments.

use async_trait::async_trait;

use crate::errors::LlmError;
use crate::message::{ChatMessage, ChatOptions, LlmResponse};
use crate::provider::ChatProvider;

#[derive(Debug)]
pub struct DummyProvider;

impl DummyProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DummyProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatProvider for DummyProvider {
    fn name(&self) -> &'static str {
        "dummy"
    }

    async fn chat(
        &self,
        _messages: &[ChatMessage],
        opts: &ChatOptions,
    ) -> Result<LlmResponse, LlmError> {
        if opts.json_mode {
            Ok(LlmResponse {
                content: r#"{"status": "ok", "provider": "dummy"}"#.to_string(),
                tokens_prompt: 10,
                tokens_completion: 20,
                cost_usd: 0.0,
            })
        } else {
            Ok(LlmResponse {
                content: "This is a dummy response from the test provider".to_string(),
                tokens_prompt: 5,
                tokens_completion: 10,
                cost_usd: 0.0,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn responses_are_mode_dependent_and_free() {
        let provider = DummyProvider::new();
        let text = provider
            .chat(&[ChatMessage::user("Hello")], &ChatOptions::new("gpt-4o-mini"))
            .await
            .unwrap();
        assert_eq!(
            text.content,
            "This is a dummy response from the test provider"
        );
        assert_eq!(text.tokens_prompt, 5);
        assert_eq!(text.tokens_completion, 10);
        assert_eq!(text.cost_usd, 0.0);

        let json = provider
            .chat(
                &[ChatMessage::user("Generate JSON")],
                &ChatOptions::json("gpt-4o-mini"),
            )
            .await
            .unwrap();
        assert_eq!(json.content, r#"{"status": "ok", "provider": "dummy"}"#);
    }
}
