//! The gateway: cache in front, bounded retry behind.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use crate::cache::ChatCache;
use crate::config::LlmConfig;
use crate::errors::LlmError;
use crate::message::{ChatMessage, ChatOptions, LlmResponse};
use crate::provider::{ChatProvider, build_provider};

const RETRY_BUDGET: Duration = Duration::from_secs(60);
const BACKOFF_BASE: Duration = Duration::from_millis(500);
const BACKOFF_CAP: Duration = Duration::from_secs(8);

pub struct LlmGateway {
    provider: Arc<dyn ChatProvider>,
    cache: Option<ChatCache>,
}

impl LlmGateway {
    /// Builds the gateway from environment configuration.
    pub fn from_env() -> Result<Self, LlmError> {
        let cfg = LlmConfig::from_env()?;
        Self::from_config(&cfg)
    }

    pub fn from_config(cfg: &LlmConfig) -> Result<Self, LlmError> {
        let provider = build_provider(cfg)?;
        let cache = cfg
            .cache_dir
            .clone()
            .map(ChatCache::new)
            .transpose()?;
        Ok(Self { provider, cache })
    }

    /// Wraps an already-built provider; used where a scripted provider is
    /// injected instead of an environment-selected one.
    pub fn with_provider(provider: Arc<dyn ChatProvider>, cache: Option<ChatCache>) -> Self {
        Self { provider, cache }
    }

    /// Cache-aware chat call.
    ///
    /// A cache hit returns the stored response without touching the
    /// provider. On miss, provider API errors are retried with exponential
    /// backoff until 60 s of wall-clock has elapsed; other errors
    /// propagate immediately.
    #[instrument(skip_all, fields(provider = self.provider.name(), model = %opts.model))]
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        opts: &ChatOptions,
    ) -> Result<LlmResponse, LlmError> {
        let key = self.cache.as_ref().map(|c| c.key(messages, opts));
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(hit) = cache.get(key) {
                return Ok(hit);
            }
        }

        let started = Instant::now();
        let mut delay = BACKOFF_BASE;
        let response = loop {
            match self.provider.chat(messages, opts).await {
                Ok(resp) => break resp,
                Err(e) if e.is_retryable() && started.elapsed() + delay < RETRY_BUDGET => {
                    warn!(error = %e, delay_ms = delay.as_millis() as u64, "provider API error, backing off");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(BACKOFF_CAP);
                }
                Err(e) => return Err(e),
            }
        };

        info!(
            tokens_prompt = response.tokens_prompt,
            tokens_completion = response.tokens_completion,
            cost_usd = response.cost_usd,
            latency_ms = started.elapsed().as_millis() as u64,
            "chat completed"
        );

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Err(e) = cache.put(key, &response) {
                warn!(error = %e, "cache write failed, continuing");
            } else {
                debug!(key = %key, "response cached");
            }
        }
        Ok(response)
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Counts calls so tests can prove the cache short-circuits I/O.
    #[derive(Debug)]
    struct CountingProvider {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl ChatProvider for CountingProvider {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _opts: &ChatOptions,
        ) -> Result<LlmResponse, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(LlmError::Api {
                    status: 429,
                    message: "rate limited".into(),
                });
            }
            Ok(LlmResponse::content_only(format!("call-{n}")))
        }
    }

    #[tokio::test]
    async fn second_identical_call_hits_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(CountingProvider {
            calls: AtomicU32::new(0),
            fail_first: 0,
        });
        let gateway = LlmGateway::with_provider(
            provider.clone(),
            Some(ChatCache::new(dir.path().to_path_buf()).unwrap()),
        );

        let messages = [ChatMessage::user("Hello")];
        let opts = ChatOptions::new("gpt-4o-mini");
        let first = gateway.chat(&messages, &opts).await.unwrap();
        let second = gateway.chat(&messages, &opts).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn api_errors_are_retried_within_budget() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicU32::new(0),
            fail_first: 2,
        });
        let gateway = LlmGateway::with_provider(provider.clone(), None);
        let out = gateway
            .chat(&[ChatMessage::user("x")], &ChatOptions::new("m"))
            .await
            .unwrap();
        assert_eq!(out.content, "call-2");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_api_errors_propagate_immediately() {
        #[derive(Debug)]
        struct DecodeFailure;

        #[async_trait]
        impl ChatProvider for DecodeFailure {
            fn name(&self) -> &'static str {
                "broken"
            }
            async fn chat(
                &self,
                _messages: &[ChatMessage],
                _opts: &ChatOptions,
            ) -> Result<LlmResponse, LlmError> {
                Err(LlmError::Decode("garbled".into()))
            }
        }

        let gateway = LlmGateway::with_provider(Arc::new(DecodeFailure), None);
        let err = gateway
            .chat(&[ChatMessage::user("x")], &ChatOptions::new("m"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Decode(_)));
    }
}
