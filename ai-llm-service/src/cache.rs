//! Content-addressed disk cache for chat responses.
//!
//! Key = `sha256(model ‖ canonical_json(messages) ‖ canonical_json(opts))`,
//! one JSON file per key. Writes go through a temp file in the same
//! directory followed by a rename, so concurrent writers of the same key
//! are safe: writes are deterministic and the final rename is atomic.
//! Entries are immutable for the life of a pipeline run.

use std::io::Write;
use std::path::PathBuf;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::errors::LlmError;
use crate::message::{ChatMessage, ChatOptions, LlmResponse};

pub struct ChatCache {
    dir: PathBuf,
}

impl ChatCache {
    pub fn new(dir: PathBuf) -> Result<Self, LlmError> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Derives the cache key for a call. Serde struct serialization has a
    /// fixed field order, which makes the JSON canonical here.
    pub fn key(&self, messages: &[ChatMessage], opts: &ChatOptions) -> String {
        let mut hasher = Sha256::new();
        hasher.update(opts.model.as_bytes());
        hasher.update(serde_json::to_vec(messages).unwrap_or_default());
        hasher.update(serde_json::to_vec(opts).unwrap_or_default());
        format!("{:x}", hasher.finalize())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Returns the stored response, or `None` on miss or unreadable entry.
    pub fn get(&self, key: &str) -> Option<LlmResponse> {
        let path = self.path_for(key);
        let bytes = std::fs::read(&path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(resp) => {
                debug!(key, "llm cache hit");
                Some(resp)
            }
            Err(e) => {
                warn!(key, error = %e, "unreadable cache entry ignored");
                None
            }
        }
    }

    /// Persists a response atomically.
    pub fn put(&self, key: &str, response: &LlmResponse) -> Result<(), LlmError> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&serde_json::to_vec(response).map_err(|e| {
            LlmError::Decode(format!("serialize cache entry: {e}"))
        })?)?;
        tmp.persist(self.path_for(key))
            .map_err(|e| LlmError::Cache(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> (tempfile::TempDir, ChatCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChatCache::new(dir.path().to_path_buf()).unwrap();
        (dir, cache)
    }

    #[test]
    fn identical_calls_share_a_key() {
        let (_dir, cache) = cache();
        let messages = [ChatMessage::user("test")];
        let a = cache.key(&messages, &ChatOptions::new("gpt-4"));
        let b = cache.key(&messages, &ChatOptions::new("gpt-4"));
        assert_eq!(a, b);

        let c = cache.key(&[ChatMessage::user("different")], &ChatOptions::new("gpt-4"));
        assert_ne!(a, c);

        let mut opts = ChatOptions::new("gpt-4");
        opts.temperature = 0.5;
        let d = cache.key(&messages, &opts);
        assert_ne!(a, d);
    }

    #[test]
    fn roundtrip_returns_the_stored_response() {
        let (_dir, cache) = cache();
        let resp = LlmResponse {
            content: "answer".into(),
            tokens_prompt: 3,
            tokens_completion: 7,
            cost_usd: 0.001,
        };
        cache.put("k1", &resp).unwrap();
        assert_eq!(cache.get("k1").unwrap(), resp);
        assert!(cache.get("k2").is_none());
    }
}
