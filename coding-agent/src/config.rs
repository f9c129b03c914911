//! Agent configuration.

use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Repository every task targets.
    pub remote_repo: String,
    /// Branch the working tree is materialised from.
    pub remote_branch: String,
    /// Local reference cache used as the clone source when present.
    pub cache_ref: Option<PathBuf>,
    /// Extra attempts after the first; total attempts = `max_retries + 1`.
    pub max_retries: u32,
    /// Model for patch generation.
    pub model: String,
    /// Marker selecting the fast test subset.
    pub pytest_mark: String,
    /// Shallow clone depth; `None` clones fully (local fixtures).
    pub clone_depth: Option<i32>,
    /// Parent directory for scoped working trees; `None` uses the system
    /// temp dir.
    pub scratch_root: Option<PathBuf>,
    /// Hard cap on concatenated snippet context, in characters.
    pub context_cap: usize,
}

impl AgentConfig {
    /// Builds the config from environment variables.
    ///
    /// Recognized vars: `REMOTE_REPO`, `REMOTE_BRANCH` (default `main`),
    /// `GIT_CACHE_REF`, `MAX_RETRIES` (default 2), `CODING_MODEL`
    /// (default `gpt-4o-mini`), `PYTEST_MARK` (default `fast`).
    pub fn from_env() -> Self {
        let max_retries = std::env::var("MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(2);
        Self {
            remote_repo: std::env::var("REMOTE_REPO")
                .unwrap_or_else(|_| "https://github.com/your-org/self-healing-code".to_string()),
            remote_branch: std::env::var("REMOTE_BRANCH").unwrap_or_else(|_| "main".to_string()),
            cache_ref: std::env::var("GIT_CACHE_REF").ok().map(PathBuf::from),
            max_retries,
            model: std::env::var("CODING_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            pytest_mark: std::env::var("PYTEST_MARK").unwrap_or_else(|_| "fast".to_string()),
            clone_depth: Some(1),
            scratch_root: None,
            context_cap: 3000,
        }
    }
}
