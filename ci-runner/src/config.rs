//! CI runner configuration.

use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct CiConfig {
    pub remote_repo: String,
    /// Marker selecting the test subset (`PYTEST_MARK`).
    pub pytest_mark: String,
    /// Where commit tarballs land.
    pub artefact_root: PathBuf,
}

impl CiConfig {
    /// Builds the config from `REMOTE_REPO`, `PYTEST_MARK` (default
    /// `fast`), and `ARTEFACT_ROOT` (default `/artefacts`).
    pub fn from_env() -> Self {
        Self {
            remote_repo: std::env::var("REMOTE_REPO").unwrap_or_default(),
            pytest_mark: std::env::var("PYTEST_MARK").unwrap_or_else(|_| "fast".to_string()),
            artefact_root: std::env::var("ARTEFACT_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/artefacts")),
        }
    }
}
