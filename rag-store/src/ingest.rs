//! Per-commit ingestion.
//!
//! Enumerates the paths a commit changed, splits each file into paragraph
//! chunks, and writes `{point_id, content, payload}` to the sparse index
//! and `{point_id, vector, payload}` to the dense index. Point ids are
//! content-addressed by `(path, chunk index)`, so re-ingesting a commit
//! overwrites in place.

use std::collections::HashMap;
use std::path::Path;

use git2::Repository;
use tracing::{debug, info, warn};

use crate::chunk::split_chunks;
use crate::dense::DensePoint;
use crate::errors::RagError;
use crate::{RagStore, Result};

pub(crate) async fn ingest_commit(
    store: &RagStore,
    repo_dir: &Path,
    commit_sha: &str,
) -> Result<u64> {
    let changed = changed_paths(repo_dir, commit_sha)?;
    info!(files = changed.len(), commit_sha, "ingesting commit");

    store
        .dense_index()
        .ensure_ready(store.config().embedding_dim)
        .await?;

    let mut written = 0u64;
    for rel in changed {
        let full = repo_dir.join(&rel);
        if !full.exists() {
            debug!(path = %rel, "changed path absent from working tree, skipping");
            continue;
        }
        let bytes = std::fs::read(&full)?;
        let text = String::from_utf8_lossy(&bytes);

        let chunks = split_chunks(&rel, &text);
        if chunks.is_empty() {
            continue;
        }

        let mut points = Vec::with_capacity(chunks.len());
        for (pid, content) in &chunks {
            // Embedding calls stay serialised per process to bound memory.
            let vector = store.embedder().embed(content).await?;
            let payload = HashMap::from([("path".to_string(), rel.clone())]);
            store.sparse_index().upsert(*pid, content, payload.clone());
            points.push(DensePoint {
                point_id: *pid,
                vector,
                payload,
            });
        }
        written += points.len() as u64;
        store.dense_index().upsert(points).await?;
        debug!(path = %rel, chunks = chunks.len(), "file ingested");
    }

    if written == 0 {
        warn!(commit_sha, "commit produced no chunks");
    }
    Ok(written)
}

/// Paths touched by the commit: its diff against the first parent, or the
/// full tree for a root commit.
fn changed_paths(repo_dir: &Path, commit_sha: &str) -> std::result::Result<Vec<String>, RagError> {
    let repo = Repository::open(repo_dir)?;
    let commit = repo.revparse_single(commit_sha)?.peel_to_commit()?;
    let tree = commit.tree()?;
    let parent_tree = match commit.parents().next() {
        Some(parent) => Some(parent.tree()?),
        None => None,
    };

    let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;
    let mut paths: Vec<String> = diff
        .deltas()
        .filter_map(|d| d.new_file().path())
        .map(|p| p.to_string_lossy().to_string())
        .collect();
    paths.sort();
    paths.dedup();
    Ok(paths)
}
