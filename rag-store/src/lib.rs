//! Hybrid retrieval engine: ingestion + dense/sparse search over code chunks.
//!
//! Two stores cooperate on the same content-addressed `point_id`:
//! - a dense vector index (Qdrant, or an in-memory implementation for
//!   deterministic tests), cosine distance;
//! - an in-process BM25 lexical index that doubles as the snippet source.
//!
//! Both are populated by the same per-commit ingestion path, which is
//! idempotent: re-ingesting a commit overwrites, never duplicates.
//! Hybrid search fuses the two result lists by
//! `S(p) = alpha * dense(p) + (1 - alpha) / sparse(p)` with ties broken by
//! ascending point id, making result order fully deterministic for fixed
//! indices.

mod chunk;
mod config;
pub mod dense;
pub mod embed;
mod errors;
mod fuse;
mod ingest;
mod snippet_cache;
mod sparse;

pub use chunk::{point_id, split_chunks};
pub use config::{EmbeddingBackend, RagConfig};
pub use dense::{DenseHit, DensePoint, DenseIndex, MemoryDenseIndex, QdrantDenseIndex};
pub use embed::{EmbeddingsProvider, build_embedder};
pub use errors::RagError;
pub use fuse::fuse_scores;
pub use snippet_cache::SnippetCache;
pub use sparse::{SparseHit, SparseIndex};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use futures::Stream;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Result alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;

/// Equality predicate on chunk payload fields (e.g. `path`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RagFilter {
    pub field: String,
    pub value: String,
}

impl RagFilter {
    pub fn path(value: &str) -> Self {
        Self {
            field: "path".to_string(),
            value: value.to_string(),
        }
    }

    pub(crate) fn matches(&self, payload: &HashMap<String, String>) -> bool {
        payload.get(&self.field).map(String::as_str) == Some(self.value.as_str())
    }
}

/// One fused search hit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RagHit {
    pub point_id: u64,
    pub score: f32,
    /// At most 200 characters materialised from the sparse store.
    pub snippet: String,
    pub path: Option<String>,
}

/// High-level facade wiring the two indices, the embedder, and the snippet
/// cache. The single entry point recommended for application code.
pub struct RagStore {
    cfg: RagConfig,
    dense: Arc<dyn DenseIndex>,
    sparse: SparseIndex,
    embedder: Arc<dyn EmbeddingsProvider>,
    snippets: SnippetCache,
}

impl RagStore {
    pub fn new(
        cfg: RagConfig,
        dense: Arc<dyn DenseIndex>,
        embedder: Arc<dyn EmbeddingsProvider>,
    ) -> Self {
        info!(dim = cfg.embedding_dim, "RagStore::new");
        Self {
            cfg,
            dense,
            sparse: SparseIndex::new(),
            embedder,
            snippets: SnippetCache::new(2048),
        }
    }

    /// Ingests the files changed by `commit_sha` in the checkout at
    /// `repo_dir`. Returns the number of chunks written.
    ///
    /// Embedding calls are serialised per process; chunk ids are derived
    /// from `md5(path:index)`, so re-running the same commit overwrites.
    ///
    /// # Errors
    /// Git, embedding, or index failures.
    #[instrument(skip_all, fields(commit_sha))]
    pub async fn ingest_commit(&self, repo_dir: &Path, commit_sha: &str) -> Result<u64> {
        ingest::ingest_commit(self, repo_dir, commit_sha).await
    }

    /// Writes one chunk straight into both indices, embedding the content.
    /// The commit ingestion path batches dense writes instead; this direct
    /// form serves bootstrap seeding.
    pub async fn index_chunk(
        &self,
        point_id: u64,
        content: &str,
        payload: HashMap<String, String>,
    ) -> Result<()> {
        let vector = self.embedder.embed(content).await?;
        self.sparse.upsert(point_id, content, payload.clone());
        self.dense
            .upsert(vec![DensePoint {
                point_id,
                vector,
                payload,
            }])
            .await?;
        Ok(())
    }

    /// Hybrid search: dense top-2k + sparse top-2k, fused, top-k.
    ///
    /// Recommended defaults `k = 8`, `alpha = 0.25`.
    #[instrument(skip_all, fields(k, alpha))]
    pub async fn hybrid_search(
        &self,
        query: &str,
        k: usize,
        alpha: f32,
        filter: Option<&RagFilter>,
    ) -> Result<Vec<RagHit>> {
        let query_vector = self.embedder.embed(query).await?;
        debug!(dim = query_vector.len(), "query embedded");

        let dense_hits = self.dense.search(query_vector, k * 2, filter).await?;
        let sparse_hits = self.sparse.search(query, k * 2, filter);
        debug!(
            dense = dense_hits.len(),
            sparse = sparse_hits.len(),
            "candidate lists retrieved"
        );

        let fused = fuse_scores(&dense_hits, &sparse_hits, alpha);
        let mut out = Vec::with_capacity(k);
        for (pid, score) in fused.into_iter().take(k) {
            let snippet = self
                .sparse
                .content(pid)
                .map(|c| c.chars().take(200).collect())
                .unwrap_or_default();
            out.push(RagHit {
                point_id: pid,
                score,
                snippet,
                path: self.sparse.payload_field(pid, "path"),
            });
        }
        if out.is_empty() {
            warn!(query_len = query.len(), "hybrid search returned nothing");
        }
        Ok(out)
    }

    /// Materialises up to `radius * 10` characters of a chunk, through the
    /// LRU cache.
    pub async fn snippet(&self, point_id: u64, radius: usize) -> Result<String> {
        let key = format!("snip::{point_id}:{radius}");
        if let Some(hit) = self.snippets.get(&key) {
            return Ok(hit);
        }
        let content = self
            .sparse
            .content(point_id)
            .ok_or(RagError::UnknownPoint(point_id))?;
        let text: String = content.chars().take(radius * 10).collect();
        self.snippets.put(key, text.clone());
        Ok(text)
    }

    /// Lazy stream of materialised snippet texts for the given ids.
    ///
    /// Unknown ids are skipped with a warning rather than poisoning the
    /// stream.
    pub fn snippet_stream<'a>(
        &'a self,
        ids: &[u64],
        radius: usize,
    ) -> impl Stream<Item = String> + 'a {
        futures::stream::iter(ids.to_vec()).filter_map(move |pid| async move {
            match self.snippet(pid, radius).await {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!(point_id = pid, error = %e, "snippet unavailable");
                    None
                }
            }
        })
    }

    pub fn config(&self) -> &RagConfig {
        &self.cfg
    }

    pub(crate) fn dense_index(&self) -> &Arc<dyn DenseIndex> {
        &self.dense
    }

    pub(crate) fn sparse_index(&self) -> &SparseIndex {
        &self.sparse
    }

    pub(crate) fn embedder(&self) -> &Arc<dyn EmbeddingsProvider> {
        &self.embedder
    }
}
