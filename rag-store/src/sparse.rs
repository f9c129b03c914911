//! In-process BM25 lexical index.
//!
//! Same point-id space as the dense index, single-writer during ingestion,
//! many concurrent readers. Scores follow the distance convention of the
//! engine's fusion formula: **lower is better**, computed as the inverse of
//! the BM25 relevance so that `(1 - alpha) / score` grows with relevance.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use tracing::trace;

use crate::RagFilter;

const K1: f32 = 1.2;
const B: f32 = 0.75;

/// One sparse hit; `score` is a distance (lower = more relevant).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SparseHit {
    pub point_id: u64,
    pub score: f32,
}

struct Doc {
    content: String,
    payload: HashMap<String, String>,
    terms: HashMap<String, u32>,
    len: usize,
}

#[derive(Default)]
struct Inner {
    docs: HashMap<u64, Doc>,
    postings: HashMap<String, HashSet<u64>>,
    total_len: usize,
}

pub struct SparseIndex {
    inner: RwLock<Inner>,
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

impl SparseIndex {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Inserts or overwrites a document. Overwriting first retracts the old
    /// term postings, which is what makes re-ingestion idempotent.
    pub fn upsert(&self, point_id: u64, content: &str, payload: HashMap<String, String>) {
        let mut inner = match self.inner.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(old) = inner.docs.remove(&point_id) {
            inner.total_len -= old.len;
            for term in old.terms.keys() {
                if let Some(ids) = inner.postings.get_mut(term) {
                    ids.remove(&point_id);
                    if ids.is_empty() {
                        inner.postings.remove(term);
                    }
                }
            }
        }

        let tokens = tokenize(content);
        let mut terms: HashMap<String, u32> = HashMap::new();
        for t in &tokens {
            *terms.entry(t.clone()).or_insert(0) += 1;
        }
        for term in terms.keys() {
            inner
                .postings
                .entry(term.clone())
                .or_default()
                .insert(point_id);
        }
        inner.total_len += tokens.len();
        inner.docs.insert(
            point_id,
            Doc {
                content: content.to_string(),
                payload,
                terms,
                len: tokens.len(),
            },
        );
    }

    /// BM25 top-k for the query, distance convention, ties by ascending id.
    pub fn search(&self, query: &str, top_k: usize, filter: Option<&RagFilter>) -> Vec<SparseHit> {
        let inner = match self.inner.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if inner.docs.is_empty() {
            return Vec::new();
        }

        let n_docs = inner.docs.len() as f32;
        let avg_len = inner.total_len as f32 / n_docs;
        let query_terms = tokenize(query);

        let mut candidates: HashSet<u64> = HashSet::new();
        for term in &query_terms {
            if let Some(ids) = inner.postings.get(term) {
                candidates.extend(ids);
            }
        }
        trace!(candidates = candidates.len(), "sparse candidates gathered");

        let mut hits: Vec<SparseHit> = candidates
            .into_iter()
            .filter_map(|pid| {
                let doc = inner.docs.get(&pid)?;
                if let Some(f) = filter {
                    if !f.matches(&doc.payload) {
                        return None;
                    }
                }
                let mut relevance = 0.0f32;
                for term in &query_terms {
                    let tf = *doc.terms.get(term).unwrap_or(&0) as f32;
                    if tf == 0.0 {
                        continue;
                    }
                    let df = inner.postings.get(term).map(|s| s.len()).unwrap_or(0) as f32;
                    let idf = (1.0 + (n_docs - df + 0.5) / (df + 0.5)).ln();
                    let denom = tf + K1 * (1.0 - B + B * doc.len as f32 / avg_len);
                    relevance += idf * tf * (K1 + 1.0) / denom;
                }
                if relevance <= 0.0 {
                    return None;
                }
                Some(SparseHit {
                    point_id: pid,
                    score: 1.0 / relevance,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            a.score
                .total_cmp(&b.score)
                .then(a.point_id.cmp(&b.point_id))
        });
        hits.truncate(top_k);
        hits
    }

    /// Full stored content of a chunk.
    pub fn content(&self, point_id: u64) -> Option<String> {
        let inner = self.inner.read().ok()?;
        inner.docs.get(&point_id).map(|d| d.content.clone())
    }

    /// One payload field of a chunk.
    pub fn payload_field(&self, point_id: u64, field: &str) -> Option<String> {
        let inner = self.inner.read().ok()?;
        inner.docs.get(&point_id)?.payload.get(field).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|g| g.docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SparseIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(path: &str) -> HashMap<String, String> {
        HashMap::from([("path".to_string(), path.to_string())])
    }

    #[test]
    fn matching_doc_beats_non_matching() {
        let index = SparseIndex::new();
        index.upsert(1, "def greet(): print('hello')", payload("a.py"));
        index.upsert(2, "def parse_config(): return env", payload("b.py"));

        let hits = index.search("greet hello", 10, None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].point_id, 1);
        assert!(hits[0].score > 0.0);
    }

    #[test]
    fn stronger_match_scores_lower_distance() {
        let index = SparseIndex::new();
        index.upsert(1, "greet greet greet the user", payload("a.py"));
        index.upsert(2, "greet once in passing with many other unrelated words", payload("b.py"));

        let hits = index.search("greet", 10, None);
        assert_eq!(hits[0].point_id, 1);
        assert!(hits[0].score < hits[1].score);
    }

    #[test]
    fn reingest_overwrites_instead_of_duplicating() {
        let index = SparseIndex::new();
        index.upsert(7, "first version of the chunk", payload("a.py"));
        index.upsert(7, "second version entirely different", payload("a.py"));

        assert_eq!(index.len(), 1);
        assert!(index.search("first", 10, None).is_empty());
        assert_eq!(index.search("second", 10, None).len(), 1);
        assert_eq!(
            index.content(7).unwrap(),
            "second version entirely different"
        );
    }

    #[test]
    fn filter_applies_to_payload() {
        let index = SparseIndex::new();
        index.upsert(1, "greet the user", payload("a.py"));
        index.upsert(2, "greet the admin", payload("b.py"));

        let f = RagFilter::path("b.py");
        let hits = index.search("greet", 10, Some(&f));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].point_id, 2);
    }
}
