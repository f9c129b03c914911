//! Dense vector index: the trait, the Qdrant binding, and a deterministic
//! in-memory implementation.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, Distance, FieldCondition, Filter, Match, PointId,
    PointStruct, SearchPointsBuilder, UpsertPointsBuilder, Value as QValue, Vector,
    VectorParamsBuilder, Vectors, condition, r#match::MatchValue, point_id, value, vectors,
};
use tracing::{debug, info, warn};

use crate::RagFilter;
use crate::errors::RagError;

/// One stored vector with its payload.
#[derive(Clone, Debug)]
pub struct DensePoint {
    pub point_id: u64,
    pub vector: Vec<f32>,
    pub payload: HashMap<String, String>,
}

/// One search hit. `score` is cosine similarity clamped to `[0, 1]`
/// (higher is better).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DenseHit {
    pub point_id: u64,
    pub score: f32,
}

/// Vector store keyed by point id.
#[async_trait]
pub trait DenseIndex: Send + Sync {
    /// Creates backing storage if missing. `dim` is the vector width.
    async fn ensure_ready(&self, dim: usize) -> Result<(), RagError>;

    /// Inserts or overwrites points by id. Returns the number written.
    async fn upsert(&self, points: Vec<DensePoint>) -> Result<u64, RagError>;

    /// Top-k by cosine similarity, ties broken by ascending point id.
    async fn search(
        &self,
        vector: Vec<f32>,
        top_k: usize,
        filter: Option<&RagFilter>,
    ) -> Result<Vec<DenseHit>, RagError>;
}

/* ==========================
In-memory implementation
========================== */

/// Deterministic dense index for tests and single-process runs.
pub struct MemoryDenseIndex {
    points: RwLock<HashMap<u64, (Vec<f32>, HashMap<String, String>)>>,
}

impl MemoryDenseIndex {
    pub fn new() -> Self {
        Self {
            points: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryDenseIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

#[async_trait]
impl DenseIndex for MemoryDenseIndex {
    async fn ensure_ready(&self, _dim: usize) -> Result<(), RagError> {
        Ok(())
    }

    async fn upsert(&self, points: Vec<DensePoint>) -> Result<u64, RagError> {
        let mut guard = self
            .points
            .write()
            .map_err(|_| RagError::Provider("dense index poisoned".into()))?;
        let n = points.len() as u64;
        for p in points {
            guard.insert(p.point_id, (p.vector, p.payload));
        }
        Ok(n)
    }

    async fn search(
        &self,
        vector: Vec<f32>,
        top_k: usize,
        filter: Option<&RagFilter>,
    ) -> Result<Vec<DenseHit>, RagError> {
        let guard = self
            .points
            .read()
            .map_err(|_| RagError::Provider("dense index poisoned".into()))?;
        let mut hits: Vec<DenseHit> = guard
            .iter()
            .filter(|(_, (_, payload))| filter.map(|f| f.matches(payload)).unwrap_or(true))
            .map(|(pid, (v, _))| DenseHit {
                point_id: *pid,
                score: cosine(&vector, v).max(0.0),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.point_id.cmp(&b.point_id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}

/* ==========================
Qdrant binding
========================== */

/// Thin adapter around `qdrant-client`, isolating the builder API from the
/// rest of the engine.
pub struct QdrantDenseIndex {
    client: Qdrant,
    collection: String,
}

impl QdrantDenseIndex {
    pub fn new(url: &str, api_key: Option<&str>, collection: &str) -> Result<Self, RagError> {
        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key.to_string());
        }
        let client = builder
            .build()
            .map_err(|e| RagError::Qdrant(e.to_string()))?;
        Ok(Self {
            client,
            collection: collection.to_string(),
        })
    }
}

#[async_trait]
impl DenseIndex for QdrantDenseIndex {
    async fn ensure_ready(&self, dim: usize) -> Result<(), RagError> {
        match self.client.collection_info(&self.collection).await {
            Ok(_) => {
                debug!("collection '{}' already exists", self.collection);
                return Ok(());
            }
            Err(err) => {
                warn!(
                    "collection '{}' not found, will be created (error={})",
                    self.collection, err
                );
            }
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(dim as u64, Distance::Cosine)),
            )
            .await
            .map_err(|e| RagError::Qdrant(e.to_string()))?;

        info!("collection '{}' created", self.collection);
        Ok(())
    }

    async fn upsert(&self, points: Vec<DensePoint>) -> Result<u64, RagError> {
        if points.is_empty() {
            return Ok(0);
        }
        let n = points.len() as u64;
        let qpoints: Vec<PointStruct> = points
            .into_iter()
            .map(|p| {
                let mut payload: HashMap<String, QValue> = HashMap::new();
                for (k, v) in p.payload {
                    payload.insert(
                        k,
                        QValue {
                            kind: Some(value::Kind::StringValue(v)),
                        },
                    );
                }
                let wrapped = Vectors {
                    vectors_options: Some(vectors::VectorsOptions::Vector(Vector {
                        data: p.vector,
                        ..Default::default()
                    })),
                };
                PointStruct {
                    id: Some(PointId {
                        point_id_options: Some(point_id::PointIdOptions::Num(p.point_id)),
                    }),
                    payload,
                    vectors: Some(wrapped),
                    ..Default::default()
                }
            })
            .collect();

        info!(
            "upserting {} points into collection '{}'",
            n, self.collection
        );
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, qpoints))
            .await
            .map_err(|e| RagError::Qdrant(e.to_string()))?;
        Ok(n)
    }

    async fn search(
        &self,
        vector: Vec<f32>,
        top_k: usize,
        filter: Option<&RagFilter>,
    ) -> Result<Vec<DenseHit>, RagError> {
        let mut builder = SearchPointsBuilder::new(&self.collection, vector, top_k as u64);
        if let Some(f) = filter {
            // qdrant-client 1.15 has no helper constructors; set the enum.
            let field = FieldCondition {
                key: f.field.clone(),
                r#match: Some(Match {
                    match_value: Some(MatchValue::Keyword(f.value.clone())),
                }),
                ..Default::default()
            };
            builder = builder.filter(Filter {
                must: vec![Condition {
                    condition_one_of: Some(condition::ConditionOneOf::Field(field)),
                }],
                ..Default::default()
            });
        }

        let res = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| RagError::Qdrant(e.to_string()))?;

        let mut hits = Vec::with_capacity(res.result.len());
        for scored in res.result {
            let Some(point_id::PointIdOptions::Num(pid)) =
                scored.id.and_then(|id| id.point_id_options)
            else {
                warn!("non-numeric point id in search result, skipping");
                continue;
            };
            hits.push(DenseHit {
                point_id: pid,
                score: scored.score.clamp(0.0, 1.0),
            });
        }
        debug!("search completed: {} hits returned", hits.len());
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_index_ranks_by_similarity() {
        let index = MemoryDenseIndex::new();
        index
            .upsert(vec![
                DensePoint {
                    point_id: 1,
                    vector: vec![1.0, 0.0],
                    payload: HashMap::new(),
                },
                DensePoint {
                    point_id: 2,
                    vector: vec![0.0, 1.0],
                    payload: HashMap::new(),
                },
            ])
            .await
            .unwrap();

        let hits = index.search(vec![1.0, 0.1], 2, None).await.unwrap();
        assert_eq!(hits[0].point_id, 1);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn memory_index_overwrites_by_id() {
        let index = MemoryDenseIndex::new();
        for _ in 0..2 {
            index
                .upsert(vec![DensePoint {
                    point_id: 5,
                    vector: vec![1.0, 0.0],
                    payload: HashMap::new(),
                }])
                .await
                .unwrap();
        }
        let hits = index.search(vec![1.0, 0.0], 10, None).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn equal_scores_tie_break_by_point_id() {
        let index = MemoryDenseIndex::new();
        index
            .upsert(vec![
                DensePoint {
                    point_id: 9,
                    vector: vec![1.0, 0.0],
                    payload: HashMap::new(),
                },
                DensePoint {
                    point_id: 3,
                    vector: vec![1.0, 0.0],
                    payload: HashMap::new(),
                },
            ])
            .await
            .unwrap();
        let hits = index.search(vec![1.0, 0.0], 2, None).await.unwrap();
        assert_eq!(hits[0].point_id, 3);
        assert_eq!(hits[1].point_id, 9);
    }
}
