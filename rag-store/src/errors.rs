//! Error types used across the retrieval library.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("embedding provider error: {0}")]
    Provider(String),

    #[error("qdrant error: {0}")]
    Qdrant(String),

    #[error("unknown point id {0}")]
    UnknownPoint(u64),

    #[error("missing embedding")]
    MissingEmbedding,

    #[error("vector size mismatch: got={got}, want={want}")]
    VectorSizeMismatch { got: usize, want: usize },
}
