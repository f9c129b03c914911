//! Deterministic hash-based embedder.
//!
//! Maps the 16 md5 digest bytes of the text into the first 16 vector
//! components scaled to `[0, 1]`; the remainder stays zero. Useless for
//! semantics, invaluable for hermetic tests and as a degraded mode when no
//! provider is reachable.

use std::{future::Future, pin::Pin};

use crate::embed::EmbeddingsProvider;
use crate::errors::RagError;

#[derive(Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl EmbeddingsProvider for HashEmbedder {
    fn embed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, RagError>> + Send + 'a>> {
        let mut v = vec![0.0f32; self.dim];
        let digest = md5::compute(text.as_bytes());
        for (slot, byte) in v.iter_mut().zip(digest.iter()) {
            *slot = *byte as f32 / 255.0;
        }
        Box::pin(async move { Ok(v) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deterministic_and_dimensioned() {
        let embedder = HashEmbedder::new(768);
        let a = embedder.embed("hello").await.unwrap();
        let b = embedder.embed("hello").await.unwrap();
        let c = embedder.embed("different").await.unwrap();
        assert_eq!(a.len(), 768);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().all(|x| (0.0..=1.0).contains(x)));
        // only the digest-backed prefix is populated
        assert!(a[16..].iter().all(|x| *x == 0.0));
    }
}
