//! Embedding capability port.
//!
//! Maps text to a fixed-length vector. The divergence analyzer only does the
//! similarity arithmetic; model lifecycle belongs to the implementation.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;

/// Trait for embedding backends.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name (e.g., "hashing", "openai").
    fn name(&self) -> &'static str;

    /// Length of every vector this provider returns.
    fn dimension(&self) -> usize;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> DomainResult<Vec<f32>>;

    /// Embed several texts, preserving input order.
    ///
    /// Remote providers override this to use a single round trip.
    async fn embed_batch(&self, texts: &[String]) -> DomainResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}
