//! Semantic divergence across candidate samples.

use std::sync::Arc;
use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::EmbeddingProvider;

/// Turns N candidate samples into a 0-1 instability score.
///
/// 0 means every sample says the same thing; 1 means maximal disagreement.
#[derive(Clone)]
pub struct DivergenceAnalyzer {
    embedder: Arc<dyn EmbeddingProvider>,
    sample_count: usize,
}

impl DivergenceAnalyzer {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, sample_count: usize) -> Self {
        Self {
            embedder,
            sample_count,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Reject inputs that do not carry exactly the configured sample count.
    pub fn check_sample_count(&self, samples: &[String]) -> DomainResult<()> {
        if samples.len() == self.sample_count {
            Ok(())
        } else {
            Err(DomainError::InvalidSampleCount {
                expected: self.sample_count,
                actual: samples.len(),
            })
        }
    }

    /// Score the samples.
    ///
    /// All blank: 0. Some blank: 1. Otherwise the mean pairwise cosine
    /// similarity `s` of the embeddings maps to `clamp((1 - s) / 2, 0, 1)`.
    pub async fn score(&self, samples: &[String]) -> DomainResult<f64> {
        self.check_sample_count(samples)?;

        let blank = samples.iter().filter(|s| s.trim().is_empty()).count();
        if blank == samples.len() {
            return Ok(0.0);
        }
        if blank > 0 {
            debug!(blank, total = samples.len(), "Blank sample alongside content");
            return Ok(1.0);
        }

        let vectors = self.embedder.embed_batch(samples).await?;
        if vectors.len() != samples.len() {
            return Err(DomainError::Embedding(format!(
                "{} returned {} vectors for {} samples",
                self.embedder.name(),
                vectors.len(),
                samples.len()
            )));
        }

        let similarity = mean_pairwise_similarity(&vectors)?;
        let divergence = divergence_from_similarity(similarity);
        debug!(
            provider = self.embedder.name(),
            similarity, divergence, "Divergence scored"
        );
        Ok(divergence)
    }
}

/// Map a mean cosine similarity in [-1, 1] to a divergence in [0, 1].
pub fn divergence_from_similarity(similarity: f64) -> f64 {
    let d = (1.0 - similarity) / 2.0;
    if d.is_nan() {
        return 1.0;
    }
    d.clamp(0.0, 1.0)
}

/// Cosine similarity. A zero vector is similar to nothing.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

fn mean_pairwise_similarity(vectors: &[Vec<f32>]) -> DomainResult<f64> {
    let mut total = 0.0;
    let mut pairs = 0_usize;
    for (i, a) in vectors.iter().enumerate() {
        for b in &vectors[i + 1..] {
            if a.len() != b.len() {
                return Err(DomainError::Embedding(format!(
                    "dimension mismatch: {} vs {}",
                    a.len(),
                    b.len()
                )));
            }
            total += cosine_similarity(a, b);
            pairs += 1;
        }
    }
    if pairs == 0 {
        return Ok(1.0);
    }
    Ok(total / pairs as f64)
}
