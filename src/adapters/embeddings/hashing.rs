//! Local, deterministic embedding provider.
//!
//! Feature hashing over lowercased word tokens and character trigrams, with a
//! hash-derived sign per feature, L2-normalised. No model, no network: equal
//! texts always produce equal vectors and texts sharing vocabulary score as
//! similar.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::ports::EmbeddingProvider;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Word features count more than trigram features.
const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

fn fnv1a(bytes: &[u8], seed: u64) -> u64 {
    bytes.iter().fold(FNV_OFFSET ^ seed, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimension: usize,
}

impl HashingEmbeddingProvider {
    /// `dimension` of zero is bumped to one.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn add_feature(&self, vector: &mut [f32], feature: &[u8], seed: u64, weight: f32) {
        let hash = fnv1a(feature, seed);
        #[allow(clippy::cast_possible_truncation)]
        let slot = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[slot] += sign * weight;
    }

    /// Embed synchronously; the async port just wraps this.
    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        let lowered = text.to_lowercase();

        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            self.add_feature(&mut vector, word.as_bytes(), 0, WORD_WEIGHT);
        }

        let chars: Vec<char> = format!(" {} ", lowered.split_whitespace().collect::<Vec<_>>().join(" "))
            .chars()
            .collect();
        let mut buf = [0_u8; 12];
        for window in chars.windows(3) {
            let mut len = 0;
            for c in window {
                len += c.encode_utf8(&mut buf[len..]).len();
            }
            self.add_feature(&mut vector, &buf[..len], 1, TRIGRAM_WEIGHT);
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    fn name(&self) -> &'static str {
        "hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> DomainResult<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> DomainResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::divergence::cosine_similarity;

    #[test]
    fn test_deterministic_and_normalised() {
        let provider = HashingEmbeddingProvider::new(64);
        let a = provider.vectorize("Energy output is 0.1 units");
        let b = provider.vectorize("Energy output is 0.1 units");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_case_and_spacing_insensitive() {
        let provider = HashingEmbeddingProvider::default();
        let a = provider.vectorize("Approve the   trade");
        let b = provider.vectorize("approve the trade");
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_shared_vocabulary_scores_higher() {
        let provider = HashingEmbeddingProvider::default();
        let base = provider.vectorize("the reactor output is stable at 40 megawatts");
        let close = provider.vectorize("the reactor output is stable at 41 megawatts");
        let far = provider.vectorize("buy two hundred shares of ACME before noon");
        assert!(cosine_similarity(&base, &close) > cosine_similarity(&base, &far));
    }

    #[test]
    fn test_blank_text_is_zero_vector() {
        let provider = HashingEmbeddingProvider::new(8);
        assert!(provider.vectorize("   ").iter().all(|x| *x == 0.0));
    }
}
