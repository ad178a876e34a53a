//! Embedding provider adapters.

pub mod hashing;
pub mod openai;

pub use hashing::HashingEmbeddingProvider;
pub use openai::{OpenAiEmbeddingConfig, OpenAiEmbeddingProvider};

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::domain::models::EmbeddingConfig;
use crate::domain::ports::EmbeddingProvider;

/// Build the provider named by `config.provider`.
pub fn provider_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "hashing" => Ok(Arc::new(HashingEmbeddingProvider::new(config.dimension))),
        "openai" => Ok(Arc::new(OpenAiEmbeddingProvider::new(config.into())?)),
        other => bail!("Unknown embedding provider: {other}"),
    }
}
