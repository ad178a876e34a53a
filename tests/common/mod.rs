//! Common test utilities for integration tests
//!
//! Deterministic embedders and request/config fixtures shared across the
//! integration test files.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use vlayer::adapters::audit::MemoryAuditSink;
use vlayer::domain::models::Config;
use vlayer::domain::ports::EmbeddingProvider;
use vlayer::{DomainError, DomainResult, ValidationOrchestrator, ValidationRequest};

/// "A" and "B" embed to orthogonal axes, "-A" opposite to "A"; anything else to a third axis.
pub struct AxisEmbedder;

pub fn axis_vector(text: &str) -> Vec<f32> {
    match text {
        "A" => vec![1.0, 0.0, 0.0],
        "B" => vec![0.0, 1.0, 0.0],
        "-A" => vec![-1.0, 0.0, 0.0],
        _ => vec![0.0, 0.0, 1.0],
    }
}

#[async_trait]
impl EmbeddingProvider for AxisEmbedder {
    fn name(&self) -> &'static str {
        "axis"
    }

    fn dimension(&self) -> usize {
        3
    }

    async fn embed(&self, text: &str) -> DomainResult<Vec<f32>> {
        Ok(axis_vector(text))
    }
}

/// Axis embedder that takes `delay` before answering a batch.
pub struct SlowEmbedder {
    pub delay: Duration,
}

#[async_trait]
impl EmbeddingProvider for SlowEmbedder {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn dimension(&self) -> usize {
        3
    }

    async fn embed(&self, text: &str) -> DomainResult<Vec<f32>> {
        Ok(axis_vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> DomainResult<Vec<Vec<f32>>> {
        tokio::time::sleep(self.delay).await;
        Ok(texts.iter().map(|t| axis_vector(t)).collect())
    }
}

/// Embedder whose backend is always down.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn dimension(&self) -> usize {
        3
    }

    async fn embed(&self, _text: &str) -> DomainResult<Vec<f32>> {
        Err(DomainError::Embedding("backend unavailable".to_string()))
    }
}

pub fn samples(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

pub fn request(items: &[&str]) -> ValidationRequest {
    ValidationRequest::new(samples(items))
}

/// Orchestrator over `embedder` with an in-memory audit sink.
pub fn orchestrator_with(
    config: Config,
    embedder: Arc<dyn EmbeddingProvider>,
) -> (ValidationOrchestrator, Arc<MemoryAuditSink>) {
    let audit = Arc::new(MemoryAuditSink::new());
    let orchestrator = ValidationOrchestrator::builder(config, embedder)
        .audit_sink(audit.clone())
        .build();
    (orchestrator, audit)
}

pub fn orchestrator(config: Config) -> (ValidationOrchestrator, Arc<MemoryAuditSink>) {
    orchestrator_with(config, Arc::new(AxisEmbedder))
}

/// Setup test logging
#[allow(dead_code)]
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
