//! Adapters for external systems behind the domain ports.

pub mod audit;
pub mod embeddings;
pub mod webhook;
