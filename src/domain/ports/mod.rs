//! Port trait definitions (Hexagonal Architecture)
//!
//! - EmbeddingProvider: text to vector, consumed by the divergence analyzer
//! - RuleDelegate: external verdicts for delegated rules
//! - AuditSink: destination for decision and late-check records

pub mod audit;
pub mod embedding;
pub mod rule_delegate;

pub use audit::{AuditEvent, AuditKind, AuditSink};
pub use embedding::EmbeddingProvider;
pub use rule_delegate::{DelegateCall, DelegateVerdict, RuleDelegate};
