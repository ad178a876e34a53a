//! Rule document loading
//!
//! Reads per-agent YAML rule documents from disk and compiles them into a
//! [`RuleRegistry`](crate::services::RuleRegistry).

pub mod loader;

pub use loader::RuleLoader;
