//! CLI command implementations.

pub mod config;
pub mod rules;
pub mod validate;
