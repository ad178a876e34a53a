//! Infrastructure layer module
//!
//! Edge concerns that feed the validation core:
//! - Configuration management (figment)
//! - Logging infrastructure (tracing-subscriber, tracing-appender)
//! - Rule document loading (serde_yaml)

pub mod config;
pub mod logging;
pub mod rules;
