use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Main configuration structure for vlayer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Semantic divergence configuration
    #[serde(default)]
    pub divergence: DivergenceConfig,

    /// Confidence and risk tier thresholds
    #[serde(default)]
    pub risk: RiskConfig,

    /// Drift detection configuration
    #[serde(default)]
    pub drift: DriftConfig,

    /// Built-in hard constraint limits
    #[serde(default)]
    pub constraints: ConstraintLimits,

    /// Wall-clock budgets
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Per-tenant circuit breaker
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Tenant failure modes
    #[serde(default)]
    pub tenants: TenantsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Embedding backend
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Directory of per-agent rule documents (YAML)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules_dir: Option<String>,
}

/// Semantic divergence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DivergenceConfig {
    /// Exact number of samples a request must carry
    #[serde(default = "default_sample_count")]
    pub sample_count: usize,

    /// Divergence above which an otherwise green outcome is sent to review
    #[serde(default = "default_entropy_threshold")]
    pub entropy_threshold: f64,
}

const fn default_sample_count() -> usize {
    3
}

const fn default_entropy_threshold() -> f64 {
    0.4
}

impl Default for DivergenceConfig {
    fn default() -> Self {
        Self {
            sample_count: default_sample_count(),
            entropy_threshold: default_entropy_threshold(),
        }
    }
}

/// Confidence and risk tier thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RiskConfig {
    /// Minimum confidence for GREEN (the caution threshold)
    #[serde(default = "default_green_confidence")]
    pub green_confidence: f64,

    /// Confidence below which the tier is RED (the danger threshold)
    #[serde(default = "default_red_confidence")]
    pub red_confidence: f64,

    /// Confidence subtracted per violation
    #[serde(default = "default_violation_penalty")]
    pub violation_penalty: f64,
}

const fn default_green_confidence() -> f64 {
    0.8
}

const fn default_red_confidence() -> f64 {
    0.5
}

const fn default_violation_penalty() -> f64 {
    0.15
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            green_confidence: default_green_confidence(),
            red_confidence: default_red_confidence(),
            violation_penalty: default_violation_penalty(),
        }
    }
}

/// Drift detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DriftConfig {
    /// |z| above which drift is reported
    #[serde(default = "default_z_threshold")]
    pub z_threshold: f64,

    /// Prior observations required before drift can be assessed
    #[serde(default = "default_min_history")]
    pub min_history: usize,

    /// Samples retained per agent; oldest are evicted
    #[serde(default = "default_drift_capacity")]
    pub capacity: usize,
}

const fn default_z_threshold() -> f64 {
    2.5
}

const fn default_min_history() -> usize {
    2
}

const fn default_drift_capacity() -> usize {
    100
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            z_threshold: default_z_threshold(),
            min_history: default_min_history(),
            capacity: default_drift_capacity(),
        }
    }
}

/// Built-in hard constraint limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConstraintLimits {
    /// Allowed relative energy imbalance
    #[serde(default = "default_energy_tolerance")]
    pub energy_tolerance: f64,

    /// Maximum loss magnitude a customer accepts
    #[serde(default = "default_max_loss")]
    pub max_loss: f64,

    #[serde(default = "default_temperature_min")]
    pub temperature_min_k: f64,

    #[serde(default = "default_temperature_max")]
    pub temperature_max_k: f64,

    #[serde(default = "default_pressure_min")]
    pub pressure_min_atm: f64,

    #[serde(default = "default_pressure_max")]
    pub pressure_max_atm: f64,

    /// Maximum assets/liabilities ratio
    #[serde(default = "default_max_leverage")]
    pub max_leverage: f64,
}

const fn default_energy_tolerance() -> f64 {
    0.05
}

const fn default_max_loss() -> f64 {
    10_000.0
}

const fn default_temperature_min() -> f64 {
    273.0
}

const fn default_temperature_max() -> f64 {
    373.0
}

const fn default_pressure_min() -> f64 {
    0.5
}

const fn default_pressure_max() -> f64 {
    1.5
}

const fn default_max_leverage() -> f64 {
    3.0
}

impl Default for ConstraintLimits {
    fn default() -> Self {
        Self {
            energy_tolerance: default_energy_tolerance(),
            max_loss: default_max_loss(),
            temperature_min_k: default_temperature_min(),
            temperature_max_k: default_temperature_max(),
            pressure_min_atm: default_pressure_min(),
            pressure_max_atm: default_pressure_max(),
            max_leverage: default_max_leverage(),
        }
    }
}

/// Wall-clock budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BudgetConfig {
    /// Time a decision waits for the checks
    #[serde(default = "default_sync_ms")]
    pub sync_ms: u64,

    /// Time pending checks may keep running after the decision, for audit and drift
    #[serde(default = "default_async_ms")]
    pub async_ms: u64,

    /// Default hard timeout of a delegated rule
    #[serde(default = "default_webhook_timeout_ms")]
    pub webhook_timeout_ms: u64,
}

const fn default_sync_ms() -> u64 {
    50
}

const fn default_async_ms() -> u64 {
    200
}

const fn default_webhook_timeout_ms() -> u64 {
    100
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            sync_ms: default_sync_ms(),
            async_ms: default_async_ms(),
            webhook_timeout_ms: default_webhook_timeout_ms(),
        }
    }
}

impl BudgetConfig {
    pub fn sync_budget(&self) -> Duration {
        Duration::from_millis(self.sync_ms)
    }

    pub fn async_budget(&self) -> Duration {
        Duration::from_millis(self.async_ms)
    }
}

/// Per-tenant circuit breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CircuitBreakerConfig {
    /// Whether the breaker is consulted at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Failure rate over the window above which the circuit opens
    #[serde(default = "default_failure_rate_threshold")]
    pub failure_rate_threshold: f64,

    /// Trailing window for the failure rate
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Outcomes required in the window before the rate is judged
    #[serde(default = "default_minimum_requests")]
    pub minimum_requests: u32,

    /// Time spent open before probing
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Probes admitted while half-open
    #[serde(default = "default_probe_quota")]
    pub probe_quota: u32,

    /// Probe success rate required to close
    #[serde(default = "default_probe_success_rate")]
    pub probe_success_rate: f64,
}

const fn default_true() -> bool {
    true
}

const fn default_failure_rate_threshold() -> f64 {
    0.10
}

const fn default_window_secs() -> u64 {
    60
}

const fn default_minimum_requests() -> u32 {
    5
}

const fn default_cooldown_secs() -> u64 {
    60
}

const fn default_probe_quota() -> u32 {
    10
}

const fn default_probe_success_rate() -> f64 {
    0.90
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            failure_rate_threshold: default_failure_rate_threshold(),
            window_secs: default_window_secs(),
            minimum_requests: default_minimum_requests(),
            cooldown_secs: default_cooldown_secs(),
            probe_quota: default_probe_quota(),
            probe_success_rate: default_probe_success_rate(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.window_secs).unwrap_or(i64::MAX))
    }

    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.cooldown_secs).unwrap_or(i64::MAX))
    }
}

/// What a tenant gets when validation cannot complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    /// Fail closed: block, never bypass.
    Strict,
    /// Fail open with a caution flag.
    #[default]
    Balanced,
    /// Fail open with a caution flag.
    Performance,
}

impl FailureMode {
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Strict)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Balanced => "balanced",
            Self::Performance => "performance",
        }
    }
}

/// Tenant failure modes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TenantsConfig {
    /// Mode for tenants without an explicit entry
    #[serde(default)]
    pub default_mode: FailureMode,

    /// Explicit per-tenant modes
    #[serde(default)]
    pub modes: HashMap<String, FailureMode>,
}

impl TenantsConfig {
    pub fn mode_for(&self, tenant: &str) -> FailureMode {
        self.modes.get(tenant).copied().unwrap_or(self.default_mode)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; console only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,

    /// Rotation of file logs: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Embedding backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EmbeddingConfig {
    /// Provider: hashing (local, deterministic) or openai
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// Vector dimension of the hashing provider
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Embedding model for the openai provider
    #[serde(default = "default_openai_model")]
    pub model: String,

    /// API key (falls back to OPENAI_API_KEY)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Request timeout in milliseconds for remote providers
    #[serde(default = "default_embedding_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_embedding_provider() -> String {
    "hashing".to_string()
}

const fn default_embedding_dimension() -> usize {
    384
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "text-embedding-3-small".to_string()
}

const fn default_embedding_timeout_ms() -> u64 {
    2_000
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            dimension: default_embedding_dimension(),
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            api_key: None,
            timeout_ms: default_embedding_timeout_ms(),
        }
    }
}
