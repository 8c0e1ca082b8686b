use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Coordinator tuning managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThrottleConfig {
    /// Lifetime of cached GET results.
    /// TOML: `throttle.cache_ttl_secs`. Default: `30`.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// TOML: `throttle.cache_max_capacity`. Default: `10000`.
    #[serde(default = "default_cache_max_capacity")]
    pub cache_max_capacity: u64,

    /// Minimum spacing between two dispatches of the same request key.
    /// TOML: `throttle.min_interval_ms`. Default: `5000`.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    /// Total attempts (first try included) for 429/5xx/network failures.
    /// TOML: `throttle.max_attempts`. Default: `3`.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// TOML: `throttle.base_delay_ms`. Default: `1000`.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// TOML: `throttle.max_delay_ms`. Default: `30000`.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Backoff recorded for a key after it was rate limited.
    /// TOML: `throttle.backoff_ceiling_secs`. Default: `60`.
    #[serde(default = "default_backoff_ceiling_secs")]
    pub backoff_ceiling_secs: u64,

    /// Upper bound for one logical call, retries included.
    /// TOML: `throttle.operation_deadline_secs`. Default: `120`.
    #[serde(default = "default_operation_deadline_secs")]
    pub operation_deadline_secs: u64,
}

/// Validated coordinator settings.
#[derive(Debug, Clone, Copy)]
pub struct ThrottleSettings {
    pub cache_ttl: Duration,
    pub cache_max_capacity: u64,
    pub min_interval: Duration,
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_ceiling: Duration,
    pub operation_deadline: Duration,
}

impl ThrottleConfig {
    pub fn resolve(&self) -> ThrottleSettings {
        let base_delay = Duration::from_millis(self.base_delay_ms);
        ThrottleSettings {
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            cache_max_capacity: self.cache_max_capacity.max(1),
            min_interval: Duration::from_millis(self.min_interval_ms),
            max_attempts: self.max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_millis(self.max_delay_ms).max(base_delay),
            backoff_ceiling: Duration::from_secs(self.backoff_ceiling_secs).max(base_delay),
            operation_deadline: Duration::from_secs(self.operation_deadline_secs.max(1)),
        }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_max_capacity: default_cache_max_capacity(),
            min_interval_ms: default_min_interval_ms(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_ceiling_secs: default_backoff_ceiling_secs(),
            operation_deadline_secs: default_operation_deadline_secs(),
        }
    }
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        ThrottleConfig::default().resolve()
    }
}

fn default_cache_ttl_secs() -> u64 {
    30
}

fn default_cache_max_capacity() -> u64 {
    10_000
}

fn default_min_interval_ms() -> u64 {
    5_000
}

fn default_max_attempts() -> usize {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_ceiling_secs() -> u64 {
    60
}

fn default_operation_deadline_secs() -> u64 {
    120
}
