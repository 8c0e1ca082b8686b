use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;

/// Token refresh tuning managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Attempts one logical call may make through the 401 refresh path.
    /// TOML: `auth.max_attempts`. Default: `3`.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between a successful refresh and the replayed request.
    /// TOML: `auth.courtesy_delay_ms`. Default: `1000`.
    #[serde(default = "default_courtesy_delay_ms")]
    pub courtesy_delay_ms: u64,

    /// Refresh endpoint calls per second.
    /// TOML: `auth.refresh_tps`. Default: `5`.
    #[serde(default = "default_refresh_tps")]
    pub refresh_tps: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct AuthSettings {
    pub max_attempts: u32,
    pub courtesy_delay: Duration,
    pub refresh_tps: NonZeroU32,
}

impl AuthConfig {
    pub fn resolve(&self) -> AuthSettings {
        AuthSettings {
            max_attempts: self.max_attempts.max(1),
            courtesy_delay: Duration::from_millis(self.courtesy_delay_ms),
            refresh_tps: NonZeroU32::new(self.refresh_tps).unwrap_or(NonZeroU32::MIN),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            courtesy_delay_ms: default_courtesy_delay_ms(),
            refresh_tps: default_refresh_tps(),
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        AuthConfig::default().resolve()
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_courtesy_delay_ms() -> u64 {
    1_000
}

fn default_refresh_tps() -> u32 {
    5
}
