mod auth;
mod basic;
mod client;
mod throttle;

pub use auth::{AuthConfig, AuthSettings};
pub use basic::BasicConfig;
pub use client::ClientConfig;
pub use throttle::{ThrottleConfig, ThrottleSettings};

use crate::error::RelayError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Logging settings (see `basic` table in relay.toml).
    #[serde(default)]
    pub basic: BasicConfig,

    /// Backend location, token storage and HTTP client settings.
    #[serde(default)]
    pub client: ClientConfig,

    /// Cache, interval and retry tuning for the coordinator.
    #[serde(default)]
    pub throttle: ThrottleConfig,

    /// Token refresh tuning.
    #[serde(default)]
    pub auth: AuthConfig,
}

const DEFAULT_CONFIG_FILE: &str = "relay.toml";
const ENV_PREFIX: &str = "RELAY_";

impl Config {
    /// Builds a Figment that merges defaults, `relay.toml` and `RELAY_*` variables.
    ///
    /// Nested keys use a double underscore: `RELAY_CLIENT__BASE_URL`.
    pub fn figment() -> Figment {
        Self::figment_from(PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    pub fn figment_from(path: PathBuf) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if path.is_file() {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load() -> Result<Self, RelayError> {
        Self::figment()
            .extract()
            .map_err(|err| RelayError::Config(err.to_string()))
    }

    pub fn throttle_settings(&self) -> ThrottleSettings {
        self.throttle.resolve()
    }

    pub fn auth_settings(&self) -> AuthSettings {
        self.auth.resolve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn defaults_match_documented_tunables() {
        let cfg = Config::default();
        let throttle = cfg.throttle_settings();
        assert_eq!(throttle.cache_ttl, Duration::from_secs(30));
        assert_eq!(throttle.min_interval, Duration::from_secs(5));
        assert_eq!(throttle.max_attempts, 3);
        assert_eq!(throttle.base_delay, Duration::from_secs(1));
        assert_eq!(throttle.max_delay, Duration::from_secs(30));
        assert_eq!(throttle.backoff_ceiling, Duration::from_secs(60));

        let auth = cfg.auth_settings();
        assert_eq!(auth.max_attempts, 3);
        assert_eq!(auth.courtesy_delay, Duration::from_secs(1));
        assert_eq!(cfg.client.refresh_path, "/api/token/refresh/");
        assert_eq!(cfg.client.login_route, "/login");
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "[client]\nbase_url = \"http://erp.internal:9000\"\n\n[throttle]\ncache_ttl_secs = 5\nmax_attempts = 0"
        )
        .expect("write toml");

        let cfg: Config = Config::figment_from(file.path().to_path_buf())
            .extract()
            .expect("extract config");

        assert_eq!(cfg.client.base_url.as_str(), "http://erp.internal:9000/");
        let throttle = cfg.throttle_settings();
        assert_eq!(throttle.cache_ttl, Duration::from_secs(5));
        // zero attempts is clamped to a single attempt
        assert_eq!(throttle.max_attempts, 1);
        assert_eq!(throttle.min_interval, Duration::from_secs(5));
    }
}
