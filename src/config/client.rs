use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// Backend and HTTP client configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Base URL every relative request path is resolved against.
    /// TOML: `client.base_url`. Default: `http://127.0.0.1:8000`.
    #[serde(default = "default_base_url")]
    pub base_url: Url,

    /// Path of the token refresh endpoint.
    /// TOML: `client.refresh_path`. Default: `/api/token/refresh/`.
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,

    /// Path of the credential login endpoint.
    /// TOML: `client.login_path`. Default: `/api/token/`.
    #[serde(default = "default_login_path")]
    pub login_path: String,

    /// Client-side route shown after an unrecoverable authentication failure.
    /// TOML: `client.login_route`. Default: `/login`.
    #[serde(default = "default_login_route")]
    pub login_route: String,

    /// File backing the durable token tier.
    /// TOML: `client.token_file`. Default: `tokens.json`.
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,

    /// Optional outbound HTTP proxy.
    /// TOML: `client.proxy`. Example: `http://127.0.0.1:1080`.
    #[serde(default)]
    pub proxy: Option<Url>,

    /// TOML: `client.connect_timeout_secs`. Default: `5`.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Per-attempt request timeout.
    /// TOML: `client.request_timeout_secs`. Default: `30`.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// TOML: `client.user_agent`.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl ClientConfig {
    pub fn is_refresh_endpoint(&self, url: &str) -> bool {
        url.split(['?', '#'])
            .next()
            .is_some_and(|path| path.ends_with(self.refresh_path.as_str()))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            refresh_path: default_refresh_path(),
            login_path: default_login_path(),
            login_route: default_login_route(),
            token_file: default_token_file(),
            proxy: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_base_url() -> Url {
    Url::parse("http://127.0.0.1:8000").expect("default base_url must be a valid URL")
}

fn default_refresh_path() -> String {
    "/api/token/refresh/".to_string()
}

fn default_login_path() -> String {
    "/api/token/".to_string()
}

fn default_login_route() -> String {
    "/login".to_string()
}

fn default_token_file() -> PathBuf {
    PathBuf::from("tokens.json")
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("mfg-relay/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_endpoint_matches_relative_and_absolute_urls() {
        let cfg = ClientConfig::default();
        assert!(cfg.is_refresh_endpoint("/api/token/refresh/"));
        assert!(cfg.is_refresh_endpoint("http://erp.local/api/token/refresh/?x=1"));
        assert!(!cfg.is_refresh_endpoint("/api/token/"));
        assert!(!cfg.is_refresh_endpoint("/api/products/"));
    }
}
