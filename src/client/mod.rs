mod response;

pub(crate) use response::normalize;

use crate::auth::{FileTokenStorage, MemoryTokenStorage, Tier, TokenRefresher, TokenStore};
use crate::config::{AuthSettings, ClientConfig, Config};
use crate::error::{AuthError, RelayError, SendError, TransportError};
use crate::transport::{HttpTransport, OutboundRequest, ReqwestTransport, RequestBody};
use crate::utils::jwt::token_expiry;
use mfg_relay_cache::RequestKey;
use mfg_relay_schema::ApiResult;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

/// Per-call request description: method, extra headers, optional body.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn request_key(&self, url: &str) -> RequestKey {
        let body = self.body.as_ref().map(RequestBody::fingerprint_source);
        RequestKey::new(self.method.as_str(), url, body.as_ref())
    }
}

/// The transport primitive: one logical call, normalized result, and the
/// 401 refresh-and-replay loop.
#[derive(Clone)]
pub struct CoreClient {
    inner: Arc<CoreInner>,
}

struct CoreInner {
    transport: Arc<dyn HttpTransport>,
    tokens: TokenStore,
    refresher: TokenRefresher,
    cfg: ClientConfig,
    auth: AuthSettings,
}

impl CoreClient {
    /// Builds the client and spawns its refresh worker; needs a tokio runtime.
    pub fn new(
        cfg: &Config,
        transport: Arc<dyn HttpTransport>,
        tokens: TokenStore,
    ) -> Result<Self, RelayError> {
        let auth = cfg.auth_settings();
        let refresh_url = cfg.client.base_url.join(&cfg.client.refresh_path)?;
        let refresher = TokenRefresher::spawn(transport.clone(), tokens.clone(), refresh_url, &auth);

        Ok(Self {
            inner: Arc::new(CoreInner {
                transport,
                tokens,
                refresher,
                cfg: cfg.client.clone(),
                auth,
            }),
        })
    }

    /// reqwest transport, durable tier in `client.token_file`, session tier in memory.
    pub fn from_config(cfg: &Config) -> Result<Self, RelayError> {
        let transport = Arc::new(ReqwestTransport::new(&cfg.client)?);
        let tokens = TokenStore::new(
            Arc::new(FileTokenStorage::new(cfg.client.token_file.clone())),
            Arc::new(MemoryTokenStorage::new()),
        );
        Self::new(cfg, transport, tokens)
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.inner.tokens
    }

    pub fn refresher(&self) -> &TokenRefresher {
        &self.inner.refresher
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.cfg
    }

    pub fn resolve_url(&self, url: &str) -> Result<Url, TransportError> {
        self.inner
            .cfg
            .base_url
            .join(url)
            .map_err(|err| TransportError::InvalidUrl {
                url: url.to_string(),
                reason: err.to_string(),
            })
    }

    /// Issues one logical request.
    ///
    /// HTTP failures come back as `ApiResult::Failure`; only network errors
    /// and fatal authentication conditions use `Err`.
    pub async fn send(&self, url: &str, options: &RequestOptions) -> Result<ApiResult, SendError> {
        let inner = &self.inner;
        let mut attempt: u32 = 0;

        loop {
            if attempt >= inner.auth.max_attempts {
                error!(url, attempt, "[Auth] Maximum retry attempts reached; clearing stored tokens");
                inner.tokens.clear();
                return Err(AuthError::MaxRetryAttempts.into());
            }

            let sent_token = inner.tokens.access_token();
            let request = self.build_request(url, options, sent_token.as_deref())?;
            let response = inner.transport.execute(request).await?;

            if response.status != StatusCode::UNAUTHORIZED {
                return Ok(normalize(&response));
            }

            debug!(url, attempt, "[Auth] Request rejected with 401");
            self.recover_session(url, sent_token).await?;
            tokio::time::sleep(inner.auth.courtesy_delay).await;
            attempt += 1;
        }
    }

    /// Obtains a usable access token after a 401, or fails fatally.
    async fn recover_session(&self, url: &str, rejected: Option<String>) -> Result<(), AuthError> {
        let inner = &self.inner;

        if inner.cfg.is_refresh_endpoint(url) {
            warn!(url, "[Auth] Refresh endpoint rejected the refresh token");
            inner.tokens.clear();
            return Err(AuthError::RefreshTokenExpired);
        }

        if inner.tokens.refresh_token().is_none() {
            warn!(url, "[Auth] No refresh token stored; session is over");
            inner.tokens.clear();
            return Err(AuthError::NoAuthToken);
        }

        if inner.refresher.is_refreshing() {
            debug!(url, "[Auth] Refresh already running; waiting for it");
        }
        match inner.refresher.refresh(rejected).await {
            Ok(_) => Ok(()),
            Err(AuthError::WorkerUnavailable) => {
                error!(url, "[Auth] Refresh worker gone; clearing stored tokens");
                inner.tokens.clear();
                Err(AuthError::WorkerUnavailable)
            }
            Err(err) => Err(err),
        }
    }

    fn build_request(
        &self,
        url: &str,
        options: &RequestOptions,
        access_token: Option<&str>,
    ) -> Result<OutboundRequest, TransportError> {
        let mut headers = HeaderMap::new();
        if !options.body.as_ref().is_some_and(RequestBody::is_multipart) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = access_token {
            match HeaderValue::from_str(&format!("Bearer {token}")) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(err) => warn!(error = %err, "[Auth] Stored access token is not a valid header value"),
            }
        }
        for (name, value) in &options.headers {
            headers.insert(name.clone(), value.clone());
        }

        Ok(OutboundRequest {
            method: options.method.clone(),
            url: self.resolve_url(url)?,
            headers,
            body: options.body.clone(),
        })
    }

    /// Exchanges credentials for a token pair.
    ///
    /// `remember` keeps the tokens in the durable tier, otherwise they only
    /// live for this session. Bypasses the refresh flow: a 401 here means
    /// bad credentials.
    pub async fn login(&self, credentials: &Value, remember: bool) -> Result<ApiResult, TransportError> {
        let inner = &self.inner;
        let request = self.build_request(
            &inner.cfg.login_path,
            &RequestOptions::new(Method::POST).with_body(credentials.clone()),
            None,
        )?;
        let result = normalize(&inner.transport.execute(request).await?);

        let ApiResult::Success { data, .. } = &result else {
            warn!(status = result.status(), "[Auth] Login rejected");
            return Ok(result);
        };

        let access = data
            .get("access")
            .or_else(|| data.get("access_token"))
            .and_then(Value::as_str);
        let refresh = data
            .get("refresh")
            .or_else(|| data.get("refresh_token"))
            .and_then(Value::as_str);

        match access {
            Some(access) => {
                let tier = if remember { Tier::Durable } else { Tier::Session };
                inner.tokens.clear();
                inner.tokens.store(tier, access, refresh);
                info!(?tier, expires_at = ?token_expiry(access), "[Auth] Logged in");
                Ok(result)
            }
            None => Ok(ApiResult::failure(
                "Login response did not contain an access token",
                result.status(),
                Some(data.clone()),
            )),
        }
    }
}
