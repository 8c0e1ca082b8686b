use super::tokens::TokenStore;
use crate::config::AuthSettings;
use crate::error::AuthError;
use crate::transport::{HttpTransport, OutboundRequest, RequestBody};
use crate::utils::jwt::{token_expiry, token_subject};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use mfg_relay_schema::describe_error;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use url::Url;

pub type RefreshOutcome = Result<String, AuthError>;

/// Body returned by the refresh endpoint.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(alias = "access_token", alias = "token")]
    access: String,
    #[serde(default, alias = "refresh_token")]
    refresh: Option<String>,
}

/// Refresh request item handled by the background worker.
#[derive(Debug)]
struct RefreshJob {
    /// Access token the caller saw rejected; `None` if it sent none.
    rejected: Option<String>,
    respond_to: oneshot::Sender<RefreshOutcome>,
}

/// Single-flight token refresh.
///
/// One worker task owns the refresh call. Jobs arriving while a refresh is
/// running are queued and answered together with its outcome.
#[derive(Clone)]
pub struct TokenRefresher {
    jobs: mpsc::UnboundedSender<RefreshJob>,
    refreshing: Arc<AtomicBool>,
}

struct RefreshWorker {
    transport: Arc<dyn HttpTransport>,
    tokens: TokenStore,
    refresh_url: Url,
    limiter: DefaultDirectRateLimiter,
    refreshing: Arc<AtomicBool>,
}

impl TokenRefresher {
    /// Spawns the refresh worker on the current tokio runtime.
    pub fn spawn(
        transport: Arc<dyn HttpTransport>,
        tokens: TokenStore,
        refresh_url: Url,
        settings: &AuthSettings,
    ) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel::<RefreshJob>();
        let refreshing = Arc::new(AtomicBool::new(false));

        let worker = RefreshWorker {
            transport,
            tokens,
            refresh_url,
            limiter: RateLimiter::direct(Quota::per_second(settings.refresh_tps)),
            refreshing: refreshing.clone(),
        };
        tokio::spawn(worker.run(jobs_rx));

        Self {
            jobs: jobs_tx,
            refreshing,
        }
    }

    /// Waits for a fresh access token, joining an in-flight refresh if any.
    pub async fn refresh(&self, rejected: Option<String>) -> RefreshOutcome {
        let (tx, rx) = oneshot::channel();
        self.jobs
            .send(RefreshJob {
                rejected,
                respond_to: tx,
            })
            .map_err(|_| AuthError::WorkerUnavailable)?;
        rx.await.map_err(|_| AuthError::WorkerUnavailable)?
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::SeqCst)
    }
}

impl RefreshWorker {
    async fn run(self, mut jobs: mpsc::UnboundedReceiver<RefreshJob>) {
        info!(url = %self.refresh_url, "[Auth] Refresh worker started");

        while let Some(first) = jobs.recv().await {
            // Someone already refreshed past the token this caller saw rejected.
            if let Some(current) = self.tokens.access_token()
                && first.rejected.as_deref() != Some(current.as_str())
            {
                debug!("[Auth] Access token already rotated; skipping refresh");
                let _ = first.respond_to.send(Ok(current));
                continue;
            }

            self.refreshing.store(true, Ordering::SeqCst);
            let mut waiters = vec![first.respond_to];
            let refresh = self.refresh_once();
            tokio::pin!(refresh);

            let outcome = loop {
                tokio::select! {
                    outcome = &mut refresh => break outcome,
                    Some(job) = jobs.recv() => {
                        waiters.push(job.respond_to);
                        debug!(queued = waiters.len(), "[Auth] Refresh in progress; request queued");
                    }
                }
            };
            self.refreshing.store(false, Ordering::SeqCst);

            debug!(
                waiters = waiters.len(),
                success = outcome.is_ok(),
                "[Auth] Releasing queued requests"
            );
            for waiter in waiters {
                if waiter.send(outcome.clone()).is_err() {
                    debug!("[Auth] Refresh waiter dropped before release");
                }
            }
        }

        info!("[Auth] Refresh worker stopped (channel closed)");
    }

    async fn refresh_once(&self) -> RefreshOutcome {
        let outcome = self.exchange().await;
        if let Err(err) = &outcome {
            warn!(error = %err, "[Auth] Token refresh failed; clearing stored tokens");
            self.tokens.clear();
        }
        outcome
    }

    async fn exchange(&self) -> RefreshOutcome {
        let refresh_token = self.tokens.refresh_token().ok_or(AuthError::NoAuthToken)?;

        self.limiter.until_ready().await;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let request = OutboundRequest {
            method: Method::POST,
            url: self.refresh_url.clone(),
            headers,
            body: Some(RequestBody::Json(json!({ "refresh": refresh_token }))),
        };

        info!("[Auth] Refreshing access token");
        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|err| AuthError::RefreshFailed(err.to_string()))?;

        if response.status == StatusCode::UNAUTHORIZED {
            return Err(AuthError::RefreshTokenExpired);
        }
        if !response.status.is_success() {
            let body: serde_json::Value =
                serde_json::from_slice(&response.body).unwrap_or_default();
            return Err(AuthError::RefreshFailed(describe_error(
                &body,
                response.status.as_u16(),
            )));
        }

        let payload: RefreshResponse = serde_json::from_slice(&response.body)
            .map_err(|err| AuthError::RefreshFailed(format!("malformed refresh response: {err}")))?;

        let tier = self
            .tokens
            .store_refreshed(&payload.access, payload.refresh.as_deref());
        info!(
            ?tier,
            rotated = payload.refresh.is_some(),
            subject = token_subject(&payload.access).as_deref().unwrap_or("<opaque>"),
            expires_at = ?token_expiry(&payload.access),
            "[Auth] Access token refreshed"
        );
        Ok(payload.access)
    }
}
