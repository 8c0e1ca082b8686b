use crate::client::RequestOptions;
use crate::error::TransportError;
use crate::throttle::{Outcome, ThrottledApi};
use crate::transport::RequestBody;
use mfg_relay_schema::ApiResult;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Where the user is sent once the session cannot be recovered.
pub trait Navigator: Send + Sync {
    fn redirect(&self, route: &str);
}

/// Navigator for headless use: only records the redirect in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn redirect(&self, route: &str) {
        warn!(route, "[Session] Authentication lost; login required");
    }
}

/// Coordinator bound to a navigator.
///
/// Fatal authentication errors clear stored tokens, trigger one redirect to
/// the login route and are then returned to the caller unchanged. Further
/// fatal errors do not redirect again until the next successful login.
#[derive(Clone)]
pub struct Session {
    api: ThrottledApi,
    navigator: Arc<dyn Navigator>,
    login_route: String,
    redirected: Arc<AtomicBool>,
}

impl Session {
    pub fn new(api: ThrottledApi, navigator: Arc<dyn Navigator>) -> Self {
        let login_route = api.client().config().login_route.clone();
        Self {
            api,
            navigator,
            login_route,
            redirected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn api(&self) -> &ThrottledApi {
        &self.api
    }

    pub fn login_route(&self) -> &str {
        &self.login_route
    }

    pub async fn get(&self, url: &str, options: RequestOptions, force_refresh: bool) -> Outcome {
        self.guard(self.api.get(url, options, force_refresh).await)
    }

    pub async fn post(
        &self,
        url: &str,
        body: impl Into<RequestBody>,
        options: RequestOptions,
        force_refresh: bool,
    ) -> Outcome {
        self.guard(self.api.post(url, body, options, force_refresh).await)
    }

    pub async fn patch(
        &self,
        url: &str,
        body: impl Into<RequestBody>,
        options: RequestOptions,
        force_refresh: bool,
    ) -> Outcome {
        self.guard(self.api.patch(url, body, options, force_refresh).await)
    }

    pub async fn delete(&self, url: &str, options: RequestOptions, force_refresh: bool) -> Outcome {
        self.guard(self.api.delete(url, options, force_refresh).await)
    }

    pub async fn login(&self, credentials: &Value, remember: bool) -> Result<ApiResult, TransportError> {
        let result = self.api.client().login(credentials, remember).await?;
        if result.is_success() {
            // Responses cached under the previous identity must not leak.
            self.api.clear_all_cache();
            self.redirected.store(false, Ordering::SeqCst);
        }
        Ok(result)
    }

    /// Forgets both token tiers and every cached response, then navigates
    /// to the login route.
    pub fn logout(&self) {
        self.api.client().tokens().clear();
        self.api.clear_all_cache();
        info!("[Session] Logged out");
        self.redirected.store(true, Ordering::SeqCst);
        self.navigator.redirect(&self.login_route);
    }

    fn guard(&self, outcome: Outcome) -> Outcome {
        if let Err(err) = &outcome {
            self.api.client().tokens().clear();
            if self.redirected.swap(true, Ordering::SeqCst) {
                debug!(error = %err, "[Session] Login redirect already issued");
            } else {
                warn!(error = %err, route = %self.login_route, "[Session] Redirecting to login");
                self.navigator.redirect(&self.login_route);
            }
        }
        outcome
    }
}
