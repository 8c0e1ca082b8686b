mod retry;

use crate::client::{CoreClient, RequestOptions};
use crate::config::{Config, ThrottleSettings};
use crate::error::{AuthError, IsRetryable, RelayError, SendError};
use crate::transport::RequestBody;
use backon::Retryable;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use mfg_relay_cache::{RequestKey, ResponseCache};
use mfg_relay_schema::ApiResult;
use reqwest::{Method, StatusCode};
use retry::{AttemptError, RetryPolicy};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

pub type Outcome = Result<ApiResult, AuthError>;
type SharedOutcome = Shared<BoxFuture<'static, Outcome>>;

/// Snapshot of the coordinator's bookkeeping, for debugging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub cache_size: u64,
    pub in_flight: usize,
    /// Current backoff per request key, in milliseconds.
    pub backoff_delays: BTreeMap<String, u64>,
}

/// Throttle/cache/retry coordinator in front of [`CoreClient`].
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct ThrottledApi {
    inner: Arc<Inner>,
}

struct Inner {
    client: CoreClient,
    settings: ThrottleSettings,
    retry_policy: RetryPolicy,
    cache: ResponseCache,
    in_flight: Mutex<HashMap<RequestKey, SharedOutcome>>,
    last_dispatch: Mutex<HashMap<RequestKey, Instant>>,
    backoff: Mutex<HashMap<RequestKey, Duration>>,
}

enum Step {
    Joined(SharedOutcome),
    Dispatched(SharedOutcome),
    Cached(ApiResult),
    Wait(Duration),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ThrottledApi {
    pub fn new(client: CoreClient, settings: ThrottleSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                retry_policy: retry::retry_policy(&settings),
                cache: ResponseCache::new(settings.cache_ttl, settings.cache_max_capacity),
                settings,
                in_flight: Mutex::new(HashMap::new()),
                last_dispatch: Mutex::new(HashMap::new()),
                backoff: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self, RelayError> {
        Ok(Self::new(CoreClient::from_config(cfg)?, cfg.throttle_settings()))
    }

    pub fn client(&self) -> &CoreClient {
        &self.inner.client
    }

    pub fn settings(&self) -> &ThrottleSettings {
        &self.inner.settings
    }

    /// Runs one logical request through coalescing, cache, spacing and retry.
    pub async fn request(&self, url: &str, options: RequestOptions, force_refresh: bool) -> Outcome {
        let key = options.request_key(url);

        loop {
            match self.inner.next_step(&key, url, &options, force_refresh) {
                Step::Joined(shared) => {
                    debug!(key = %key, "[Relay] Joined in-flight request");
                    return shared.await;
                }
                Step::Dispatched(shared) => return shared.await,
                Step::Cached(result) => {
                    debug!(key = %key, "[Relay] Cache hit");
                    return Ok(result);
                }
                Step::Wait(wait) => {
                    debug!(key = %key, ?wait, "[Relay] Minimum interval not elapsed; waiting");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    pub async fn get(&self, url: &str, options: RequestOptions, force_refresh: bool) -> Outcome {
        let options = RequestOptions {
            method: Method::GET,
            ..options
        };
        self.request(url, options, force_refresh).await
    }

    pub async fn post(
        &self,
        url: &str,
        body: impl Into<RequestBody>,
        options: RequestOptions,
        force_refresh: bool,
    ) -> Outcome {
        let options = RequestOptions {
            method: Method::POST,
            body: Some(body.into()),
            ..options
        };
        self.request(url, options, force_refresh).await
    }

    pub async fn patch(
        &self,
        url: &str,
        body: impl Into<RequestBody>,
        options: RequestOptions,
        force_refresh: bool,
    ) -> Outcome {
        let options = RequestOptions {
            method: Method::PATCH,
            body: Some(body.into()),
            ..options
        };
        self.request(url, options, force_refresh).await
    }

    pub async fn delete(&self, url: &str, options: RequestOptions, force_refresh: bool) -> Outcome {
        let options = RequestOptions {
            method: Method::DELETE,
            ..options
        };
        self.request(url, options, force_refresh).await
    }

    /// Drops the cached result for one request.
    pub fn clear_cache(&self, url: &str, options: &RequestOptions) {
        let key = options.request_key(url);
        debug!(key = %key, "[Relay] Cache entry cleared");
        self.inner.cache.invalidate(&key);
    }

    pub fn clear_all_cache(&self) {
        debug!("[Relay] Cache cleared");
        self.inner.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        let backoff_delays = lock(&self.inner.backoff)
            .iter()
            .map(|(key, delay)| {
                (
                    key.to_string(),
                    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                )
            })
            .collect();
        CacheStats {
            cache_size: self.inner.cache.len(),
            in_flight: lock(&self.inner.in_flight).len(),
            backoff_delays,
        }
    }
}

impl Inner {
    /// Decides the next move for `key` in one critical section, so two
    /// callers can never both dispatch the same key.
    fn next_step(
        self: &Arc<Self>,
        key: &RequestKey,
        url: &str,
        options: &RequestOptions,
        force_refresh: bool,
    ) -> Step {
        let mut in_flight = lock(&self.in_flight);
        if let Some(shared) = in_flight.get(key) {
            return Step::Joined(shared.clone());
        }

        if options.method == Method::GET
            && !force_refresh
            && let Some(hit) = self.cache.get(key)
        {
            return Step::Cached(hit);
        }

        if let Some(wait) = self.remaining_interval(key) {
            return Step::Wait(wait);
        }

        let shared = self.dispatch(key.clone(), url.to_string(), options.clone());
        in_flight.insert(key.clone(), shared.clone());
        Step::Dispatched(shared)
    }

    fn remaining_interval(&self, key: &RequestKey) -> Option<Duration> {
        let last = *lock(&self.last_dispatch).get(key)?;
        let elapsed = last.elapsed();
        (elapsed < self.settings.min_interval).then(|| self.settings.min_interval - elapsed)
    }

    /// Spawns the work so it settles even if every waiting caller goes away.
    fn dispatch(self: &Arc<Self>, key: RequestKey, url: String, options: RequestOptions) -> SharedOutcome {
        let inner = Arc::clone(self);
        let span = info_span!(
            "dispatch",
            request_id = %Uuid::new_v4(),
            method = %options.method,
            url = %url
        );

        let task_key = key.clone();
        let handle = tokio::spawn(
            async move {
                let deadline = inner.settings.operation_deadline;
                let outcome = match tokio::time::timeout(
                    deadline,
                    inner.send_with_retry(&task_key, &url, &options),
                )
                .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!(key = %task_key, ?deadline, "[Relay] Request deadline exceeded");
                        Ok(ApiResult::failure("Request deadline exceeded", 0, None))
                    }
                };
                inner.settle(&task_key, &options.method, &outcome);
                outcome
            }
            .instrument(span),
        );

        let inner = Arc::clone(self);
        async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(key = %key, error = %err, "[Relay] Request task failed");
                    lock(&inner.in_flight).remove(&key);
                    Ok(ApiResult::failure(format!("Request task failed: {err}"), 0, None))
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn send_with_retry(&self, key: &RequestKey, url: &str, options: &RequestOptions) -> Outcome {
        let outcome = (|| self.attempt(key, url, options))
            .retry(self.retry_policy)
            .when(|err: &AttemptError| err.is_retryable())
            .notify(|err: &AttemptError, dur: Duration| {
                warn!(key = %key, error = %err, "[Relay] Retrying in {:?}", dur);
            })
            .await;

        match outcome {
            Ok(result) => Ok(result),
            Err(err) => err.into_outcome(),
        }
    }

    async fn attempt(&self, key: &RequestKey, url: &str, options: &RequestOptions) -> Result<ApiResult, AttemptError> {
        let result = match self.client.send(url, options).await {
            Ok(result) => result,
            Err(SendError::Transport(err)) => return Err(AttemptError::Transport(err)),
            Err(SendError::Auth(err)) => return Err(AttemptError::Auth(err)),
        };

        match StatusCode::from_u16(result.status()) {
            _ if result.is_success() => Ok(result),
            Ok(StatusCode::TOO_MANY_REQUESTS) => {
                self.record_rate_limit(key);
                Err(AttemptError::RateLimited(result))
            }
            Ok(StatusCode::FORBIDDEN) => {
                debug!(key = %key, "[Relay] Permission denied; not retrying");
                Ok(result)
            }
            Ok(status) if status.is_server_error() => Err(AttemptError::ServerError(result)),
            _ => Ok(result),
        }
    }

    fn record_rate_limit(&self, key: &RequestKey) {
        let ceiling = self.settings.backoff_ceiling;
        lock(&self.backoff).insert(key.clone(), ceiling);
        warn!(key = %key, backoff = ?ceiling, "[Relay] Rate limited; backoff raised to ceiling");
    }

    fn decay_backoff(&self, key: &RequestKey) {
        let mut backoff = lock(&self.backoff);
        if let Some(delay) = backoff.get_mut(key) {
            *delay = (*delay / 2).max(self.settings.base_delay);
            debug!(key = %key, backoff = ?*delay, "[Relay] Backoff decayed");
        }
    }

    fn settle(&self, key: &RequestKey, method: &Method, outcome: &Outcome) {
        if let Ok(result) = outcome
            && result.is_success()
        {
            self.decay_backoff(key);
            if *method == Method::GET {
                self.cache.insert(key.clone(), result.clone());
            }
        }
        lock(&self.last_dispatch).insert(key.clone(), Instant::now());
        lock(&self.in_flight).remove(key);
    }
}
