use crate::error::{AuthError, IsRetryable, TransportError};
use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use std::time::Duration;
use mfg_relay_schema::ApiResult;
use thiserror::Error as ThisError;

use crate::config::ThrottleSettings;

/// Why a single attempt did not produce a final answer.
#[derive(Debug, Clone, ThisError)]
pub(crate) enum AttemptError {
    #[error("rate limited (status 429)")]
    RateLimited(ApiResult),

    #[error("server error (status {})", .0.status())]
    ServerError(ApiResult),

    #[error(transparent)]
    Transport(TransportError),

    #[error(transparent)]
    Auth(AuthError),
}

impl IsRetryable for AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            AttemptError::RateLimited(_) | AttemptError::ServerError(_) => true,
            AttemptError::Transport(err) => err.is_retryable(),
            AttemptError::Auth(_) => false,
        }
    }
}

impl AttemptError {
    /// Final outcome once retries are exhausted or the error is not retryable.
    pub(crate) fn into_outcome(self) -> Result<ApiResult, AuthError> {
        match self {
            AttemptError::RateLimited(result) | AttemptError::ServerError(result) => Ok(result),
            AttemptError::Transport(err) => Ok(ApiResult::failure(err.to_string(), 0, None)),
            AttemptError::Auth(err) => Err(err),
        }
    }
}

/// Exponential backoff whose delays are clamped again after jitter.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    exponential: ExponentialBuilder,
    max_delay: Duration,
}

#[derive(Debug)]
pub(crate) struct CappedBackoff {
    inner: ExponentialBackoff,
    max_delay: Duration,
}

impl BackoffBuilder for RetryPolicy {
    type Backoff = CappedBackoff;

    fn build(self) -> Self::Backoff {
        CappedBackoff {
            inner: self.exponential.build(),
            max_delay: self.max_delay,
        }
    }
}

impl Iterator for CappedBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        self.inner.next().map(|delay| delay.min(self.max_delay))
    }
}

/// `min(base * 2^(n-1) + jitter, max)`, `max_attempts - 1` retries.
pub(crate) fn retry_policy(settings: &ThrottleSettings) -> RetryPolicy {
    RetryPolicy {
        exponential: ExponentialBuilder::default()
            .with_min_delay(settings.base_delay)
            .with_max_delay(settings.max_delay)
            .with_factor(2.0)
            .with_max_times(settings.max_attempts.saturating_sub(1))
            .with_jitter(),
        max_delay: settings.max_delay,
    }
}
