use super::{AuthError, IsRetryable};
use thiserror::Error as ThisError;

/// Failure below the HTTP layer: no status was received.
#[derive(Debug, Clone, ThisError)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Failed to read response body: {0}")]
    Body(String),

    #[error("Invalid request URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_body() || err.is_decode() {
            TransportError::Body(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

impl IsRetryable for TransportError {
    fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::InvalidUrl { .. })
    }
}

/// Outcome of the transport primitive when no normalized result exists.
#[derive(Debug, Clone, ThisError)]
pub enum SendError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
