use thiserror::Error as ThisError;

/// Unrecoverable authentication failures.
///
/// These are the only errors that leave the request core through `Err`;
/// the caller is expected to send the user back to the login route.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum AuthError {
    #[error("No authentication token available")]
    NoAuthToken,

    #[error("Refresh token expired")]
    RefreshTokenExpired,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Maximum retry attempts reached")]
    MaxRetryAttempts,

    #[error("Token refresh worker unavailable")]
    WorkerUnavailable,
}
