use thiserror::Error as ThisError;

/// Setup and wiring failures (configuration, client construction, storage).
#[derive(Debug, ThisError)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Token storage error: {0}")]
    Storage(String),
}
