mod auth;
mod relay;
mod transport;

pub use auth::AuthError;
pub use relay::RelayError;
pub use transport::{SendError, TransportError};

pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}
