pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod session;
pub mod throttle;
pub mod transport;
pub mod utils;

pub use client::{CoreClient, RequestOptions};
pub use config::Config;
pub use error::{AuthError, RelayError, SendError, TransportError};
pub use mfg_relay_cache::RequestKey;
pub use mfg_relay_schema::ApiResult;
pub use session::{LogNavigator, Navigator, Session};
pub use throttle::{CacheStats, ThrottledApi};
