mod refresher;
mod storage;
mod tokens;

pub use refresher::{RefreshOutcome, TokenRefresher};
pub use storage::{FileTokenStorage, MemoryTokenStorage, TokenStorage};
pub use tokens::{AUTH_TOKEN_KEY, REFRESH_TOKEN_KEY, Tier, TokenStore};
