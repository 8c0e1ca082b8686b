pub mod fingerprint;
pub mod store;

pub use fingerprint::RequestKey;
pub use store::{CacheEntry, ResponseCache};
