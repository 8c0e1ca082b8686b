use super::storage::{MemoryTokenStorage, TokenStorage};
use std::sync::Arc;
use tracing::warn;

pub const AUTH_TOKEN_KEY: &str = "authToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Durable,
    Session,
}

/// Access/refresh tokens spread over a durable and a session tier.
///
/// Reads prefer the durable tier. Refreshed tokens are written back to the
/// tier that held the previous ones.
#[derive(Clone)]
pub struct TokenStore {
    durable: Arc<dyn TokenStorage>,
    session: Arc<dyn TokenStorage>,
}

impl TokenStore {
    pub fn new(durable: Arc<dyn TokenStorage>, session: Arc<dyn TokenStorage>) -> Self {
        Self { durable, session }
    }

    /// Both tiers in memory.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryTokenStorage::new()),
            Arc::new(MemoryTokenStorage::new()),
        )
    }

    pub fn access_token(&self) -> Option<String> {
        self.lookup(AUTH_TOKEN_KEY).map(|(token, _)| token)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.lookup(REFRESH_TOKEN_KEY).map(|(token, _)| token)
    }

    /// Tier currently holding the access token, falling back to the refresh token's tier.
    pub fn active_tier(&self) -> Option<Tier> {
        self.lookup(AUTH_TOKEN_KEY)
            .or_else(|| self.lookup(REFRESH_TOKEN_KEY))
            .map(|(_, tier)| tier)
    }

    pub fn store(&self, tier: Tier, access: &str, refresh: Option<&str>) {
        let storage = self.storage(tier);
        if let Err(err) = storage.set(AUTH_TOKEN_KEY, access) {
            warn!(?tier, error = %err, "Failed to store access token");
        }
        if let Some(refresh) = refresh
            && let Err(err) = storage.set(REFRESH_TOKEN_KEY, refresh)
        {
            warn!(?tier, error = %err, "Failed to store refresh token");
        }
    }

    /// Stores a refreshed token pair next to the previous one.
    pub fn store_refreshed(&self, access: &str, refresh: Option<&str>) -> Tier {
        let tier = self.active_tier().unwrap_or(Tier::Session);
        self.store(tier, access, refresh);
        tier
    }

    pub fn clear(&self) {
        for tier in [Tier::Durable, Tier::Session] {
            let storage = self.storage(tier);
            for key in [AUTH_TOKEN_KEY, REFRESH_TOKEN_KEY] {
                if let Err(err) = storage.remove(key) {
                    warn!(?tier, key, error = %err, "Failed to clear token");
                }
            }
        }
    }

    fn storage(&self, tier: Tier) -> &Arc<dyn TokenStorage> {
        match tier {
            Tier::Durable => &self.durable,
            Tier::Session => &self.session,
        }
    }

    fn lookup(&self, key: &str) -> Option<(String, Tier)> {
        [Tier::Durable, Tier::Session].into_iter().find_map(|tier| {
            self.storage(tier)
                .get(key)
                .filter(|token| !token.trim().is_empty())
                .map(|token| (token, tier))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durable_tier_wins_on_read() {
        let store = TokenStore::in_memory();
        store.store(Tier::Session, "session-access", None);
        store.store(Tier::Durable, "durable-access", None);

        assert_eq!(store.access_token().as_deref(), Some("durable-access"));
        assert_eq!(store.active_tier(), Some(Tier::Durable));
    }

    #[test]
    fn refreshed_tokens_land_in_previous_tier() {
        let store = TokenStore::in_memory();
        store.store(Tier::Session, "old-access", Some("old-refresh"));

        let tier = store.store_refreshed("new-access", Some("new-refresh"));

        assert_eq!(tier, Tier::Session);
        assert_eq!(store.access_token().as_deref(), Some("new-access"));
        assert_eq!(store.refresh_token().as_deref(), Some("new-refresh"));
        assert_eq!(store.storage(Tier::Durable).get(AUTH_TOKEN_KEY), None);
    }

    #[test]
    fn refresh_tier_used_when_access_token_missing() {
        let store = TokenStore::in_memory();
        store
            .storage(Tier::Durable)
            .set(REFRESH_TOKEN_KEY, "r")
            .expect("set");

        assert_eq!(store.store_refreshed("a", None), Tier::Durable);
    }

    #[test]
    fn clear_empties_both_tiers() {
        let store = TokenStore::in_memory();
        store.store(Tier::Durable, "a", Some("r"));
        store.store(Tier::Session, "b", Some("s"));

        store.clear();

        assert_eq!(store.access_token(), None);
        assert_eq!(store.refresh_token(), None);
        assert_eq!(store.active_tier(), None);
    }
}
