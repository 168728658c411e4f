use crate::cache::{CacheKey, Expiry};

/// Per-call cache settings.
///
/// Unset fields fall back to the call variant's default (`use_cache`) or the
/// manager's [`NetworkConfig`](crate::client::NetworkConfig) (`expiry`).
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    pub use_cache: Option<bool>,
    pub cache_key: Option<CacheKey>,
    pub expiry: Option<Expiry>,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read from and write to the cache for this call.
    pub fn cached() -> Self {
        Self::new().use_cache(true)
    }

    pub fn use_cache(mut self, enabled: bool) -> Self {
        self.use_cache = Some(enabled);
        self
    }

    /// Override the derived key.
    pub fn cache_key(mut self, key: impl Into<CacheKey>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn expiry(mut self, expiry: Expiry) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub(crate) fn use_cache_or(&self, default: bool) -> bool {
        self.use_cache.unwrap_or(default)
    }
}
