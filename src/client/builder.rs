use crate::cache::{CacheConfig, CacheKeyGenerator, CacheManager, Clock, Expiry, SystemClock};
use crate::client::core::{watch_reachability, Inner, NetworkManager};
use crate::client::dispatch::DispatchState;
use crate::plugins::{ClientInfo, HeaderPlugin, LoggerPlugin, Plugin, PluginChain, TokenSource};
use crate::reachability::{ManualReachability, Reachability, ReachabilitySource};
use crate::transport::{HttpTransport, Transport, TransportConfig};
use crate::{Error, ErrorContext, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Applied to cache writes when a call does not choose an expiry.
    pub default_expiry: Expiry,
    /// Queue bound while offline; the oldest request is dropped beyond it.
    pub max_pending: usize,
    /// Queued requests older than this fail on drain instead of being sent.
    pub pending_ttl: Option<Duration>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            default_expiry: Expiry::minutes(30),
            max_pending: 64,
            pending_ttl: None,
        }
    }
}

impl NetworkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with overrides from:
    /// - `NETCACHE_MAX_PENDING` (default 64)
    /// - `NETCACHE_PENDING_TTL_SECS` (default unset)
    /// - `NETCACHE_DEFAULT_EXPIRY_SECS` (default 1800)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_expiry: std::env::var("NETCACHE_DEFAULT_EXPIRY_SECS")
                .ok()
                .and_then(|s| parse_expiry_secs(&s))
                .unwrap_or(defaults.default_expiry),
            max_pending: std::env::var("NETCACHE_MAX_PENDING")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .map(|n| n.max(1))
                .unwrap_or(defaults.max_pending),
            pending_ttl: std::env::var("NETCACHE_PENDING_TTL_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|s| *s > 0)
                .map(Duration::from_secs),
        }
    }

    pub fn with_default_expiry(mut self, expiry: Expiry) -> Self {
        self.default_expiry = expiry;
        self
    }

    pub fn with_max_pending(mut self, n: usize) -> Self {
        self.max_pending = n.max(1);
        self
    }

    pub fn with_pending_ttl(mut self, ttl: Duration) -> Self {
        self.pending_ttl = Some(ttl);
        self
    }
}

/// Non-negative whole seconds; anything else is ignored.
fn parse_expiry_secs(raw: &str) -> Option<Expiry> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|secs| *secs >= 0)
        .map(Expiry::seconds)
}

/// Builder for [`NetworkManager`].
///
/// Every collaborator is optional: the defaults are a `reqwest` transport,
/// an on-disk cache in the platform cache directory, and a reachability
/// source that always reports `Available`.
pub struct NetworkManagerBuilder {
    config: NetworkConfig,
    cache_config: CacheConfig,
    cache: Option<Arc<CacheManager>>,
    clock: Option<Arc<dyn Clock>>,
    transport: Option<Arc<dyn Transport>>,
    transport_config: TransportConfig,
    reachability: Option<Arc<dyn ReachabilitySource>>,
    client_info: ClientInfo,
    token: Option<TokenSource>,
    logging: Option<bool>,
    plugins: Vec<Arc<dyn Plugin>>,
    key_salt: Option<String>,
}

impl NetworkManagerBuilder {
    pub fn new() -> Self {
        Self {
            config: NetworkConfig::from_env(),
            cache_config: CacheConfig::from_env(),
            cache: None,
            clock: None,
            transport: None,
            transport_config: TransportConfig::from_env(),
            reachability: None,
            client_info: ClientInfo::default(),
            token: None,
            logging: None,
            plugins: Vec::new(),
            key_salt: None,
        }
    }

    pub fn config(mut self, config: NetworkConfig) -> Self {
        self.config = config;
        self
    }

    pub fn default_expiry(mut self, expiry: Expiry) -> Self {
        self.config.default_expiry = expiry;
        self
    }

    pub fn max_pending(mut self, n: usize) -> Self {
        self.config.max_pending = n.max(1);
        self
    }

    pub fn pending_ttl(mut self, ttl: Duration) -> Self {
        self.config.pending_ttl = Some(ttl);
        self
    }

    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    /// Share an already opened cache. Takes precedence over `cache_config`.
    pub fn cache(mut self, cache: Arc<CacheManager>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Clock used to evaluate expiry when the builder opens the cache.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.transport_config = config;
        self
    }

    pub fn reachability(mut self, source: Arc<dyn ReachabilitySource>) -> Self {
        self.reachability = Some(source);
        self
    }

    pub fn client_info(mut self, info: ClientInfo) -> Self {
        self.client_info = info;
        self
    }

    pub fn token_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        self.token = Some(TokenSource::new(provider));
        self
    }

    /// Force request logging on or off. Defaults to on in debug builds.
    pub fn logging(mut self, enabled: bool) -> Self {
        self.logging = Some(enabled);
        self
    }

    pub fn plugin<P: Plugin + 'static>(mut self, plugin: P) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    /// Namespace derived cache keys, e.g. per signed-in user.
    pub fn key_salt(mut self, salt: impl Into<String>) -> Self {
        self.key_salt = Some(salt.into());
        self
    }

    /// Build the manager and start watching reachability.
    ///
    /// Must run inside a Tokio runtime.
    pub async fn build(self) -> Result<NetworkManager> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            Error::unknown_with_context(
                "NetworkManager requires a Tokio runtime",
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("builder"),
            )
        })?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new(&self.transport_config)?),
        };

        let cache = match self.cache {
            Some(c) => c,
            None => {
                let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
                Arc::new(CacheManager::open_with_clock(self.cache_config, clock).await)
            }
        };

        let headers = match self.token {
            Some(source) => HeaderPlugin::new(self.client_info).with_token_source(source),
            None => HeaderPlugin::new(self.client_info),
        };
        let token = headers.token_slot();
        let logger = match self.logging {
            Some(enabled) => LoggerPlugin::new().enabled(enabled),
            None => LoggerPlugin::new(),
        };
        let mut plugins = PluginChain::new().with(headers).with(logger);
        for p in self.plugins {
            plugins.add(p);
        }

        let keys = match self.key_salt {
            Some(salt) => CacheKeyGenerator::new().with_salt(salt),
            None => CacheKeyGenerator::new(),
        };

        let source: Arc<dyn ReachabilitySource> = self
            .reachability
            .unwrap_or_else(|| Arc::new(ManualReachability::new(Reachability::Available)));
        let initial = source.current();
        let updates = source.watch();
        let (status_tx, _) = broadcast::channel(16);

        debug!(
            reachability = %initial,
            max_pending = self.config.max_pending,
            plugins = ?plugins.names(),
            cache_dir = %cache.config().directory.display(),
            "network manager ready"
        );

        let inner = Arc::new(Inner {
            cache,
            transport,
            plugins: Arc::new(plugins),
            keys,
            state: Mutex::new(DispatchState::new(initial, self.config.max_pending)),
            config: self.config,
            token,
            status_tx,
            watcher: Mutex::new(None),
            _source: source,
        });

        let handle = runtime.spawn(watch_reachability(Arc::downgrade(&inner), updates));
        *inner.watcher.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);

        Ok(NetworkManager::from_inner(inner))
    }
}

impl Default for NetworkManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_env_values() {
        assert_eq!(parse_expiry_secs("90"), Some(Expiry::seconds(90)));
        assert_eq!(parse_expiry_secs(" 0 "), Some(Expiry::seconds(0)));
        assert_eq!(parse_expiry_secs("-5"), None);
        assert_eq!(parse_expiry_secs("soon"), None);
        assert_eq!(
            parse_expiry_secs("9223372036854775807"),
            Some(Expiry::Never)
        );
    }

    #[test]
    fn test_config_setters_clamp_queue_bound() {
        let cfg = NetworkConfig::new()
            .with_max_pending(0)
            .with_pending_ttl(Duration::from_secs(30));
        assert_eq!(cfg.max_pending, 1);
        assert_eq!(cfg.pending_ttl, Some(Duration::from_secs(30)));
    }
}
