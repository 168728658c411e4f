//! Cache manager.

use super::backend::{CacheBackend, CacheEntry, DiskCache, MemoryCache};
use super::expiry::{Clock, Expiry, SystemClock};
use super::key::CacheKey;
use crate::error::CacheError;
use directories::ProjectDirs;
use serde::{de::DeserializeOwned, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub directory: PathBuf,
    pub memory_capacity: usize,
    pub max_entry_size: usize,
    pub enabled: bool,
    pub key_prefix: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            memory_capacity: 512,
            max_entry_size: 10 * 1024 * 1024,
            enabled: true,
            key_prefix: None,
        }
    }
}

fn default_directory() -> PathBuf {
    let base = ProjectDirs::from("", "", "netcache")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("netcache"));
    base.join("http-cache")
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `NETCACHE_CACHE_DIR`, `NETCACHE_MEMORY_CAPACITY`
    /// and `NETCACHE_CACHE_ENABLED`.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(dir) = std::env::var("NETCACHE_CACHE_DIR") {
            if !dir.trim().is_empty() {
                cfg.directory = PathBuf::from(dir);
            }
        }
        if let Some(cap) = std::env::var("NETCACHE_MEMORY_CAPACITY")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
        {
            cfg.memory_capacity = cap.max(1);
        }
        if let Ok(v) = std::env::var("NETCACHE_CACHE_ENABLED") {
            cfg.enabled = !matches!(v.trim(), "0" | "false" | "off" | "no");
        }
        cfg
    }

    pub fn with_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.directory = dir.into();
        self
    }
    pub fn with_memory_capacity(mut self, cap: usize) -> Self {
        self.memory_capacity = cap.max(1);
        self
    }
    pub fn with_max_entry_size(mut self, bytes: usize) -> Self {
        self.max_entry_size = bytes;
        self
    }
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
}
impl AtomicStats {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }
    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Two-tier response cache: an LRU memory tier in front of per-key files.
///
/// Every operation is best-effort. Encoding, decoding and disk failures are
/// logged and counted, and surface to callers only as a miss. A failed disk
/// write leaves the memory tier updated, so the two tiers can briefly
/// disagree until the entry is next written or removed.
///
/// Writes, removals, sweeps and disk reads are serialized; memory hits are
/// not.
pub struct CacheManager {
    config: CacheConfig,
    memory: MemoryCache,
    disk: DiskCache,
    clock: Arc<dyn Clock>,
    stats: AtomicStats,
    writes: Mutex<()>,
}

impl CacheManager {
    /// Open the store, creating its directory and sweeping expired entries.
    pub async fn open(config: CacheConfig) -> Self {
        Self::open_with_clock(config, Arc::new(SystemClock)).await
    }

    pub async fn open_with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let manager = Self {
            memory: MemoryCache::new(config.memory_capacity),
            disk: DiskCache::new(config.directory.clone()),
            config,
            clock,
            stats: AtomicStats::new(),
            writes: Mutex::new(()),
        };
        if manager.config.enabled {
            if let Err(e) = manager.disk.ensure_dir().await {
                warn!(tier = manager.disk.name(), dir = %manager.disk.directory().display(), error = %e, "failed to create cache directory");
            }
            let removed = manager.clean_expired().await;
            debug!(removed, "initial cache sweep finished");
        }
        manager
    }

    /// Store `value` under `key`, replacing any previous entry.
    ///
    /// `Expiry::After` is pinned to the current clock here.
    pub async fn put<T: Serialize + ?Sized>(&self, key: &CacheKey, value: &T, expiry: Expiry) {
        if let Some(data) = self.encode(key, value) {
            self.put_encoded(key, data, expiry).await;
        }
    }

    /// Encode `value` for [`put_encoded`](Self::put_encoded). `None` when the
    /// cache is disabled or encoding fails.
    pub fn encode<T: Serialize + ?Sized>(&self, key: &CacheKey, value: &T) -> Option<Vec<u8>> {
        if !self.config.enabled {
            return None;
        }
        match serde_json::to_vec(value) {
            Ok(data) => Some(data),
            Err(e) => {
                self.record_error(key, "encode", &e.into());
                None
            }
        }
    }

    /// Store an already encoded payload. A payload over the size limit is
    /// not stored and removes whatever `key` held before.
    pub async fn put_encoded(&self, key: &CacheKey, data: Vec<u8>, expiry: Expiry) {
        if !self.config.enabled {
            return;
        }
        let key = self.prefix_key(key);
        let _guard = self.writes.lock().await;
        if data.len() > self.config.max_entry_size {
            debug!(key = %key, size = data.len(), "payload exceeds max entry size, not cached");
            self.remove_prefixed(&key).await;
            return;
        }
        let now = self.clock.now();
        let entry = CacheEntry::new(data, expiry.resolve(now), now);

        // Memory first; a disk failure does not undo it.
        if let Err(e) = self.memory.store(&key, entry.clone()).await {
            self.record_tier_error(&self.memory, &key, "write", &e);
        }
        self.stats.sets.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = self.disk.store(&key, entry).await {
            self.record_tier_error(&self.disk, &key, "write", &e);
        }
    }

    /// Fetch and decode the value stored under `key`.
    ///
    /// Expired entries are removed and reported as `None`; so is anything that
    /// cannot be decoded as `T`.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        if !self.config.enabled {
            return None;
        }
        let Some((key, entry)) = self.lookup(key).await else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        match serde_json::from_slice::<T>(&entry.payload) {
            Ok(value) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Err(e) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                self.record_error(&key, "decode", &e.into());
                None
            }
        }
    }

    /// Remove `key` from both tiers. Removing a missing key is a no-op.
    pub async fn remove(&self, key: &CacheKey) {
        let key = self.prefix_key(key);
        let _guard = self.writes.lock().await;
        self.remove_prefixed(&key).await;
    }

    pub async fn clear_all(&self) {
        let _guard = self.writes.lock().await;
        for tier in [&self.memory as &dyn CacheBackend, &self.disk] {
            if let Err(e) = tier.clear().await {
                warn!(tier = tier.name(), error = %e, "failed to clear cache tier");
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Sweep expired entries from both tiers; returns the number of tier
    /// entries removed.
    pub async fn clean_expired(&self) -> usize {
        let now = self.clock.now();
        let _guard = self.writes.lock().await;
        let mut removed = self.memory.purge_expired(now).await.unwrap_or(0);
        match self.disk.purge_expired(now).await {
            Ok(n) => removed += n,
            Err(e) => {
                warn!(tier = self.disk.name(), error = %e, "failed to sweep expired entries");
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
        removed
    }

    pub async fn exists(&self, key: &CacheKey) -> bool {
        self.config.enabled && self.lookup(key).await.is_some()
    }

    pub async fn expiry(&self, key: &CacheKey) -> Option<Expiry> {
        if !self.config.enabled {
            return None;
        }
        self.lookup(key).await.map(|(_, entry)| entry.expiry())
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Number of entries currently held in memory.
    pub async fn memory_len(&self) -> usize {
        self.memory.len().await.unwrap_or(0)
    }

    /// Find a live entry, collapsing expired ones to absent. A disk hit is
    /// promoted into memory with its persisted deadline.
    async fn lookup(&self, key: &CacheKey) -> Option<(CacheKey, CacheEntry)> {
        let key = self.prefix_key(key);
        if let Ok(Some(entry)) = self.memory.load(&key).await {
            if !entry.is_expired_at(self.clock.now()) {
                return Some((key, entry));
            }
        }

        let _guard = self.writes.lock().await;
        let now = self.clock.now();
        let (entry, from_disk) = match self.memory.load(&key).await {
            Ok(Some(entry)) => (entry, false),
            _ => match self.disk.load(&key).await {
                Ok(Some(entry)) => (entry, true),
                Ok(None) => return None,
                Err(e) => {
                    self.record_tier_error(&self.disk, &key, "read", &e);
                    return None;
                }
            },
        };

        if entry.is_expired_at(now) {
            debug!(key = %key, "cache entry expired");
            self.remove_prefixed(&key).await;
            return None;
        }
        if from_disk {
            if let Err(e) = self.memory.store(&key, entry.clone()).await {
                self.record_tier_error(&self.memory, &key, "promote", &e);
            }
        }
        Some((key, entry))
    }

    /// Caller holds `writes`.
    async fn remove_prefixed(&self, key: &CacheKey) {
        let in_memory = self.memory.delete(key).await.unwrap_or(false);
        let on_disk = match self.disk.delete(key).await {
            Ok(removed) => removed,
            Err(e) => {
                self.record_tier_error(&self.disk, key, "remove", &e);
                false
            }
        };
        if in_memory || on_disk {
            self.stats.deletes.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_error(&self, key: &CacheKey, op: &str, err: &CacheError) {
        self.stats.errors.fetch_add(1, Ordering::Relaxed);
        warn!(key = %key, op, error = %err, "cache operation failed");
    }

    fn record_tier_error(&self, tier: &dyn CacheBackend, key: &CacheKey, op: &str, err: &CacheError) {
        self.stats.errors.fetch_add(1, Ordering::Relaxed);
        warn!(tier = tier.name(), key = %key, op, error = %err, "cache operation failed");
    }

    fn prefix_key(&self, key: &CacheKey) -> CacheKey {
        if let Some(ref p) = self.config.key_prefix {
            CacheKey::new(format!("{}:{}", p, key.as_str()))
        } else {
            key.clone()
        }
    }
}
