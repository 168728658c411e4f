//! 响应缓存模块：内存 + 磁盘两级缓存，带过期策略。
//!
//! # Response Caching Module
//!
//! Two-tier response cache used by the network dispatcher: an LRU memory tier
//! in front of per-key files on disk, each entry carrying its own expiry.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CacheManager`] | Two-tier store with best-effort semantics and statistics |
//! | [`CacheConfig`] | Directory, memory capacity, size limit, key prefix |
//! | [`Expiry`] | `Never`, `At(instant)` or `After(duration)` |
//! | [`Clock`] | Time source; [`ManualClock`] for simulated time |
//! | [`CacheBackend`] | Tier trait implemented by [`MemoryCache`] and [`DiskCache`] |
//! | [`CacheKey`] | Opaque key, usually from [`derive_key`] |
//!
//! ## Example
//!
//! ```rust,no_run
//! use netcache::cache::{CacheConfig, CacheKey, CacheManager, Expiry};
//!
//! # async fn demo() {
//! let cache = CacheManager::open(CacheConfig::new().with_directory("/tmp/netcache")).await;
//! let key = CacheKey::new("banners");
//! cache.put(&key, &vec!["spring-sale"], Expiry::minutes(30)).await;
//! let banners: Option<Vec<String>> = cache.get(&key).await;
//! # }
//! ```
//!
//! ## Cache Key Generation
//!
//! Keys are SHA-256 digests of the HTTP method, base URL, path and the request
//! parameters serialized with sorted keys, so the same logical request always
//! maps to the same entry regardless of parameter insertion order.

mod backend;
mod expiry;
pub(crate) mod key;
mod manager;

pub use backend::{CacheBackend, CacheEntry, DiskCache, MemoryCache};
pub use expiry::{Clock, Expiry, ManualClock, SystemClock};
pub use key::{derive_key, CacheKey, CacheKeyGenerator};
pub use manager::{CacheConfig, CacheManager, CacheStats};
