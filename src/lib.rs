//! # netcache
//!
//! 面向客户端应用的 HTTP 请求与缓存层：网络可达性、离线请求队列、两级缓存。
//!
//! HTTP request and cache layer for client applications. Calls are described
//! by [`ApiTarget`] values and consumed as cold streams that emit a cached
//! value first (when there is one) and then the network result.
//!
//! ## Key Features
//!
//! - **Cache-then-network**: [`NetworkManager::request_with_cache`] and the
//!   enveloped variants emit at most a cached value and a fresh value
//! - **Two-tier cache**: LRU memory tier over per-key disk files, with
//!   per-entry [`cache::Expiry`]
//! - **Offline queue**: calls made while the network is unavailable wait and
//!   are re-submitted, in order, once it comes back
//! - **Stable keys**: cache keys are SHA-256 digests of the request shape,
//!   independent of parameter order
//! - **Plugins**: header injection (bearer token, client identity) and
//!   request logging around every transport call
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use netcache::{CacheOptions, Endpoint, NetworkManager};
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() -> netcache::Result<()> {
//!     let manager = NetworkManager::builder()
//!         .token_provider(|| std::env::var("API_TOKEN").ok())
//!         .build()
//!         .await?;
//!
//!     let base = Url::parse("https://api.example.com").expect("static url");
//!     let mut banners = manager
//!         .request_data::<_, Vec<String>>(Endpoint::get(base, "/banners"), CacheOptions::cached());
//!
//!     while let Some(item) = banners.next().await {
//!         println!("{:?}", item?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Network dispatcher, builder, per-call options |
//! | [`cache`] | Two-tier cache, expiry policies, key derivation |
//! | [`types`] | Request descriptors and response envelopes |
//! | [`transport`] | Transport trait and the `reqwest` implementation |
//! | [`plugins`] | Header and logging plugins |
//! | [`reachability`] | Connectivity sources |

pub mod cache;
pub mod client;
pub mod plugins;
pub mod reachability;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use cache::{CacheConfig, CacheKey, CacheManager, Expiry};
pub use client::{
    CacheOptions, DispatcherSnapshot, NetworkConfig, NetworkManager, NetworkManagerBuilder,
};
pub use reachability::{ManualReachability, Reachability, ReachabilitySource};
pub use transport::{HttpTransport, Transport, TransportConfig};
pub use types::{ApiTarget, CacheOnly, Endpoint, HttpMethod, PageEnvelope, ResponseEnvelope};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `Result<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
