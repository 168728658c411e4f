//! Banner / Product List Demo
//!
//! Walks through the three common call shapes of a shop home screen:
//! 1. Banners with cache-then-network (two emissions on the second run)
//! 2. A paginated product list
//! 3. A cache-only read that never touches the network
//! 4. A call made while offline, replayed when the network returns
//!
//! Runs against an in-process transport by default. Set
//! `NETCACHE_DEMO_BASE_URL` to hit a real server speaking the same envelope
//! format instead.
//!
//! ```bash
//! RUST_LOG=netcache=debug cargo run --example banners
//! ```

use async_trait::async_trait;
use futures::StreamExt;
use netcache::transport::{PreparedRequest, RawResponse, Transport, TransportError};
use netcache::{
    ApiTarget, CacheConfig, CacheOnly, CacheOptions, HttpMethod, ManualReachability,
    NetworkManager, Reachability,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Banner {
    id: u64,
    title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Product {
    id: u64,
    name: String,
    price_cents: u64,
}

#[derive(Debug, Clone)]
enum Home {
    Banners,
    Products { page: u64 },
}

impl ApiTarget for Home {
    fn base_url(&self) -> Url {
        let base = std::env::var("NETCACHE_DEMO_BASE_URL")
            .unwrap_or_else(|_| "https://shop.invalid".to_string());
        Url::parse(&base).unwrap_or_else(|_| Url::parse("https://shop.invalid").expect("static url"))
    }

    fn path(&self) -> String {
        match self {
            Home::Banners => "/home/banners".into(),
            Home::Products { .. } => "/products".into(),
        }
    }

    fn method(&self) -> HttpMethod {
        HttpMethod::Get
    }

    fn parameters(&self) -> Option<Map<String, Value>> {
        match self {
            Home::Banners => None,
            Home::Products { page } => json!({"page": page, "pageSize": 2}).as_object().cloned(),
        }
    }
}

/// Answers the two demo endpoints from memory.
struct CannedShop;

#[async_trait]
impl Transport for CannedShop {
    async fn execute(&self, request: &PreparedRequest) -> Result<RawResponse, TransportError> {
        tokio::time::sleep(Duration::from_millis(80)).await;
        let body = if request.url.ends_with("/home/banners") {
            json!({"code": 200, "message": "success", "data": [
                {"id": 1, "title": "Spring sale"},
                {"id": 2, "title": "New arrivals"}
            ]})
        } else if request.url.ends_with("/products") {
            json!({"code": 200, "message": "success", "data": {
                "list": [
                    {"id": 10, "name": "Canvas tote", "priceCents": 2900},
                    {"id": 11, "name": "Desk lamp", "priceCents": 5400}
                ],
                "total": 5, "page": 1, "pageSize": 2
            }})
        } else {
            return Ok(RawResponse::new(404, ""));
        };
        Ok(RawResponse::new(200, body.to_string()).with_url(request.url.clone()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("netcache=info")),
        )
        .init();

    let cache_dir = tempfile::tempdir()?;
    let reachability = ManualReachability::new(Reachability::Available);

    let mut builder = NetworkManager::builder()
        .cache_config(CacheConfig::new().with_directory(cache_dir.path()))
        .reachability(Arc::new(reachability.clone()))
        .token_provider(|| Some("demo-token".into()));
    if std::env::var("NETCACHE_DEMO_BASE_URL").is_err() {
        builder = builder.transport(Arc::new(CannedShop));
    }
    let manager = builder.build().await?;

    println!("== banners, first run (network only) ==");
    let mut banners = manager.request_data::<_, Vec<Banner>>(Home::Banners, CacheOptions::cached());
    while let Some(item) = banners.next().await {
        println!("  {:?}", item?);
    }

    println!("== banners, second run (cache, then network) ==");
    let mut banners = manager.request_data::<_, Vec<Banner>>(Home::Banners, CacheOptions::cached());
    while let Some(item) = banners.next().await {
        println!("  {:?}", item?);
    }

    println!("== products page 1 ==");
    let mut page = manager.request_page::<_, Product>(Home::Products { page: 1 }, CacheOptions::cached());
    while let Some(item) = page.next().await {
        let page = item?;
        println!(
            "  {} items, page {}/{}, more: {}",
            page.list.len(),
            page.page,
            page.total_pages(),
            page.has_next_page()
        );
    }

    println!("== banners, cache only ==");
    let cached: Vec<_> = manager
        .request_data::<_, Vec<Banner>>(CacheOnly(Home::Banners), CacheOptions::cached())
        .collect()
        .await;
    println!("  {} emission(s)", cached.len());

    println!("== products while offline ==");
    reachability.set(Reachability::Unavailable);
    tokio::time::sleep(Duration::from_millis(10)).await;
    let pending = tokio::spawn(
        manager
            .request_page::<_, Product>(Home::Products { page: 1 }, CacheOptions::new())
            .collect::<Vec<_>>(),
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("  queued: {}", manager.snapshot().pending);
    reachability.set(Reachability::Available);
    let replayed = pending.await?;
    println!("  replayed with {} emission(s)", replayed.len());

    let snapshot = manager.snapshot();
    println!(
        "cache: {} hits / {} misses ({:.0}% hit ratio)",
        snapshot.cache.hits,
        snapshot.cache.misses,
        snapshot.cache.hit_ratio() * 100.0
    );
    Ok(())
}
