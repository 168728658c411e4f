//! Shared fixtures: a recording transport and a small endpoint enum.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use netcache::transport::{PreparedRequest, RawResponse, Transport, TransportError};
use netcache::{
    ApiTarget, CacheConfig, HttpMethod, ManualReachability, NetworkManager, NetworkManagerBuilder,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

pub const BASE: &str = "https://api.example.com";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Banner {
    pub id: u64,
    pub title: String,
}

pub fn banners() -> Vec<Banner> {
    vec![
        Banner { id: 1, title: "Spring sale".into() },
        Banner { id: 2, title: "New arrivals".into() },
    ]
}

#[derive(Debug, Clone)]
pub enum Shop {
    Banners,
    Products { page: u64 },
    Product { id: u64 },
    AddToCart { product_id: u64, count: u32 },
}

impl ApiTarget for Shop {
    fn base_url(&self) -> Url {
        Url::parse(BASE).unwrap()
    }

    fn path(&self) -> String {
        match self {
            Shop::Banners => "/banners".into(),
            Shop::Products { .. } => "/products".into(),
            Shop::Product { id } => format!("/products/{}", id),
            Shop::AddToCart { .. } => "/cart/add".into(),
        }
    }

    fn method(&self) -> HttpMethod {
        match self {
            Shop::AddToCart { .. } => HttpMethod::Post,
            _ => HttpMethod::Get,
        }
    }

    fn parameters(&self) -> Option<Map<String, Value>> {
        match self {
            Shop::Products { page } => json!({"page": page, "pageSize": 20}).as_object().cloned(),
            Shop::AddToCart { product_id, count } => {
                json!({"productId": product_id, "count": count}).as_object().cloned()
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Body(u16, String),
    Timeout,
    Offline,
}

/// Transport double that records every request and answers from a route
/// table keyed by path. Unknown paths answer 404.
#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<PreparedRequest>>,
    routes: Mutex<HashMap<String, Reply>>,
    delay: Mutex<Option<Duration>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, path: &str, status: u16, body: impl Into<String>) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), Reply::Body(status, body.into()));
    }

    pub fn respond_json(&self, path: &str, body: Value) {
        self.respond(path, 200, body.to_string());
    }

    pub fn time_out(&self, path: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), Reply::Timeout);
    }

    pub fn go_offline(&self, path: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), Reply::Offline);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<PreparedRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|r| r.url.trim_start_matches(BASE).to_string())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn execute(&self, request: &PreparedRequest) -> Result<RawResponse, TransportError> {
        self.calls.lock().unwrap().push(request.clone());
        let path = request.url.trim_start_matches(BASE).to_string();
        let reply = self.routes.lock().unwrap().get(&path).cloned();
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match reply {
            Some(Reply::Body(status, body)) => {
                Ok(RawResponse::new(status, Bytes::from(body)).with_url(request.url.clone()))
            }
            Some(Reply::Timeout) => Err(TransportError::Timeout),
            Some(Reply::Offline) => Err(TransportError::Connectivity("offline".into())),
            None => Ok(RawResponse::new(404, Bytes::new())),
        }
    }
}

pub fn envelope(data: Value) -> Value {
    json!({"code": 200, "message": "success", "data": data})
}

/// Builder wired to the recording transport, a manual reachability source
/// and a throwaway cache directory.
pub fn builder(
    transport: &Arc<RecordingTransport>,
    source: &ManualReachability,
    dir: &TempDir,
) -> NetworkManagerBuilder {
    NetworkManager::builder()
        .transport(transport.clone())
        .reachability(Arc::new(source.clone()))
        .cache_config(CacheConfig::new().with_directory(dir.path()))
        .logging(false)
}

pub async fn manager(
    transport: &Arc<RecordingTransport>,
    source: &ManualReachability,
    dir: &TempDir,
) -> NetworkManager {
    builder(transport, source, dir).build().await.unwrap()
}

/// Spin the runtime until `cond` holds, or panic after a second.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
