use crate::cache::{CacheKey, CacheKeyGenerator, CacheManager, Expiry};
use crate::client::builder::{NetworkConfig, NetworkManagerBuilder};
use crate::client::dispatch::{Admission, DispatchState, PendingRequest, Transition};
use crate::client::error_classification::{
    classify_transport_error, decode_body, decode_envelope,
};
use crate::client::options::CacheOptions;
use crate::client::signals::DispatcherSnapshot;
use crate::plugins::{PluginChain, TokenSource};
use crate::reachability::{Reachability, ReachabilitySource};
use crate::transport::{RawResponse, Transport};
use crate::types::{ApiTarget, PageEnvelope, ResponseEnvelope};
use crate::{BoxStream, Error, ErrorContext, Result};
use arc_swap::ArcSwapOption;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Instant;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Dispatcher for cached HTTP calls.
///
/// Every call returns a cold stream: nothing happens until it is polled, and
/// each fresh stream runs the whole cache → network sequence again. A call
/// emits at most two items, the cached value (when enabled and present) and
/// then the network value or error.
///
/// Cloning is cheap; clones share state. The reachability watcher stops when
/// the last clone is dropped.
#[derive(Clone)]
pub struct NetworkManager {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) cache: Arc<CacheManager>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) plugins: Arc<PluginChain>,
    pub(crate) keys: CacheKeyGenerator,
    pub(crate) config: NetworkConfig,
    pub(crate) token: Arc<ArcSwapOption<TokenSource>>,
    pub(crate) state: Mutex<DispatchState>,
    pub(crate) status_tx: broadcast::Sender<bool>,
    pub(crate) watcher: Mutex<Option<JoinHandle<()>>>,
    // Keeps the source alive for as long as the watcher reads from it.
    pub(crate) _source: Arc<dyn ReachabilitySource>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let handle = self
            .watcher
            .get_mut()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

type Decoder<R> = fn(&RawResponse) -> Result<R>;

enum Phase {
    Cache,
    Network,
    Done,
}

/// State carried across polls of one call stream.
struct Call<R> {
    inner: Arc<Inner>,
    target: Arc<dyn ApiTarget>,
    options: CacheOptions,
    use_cache: bool,
    key: Option<CacheKey>,
    decode: Decoder<R>,
    phase: Phase,
}

impl<R> Call<R>
where
    R: Serialize + DeserializeOwned + Send + 'static,
{
    /// Derived on first use, so building a stream costs nothing.
    fn key(&mut self) -> CacheKey {
        let options = &self.options;
        let inner = &self.inner;
        let target = &self.target;
        self.key
            .get_or_insert_with(|| {
                options
                    .cache_key
                    .clone()
                    .unwrap_or_else(|| inner.keys.generate_for(target.as_ref()))
            })
            .clone()
    }

    async fn from_cache(&mut self) -> Option<R> {
        if !self.use_cache {
            return None;
        }
        let key = self.key();
        let value = self.inner.cache.get::<R>(&key).await;
        if value.is_some() {
            debug!(key = %key, url = %self.target.url(), "cache hit");
        }
        value
    }

    async fn from_network(&mut self) -> Result<R> {
        let key = self.key();
        let rx = self.inner.submit(self.target.clone());
        let raw = rx.await.map_err(|_| {
            Error::unknown_with_context(
                "request ended without a result",
                ErrorContext::new()
                    .with_field_path(self.target.url())
                    .with_source("dispatcher"),
            )
        })??;

        let value = (self.decode)(&raw)?;
        if self.use_cache {
            let expiry = self.options.expiry.unwrap_or(self.inner.config.default_expiry);
            // Encoded up front so the value is not borrowed across the write.
            let encoded = self.inner.cache.encode(&key, &value);
            if let Some(data) = encoded {
                self.inner.cache.put_encoded(&key, data, expiry).await;
            }
        }
        Ok(value)
    }
}

fn call_stream<R>(call: Call<R>) -> BoxStream<'static, R>
where
    R: Serialize + DeserializeOwned + Send + 'static,
{
    Box::pin(futures::stream::unfold(call, |mut call| async move {
        loop {
            match call.phase {
                Phase::Cache => {
                    call.phase = if call.target.cache_only() {
                        Phase::Done
                    } else {
                        Phase::Network
                    };
                    if let Some(value) = call.from_cache().await {
                        return Some((Ok(value), call));
                    }
                }
                Phase::Network => {
                    call.phase = Phase::Done;
                    let item = call.from_network().await;
                    return Some((item, call));
                }
                Phase::Done => return None,
            }
        }
    }))
}

impl NetworkManager {
    pub fn builder() -> NetworkManagerBuilder {
        NetworkManagerBuilder::new()
    }

    pub(crate) fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    fn call<T, R>(
        &self,
        target: T,
        options: CacheOptions,
        default_use_cache: bool,
        decode: Decoder<R>,
    ) -> BoxStream<'static, R>
    where
        T: ApiTarget + 'static,
        R: Serialize + DeserializeOwned + Send + 'static,
    {
        let use_cache = options.use_cache_or(default_use_cache);
        call_stream(Call {
            inner: self.inner.clone(),
            target: Arc::new(target),
            options,
            use_cache,
            key: None,
            decode,
            phase: Phase::Cache,
        })
    }

    /// Cache-then-network call decoding the body directly as `T`.
    ///
    /// Caching is on unless `options` turns it off.
    pub fn request_with_cache<T, D>(&self, target: T, options: CacheOptions) -> BoxStream<'static, D>
    where
        T: ApiTarget + 'static,
        D: Serialize + DeserializeOwned + Send + 'static,
    {
        self.call(target, options, true, decode_body::<D>)
    }

    /// Enveloped call. A non-success business code fails with
    /// [`Error::BusinessError`]. Caching is off unless `options` turns it on.
    pub fn request<T, D>(
        &self,
        target: T,
        options: CacheOptions,
    ) -> BoxStream<'static, ResponseEnvelope<D>>
    where
        T: ApiTarget + 'static,
        D: Serialize + DeserializeOwned + Send + 'static,
    {
        self.call(target, options, false, decode_envelope::<D>)
    }

    /// Enveloped call yielding only `data`; a missing `data` is a decode error.
    pub fn request_data<T, D>(&self, target: T, options: CacheOptions) -> BoxStream<'static, D>
    where
        T: ApiTarget + 'static,
        D: Serialize + DeserializeOwned + Send + 'static,
    {
        Box::pin(self.request::<T, D>(target, options).map(|item| {
            item.and_then(|envelope| {
                envelope
                    .data
                    .ok_or_else(|| Error::decode("response envelope has no data"))
            })
        }))
    }

    pub fn request_page<T, D>(
        &self,
        target: T,
        options: CacheOptions,
    ) -> BoxStream<'static, PageEnvelope<D>>
    where
        T: ApiTarget + 'static,
        D: Serialize + DeserializeOwned + Send + 'static,
    {
        self.request_data::<T, PageEnvelope<D>>(target, options)
    }

    /// Enveloped call whose payload is ignored.
    pub fn request_empty<T>(&self, target: T, options: CacheOptions) -> BoxStream<'static, ()>
    where
        T: ApiTarget + 'static,
    {
        Box::pin(
            self.request::<T, serde_json::Value>(target, options)
                .map(|item| item.map(|_| ())),
        )
    }

    /// Drop the cached entry for `target`, or for `cache_key` when given.
    pub async fn clear_cache(&self, target: &dyn ApiTarget, cache_key: Option<CacheKey>) {
        let key = cache_key.unwrap_or_else(|| self.inner.keys.generate_for(target));
        self.inner.cache.remove(&key).await;
    }

    pub async fn clear_all_cache(&self) {
        self.inner.cache.clear_all().await;
    }

    /// `true` when the network becomes available, `false` when it is lost.
    /// Only transitions observed after subscribing are delivered.
    pub fn network_status(&self) -> futures::stream::BoxStream<'static, bool> {
        let rx = self.inner.status_tx.subscribe();
        Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(up) => return Some((up, rx)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        }))
    }

    /// Replace the access-token supplier used for `Authorization`.
    pub fn set_token_provider<F>(&self, provider: F)
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        self.inner
            .token
            .store(Some(Arc::new(TokenSource::new(provider))));
    }

    pub fn reachability(&self) -> Reachability {
        self.inner.lock_state().reachability
    }

    pub fn snapshot(&self) -> DispatcherSnapshot {
        let (reachability, pending, max_pending) = {
            let st = self.inner.lock_state();
            (st.reachability, st.pending.len(), st.pending.capacity())
        };
        DispatcherSnapshot {
            reachability,
            pending,
            max_pending,
            cache: self.inner.cache.stats(),
        }
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.inner.cache
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.inner.config
    }

    /// Default expiry applied when a call does not set one.
    pub fn default_expiry(&self) -> Expiry {
        self.inner.config.default_expiry
    }
}

impl Inner {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Send now, or park until the network comes back.
    pub(crate) fn submit(
        &self,
        target: Arc<dyn ApiTarget>,
    ) -> oneshot::Receiver<Result<RawResponse>> {
        let (tx, rx) = oneshot::channel();
        let admission = self.lock_state().admit(PendingRequest::new(target, tx));
        match admission {
            Admission::Send(req) => self.spawn_transport(req),
            Admission::Queued(evicted) => {
                debug!(pending = self.lock_state().pending.len(), "network unavailable, request queued");
                if let Some(old) = evicted {
                    warn!(url = %old.target.url(), "pending queue full, dropping oldest request");
                    let _ = old.reply.send(Err(Error::NetworkUnavailable));
                }
            }
        }
        rx
    }

    fn spawn_transport(&self, req: PendingRequest) {
        tokio::spawn(send(self.plugins.clone(), self.transport.clone(), req));
    }

    /// Send a batch from one task. Each request reaches the transport in
    /// batch order; responses complete in whatever order they arrive.
    fn spawn_batch(&self, batch: Vec<PendingRequest>) {
        if batch.is_empty() {
            return;
        }
        let plugins = self.plugins.clone();
        let transport = self.transport.clone();
        tokio::spawn(async move {
            let sends = batch
                .into_iter()
                .map(|req| send(plugins.clone(), transport.clone(), req));
            futures::future::join_all(sends).await;
        });
    }

    pub(crate) fn apply_reachability(&self, next: Reachability) {
        let transition = self.lock_state().observe(next);
        match transition {
            Transition::Unchanged => {}
            Transition::Changed => {
                info!(state = %next, "reachability changed");
                if next == Reachability::Unavailable {
                    let _ = self.status_tx.send(false);
                }
            }
            Transition::Drain(queue) => {
                info!(state = %next, queued = queue.len(), "reachability changed");
                let _ = self.status_tx.send(true);
                let now = Instant::now();
                let mut batch = Vec::with_capacity(queue.len());
                for req in queue {
                    if req.is_abandoned() {
                        continue;
                    }
                    if req.is_stale(self.config.pending_ttl, now) {
                        debug!(url = %req.target.url(), "pending request expired");
                        let _ = req.reply.send(Err(Error::NetworkUnavailable));
                        continue;
                    }
                    // same path as a fresh call
                    match self.lock_state().admit(req) {
                        Admission::Send(req) => batch.push(req),
                        Admission::Queued(evicted) => {
                            if let Some(old) = evicted {
                                let _ = old.reply.send(Err(Error::NetworkUnavailable));
                            }
                        }
                    }
                }
                self.spawn_batch(batch);
            }
        }
    }
}

async fn send(plugins: Arc<PluginChain>, transport: Arc<dyn Transport>, req: PendingRequest) {
    let url = req.target.url();
    let result = plugins
        .execute(req.target.as_ref(), transport.as_ref())
        .await
        .map_err(|e| classify_transport_error(e, &url));
    // receiver gone means the consumer dropped its stream
    let _ = req.reply.send(result);
}

/// Feeds reachability observations into the dispatcher until the source
/// ends or the manager is dropped.
pub(crate) async fn watch_reachability(
    inner: Weak<Inner>,
    mut updates: futures::stream::BoxStream<'static, Reachability>,
) {
    while let Some(state) = updates.next().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.apply_reachability(state);
    }
    debug!("reachability watcher stopped");
}
