//! Dispatcher behaviour against a recording transport.

mod common;

use common::{banners, envelope, manager, wait_until, Banner, RecordingTransport, Shop};
use futures::StreamExt;
use netcache::cache::CacheKeyGenerator;
use netcache::{
    CacheConfig, CacheOnly, CacheOptions, Error, Expiry, ManualReachability, PageEnvelope,
    Reachability,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cell::Cell;
use std::time::Duration;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok, assert_pending};

fn key_for(target: &Shop) -> netcache::CacheKey {
    CacheKeyGenerator::new().generate_for(target)
}

#[tokio::test]
async fn test_single_emission_populates_cache() {
    let dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new();
    transport.respond_json("/banners", json!(banners()));
    let source = ManualReachability::new(Reachability::Available);
    let manager = manager(&transport, &source, &dir).await;

    let items: Vec<_> = manager
        .request_with_cache::<_, Vec<Banner>>(Shop::Banners, CacheOptions::new())
        .collect()
        .await;

    assert_eq!(items.len(), 1);
    assert_eq!(assert_ok!(items.into_iter().next().unwrap()), banners());
    assert_eq!(transport.call_count(), 1);

    let key = key_for(&Shop::Banners);
    assert!(manager.cache().exists(&key).await);
    let cached: Option<Vec<Banner>> = manager.cache().get(&key).await;
    assert_eq!(cached, Some(banners()));
}

#[tokio::test]
async fn test_cached_value_precedes_network_value() {
    let dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new();
    let fresh = vec![Banner { id: 3, title: "Flash deal".into() }];
    transport.respond_json("/banners", json!(fresh));
    let source = ManualReachability::new(Reachability::Available);
    let manager = manager(&transport, &source, &dir).await;

    manager
        .cache()
        .put(&key_for(&Shop::Banners), &banners(), Expiry::minutes(5))
        .await;

    let items: Vec<Vec<Banner>> = manager
        .request_with_cache::<_, Vec<Banner>>(Shop::Banners, CacheOptions::new())
        .map(|r| r.unwrap())
        .collect()
        .await;

    assert_eq!(items, vec![banners(), fresh.clone()]);

    // the network value replaced the cached one
    let cached: Option<Vec<Banner>> = manager.cache().get(&key_for(&Shop::Banners)).await;
    assert_eq!(cached, Some(fresh));
}

/// `Cell` is `Send` but not `Sync`.
#[derive(Debug, Serialize, Deserialize)]
struct Counter {
    hits: Cell<u32>,
}

#[tokio::test]
async fn test_call_streams_run_on_spawned_tasks() {
    let dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new();
    transport.respond_json("/banners", json!({"hits": 3}));
    let source = ManualReachability::new(Reachability::Available);
    let manager = manager(&transport, &source, &dir).await;

    let stream = manager.request_with_cache::<_, Counter>(Shop::Banners, CacheOptions::new());
    let items = tokio::spawn(stream.collect::<Vec<_>>()).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(assert_ok!(&items[0]).hits.get(), 3);

    let stream = manager.request_with_cache::<_, Counter>(Shop::Banners, CacheOptions::new());
    let items = tokio::spawn(stream.collect::<Vec<_>>()).await.unwrap();
    assert_eq!(items.len(), 2);
}

#[tokio::test]
async fn test_oversized_response_evicts_cached_one() {
    let dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new();
    transport.respond_json("/banners", json!(["a"]));
    let source = ManualReachability::new(Reachability::Available);
    let manager = common::builder(&transport, &source, &dir)
        .cache_config(
            CacheConfig::new()
                .with_directory(dir.path())
                .with_max_entry_size(16),
        )
        .build()
        .await
        .unwrap();
    let key = key_for(&Shop::Banners);

    let _: Vec<_> = manager
        .request_with_cache::<_, Vec<String>>(Shop::Banners, CacheOptions::new())
        .collect()
        .await;
    assert_eq!(manager.cache().get::<Vec<String>>(&key).await, Some(vec!["a".to_string()]));

    transport.respond_json("/banners", json!(["a much longer banner title"]));
    let items: Vec<_> = manager
        .request_with_cache::<_, Vec<String>>(Shop::Banners, CacheOptions::new())
        .collect()
        .await;
    assert_eq!(items.len(), 2);
    assert_eq!(manager.cache().get::<Vec<String>>(&key).await, None);
}

#[tokio::test]
async fn test_cache_only_never_touches_transport() {
    let dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new();
    transport.respond_json("/banners", json!(banners()));
    let source = ManualReachability::new(Reachability::Available);
    let manager = manager(&transport, &source, &dir).await;

    // miss: completes without emitting
    let items: Vec<_> = manager
        .request_with_cache::<_, Vec<Banner>>(CacheOnly(Shop::Banners), CacheOptions::new())
        .collect()
        .await;
    assert!(items.is_empty());

    manager
        .cache()
        .put(&key_for(&Shop::Banners), &banners(), Expiry::Never)
        .await;

    // hit: exactly one emission
    let items: Vec<_> = manager
        .request_with_cache::<_, Vec<Banner>>(CacheOnly(Shop::Banners), CacheOptions::new())
        .collect()
        .await;
    assert_eq!(items.len(), 1);
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_streams_are_cold() {
    let dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new();
    transport.respond_json("/banners", json!(banners()));
    let source = ManualReachability::new(Reachability::Available);
    let manager = manager(&transport, &source, &dir).await;

    let unpolled =
        manager.request_with_cache::<_, Vec<Banner>>(Shop::Banners, CacheOptions::cached());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.call_count(), 0);
    drop(unpolled);

    let opts = CacheOptions::new().use_cache(false);
    for _ in 0..2 {
        let items: Vec<_> = manager
            .request_with_cache::<_, Vec<Banner>>(Shop::Banners, opts.clone())
            .collect()
            .await;
        assert_eq!(items.len(), 1);
    }
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn test_offline_calls_replay_in_order() {
    let dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new();
    for id in 1..=3 {
        transport.respond_json(
            &format!("/products/{}", id),
            envelope(json!({"id": id, "title": format!("p{}", id)})),
        );
    }
    let source = ManualReachability::new(Reachability::Unavailable);
    let manager = manager(&transport, &source, &dir).await;

    let mut handles = Vec::new();
    for id in 1..=3 {
        let stream = manager.request_data::<_, Banner>(Shop::Product { id }, CacheOptions::new());
        handles.push(tokio::spawn(stream.collect::<Vec<_>>()));
        // let each call reach the queue before the next is spawned
        wait_until(|| manager.snapshot().pending == id as usize).await;
    }
    assert_eq!(transport.call_count(), 0);

    source.set(Reachability::Available);

    for (i, handle) in handles.into_iter().enumerate() {
        let items = handle.await.unwrap();
        assert_eq!(items.len(), 1);
        let banner = assert_ok!(items.into_iter().next().unwrap());
        assert_eq!(banner.id, i as u64 + 1);
    }
    assert_eq!(
        transport.paths(),
        vec!["/products/1", "/products/2", "/products/3"]
    );
    assert_eq!(manager.snapshot().pending, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_offline_replay_order_holds_across_workers() {
    for _ in 0..20 {
        let dir = TempDir::new().unwrap();
        let transport = RecordingTransport::new();
        for id in 1..=6 {
            transport.respond_json(
                &format!("/products/{}", id),
                envelope(json!({"id": id, "title": format!("p{}", id)})),
            );
        }
        let source = ManualReachability::new(Reachability::Unavailable);
        let manager = manager(&transport, &source, &dir).await;

        let mut handles = Vec::new();
        for id in 1..=6u64 {
            let stream =
                manager.request_data::<_, Banner>(Shop::Product { id }, CacheOptions::new());
            handles.push(tokio::spawn(stream.collect::<Vec<_>>()));
            wait_until(|| manager.snapshot().pending == id as usize).await;
        }

        source.set(Reachability::Available);
        for handle in handles {
            assert_eq!(handle.await.unwrap().len(), 1);
        }
        let expected: Vec<String> = (1..=6).map(|id| format!("/products/{}", id)).collect();
        assert_eq!(transport.paths(), expected);
    }
}

#[tokio::test]
async fn test_queued_call_waits_without_emitting() {
    let dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new();
    transport.respond_json("/banners", envelope(json!(banners())));
    let source = ManualReachability::new(Reachability::Unavailable);
    let manager = manager(&transport, &source, &dir).await;

    let mut stream = manager.request_data::<_, Vec<Banner>>(Shop::Banners, CacheOptions::new());
    {
        let mut next = tokio_test::task::spawn(stream.next());
        assert_pending!(next.poll());
    }
    assert_eq!(manager.snapshot().pending, 1);
    assert!(manager.snapshot().is_offline());

    source.set(Reachability::Available);
    let item = stream.next().await.unwrap();
    assert_eq!(assert_ok!(item), banners());
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_full_queue_drops_oldest() {
    let dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new();
    let source = ManualReachability::new(Reachability::Unavailable);
    let manager = common::builder(&transport, &source, &dir)
        .max_pending(2)
        .build()
        .await
        .unwrap();

    let mut handles = Vec::new();
    for id in 1..=3u64 {
        let stream = manager.request_empty(Shop::Product { id }, CacheOptions::new());
        handles.push(tokio::spawn(stream.collect::<Vec<_>>()));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let first = handles.remove(0).await.unwrap();
    assert!(matches!(first.as_slice(), [Err(Error::NetworkUnavailable)]));
    assert_eq!(manager.snapshot().pending, 2);
    assert_eq!(manager.snapshot().max_pending, 2);
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_stale_pending_requests_fail_on_drain() {
    let dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new();
    let source = ManualReachability::new(Reachability::Unavailable);
    let manager = common::builder(&transport, &source, &dir)
        .pending_ttl(Duration::from_millis(10))
        .build()
        .await
        .unwrap();

    let handle = tokio::spawn(
        manager
            .request_empty(Shop::Banners, CacheOptions::new())
            .collect::<Vec<_>>(),
    );
    wait_until(|| manager.snapshot().pending == 1).await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    source.set(Reachability::Available);
    let items = handle.await.unwrap();
    assert!(matches!(items.as_slice(), [Err(Error::NetworkUnavailable)]));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_dropped_stream_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new();
    transport.respond_json("/banners", json!(banners()));
    transport.set_delay(Duration::from_millis(100));
    let source = ManualReachability::new(Reachability::Available);
    let manager = manager(&transport, &source, &dir).await;

    let stream =
        manager.request_with_cache::<_, Vec<Banner>>(Shop::Banners, CacheOptions::new());
    let consumer = tokio::spawn(stream.collect::<Vec<_>>());
    wait_until(|| transport.call_count() == 1).await;
    // aborting the consumer drops the stream mid-flight
    consumer.abort();
    assert!(consumer.await.unwrap_err().is_cancelled());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(transport.call_count(), 1);
    assert!(!manager.cache().exists(&key_for(&Shop::Banners)).await);
}

#[tokio::test]
async fn test_error_mapping() {
    let dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new();
    transport.respond("/products/1", 500, "oops");
    transport.respond("/products/2", 200, "{not json");
    transport.respond_json(
        "/products/3",
        json!({"code": 4001, "message": "Out of stock"}),
    );
    transport.time_out("/products/4");
    transport.go_offline("/products/5");
    transport.respond_json("/products/6", json!({"code": 0, "message": "ok"}));
    let source = ManualReachability::new(Reachability::Available);
    let manager = manager(&transport, &source, &dir).await;

    async fn first_error(manager: &netcache::NetworkManager, id: u64) -> Error {
        let mut stream = manager.request_data::<_, Value>(Shop::Product { id }, CacheOptions::new());
        assert_err!(stream.next().await.unwrap())
    }

    match first_error(&manager, 1).await {
        Error::ServerError { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "Internal Server Error");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(first_error(&manager, 2).await, Error::DecodeError(_)));
    match first_error(&manager, 3).await {
        Error::BusinessError { code, message } => {
            assert_eq!(code, 4001);
            assert_eq!(message, "Out of stock");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(first_error(&manager, 4).await, Error::Timeout));
    assert!(matches!(first_error(&manager, 5).await, Error::NetworkUnavailable));
    // success envelope without data
    assert!(matches!(first_error(&manager, 6).await, Error::DecodeError(_)));
}

#[tokio::test]
async fn test_failures_are_not_cached() {
    let dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new();
    transport.respond_json("/banners", json!({"code": 500, "message": "busy"}));
    let source = ManualReachability::new(Reachability::Available);
    let manager = manager(&transport, &source, &dir).await;

    let items: Vec<_> = manager
        .request::<_, Vec<Banner>>(Shop::Banners, CacheOptions::cached())
        .collect()
        .await;
    assert!(matches!(items.as_slice(), [Err(Error::BusinessError { code: 500, .. })]));
    assert!(!manager.cache().exists(&key_for(&Shop::Banners)).await);
}

#[tokio::test]
async fn test_enveloped_page_with_custom_key_and_expiry() {
    let dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new();
    transport.respond_json(
        "/products",
        envelope(json!({
            "list": [{"id": 1, "title": "a"}, {"id": 2, "title": "b"}],
            "total": 45,
            "page": 1,
            "pageSize": 20
        })),
    );
    let source = ManualReachability::new(Reachability::Available);
    let manager = manager(&transport, &source, &dir).await;

    let options = CacheOptions::cached()
        .cache_key("products-first-page")
        .expiry(Expiry::Never);
    let items: Vec<PageEnvelope<Banner>> = manager
        .request_page::<_, Banner>(Shop::Products { page: 1 }, options)
        .map(|r| r.unwrap())
        .collect()
        .await;

    assert_eq!(items.len(), 1);
    let page = &items[0];
    assert_eq!(page.list.len(), 2);
    assert_eq!(page.total_pages(), 3);
    assert!(page.has_next_page());

    let key = netcache::CacheKey::new("products-first-page");
    assert_eq!(manager.cache().expiry(&key).await, Some(Expiry::Never));

    // the query carries the page parameters
    let call = &transport.calls()[0];
    assert!(call.query.contains(&("page".to_string(), "1".to_string())));

    manager
        .clear_cache(&Shop::Products { page: 1 }, Some(key.clone()))
        .await;
    assert!(!manager.cache().exists(&key).await);
}

#[tokio::test]
async fn test_request_defaults_to_no_cache() {
    let dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new();
    transport.respond_json("/cart/add", envelope(Value::Null));
    let source = ManualReachability::new(Reachability::Available);
    let manager = manager(&transport, &source, &dir).await;

    let target = Shop::AddToCart { product_id: 9, count: 1 };
    let items: Vec<_> = manager
        .request_empty(target.clone(), CacheOptions::new())
        .collect()
        .await;
    assert!(matches!(items.as_slice(), [Ok(())]));
    assert!(!manager.cache().exists(&key_for(&target)).await);

    let call = &transport.calls()[0];
    assert_eq!(call.body, Some(json!({"productId": 9, "count": 1})));
}

#[tokio::test]
async fn test_network_status_broadcasts_transitions() {
    let dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new();
    let source = ManualReachability::new(Reachability::Available);
    let manager = manager(&transport, &source, &dir).await;

    let mut status = manager.network_status();
    source.set(Reachability::Unavailable);
    assert_eq!(status.next().await, Some(false));
    assert_eq!(manager.reachability(), Reachability::Unavailable);

    source.set(Reachability::Available);
    assert_eq!(status.next().await, Some(true));
    assert_eq!(manager.reachability(), Reachability::Available);
}

#[tokio::test]
async fn test_token_provider_can_be_replaced() {
    let dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new();
    transport.respond_json("/banners", envelope(json!([])));
    let source = ManualReachability::new(Reachability::Available);
    let manager = common::builder(&transport, &source, &dir)
        .token_provider(|| Some("first".into()))
        .build()
        .await
        .unwrap();

    let _: Vec<_> = manager
        .request_empty(Shop::Banners, CacheOptions::new())
        .collect()
        .await;
    manager.set_token_provider(|| Some("second".into()));
    let _: Vec<_> = manager
        .request_empty(Shop::Banners, CacheOptions::new())
        .collect()
        .await;

    let auth: Vec<_> = transport
        .calls()
        .iter()
        .map(|c| c.header("Authorization").map(str::to_string))
        .collect();
    assert_eq!(
        auth,
        vec![Some("Bearer first".to_string()), Some("Bearer second".to_string())]
    );
}

#[tokio::test]
async fn test_clear_all_cache() {
    let dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new();
    let source = ManualReachability::new(Reachability::Available);
    let manager = manager(&transport, &source, &dir).await;

    manager
        .cache()
        .put(&key_for(&Shop::Banners), &banners(), Expiry::Never)
        .await;
    manager.clear_all_cache().await;
    assert!(!manager.cache().exists(&key_for(&Shop::Banners)).await);
    assert_eq!(manager.snapshot().cache.sets, 1);
}
