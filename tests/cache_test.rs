//! Integration tests for [`DatasourceCache`] over the file, memory and
//! redis backends.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mimir::cache::{
    CacheLayer, CacheStatus, CacheStore, DatasourceCache, FileStore, MemoryStore, RedisStore,
};
use mimir::config::RedisSettings;
use mimir::{Clock, Config, DatasourceSchema, ManualClock, Pipeline, RequestContext, SystemClock};

// ============================================================================
// Helpers
// ============================================================================

fn remote(ttl: u64) -> DatasourceSchema {
    DatasourceSchema::from_json(
        "makes",
        &json!({
            "source": {"type": "remote", "host": "api.local", "port": 3000, "path": "makes"},
            "caching": {"ttl": ttl}
        })
        .to_string(),
    )
    .unwrap()
}

fn schema(json: &str) -> DatasourceSchema {
    DatasourceSchema::from_json("makes", json).unwrap()
}

fn layer(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> CacheLayer {
    CacheLayer {
        enabled: true,
        default_ttl: Duration::from_secs(300),
        store: Some(store),
        clock,
    }
}

fn request(url: &str) -> RequestContext {
    RequestContext::parse(url).unwrap()
}

const ENDPOINT: &str = "http://api.local:3000/makes?count=20&page=1";

// ============================================================================
// Filesystem
// ============================================================================

#[tokio::test]
async fn file_entry_is_fresh_until_ttl() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(dir.path(), "json").unwrap());
    let clock = Arc::new(ManualClock::at_epoch_secs(0));
    let cache = DatasourceCache::new(&remote(5), layer(store.clone(), clock.clone()));
    let req = request("http://site.local/cars");

    let key = cache.key(ENDPOINT);
    cache.cache_response(&key, &json!({"results": [1]}), &req).await;

    let written = std::fs::metadata(store.path_for(&key))
        .unwrap()
        .modified()
        .unwrap();

    clock.set(written + Duration::from_secs(4));
    let lookup = cache.get_from_cache(&key, &req).await;
    assert_eq!(lookup.status, CacheStatus::Hit { backend: "file" });
    assert_eq!(lookup.value, Some(json!({"results": [1]})));

    clock.set(written + Duration::from_secs(6));
    let lookup = cache.get_from_cache(&key, &req).await;
    assert_eq!(lookup.status, CacheStatus::Miss { backend: "file" });
    assert!(lookup.value.is_none());
}

#[tokio::test]
async fn file_entries_follow_the_store_clock() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::at_epoch_secs(1_000));
    let store = Arc::new(
        FileStore::new(dir.path(), "json")
            .unwrap()
            .with_clock(clock.clone()),
    );
    let cache = DatasourceCache::new(&remote(5), layer(store, clock.clone()));
    let req = request("http://site.local/cars");
    let key = cache.key(ENDPOINT);
    cache.cache_response(&key, &json!({"results": [1]}), &req).await;

    clock.advance(Duration::from_secs(4));
    assert_eq!(
        cache.get_from_cache(&key, &req).await.status,
        CacheStatus::Hit { backend: "file" }
    );

    clock.advance(Duration::from_secs(86_400));
    assert_eq!(
        cache.get_from_cache(&key, &req).await.status,
        CacheStatus::Miss { backend: "file" }
    );
}

#[tokio::test]
async fn file_entry_from_the_future_is_a_miss() {
    let dir = tempfile::tempdir().unwrap();
    // Written with the system clock, read by a clock far in the past.
    let store = Arc::new(FileStore::new(dir.path(), "json").unwrap());
    let clock = Arc::new(ManualClock::at_epoch_secs(1_000));
    let cache = DatasourceCache::new(&remote(5), layer(store, clock.clone()));
    let req = request("http://site.local/cars");
    let key = cache.key(ENDPOINT);
    cache.cache_response(&key, &json!({"results": [1]}), &req).await;

    clock.advance(Duration::from_secs(86_400));
    let lookup = cache.get_from_cache(&key, &req).await;
    assert_eq!(lookup.status, CacheStatus::Miss { backend: "file" });
    assert!(lookup.value.is_none());
}

#[tokio::test]
async fn corrupt_file_is_a_miss() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(dir.path(), "json").unwrap());
    let cache = DatasourceCache::new(
        &remote(300),
        layer(store.clone(), Arc::new(SystemClock)),
    );
    let key = cache.key(ENDPOINT);
    std::fs::write(store.path_for(&key), b"{ not json").unwrap();

    let lookup = cache.get_from_cache(&key, &request("http://site.local/")).await;
    assert_eq!(lookup.status, CacheStatus::Miss { backend: "file" });
}

#[tokio::test]
async fn bypass_never_touches_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(dir.path(), "json").unwrap());
    let cache = DatasourceCache::new(
        &remote(300),
        layer(store.clone(), Arc::new(SystemClock)),
    );
    let bypass = request("http://site.local/cars?cache=false");
    let key = cache.key(ENDPOINT);

    assert!(!cache.caching_enabled(&bypass));
    cache.cache_response(&key, &json!(1), &bypass).await;
    assert!(!store.exists(&key).await.unwrap());

    // An entry written by a normal request is still ignored by the bypass.
    cache
        .cache_response(&key, &json!(1), &request("http://site.local/cars"))
        .await;
    let lookup = cache.get_from_cache(&key, &bypass).await;
    assert_eq!(lookup.status, CacheStatus::Bypassed);
    assert!(lookup.value.is_none());
}

#[test]
fn caching_switches() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new(10, Arc::new(SystemClock)));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let req = request("http://site.local/");

    let mut global_off = layer(store.clone(), clock.clone());
    global_off.enabled = false;
    assert!(!DatasourceCache::new(&remote(60), global_off).caching_enabled(&req));

    let disabled = DatasourceCache::new(
        &schema(r#"{"source": {"type": "remote", "host": "h"}, "caching": {"enabled": false}}"#),
        layer(store.clone(), clock.clone()),
    );
    assert!(!disabled.caching_enabled(&req));

    let static_source = DatasourceCache::new(
        &schema(r#"{"source": {"type": "static", "data": []}}"#),
        layer(store.clone(), clock.clone()),
    );
    assert!(!static_source.caching_enabled(&req));

    assert!(DatasourceCache::new(&remote(60), layer(store, clock)).caching_enabled(&req));
    let never = CacheLayer::disabled(Arc::new(SystemClock));
    assert!(!DatasourceCache::new(&remote(60), never).caching_enabled(&req));
}

#[test]
fn datasource_ttl_overrides_default() {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new(10, clock.clone()));
    let cache = DatasourceCache::new(&remote(42), layer(store.clone(), clock.clone()));
    assert_eq!(cache.ttl(), Duration::from_secs(42));

    let cache = DatasourceCache::new(
        &schema(r#"{"source": {"type": "remote", "host": "h"}}"#),
        layer(store, clock),
    );
    assert_eq!(cache.ttl(), Duration::from_secs(300));
}

// ============================================================================
// Memory
// ============================================================================

#[tokio::test]
async fn memory_backend_hits_then_expires() {
    let clock = Arc::new(ManualClock::at_epoch_secs(10_000));
    let store = Arc::new(MemoryStore::new(100, clock.clone()));
    let cache = DatasourceCache::new(&remote(5), layer(store, clock.clone()));
    let req = request("http://site.local/");
    let key = cache.key(ENDPOINT);

    cache.cache_response(&key, &json!({"ok": true}), &req).await;
    clock.advance(Duration::from_secs(4));
    assert_eq!(
        cache.get_from_cache(&key, &req).await.status,
        CacheStatus::Hit { backend: "memory" }
    );

    clock.advance(Duration::from_secs(2));
    assert_eq!(
        cache.get_from_cache(&key, &req).await.status,
        CacheStatus::Miss { backend: "memory" }
    );
}

// ============================================================================
// Redis
// ============================================================================

fn unreachable_redis() -> RedisSettings {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    RedisSettings {
        enabled: true,
        host: "127.0.0.1".into(),
        port,
        timeout_ms: 300,
        ..RedisSettings::default()
    }
}

#[tokio::test]
async fn redis_outage_degrades_to_miss() {
    let store = Arc::new(RedisStore::new(&unreachable_redis()).unwrap());
    let cache = DatasourceCache::new(&remote(60), layer(store, Arc::new(SystemClock)));
    let req = request("http://site.local/");
    let key = cache.key(ENDPOINT);

    cache.cache_response(&key, &json!({"ok": true}), &req).await;
    let lookup = cache.get_from_cache(&key, &req).await;
    assert_eq!(lookup.status, CacheStatus::Miss { backend: "redis" });
    assert!(lookup.value.is_none());
}

#[tokio::test]
async fn pipeline_serves_live_data_when_redis_is_down() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/makes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": ["Ford"]})))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.caching.redis = unreachable_redis();
    let addr = server.address();
    let schema = DatasourceSchema::from_json(
        "makes",
        &json!({
            "source": {"type": "remote", "host": addr.ip().to_string(), "port": addr.port(), "path": "makes"}
        })
        .to_string(),
    )
    .unwrap();

    let pipeline = Pipeline::builder().config(config).schema(schema).build().unwrap();
    for _ in 0..2 {
        let page = pipeline.load_page(&["makes"], &request("http://site.local/")).await.unwrap();
        assert!(!page.has_errors(), "{:?}", page.errors);
        assert_eq!(page.get("makes").unwrap()["results"][0], "Ford");
        assert_eq!(page.cache["makes"], CacheStatus::Miss { backend: "redis" });
    }
    server.verify().await;
}
