//! End-to-end tests for [`Pipeline`]: token acquisition, fetch, cache write,
//! and the cached second request.

use std::sync::Arc;

use serde_json::{Value, json};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mimir::cache::FileStore;
use mimir::{CacheStatus, DatasourceSchema, Pipeline, RequestContext};

// ============================================================================
// Helpers
// ============================================================================

fn remote_schema(server: &MockServer, name: &str, source_path: &str, extra: Value) -> DatasourceSchema {
    let addr = server.address();
    let mut doc = json!({
        "source": {
            "type": "remote",
            "host": addr.ip().to_string(),
            "port": addr.port(),
            "path": source_path
        },
        "auth": {
            "host": addr.ip().to_string(),
            "port": addr.port(),
            "tokenPath": "/token",
            "credentials": {"clientId": "web", "secret": "s3cret"}
        },
        "query": {"count": 20, "page": 1}
    });
    if let (Value::Object(doc), Value::Object(extra)) = (&mut doc, extra) {
        doc.extend(extra);
    }
    DatasourceSchema::from_json(name, &doc.to_string()).unwrap()
}

async fn mount_token(server: &MockServer, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_json(json!({"clientId": "web", "secret": "s3cret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "abc",
            "tokenType": "Bearer",
            "expiresIn": 1800
        })))
        .expect(expected)
        .mount(server)
        .await;
}

fn pipeline(cache_dir: &std::path::Path, schemas: Vec<DatasourceSchema>) -> Pipeline {
    let mut builder = Pipeline::builder()
        .cache_store(Arc::new(FileStore::new(cache_dir, "json").unwrap()));
    for schema in schemas {
        builder = builder.schema(schema);
    }
    builder.build().unwrap()
}

fn cache_files(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
        .count()
}

fn request(url: &str) -> RequestContext {
    RequestContext::parse(url).unwrap()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn second_request_is_served_from_cache() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/makes"))
        .and(query_param("count", "20"))
        .and(query_param("page", "1"))
        .and(header("Authorization", "Bearer abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"name": "Ford"}, {"name": "BMW"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path(), vec![remote_schema(&server, "makes", "makes", json!({}))]);

    let first = pipeline
        .load_page(&["makes"], &request("http://site.local/cars"))
        .await
        .unwrap();
    assert!(!first.has_errors(), "{:?}", first.errors);
    assert_eq!(first.get("makes").unwrap()["results"][0]["name"], "Ford");
    assert_eq!(first.cache["makes"], CacheStatus::Miss { backend: "file" });
    assert_eq!(cache_files(dir.path()), 1);

    let second = pipeline
        .load_page(&["makes"], &request("http://site.local/cars"))
        .await
        .unwrap();
    assert_eq!(second.get("makes"), first.get("makes"));
    assert_eq!(second.cache["makes"], CacheStatus::Hit { backend: "file" });

    server.verify().await;
}

#[tokio::test]
async fn cache_false_bypasses_cache() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/makes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path(), vec![remote_schema(&server, "makes", "makes", json!({}))]);

    for _ in 0..2 {
        let page = pipeline
            .load_page(&["makes"], &request("http://site.local/cars?cache=false"))
            .await
            .unwrap();
        assert_eq!(page.cache["makes"], CacheStatus::Bypassed);
    }
    assert_eq!(cache_files(dir.path()), 0);
    server.verify().await;
}

#[tokio::test]
async fn debug_request_bypasses_cache() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/makes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path(), vec![remote_schema(&server, "makes", "makes", json!({}))]);
    let debug = request("http://site.local/cars").debug(true);

    pipeline.load_page(&["makes"], &debug).await.unwrap();
    let page = pipeline.load_page(&["makes"], &debug).await.unwrap();
    assert_eq!(page.cache["makes"], CacheStatus::Bypassed);
    server.verify().await;
}

#[tokio::test]
async fn page_parameter_overrides_schema_page() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/makes"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"page": 3})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path(), vec![remote_schema(&server, "makes", "makes", json!({}))]);

    let page = pipeline
        .load_page(&["makes"], &request("http://site.local/cars?page=3"))
        .await
        .unwrap();
    assert_eq!(page.get("makes").unwrap()["page"], 3);
    server.verify().await;
}

#[tokio::test]
async fn route_parameters_fill_path_and_filter() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/makes/ford/models"))
        .and(query_param("filter", r#"{"year":2020}"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": ["Focus"]})))
        .expect(1)
        .mount(&server)
        .await;

    let schema = remote_schema(
        &server,
        "models",
        "makes/{make}/models",
        json!({
            "requestParams": [
                {"param": "make", "field": "make", "target": "endpoint"},
                {"param": "year", "field": "year"}
            ]
        }),
    );
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path(), vec![schema]);

    let req = request("http://site.local/cars/ford/2020")
        .param("make", "ford")
        .param("year", "2020");
    let page = pipeline.load_page(&["models"], &req).await.unwrap();
    assert_eq!(page.get("models").unwrap()["results"][0], "Focus");
    server.verify().await;
}

#[tokio::test]
async fn failed_fetch_becomes_error_object_and_is_not_cached() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/makes"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let colours = DatasourceSchema::from_json(
        "colours",
        r#"{"source": {"type": "static", "data": [{"name": "red"}]}}"#,
    )
    .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(
        dir.path(),
        vec![remote_schema(&server, "makes", "makes", json!({})), colours],
    );

    let page = pipeline
        .load_page(&["makes", "colours"], &request("http://site.local/cars"))
        .await
        .unwrap();

    let error = page.error("makes").unwrap();
    assert_eq!(error.remote_host.as_deref(), Some("127.0.0.1"));
    assert_eq!(
        error.remote_port.as_deref(),
        Some(server.address().port().to_string().as_str())
    );
    assert_eq!(error.remote_path.as_deref(), Some("/makes"));
    assert!(error.message.contains("500"));
    assert_eq!(page.get("makes").unwrap()["remotePath"], "/makes");

    assert_eq!(page.get("colours").unwrap()["results"][0]["name"], "red");
    assert_eq!(cache_files(dir.path()), 0);
}

#[tokio::test]
async fn auth_failure_is_reported_against_token_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/makes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path(), vec![remote_schema(&server, "makes", "makes", json!({}))]);

    let page = pipeline
        .load_page(&["makes"], &request("http://site.local/cars"))
        .await
        .unwrap();
    let error = page.error("makes").unwrap();
    assert!(error.message.starts_with("authentication failed"));
    assert_eq!(error.remote_path.as_deref(), Some("/token"));
    server.verify().await;
}

#[tokio::test]
async fn datasources_sharing_auth_share_one_token() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    for route in ["/makes", "/models"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"route": route})))
            .expect(1)
            .mount(&server)
            .await;
    }

    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(
        dir.path(),
        vec![
            remote_schema(&server, "makes", "makes", json!({})),
            remote_schema(&server, "models", "models", json!({})),
        ],
    );

    let page = pipeline
        .load_page(&["makes", "models"], &request("http://site.local/cars"))
        .await
        .unwrap();
    assert!(!page.has_errors(), "{:?}", page.errors);
    assert_eq!(page.get("models").unwrap()["route"], "/models");
    assert_eq!(pipeline.tokens().len(), 1);
    server.verify().await;
}

#[tokio::test]
async fn loads_schema_files_from_schema_dir() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/colours"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["red", "blue"])))
        .expect(1)
        .mount(&server)
        .await;

    let schemas = tempfile::tempdir().unwrap();
    let addr = server.address();
    std::fs::write(
        schemas.path().join("colours.json"),
        json!({
            "source": {"type": "api", "host": addr.ip().to_string(), "port": addr.port().to_string(), "path": "/colours"}
        })
        .to_string(),
    )
    .unwrap();

    let cache = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::builder()
        .cache_store(Arc::new(FileStore::new(cache.path(), "json").unwrap()))
        .schema_dir(schemas.path())
        .build()
        .unwrap();

    let fetched = pipeline
        .load("colours", &request("http://site.local/"))
        .await
        .unwrap();
    assert_eq!(fetched.data, json!(["red", "blue"]));

    let received = server.received_requests().await.unwrap();
    assert!(received[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn missing_datasource_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path(), vec![]);
    let err = pipeline
        .datasource("nowhere")
        .await
        .unwrap_err();
    assert!(err.is_configuration());
}

#[tokio::test]
async fn missing_schema_fails_the_page_before_any_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/makes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path(), vec![remote_schema(&server, "makes", "makes", json!({}))]);

    let err = pipeline
        .load_page(&["makes", "nowhere"], &request("http://site.local/cars"))
        .await
        .unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("'nowhere' not found"));
    assert_eq!(cache_files(dir.path()), 0);
    server.verify().await;
}

#[tokio::test]
async fn invalid_schema_file_fails_the_page() {
    let schemas = tempfile::tempdir().unwrap();
    std::fs::write(schemas.path().join("broken.json"), r#"{"source": 42}"#).unwrap();
    let cache = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::builder()
        .cache_store(Arc::new(FileStore::new(cache.path(), "json").unwrap()))
        .schema_dir(schemas.path())
        .build()
        .unwrap();

    let err = pipeline
        .load_page(&["broken"], &request("http://site.local/"))
        .await
        .unwrap_err();
    assert!(err.is_configuration());
}

#[tokio::test]
async fn inline_schema_with_query_defaults_builds_full_endpoint() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/makes"))
        .and(query_param("count", "20"))
        .and(query_param("page", "1"))
        .and(header("Authorization", "Bearer abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"name": "Ford"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let addr = server.address();
    let schema = DatasourceSchema::from_json(
        "makes",
        &json!({
            "type": "remote",
            "host": addr.ip().to_string(),
            "port": addr.port(),
            "path": "makes",
            "queryDefaults": {"count": 20, "page": 1},
            "authConfig": {
                "host": addr.ip().to_string(),
                "port": addr.port(),
                "credentials": {"clientId": "web", "secret": "s3cret"}
            }
        })
        .to_string(),
    )
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path(), vec![schema]);
    let mut datasource = pipeline.datasource("makes").await.unwrap();
    let fetched = datasource.load(&request("http://site.local/cars")).await.unwrap();
    assert_eq!(
        datasource.endpoint(),
        Some(format!("http://{addr}/makes?count=20&page=1").as_str())
    );
    assert_eq!(fetched.data["results"][0]["name"], "Ford");

    let second = pipeline
        .load_page(&["makes"], &request("http://site.local/cars"))
        .await
        .unwrap();
    assert_eq!(second.cache["makes"], CacheStatus::Hit { backend: "file" });
    server.verify().await;
}
