//! Integration tests for the HTTP API
//!
//! Drives the axum router in-process against a fake Firefly III upstream and a
//! config document in a temporary directory.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use firefly_proxy::cache::{CacheEntries, ConfigStore};
use firefly_proxy::config::{SettingsResolver, ACCESS_TOKEN_KEY, BASE_URL_ENV, BASE_URL_KEY};
use firefly_proxy::firefly::{FireflyClient, Params, Upstream, UpstreamError};
use firefly_proxy::server::{self, AppState};
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

/// A request the fake upstream received
#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    path: String,
    params: Vec<(String, String)>,
    body: Option<Value>,
}

/// Upstream answering from a per-path table
#[derive(Default)]
struct FakeUpstream {
    replies: HashMap<String, Result<Value, UpstreamError>>,
    requests: Mutex<Vec<Recorded>>,
}

impl FakeUpstream {
    fn reply(mut self, path: &str, reply: Result<Value, UpstreamError>) -> Self {
        self.replies.insert(path.to_string(), reply);
        self
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Upstream for FakeUpstream {
    async fn request(
        &self,
        method: Method,
        path: &str,
        params: &Params<'_>,
        body: Option<&Value>,
    ) -> Result<Value, UpstreamError> {
        self.requests.lock().unwrap().push(Recorded {
            method,
            path: path.to_string(),
            params: params
                .iter()
                .filter_map(|(k, v)| v.map(|v| (k.to_string(), v.to_string())))
                .collect(),
            body: body.cloned(),
        });
        self.replies
            .get(path)
            .cloned()
            .unwrap_or_else(|| Ok(json!({"echo": body.cloned()})))
    }
}

struct TestApp {
    router: Router,
    store: Arc<ConfigStore>,
    upstream: Arc<FakeUpstream>,
    _temp_dir: TempDir,
}

fn create_test_app(upstream: FakeUpstream) -> TestApp {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let store = Arc::new(ConfigStore::in_dir(temp_dir.path()));
    let upstream = Arc::new(upstream);
    let state = AppState::new(store.clone(), upstream.clone());
    TestApp {
        router: server::app(state, None),
        store,
        upstream,
        _temp_dir: temp_dir,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| json!(String::from_utf8_lossy(&bytes)))
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn stale_timestamp() -> String {
    "2020-01-01T00:00:00".to_string()
}

fn seed_cache(store: &ConfigStore, key: &str, data: Value, synced_at: &str) {
    store
        .try_modify(|document| {
            document.insert(
                "resource_cache".into(),
                json!({ key: { "data": data, "last_synced_at": synced_at } }),
            );
            true
        })
        .unwrap();
}

#[tokio::test]
async fn test_accounts_default_to_asset_type_and_are_cached() {
    let app = create_test_app(
        FakeUpstream::default().reply("accounts", Ok(json!({"data": [{"id": "1"}]}))),
    );

    let (status, body) = send(&app.router, get("/api/accounts")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"data": [{"id": "1"}]}));
    let requests = app.upstream.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::GET);
    assert_eq!(requests[0].path, "accounts");
    assert_eq!(requests[0].params, vec![("type".to_string(), "asset".to_string())]);

    let cached = CacheEntries::new(app.store.clone()).get("accounts?type=asset");
    assert_eq!(cached.data, Some(body));
    assert!(cached.last_synced_at.is_some());
}

#[tokio::test]
async fn test_accounts_type_selects_cache_key() {
    let app = create_test_app(FakeUpstream::default().reply("accounts", Ok(json!([]))));

    let (status, _) = send(&app.router, get("/api/accounts?type=expense")).await;

    assert_eq!(status, StatusCode::OK);
    let entries = CacheEntries::new(app.store.clone());
    assert!(entries.get("accounts?type=expense").data.is_some());
    assert!(entries.get("accounts?type=asset").data.is_none());
}

#[tokio::test]
async fn test_second_request_is_served_from_cache() {
    let app = create_test_app(FakeUpstream::default().reply("budgets", Ok(json!(["b"]))));

    let (_, first) = send(&app.router, get("/api/budgets")).await;
    let (status, second) = send(&app.router, get("/api/budgets")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(first, second);
    assert_eq!(app.upstream.requests().len(), 1);
}

#[tokio::test]
async fn test_stale_cache_is_served_when_upstream_is_down() {
    let app = create_test_app(FakeUpstream::default().reply(
        "categories",
        Err(UpstreamError::Transport {
            details: "connection refused".into(),
        }),
    ));
    seed_cache(&app.store, "categories", json!(["stale"]), &stale_timestamp());

    let (status, body) = send(&app.router, get("/api/categories")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["stale"]));
    let cached = CacheEntries::new(app.store.clone()).get("categories");
    assert_eq!(cached.last_synced_at, Some(stale_timestamp()));
}

#[tokio::test]
async fn test_upstream_error_without_cache_is_forwarded() {
    let app = create_test_app(FakeUpstream::default().reply(
        "tags",
        Err(UpstreamError::Status {
            status: StatusCode::UNAUTHORIZED,
            body: json!({"message": "Unauthenticated."}),
        }),
    ));

    let (status, body) = send(&app.router, get("/api/tags")).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"message": "Unauthenticated."}));
}

#[tokio::test]
async fn test_transport_error_without_cache_is_bad_gateway() {
    let app = create_test_app(FakeUpstream::default().reply(
        "tags",
        Err(UpstreamError::Transport {
            details: "timed out".into(),
        }),
    ));

    let (status, body) = send(&app.router, get("/api/tags")).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["details"], "timed out");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_transaction_missing_amount_is_rejected_without_upstream_call() {
    let app = create_test_app(FakeUpstream::default());
    let form = json!({
        "description": "Coffee",
        "source_account_id": "1",
        "destination_account_id": "2",
        "date": "2024-05-01",
    });

    let (status, body) = send(
        &app.router,
        post_json("/api/transactions", &form.to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("amount"));
    assert!(app.upstream.requests().is_empty());
}

#[tokio::test]
async fn test_transaction_with_invalid_json_is_rejected() {
    let app = create_test_app(FakeUpstream::default());

    let (status, body) = send(&app.router, post_json("/api/transactions", "{oops")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"message": "Missing JSON payload."}));
    assert!(app.upstream.requests().is_empty());
}

#[tokio::test]
async fn test_transaction_is_translated_and_forwarded() {
    let app = create_test_app(FakeUpstream::default());
    let form = json!({
        "description": "Rent",
        "source_account_id": "1",
        "destination_account_id": "9",
        "date": "2024-05-01",
        "amount": 950,
        "transaction_type": "withdrawal",
        "tags": "home, monthly",
    });

    let (status, body) = send(
        &app.router,
        post_json("/api/transactions", &form.to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let requests = app.upstream.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::POST);
    assert_eq!(requests[0].path, "transactions");
    let sent = requests[0].body.clone().unwrap();
    assert_eq!(
        sent,
        json!({
            "transactions": [{
                "description": "Rent",
                "type": "withdrawal",
                "date": "2024-05-01",
                "amount": "950",
                "source_id": "1",
                "destination_id": "9",
                "tags": ["home", "monthly"],
            }]
        })
    );
    assert_eq!(body, json!({"echo": sent}));
}

#[tokio::test]
async fn test_transactions_are_not_cached() {
    let app = create_test_app(FakeUpstream::default());
    let form = json!({
        "description": "Rent",
        "source_account_id": "1",
        "destination_account_id": "9",
        "date": "2024-05-01",
        "amount": "950",
    });

    send(&app.router, post_json("/api/transactions", &form.to_string())).await;

    assert!(app.store.load().get("resource_cache").is_none());
}

#[tokio::test]
async fn test_missing_configuration_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(ConfigStore::in_dir(temp_dir.path()));
    let settings = SettingsResolver::with_env(store.clone(), Arc::new(|_: &str| None::<String>));
    let client = FireflyClient::new(settings).unwrap();
    let router = server::app(AppState::new(store, Arc::new(client)), None);

    let (status, body) = send(&router, get("/api/budgets")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "configuration_error");
    assert!(body["message"].as_str().unwrap().contains(BASE_URL_ENV));
}

#[tokio::test]
async fn test_persisted_settings_win_over_environment() {
    use axum::routing::get as get_route;

    // Fake Firefly III that only answers on the persisted base URL
    let firefly = Router::new().route(
        "/api/v1/tags",
        get_route(|| async { axum::Json(json!({"data": ["from-file"]})) }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, firefly).await.unwrap();
    });

    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(ConfigStore::in_dir(temp_dir.path()));
    store
        .update_settings(|settings| {
            settings.insert(BASE_URL_KEY.into(), json!(format!("http://{addr}")));
            settings.insert(ACCESS_TOKEN_KEY.into(), json!("file-token"));
        })
        .unwrap();
    let settings = SettingsResolver::with_env(
        store.clone(),
        Arc::new(|name: &str| (name == BASE_URL_ENV).then(|| "http://127.0.0.1:9".to_string())),
    );
    let client = FireflyClient::new(settings).unwrap();
    let router = server::app(AppState::new(store, Arc::new(client)), None);

    let (status, body) = send(&router, get("/api/tags")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"data": ["from-file"]}));
}

#[tokio::test]
async fn test_concurrent_requests_keep_document_valid() {
    let app = create_test_app(
        FakeUpstream::default()
            .reply("accounts", Ok(json!(["a"])))
            .reply("budgets", Ok(json!(["b"])))
            .reply("categories", Ok(json!(["c"])))
            .reply("tags", Ok(json!(["t"]))),
    );
    let uris = [
        "/api/accounts",
        "/api/accounts?type=expense",
        "/api/budgets",
        "/api/categories",
        "/api/tags",
    ];

    let results = futures::future::join_all(uris.iter().map(|uri| send(&app.router, get(uri)))).await;

    assert!(results.iter().all(|(status, _)| *status == StatusCode::OK));
    let content = std::fs::read_to_string(app.store.path()).unwrap();
    let document: Value = serde_json::from_str(&content).expect("document stays valid JSON");
    assert_eq!(document["resource_cache"].as_object().unwrap().len(), 5);
}

#[tokio::test]
async fn test_static_frontend_is_served() {
    let frontend = TempDir::new().unwrap();
    std::fs::write(frontend.path().join("index.html"), "<h1>Firefly</h1>").unwrap();
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(ConfigStore::in_dir(temp_dir.path()));
    let state = AppState::new(store, Arc::new(FakeUpstream::default()));
    let router = server::app(state, Some(frontend.path()));

    let response = router.oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"<h1>Firefly</h1>");
}
