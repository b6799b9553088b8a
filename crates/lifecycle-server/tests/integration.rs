use std::sync::Arc;

use axum::http::StatusCode;
use http_body_util::BodyExt;
use lifecycle_core::dispatch::Dispatcher;
use lifecycle_core::operation::OperationKey;
use lifecycle_core::repo::RepoMap;
use lifecycle_core::store::{MemoryStore, OperationRepository, RepoMapRepository};
use lifecycle_core::testing::{repo, RecordingSink, ScriptedBackend};
use lifecycle_core::types::EventType;
use lifecycle_server::state::AppState;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Fixture {
    app: axum::Router,
    operations: OperationRepository,
    backend: Arc<ScriptedBackend>,
    sink: Arc<RecordingSink>,
}

/// Wire a router over in-memory containers. `None` leaves the repo directory
/// unpopulated.
fn fixture(map: Option<RepoMap>) -> Fixture {
    let maps = RepoMapRepository::new(Arc::new(MemoryStore::new()));
    if let Some(map) = map {
        maps.replace(&map).unwrap();
    }
    let operations = OperationRepository::new(Arc::new(MemoryStore::new()));
    let backend = Arc::new(ScriptedBackend::new());
    for name in ["repo-a", "repo-b", "repo-c"] {
        backend.add_workflow(name, "configure");
    }
    let sink = Arc::new(RecordingSink::new());
    let dispatcher = Dispatcher::new(
        "acme",
        maps,
        operations.clone(),
        backend.clone(),
        sink.clone(),
    );
    let app = lifecycle_server::build_router(AppState::new(Arc::new(dispatcher)));
    Fixture {
        app,
        operations,
        backend,
        sink,
    }
}

fn directory() -> RepoMap {
    RepoMap::new(
        vec![
            repo("repo-a", &["saas-lifecycle", "billing", "prod"]),
            repo("repo-b", &["saas-lifecycle", "billing"]),
        ],
        Some("\"etag-1\"".into()),
    )
}

/// Send a GET request via `oneshot` and return (status, parsed JSON body).
async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Send a POST request with a raw body via `oneshot` and return (status, parsed JSON body).
async fn post_raw(app: axum::Router, uri: &str, body: Vec<u8>) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body))
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Send a POST request with a JSON body via `oneshot` and return (status, parsed JSON body).
async fn post_json(
    app: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    post_raw(app, uri, serde_json::to_vec(&body).unwrap()).await
}

const CONFIGURE: &str = "/tenants/t1/subscriptions/s1/configure";

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_ok() {
    let f = fixture(None);
    let (status, body) = get(f.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dispatch_accepts_and_records_operation() {
    let f = fixture(Some(directory()));
    let (status, body) = post_json(
        f.app,
        CONFIGURE,
        serde_json::json!({
            "operationId": "abc123",
            "context": {"seats": 5},
            "selectors": ["Billing", "prod"]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["operationId"], "abc123");

    let op = f
        .operations
        .get(&OperationKey::new("repo-a", "abc123"))
        .unwrap()
        .expect("record stored under the selected repo");
    assert_eq!(op.tenant_id, "t1");
    assert_eq!(op.subscription_id, "s1");
    assert_eq!(op.action_type, "configure");
    assert!(f.backend.has_branch("repo-a", "abc123"));
    assert_eq!(f.sink.count("abc123", EventType::Configuring), 1);
}

#[tokio::test]
async fn dispatch_under_saas_prefix_generates_an_id() {
    let f = fixture(Some(directory()));
    let (status, body) = post_json(
        f.app,
        "/saas/tenants/t1/subscriptions/s1/configure",
        serde_json::json!({ "selectors": ["billing", "prod"] }),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let id = body["operationId"].as_str().unwrap();
    assert!(!id.is_empty());
    assert!(f
        .operations
        .exists(&OperationKey::new("repo-a", id))
        .unwrap());
}

#[tokio::test]
async fn ambiguous_selectors_return_409_with_candidates() {
    let mut map = directory();
    map.repos
        .push(repo("repo-c", &["saas-lifecycle", "billing", "prod", "eu"]));
    let f = fixture(Some(map));

    let (status, body) = post_json(
        f.app,
        CONFIGURE,
        serde_json::json!({ "selectors": ["billing", "prod"] }),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["repos"], serde_json::json!(["repo-a", "repo-c"]));
    assert!(body["error"].as_str().unwrap().contains("repo-a"));
    assert_eq!(f.backend.branch_count(), 0);
    assert!(f.sink.events().is_empty());
}

#[tokio::test]
async fn unmatched_selectors_return_404() {
    let f = fixture(Some(directory()));
    let (status, body) = post_json(
        f.app,
        CONFIGURE,
        serde_json::json!({ "selectors": ["payroll"] }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("no matching workflow"));
}

#[tokio::test]
async fn missing_directory_returns_503() {
    let f = fixture(None);
    let (status, body) = post_json(
        f.app,
        CONFIGURE,
        serde_json::json!({ "selectors": ["billing"] }),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());
    assert!(f.backend.calls().is_empty());
}

#[tokio::test]
async fn empty_selectors_return_400() {
    let f = fixture(Some(directory()));
    let (status, body) = post_json(f.app, CONFIGURE, serde_json::json!({ "selectors": [] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn malformed_body_returns_400() {
    let f = fixture(Some(directory()));
    let (status, body) = post_raw(f.app, CONFIGURE, b"{not json".to_vec()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("malformed request body"));
}

#[tokio::test]
async fn repeated_operation_id_returns_409() {
    let f = fixture(Some(directory()));
    let body = serde_json::json!({ "operationId": "dup1", "selectors": ["billing", "prod"] });

    let (first, _) = post_json(f.app.clone(), CONFIGURE, body.clone()).await;
    assert_eq!(first, StatusCode::ACCEPTED);

    let (second, _) = post_json(f.app, CONFIGURE, body).await;
    assert_eq!(second, StatusCode::CONFLICT);
    assert_eq!(f.backend.branch_count(), 1);
    assert_eq!(f.sink.count("dup1", EventType::Configuring), 1);
}
