//! `/api/posts`, `/api/help-requests`, `/api/partitioning/stats`.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::types::AppState;
use crate::config::Config;
use crate::error::{DbError, Result};
use crate::oplog::OperationType;
use crate::store::document::{GeoPoint, PostData, PostType};
use crate::store::{Collection, Query as StoreQuery, Sort, SortOrder, Update};

fn with_timezone_metadata(mut body: Value) -> Value {
    if let Value::Object(map) = &mut body {
        map.insert(
            "_metadata".to_string(),
            json!({"timezone": "UTC", "timezone_offset": "+00:00"}),
        );
    }
    body
}

#[derive(Debug, Deserialize)]
pub struct ListPostsParams {
    pub post_type: Option<String>,
    pub region: Option<String>,
    #[serde(default)]
    pub global: bool,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub skip: usize,
}

fn default_limit() -> usize {
    100
}

pub async fn list_posts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListPostsParams>,
) -> Result<Json<Value>> {
    if let Some(post_type) = &params.post_type {
        if !Config::validate_post_type(post_type) {
            return Err(DbError::InvalidRequest(format!("Invalid post type: {post_type}")));
        }
    }

    if params.global {
        return list_posts_global(state, params).await;
    }

    let mut query = StoreQuery::all();
    if let Some(post_type) = &params.post_type {
        query = query.and_eq("post_type", post_type.clone());
    }

    match &params.region {
        Some(region) if region == "all" => {}
        Some(region) => {
            if !Config::validate_region(region) {
                return Err(DbError::InvalidRequest(format!("Invalid region: {region}")));
            }
            query = query.and_eq("region", region.clone());
        }
        None => query = query.and_eq("region", state.config.region.clone()),
    }

    let total_count = state.store.count(Collection::Posts.as_str(), &query).await?;
    let posts = state
        .store
        .find_many(
            Collection::Posts.as_str(),
            &query,
            Some(Sort::by("timestamp", SortOrder::Descending)),
            params.skip,
            params.limit,
        )
        .await?;

    let body = json!({
        "posts": posts,
        "count": posts_len(&posts),
        "total_count": total_count,
        "skip": params.skip,
        "limit": params.limit,
        "region": state.config.region,
    });
    Ok(Json(with_timezone_metadata(body)))
}

async fn list_posts_global(state: Arc<AppState>, params: ListPostsParams) -> Result<Json<Value>> {
    tracing::info!("executing global query across all regions");

    let mut local_query = StoreQuery::all();
    if let Some(post_type) = &params.post_type {
        local_query = local_query.and_eq("post_type", post_type.clone());
    }

    let local_posts = state
        .store
        .find_many(
            Collection::Posts.as_str(),
            &local_query,
            Some(Sort::by("timestamp", SortOrder::Descending)),
            0,
            params.limit,
        )
        .await?;

    let mut remote_params = vec![("region".to_string(), "all".to_string())];
    if let Some(post_type) = &params.post_type {
        remote_params.push(("post_type".to_string(), post_type.clone()));
    }
    remote_params.push(("limit".to_string(), params.limit.to_string()));

    let scatter = state
        .router
        .scatter_gather(
            "/api/posts",
            &remote_params,
            None,
            local_posts.clone(),
            "timestamp",
            params.limit,
        )
        .await;

    let remote_count = scatter.results.len().saturating_sub(local_posts.len());

    let body = json!({
        "posts": scatter.results,
        "count": posts_len(&scatter.results),
        "region": "global",
        "sources": {
            "local": local_posts.len(),
            "remote": remote_count,
        },
        "query_metadata": scatter.metadata,
    });
    Ok(Json(with_timezone_metadata(body)))
}

fn posts_len(posts: &[Value]) -> usize {
    posts.len()
}

pub async fn get_post(State(state): State<Arc<AppState>>, Path(post_id): Path<String>) -> Result<Json<Value>> {
    let post = state
        .store
        .find_one(Collection::Posts.as_str(), &StoreQuery::eq("post_id", post_id))
        .await?
        .ok_or_else(|| DbError::NotFound("Post not found".to_string()))?;
    Ok(Json(post))
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub user_id: String,
    pub post_type: String,
    pub message: String,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub capacity: Option<u64>,
}

pub async fn create_post(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreatePostRequest>,
) -> Result<(axum::http::StatusCode, Json<Value>)> {
    let post_type = PostType::parse(&body.post_type)?;
    let now = Utc::now();
    let post = PostData {
        post_id: Uuid::new_v4().to_string(),
        user_id: body.user_id,
        post_type,
        message: body.message,
        location: body.location.unwrap_or_else(|| GeoPoint::new(0.0, 0.0)),
        region: body.region.unwrap_or_else(|| state.config.region.clone()),
        capacity: body.capacity,
        timestamp: now,
        last_modified: now,
    };
    post.validate()?;

    let payload = serde_json::to_value(&post)?;
    state.store.insert_one(Collection::Posts.as_str(), payload.clone()).await?;
    state
        .oplog
        .queue_operation(OperationType::Insert, Collection::Posts.as_str(), &post.post_id, payload)
        .await?;

    tracing::info!(post_id = %post.post_id, user_id = %post.user_id, "created post");

    Ok((
        axum::http::StatusCode::CREATED,
        Json(json!({
            "message": "Post created successfully",
            "post_id": post.post_id,
            "region": state.config.region,
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePostRequest {
    pub message: Option<String>,
    pub post_type: Option<String>,
    pub capacity: Option<u64>,
    pub location: Option<GeoPoint>,
}

pub async fn update_post(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<String>,
    Json(body): Json<UpdatePostRequest>,
) -> Result<Json<Value>> {
    let query = StoreQuery::eq("post_id", post_id.clone());
    let existing = state
        .store
        .find_one(Collection::Posts.as_str(), &query)
        .await?
        .ok_or_else(|| DbError::NotFound("Post not found".to_string()))?;
    let _ = existing;

    let mut fields = serde_json::Map::new();
    if let Some(message) = body.message {
        fields.insert("message".to_string(), Value::String(message));
    }
    if let Some(post_type) = &body.post_type {
        PostType::parse(post_type)?;
        fields.insert("post_type".to_string(), Value::String(post_type.clone()));
    }
    if let Some(capacity) = body.capacity {
        fields.insert("capacity".to_string(), json!(capacity));
    }
    if let Some(location) = &body.location {
        location.validate()?;
        fields.insert("location".to_string(), serde_json::to_value(location)?);
    }
    fields.insert("last_modified".to_string(), Value::String(Utc::now().to_rfc3339()));

    let update_payload = Value::Object(fields);
    state
        .store
        .update_one(Collection::Posts.as_str(), &query, Update::Set(update_payload.clone()))
        .await?;
    state
        .oplog
        .queue_operation(OperationType::Update, Collection::Posts.as_str(), &post_id, update_payload)
        .await?;

    tracing::info!(post_id = %post_id, "updated post");

    Ok(Json(json!({
        "message": "Post updated successfully",
        "post_id": post_id,
    })))
}

pub async fn delete_post(State(state): State<Arc<AppState>>, Path(post_id): Path<String>) -> Result<Json<Value>> {
    let query = StoreQuery::eq("post_id", post_id.clone());
    let deleted = state.store.delete_one(Collection::Posts.as_str(), &query).await?;
    if !deleted {
        return Err(DbError::NotFound("Post not found".to_string()));
    }
    state
        .oplog
        .queue_operation(OperationType::Delete, Collection::Posts.as_str(), &post_id, json!({}))
        .await?;

    tracing::info!(post_id = %post_id, "deleted post");

    Ok(Json(json!({
        "message": "Post deleted successfully",
        "post_id": post_id,
    })))
}

#[derive(Debug, Deserialize)]
pub struct HelpRequestParams {
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    #[serde(default = "default_radius")]
    pub radius: f64,
}

fn default_radius() -> f64 {
    10_000.0
}

pub async fn list_help_requests(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HelpRequestParams>,
) -> Result<Json<Value>> {
    let (Some(longitude), Some(latitude)) = (params.longitude, params.latitude) else {
        return Err(DbError::InvalidRequest("Location coordinates required".to_string()));
    };

    let query = StoreQuery::eq("post_type", "help").and_near("location", longitude, latitude, params.radius);

    let help_requests = state
        .store
        .find_many(Collection::Posts.as_str(), &query, None, 0, 50)
        .await?;

    Ok(Json(json!({
        "help_requests": help_requests,
        "count": help_requests.len(),
    })))
}

pub async fn partitioning_stats(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    Ok(Json(json!({
        "region": state.config.region,
        "partitioning": {
            "enabled": true,
            "strategy": "consistent_hashing",
            "partition_key": "user_id",
            "nodes": state.partition_nodes,
            "distribution": state.partition_ring.distribution(),
        },
        "description": "Consistent hashing distributes user data across replica set nodes for load balancing",
    })))
}
