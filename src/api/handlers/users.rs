//! `/api/users`, `/api/mark-safe`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::types::AppState;
use crate::error::{DbError, Result};
use crate::oplog::OperationType;
use crate::store::document::{GeoPoint, PostData, PostType, UserData};
use crate::store::{Collection, Query, Update};

pub async fn get_user(State(state): State<Arc<AppState>>, Path(user_id): Path<String>) -> Result<Json<Value>> {
    let user = state
        .store
        .find_one(Collection::Users.as_str(), &Query::eq("user_id", user_id))
        .await?
        .ok_or_else(|| DbError::NotFound("User not found".to_string()))?;
    Ok(Json(user))
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub reputation: i64,
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateUserRequest>,
) -> Result<(axum::http::StatusCode, Json<Value>)> {
    let user = UserData {
        user_id: Uuid::new_v4().to_string(),
        name: body.name,
        email: body.email,
        region: body.region.unwrap_or_else(|| state.config.region.clone()),
        location: body.location.unwrap_or_else(|| GeoPoint::new(0.0, 0.0)),
        verified: body.verified,
        reputation: body.reputation,
        created_at: Utc::now(),
    };
    user.validate()?;

    let existing = state
        .store
        .find_one(Collection::Users.as_str(), &Query::eq("email", user.email.clone()))
        .await?;
    if existing.is_some() {
        return Err(DbError::Conflict("User with this email already exists".to_string()));
    }

    let payload = serde_json::to_value(&user)?;
    state.store.insert_one(Collection::Users.as_str(), payload.clone()).await?;
    state
        .oplog
        .queue_operation(OperationType::Insert, Collection::Users.as_str(), &user.user_id, payload)
        .await?;

    tracing::info!(user_id = %user.user_id, email = %user.email, "created user");

    Ok((
        axum::http::StatusCode::CREATED,
        Json(json!({
            "message": "User created successfully",
            "user_id": user.user_id,
            "region": state.config.region,
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub location: Option<GeoPoint>,
    pub verified: Option<bool>,
    pub reputation: Option<i64>,
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(body): Json<UpdateUserRequest>,
) -> Result<Json<Value>> {
    let query = Query::eq("user_id", user_id.clone());
    state
        .store
        .find_one(Collection::Users.as_str(), &query)
        .await?
        .ok_or_else(|| DbError::NotFound("User not found".to_string()))?;

    let mut fields = serde_json::Map::new();
    if let Some(name) = body.name {
        fields.insert("name".to_string(), Value::String(name));
    }
    if let Some(location) = &body.location {
        location.validate()?;
        fields.insert("location".to_string(), serde_json::to_value(location)?);
    }
    if let Some(verified) = body.verified {
        fields.insert("verified".to_string(), json!(verified));
    }
    if let Some(reputation) = body.reputation {
        fields.insert("reputation".to_string(), json!(reputation));
    }

    let update_payload = Value::Object(fields);
    state
        .store
        .update_one(Collection::Users.as_str(), &query, Update::Set(update_payload.clone()))
        .await?;
    state
        .oplog
        .queue_operation(OperationType::Update, Collection::Users.as_str(), &user_id, update_payload)
        .await?;

    tracing::info!(user_id = %user_id, "updated user");

    Ok(Json(json!({
        "message": "User updated successfully",
        "user_id": user_id,
    })))
}

#[derive(Debug, Deserialize)]
pub struct MarkSafeRequest {
    pub user_id: String,
}

/// Creates a `safety`-typed post on the user's behalf, so their status
/// propagates through the same replication path as any other post.
pub async fn mark_safe(
    State(state): State<Arc<AppState>>,
    Json(body): Json<MarkSafeRequest>,
) -> Result<Json<Value>> {
    let user = state
        .store
        .find_one(Collection::Users.as_str(), &Query::eq("user_id", body.user_id.clone()))
        .await?
        .ok_or_else(|| DbError::NotFound("User not found".to_string()))?;

    let name = user.get("name").and_then(Value::as_str).unwrap_or("User");
    let location: GeoPoint = user
        .get("location")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_else(|| GeoPoint::new(0.0, 0.0));
    let region = user
        .get("region")
        .and_then(Value::as_str)
        .unwrap_or(&state.config.region)
        .to_string();

    let now = Utc::now();
    let post = PostData {
        post_id: Uuid::new_v4().to_string(),
        user_id: body.user_id.clone(),
        post_type: PostType::Safety,
        message: format!("{name} marked themselves as safe"),
        location,
        region,
        capacity: None,
        timestamp: now,
        last_modified: now,
    };

    let payload = serde_json::to_value(&post)?;
    state.store.insert_one(Collection::Posts.as_str(), payload.clone()).await?;
    state
        .oplog
        .queue_operation(OperationType::Insert, Collection::Posts.as_str(), &post.post_id, payload)
        .await?;

    tracing::info!(user_id = %body.user_id, post_id = %post.post_id, "user marked as safe");

    Ok(Json(json!({
        "message": "User marked as safe",
        "user_id": body.user_id,
        "post_id": post.post_id,
    })))
}
