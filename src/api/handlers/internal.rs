//! `/internal/sync`, `/internal/changes` — the peer-to-peer replication
//! transport.

use std::sync::Arc;

use axum::extract::{Query as QueryExtractor, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::types::AppState;
use crate::error::{DbError, Result};
use crate::oplog::OplogEntry;

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub operations: Vec<OplogEntry>,
}

pub async fn receive_sync(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SyncRequest>,
) -> Result<Json<Value>> {
    if body.operations.is_empty() {
        return Err(DbError::InvalidRequest("No operations provided".to_string()));
    }

    state.daemon.apply_operations(&body.operations).await;

    Ok(Json(json!({
        "message": "Operations applied successfully",
        "count": body.operations.len(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct ChangesParams {
    pub since: Option<String>,
}

pub async fn get_changes(
    State(state): State<Arc<AppState>>,
    QueryExtractor(params): QueryExtractor<ChangesParams>,
) -> Result<Json<Value>> {
    let since: Option<DateTime<Utc>> = params
        .since
        .as_deref()
        .and_then(crate::store::document::parse_timestamp);

    if params.since.is_some() && since.is_none() {
        tracing::warn!(since = ?params.since, "invalid since timestamp format");
    }

    let operations = state.oplog.changes_since(since).await?;

    Ok(Json(json!({
        "operations": operations,
        "count": operations.len(),
    })))
}
