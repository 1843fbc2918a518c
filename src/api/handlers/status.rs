//! `/health` (liveness probe) and `/status` (rich operator telemetry).

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::api::types::AppState;
use crate::liveness::IslandState;

/// Cheap liveness probe: no store round-trip, just confirms the process is
/// serving requests. Distinct from `/status`, which is expensive.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "region": state.config.region,
        "service": "meshnet-region",
    }))
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let db_health = state.store.check_health().await;
    let remote_health = state.router.check_network_health().await;
    let island = state.liveness.status();
    let conflicts = state.resolver.snapshot();

    let db_status_ok = db_health.as_ref().map(|h| h.status == "ok").unwrap_or(false);

    let island_status_label = match island.state {
        IslandState::Island => "ISLAND MODE",
        IslandState::Suspect => "SUSPECT",
        IslandState::Connected => "connected",
    };

    let remote_regions: serde_json::Map<String, Value> = remote_health
        .into_iter()
        .map(|(url, reachable)| {
            (
                url,
                Value::String(if reachable { "reachable" } else { "unreachable" }.to_string()),
            )
        })
        .collect();

    Json(json!({
        "status": if db_status_ok { "healthy" } else { "degraded" },
        "region": {
            "name": state.config.region,
            "display_name": state.config.region_display_name(),
        },
        "database": db_health.map(|h| json!({
            "status": h.status,
            "primary": h.primary,
            "members": h.members,
        })).unwrap_or_else(|err| json!({"status": "unhealthy", "error": err.to_string()})),
        "partitioning": {
            "enabled": true,
            "strategy": "consistent_hashing",
            "partition_key": "user_id",
            "nodes": state.partition_nodes,
            "distribution": state.partition_ring.distribution(),
        },
        "island_mode": {
            "active": island.state == IslandState::Island,
            "suspect": island.state == IslandState::Suspect,
            "threshold_seconds": island.threshold_seconds,
            "isolation_start": island.isolation_start,
            "connected_regions": island.connected_peers,
            "total_regions": island.total_peers,
            "status": island_status_label,
        },
        "remote_regions": remote_regions,
        "replication_status": island.peers,
        "conflict_metrics": conflicts,
        "configuration": {
            "sync_interval_seconds": state.config.sync_interval.as_secs(),
            "request_timeout_seconds": state.config.request_timeout.as_secs(),
        },
    }))
}
