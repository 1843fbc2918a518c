//! Last-write-wins conflict resolution for incoming replicated documents,
//! plus the metrics the `/status` endpoint surfaces.

use std::collections::HashMap;
use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::store::document::extract_timestamp;

const RECENT_CONFLICTS_CAPACITY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The incoming (remote) document is newer, or ties and wins the
    /// region_origin tie-break: apply it.
    RemoteWins,
    /// The document already on disk is newer, or ties and wins the
    /// tie-break: discard the incoming one.
    LocalWins,
    /// Neither side carries a comparable timestamp; the apply step keeps the
    /// existing document rather than risk clobbering it with garbage.
    Unresolved,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConflictRecord {
    pub collection: String,
    pub document_id: String,
    pub local_region: String,
    pub remote_region: String,
    pub resolution: &'static str,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize)]
pub struct ConflictMetrics {
    pub total: u64,
    pub remote_wins: u64,
    pub local_wins: u64,
    pub unresolved: u64,
    pub by_collection: HashMap<String, u64>,
    #[serde(skip)]
    recent: VecDeque<ConflictRecord>,
}

impl ConflictMetrics {
    pub fn recent(&self) -> Vec<ConflictRecord> {
        self.recent.iter().cloned().collect()
    }
}

/// Compares `local` and `remote` versions of the same document and decides
/// which one survives, using `last_modified` falling back to `timestamp`,
/// with a lexicographic `region_origin` tie-break when timestamps are
/// exactly equal — a deterministic resolution independent of push order.
pub struct ConflictResolver {
    metrics: Mutex<ConflictMetrics>,
}

impl ConflictResolver {
    pub fn new() -> Self {
        Self {
            metrics: Mutex::new(ConflictMetrics::default()),
        }
    }

    pub fn resolve(&self, local: &Value, remote: &Value) -> Resolution {
        let local_ts = effective_timestamp(local);
        let remote_ts = effective_timestamp(remote);

        let (local_ts, remote_ts) = match (local_ts, remote_ts) {
            (Some(l), Some(r)) => (l, r),
            _ => return Resolution::Unresolved,
        };

        if remote_ts > local_ts {
            Resolution::RemoteWins
        } else if remote_ts < local_ts {
            Resolution::LocalWins
        } else {
            let local_region = local.get("region").and_then(Value::as_str).unwrap_or("");
            let remote_region = remote.get("region").and_then(Value::as_str).unwrap_or("");
            if remote_region < local_region {
                Resolution::RemoteWins
            } else {
                Resolution::LocalWins
            }
        }
    }

    /// Resolves and records the outcome in the rolling metrics, for callers
    /// (the daemon's apply step) that want both in one call.
    pub fn resolve_and_record(
        &self,
        collection: &str,
        document_id: &str,
        local: &Value,
        remote: &Value,
    ) -> Resolution {
        let resolution = self.resolve(local, remote);
        if resolution == Resolution::Unresolved {
            tracing::warn!(collection, document_id, "conflict left unresolved: missing timestamps");
        }

        let local_region = local.get("region").and_then(Value::as_str).unwrap_or("").to_string();
        let remote_region = remote.get("region").and_then(Value::as_str).unwrap_or("").to_string();

        let mut metrics = self.metrics.lock();
        metrics.total += 1;
        match resolution {
            Resolution::RemoteWins => metrics.remote_wins += 1,
            Resolution::LocalWins => metrics.local_wins += 1,
            Resolution::Unresolved => metrics.unresolved += 1,
        }
        *metrics.by_collection.entry(collection.to_string()).or_insert(0) += 1;

        let record = ConflictRecord {
            collection: collection.to_string(),
            document_id: document_id.to_string(),
            local_region,
            remote_region,
            resolution: match resolution {
                Resolution::RemoteWins => "remote_wins",
                Resolution::LocalWins => "local_wins",
                Resolution::Unresolved => "unresolved",
            },
            at: Utc::now(),
        };
        if metrics.recent.len() == RECENT_CONFLICTS_CAPACITY {
            metrics.recent.pop_front();
        }
        metrics.recent.push_back(record);

        resolution
    }

    pub fn snapshot(&self) -> ConflictMetricsSnapshot {
        let metrics = self.metrics.lock();
        ConflictMetricsSnapshot {
            total: metrics.total,
            remote_wins: metrics.remote_wins,
            local_wins: metrics.local_wins,
            unresolved: metrics.unresolved,
            by_collection: metrics.by_collection.clone(),
            recent: metrics.recent(),
        }
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct ConflictMetricsSnapshot {
    pub total: u64,
    pub remote_wins: u64,
    pub local_wins: u64,
    pub unresolved: u64,
    pub by_collection: HashMap<String, u64>,
    pub recent: Vec<ConflictRecord>,
}

fn effective_timestamp(doc: &Value) -> Option<DateTime<Utc>> {
    extract_timestamp(doc, "last_modified").or_else(|| extract_timestamp(doc, "timestamp"))
}
