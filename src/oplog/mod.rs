//! Operation log: the durable, append-only per-site queue of mutations that
//! the replication daemon fans out to peers.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::store::{Collection, Query, Sort, SortOrder, StoreAdapter, Update};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Insert,
    Update,
    Delete,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Insert => "insert",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OplogEntry {
    pub operation_type: OperationType,
    pub collection: String,
    pub document_id: String,
    /// Empty object for deletes.
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub region_origin: String,
    pub synced_to: Vec<String>,
}

const PUSH_BATCH_SIZE: usize = 100;
pub const GC_EVERY_N_CYCLES: u64 = 60;
const RETENTION_HOURS: i64 = 24;

pub struct OperationLog {
    store: Arc<dyn StoreAdapter>,
    region: String,
}

impl OperationLog {
    pub fn new(store: Arc<dyn StoreAdapter>, region: String) -> Self {
        Self { store, region }
    }

    /// Appends one entry. Every successful local write (insert, update,
    /// delete) calls this exactly once; `data` is an
    /// empty object for deletes.
    pub async fn queue_operation(
        &self,
        operation_type: OperationType,
        collection: &str,
        document_id: &str,
        data: Value,
    ) -> Result<()> {
        let entry = OplogEntry {
            operation_type,
            collection: collection.to_string(),
            document_id: document_id.to_string(),
            data,
            timestamp: Utc::now(),
            region_origin: self.region.clone(),
            synced_to: Vec::new(),
        };
        let payload = serde_json::to_value(&entry)?;
        self.store
            .insert_one(Collection::OperationLog.as_str(), payload)
            .await?;
        Ok(())
    }

    /// Entries originated locally that some configured peer hasn't
    /// acknowledged yet, oldest first, capped at 100 per cycle.
    pub async fn pushable_entries(&self, peers: &[String]) -> Result<Vec<OplogEntry>> {
        let query = Query::eq("region_origin", self.region.as_str())
            .and_not_superset_of("synced_to", peers.to_vec());

        let docs = self
            .store
            .find_many(
                Collection::OperationLog.as_str(),
                &query,
                Some(Sort::by("timestamp", SortOrder::Ascending)),
                0,
                PUSH_BATCH_SIZE,
            )
            .await?;

        Ok(docs
            .into_iter()
            .filter_map(|d| serde_json::from_value(d).ok())
            .collect())
    }

    /// Atomically adds `peer` to `synced_to` for every entry in the batch
    /// (idempotent set semantics — re-pushing is a no-op on replay).
    pub async fn mark_synced(&self, entries: &[OplogEntry], peer: &str) -> Result<()> {
        for entry in entries {
            // Match the stored document's serialized form exactly: `OplogEntry`'s
            // derived `Serialize` emits `Z`-suffixed timestamps, not `to_rfc3339()`'s
            // numeric-offset form, and `Condition::Eq` does raw value equality.
            let query = Query::eq("region_origin", entry.region_origin.as_str())
                .and_eq("document_id", entry.document_id.as_str())
                .and_eq("timestamp", serde_json::to_value(entry.timestamp)?);
            self.store
                .update_one(
                    Collection::OperationLog.as_str(),
                    &query,
                    Update::AddToSet {
                        field: "synced_to".to_string(),
                        value: peer.to_string(),
                    },
                )
                .await?;
        }
        Ok(())
    }

    /// Deletes every fully-acknowledged, locally-originated entry older than
    /// the retention window. Best-effort: failures are left for the next
    /// cycle and must never block the sync loop.
    pub async fn collect_garbage(&self, peers: &[String]) -> Result<usize> {
        let cutoff = Utc::now() - Duration::hours(RETENTION_HOURS);
        let query = Query::eq("region_origin", self.region.as_str())
            .and_superset_of("synced_to", peers.to_vec())
            .and_older_than("timestamp", cutoff);

        self.store
            .delete_many(Collection::OperationLog.as_str(), &query)
            .await
    }

    /// Locally-originated operations newer than `since`, ascending by
    /// timestamp, capped at 100 — the `/internal/changes` response body.
    pub async fn changes_since(&self, since: Option<DateTime<Utc>>) -> Result<Vec<OplogEntry>> {
        let query = Query::eq("region_origin", self.region.as_str());
        let docs = self
            .store
            .find_many(
                Collection::OperationLog.as_str(),
                &query,
                Some(Sort::by("timestamp", SortOrder::Ascending)),
                0,
                PUSH_BATCH_SIZE,
            )
            .await?;

        let entries = docs
            .into_iter()
            .filter_map(|d| serde_json::from_value::<OplogEntry>(d).ok());

        Ok(match since {
            Some(since) => entries.filter(|e| e.timestamp > since).collect(),
            None => entries.collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use serde_json::json;

    fn log() -> OperationLog {
        OperationLog::new(Arc::new(InMemoryStore::new()), "north_america".to_string())
    }

    #[tokio::test]
    async fn queue_then_pushable_round_trips() {
        let log = log();
        log.queue_operation(OperationType::Insert, "posts", "p1", json!({"a": 1}))
            .await
            .unwrap();

        let pushable = log
            .pushable_entries(&["http://eu".to_string(), "http://ap".to_string()])
            .await
            .unwrap();
        assert_eq!(pushable.len(), 1);
        assert!(pushable[0].synced_to.is_empty());
    }

    #[tokio::test]
    async fn mark_synced_is_idempotent_and_shrinks_pushable_set() {
        let log = log();
        log.queue_operation(OperationType::Insert, "posts", "p1", json!({}))
            .await
            .unwrap();

        let peers = vec!["http://eu".to_string(), "http://ap".to_string()];
        let entries = log.pushable_entries(&peers).await.unwrap();
        log.mark_synced(&entries, "http://eu").await.unwrap();
        log.mark_synced(&entries, "http://eu").await.unwrap(); // idempotent replay

        let still_pushable = log.pushable_entries(&peers).await.unwrap();
        assert_eq!(still_pushable.len(), 1); // ap hasn't acked yet
        assert_eq!(still_pushable[0].synced_to, vec!["http://eu".to_string()]);

        log.mark_synced(&still_pushable, "http://ap").await.unwrap();
        let fully_synced = log.pushable_entries(&peers).await.unwrap();
        assert!(fully_synced.is_empty());
    }

    #[tokio::test]
    async fn gc_only_removes_fully_acked_entries() {
        let log = log();
        log.queue_operation(OperationType::Insert, "posts", "p1", json!({}))
            .await
            .unwrap();
        let peers = vec!["http://eu".to_string()];
        let entries = log.pushable_entries(&peers).await.unwrap();
        log.mark_synced(&entries, "http://eu").await.unwrap();

        // Not old enough yet: GC leaves it alone.
        let deleted = log.collect_garbage(&peers).await.unwrap();
        assert_eq!(deleted, 0);
    }
}
