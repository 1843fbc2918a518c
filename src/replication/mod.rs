//! The replication daemon: push local operations to peers, pull theirs, and
//! apply them locally through the conflict resolver.

pub mod client;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::conflict::ConflictResolver;
use crate::liveness::LivenessTracker;
use crate::oplog::{OperationLog, OperationType};
use crate::store::document::extract_timestamp;
use crate::store::{Collection, Query, StoreAdapter, Update};

pub use client::PeerClient;

const GC_EVERY_N_CYCLES: u64 = crate::oplog::GC_EVERY_N_CYCLES;
const GC_RETENTION_HOURS: i64 = 24;
const JOIN_DEADLINE: Duration = Duration::from_secs(5);

pub struct ReplicationDaemon {
    region: String,
    remote_regions: Vec<String>,
    sync_interval: Duration,
    store: Arc<dyn StoreAdapter>,
    oplog: Arc<OperationLog>,
    resolver: Arc<ConflictResolver>,
    liveness: Arc<LivenessTracker>,
    client: PeerClient,
    running: Arc<AtomicBool>,
    handle: AsyncMutex<Option<JoinHandle<()>>>,
}

impl ReplicationDaemon {
    pub fn new(
        region: String,
        remote_regions: Vec<String>,
        sync_interval: Duration,
        request_timeout: Duration,
        store: Arc<dyn StoreAdapter>,
        oplog: Arc<OperationLog>,
        resolver: Arc<ConflictResolver>,
        liveness: Arc<LivenessTracker>,
    ) -> Self {
        Self {
            region,
            remote_regions,
            sync_interval,
            store,
            oplog,
            resolver,
            liveness,
            client: PeerClient::new(request_timeout),
            running: Arc::new(AtomicBool::new(false)),
            handle: AsyncMutex::new(None),
        }
    }

    /// Idempotent: a second call while already running is a no-op.
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("sync daemon is already running");
            return;
        }

        let daemon = Arc::clone(self);
        let handle = tokio::spawn(async move { daemon.sync_loop().await });
        *self.handle.lock().await = Some(handle);
        tracing::info!(interval_s = self.sync_interval.as_secs(), "sync daemon started");
    }

    /// Signals the loop to stop and waits up to 5s for it to exit, mirroring
    /// `sync_thread.join(timeout=5)`.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            if tokio::time::timeout(JOIN_DEADLINE, handle).await.is_err() {
                tracing::warn!("sync daemon did not stop within the join deadline");
            }
        }
        tracing::info!("sync daemon stopped");
    }

    async fn sync_loop(self: Arc<Self>) {
        let mut cleanup_counter: u64 = 0;

        while self.running.load(Ordering::SeqCst) {
            if let Err(err) = self.push_local_changes().await {
                tracing::error!(%err, "error pushing local changes");
            }
            if let Err(err) = self.pull_remote_changes().await {
                tracing::error!(%err, "error pulling remote changes");
            }

            cleanup_counter += 1;
            if cleanup_counter >= GC_EVERY_N_CYCLES {
                tracing::info!("running periodic operation log cleanup");
                match self.oplog.collect_garbage(&self.remote_regions).await {
                    Ok(deleted) if deleted > 0 => {
                        tracing::info!(deleted, "cleaned up old operations")
                    }
                    Ok(_) => {}
                    Err(err) => tracing::error!(%err, "error cleaning up old operations"),
                }
                cleanup_counter = 0;
            }

            tokio::time::sleep(self.sync_interval).await;
        }
    }

    async fn push_local_changes(&self) -> crate::error::Result<()> {
        let pushable = self.oplog.pushable_entries(&self.remote_regions).await?;
        if pushable.is_empty() {
            return Ok(());
        }
        tracing::info!(count = pushable.len(), "found operations to sync");

        for peer in &self.remote_regions {
            match self.client.push(peer, &pushable).await {
                Ok(true) => {
                    self.oplog.mark_synced(&pushable, peer).await?;
                    tracing::info!(peer, count = pushable.len(), "pushed operations");
                    self.liveness.record_success(peer);
                }
                Ok(false) => {
                    tracing::warn!(peer, "peer rejected push");
                    self.liveness.record_failure(peer);
                }
                Err(err) => {
                    tracing::error!(peer, %err, "failed to push to peer");
                    self.liveness.record_failure(peer);
                }
            }
        }
        Ok(())
    }

    async fn pull_remote_changes(&self) -> crate::error::Result<()> {
        for peer in &self.remote_regions {
            let since = self.last_sync_time(peer).await?;
            match self.client.pull(peer, since).await {
                Ok(operations) => {
                    if !operations.is_empty() {
                        self.apply_operations(&operations).await;
                        tracing::info!(peer, count = operations.len(), "pulled operations");
                        self.set_last_sync_time(peer, Utc::now()).await?;
                    }
                    self.liveness.record_success(peer);
                }
                Err(err) => {
                    tracing::error!(peer, %err, "failed to pull from peer");
                    self.liveness.record_failure(peer);
                }
            }
        }
        Ok(())
    }

    /// Applies a batch of remote operations, resolving conflicts on
    /// insert/update collisions and applying deletes unconditionally —
    /// deletes never go through the resolver.
    pub async fn apply_operations(&self, operations: &[crate::oplog::OplogEntry]) {
        for op in operations {
            if let Err(err) = self.apply_one(op).await {
                tracing::error!(document_id = %op.document_id, %err, "error applying operation");
            }
        }
    }

    async fn apply_one(&self, op: &crate::oplog::OplogEntry) -> crate::error::Result<()> {
        let Some(id_field) = Collection::singular_id_field(&op.collection) else {
            return Err(crate::error::DbError::InvalidRequest(format!(
                "unknown collection '{}'",
                op.collection
            )));
        };
        let query = Query::eq(id_field, op.document_id.as_str());

        match op.operation_type {
            OperationType::Insert => {
                let existing = self.store.find_one(&op.collection, &query).await?;
                match existing {
                    None => {
                        self.store.insert_one(&op.collection, op.data.clone()).await?;
                        tracing::info!(collection = %op.collection, document_id = %op.document_id, "applied insert");
                    }
                    Some(existing) => self.resolve_conflict(&op.collection, &op.document_id, &op.data, existing).await?,
                }
            }
            OperationType::Update => {
                let existing = self.store.find_one(&op.collection, &query).await?;
                match existing {
                    Some(existing) => self.resolve_conflict(&op.collection, &op.document_id, &op.data, existing).await?,
                    None => {
                        self.store.insert_one(&op.collection, op.data.clone()).await?;
                        tracing::info!(collection = %op.collection, document_id = %op.document_id, "applied update as insert");
                    }
                }
            }
            OperationType::Delete => {
                self.store.delete_one(&op.collection, &query).await?;
                tracing::info!(collection = %op.collection, document_id = %op.document_id, "applied delete");
            }
        }
        Ok(())
    }

    async fn resolve_conflict(
        &self,
        collection: &str,
        document_id: &str,
        remote: &Value,
        local: Value,
    ) -> crate::error::Result<()> {
        let resolution = self.resolver.resolve_and_record(collection, document_id, &local, remote);
        let Some(id_field) = Collection::singular_id_field(collection) else {
            return Ok(());
        };
        let query = Query::eq(id_field, document_id.to_string());

        match resolution {
            crate::conflict::Resolution::RemoteWins => {
                self.store.update_one(collection, &query, Update::Set(remote.clone())).await?;
                tracing::info!(collection, document_id, "resolved conflict, remote wins");
            }
            crate::conflict::Resolution::LocalWins => {
                // If the local copy still carries string timestamps (never
                // round-tripped through a typed write), normalize them in
                // place so future comparisons are well-typed.
                let mut repair = serde_json::Map::new();
                if let Some(Value::String(_)) = local.get("timestamp") {
                    if let Some(ts) = extract_timestamp(&local, "timestamp") {
                        repair.insert("timestamp".to_string(), Value::String(ts.to_rfc3339()));
                    }
                }
                if let Some(Value::String(_)) = local.get("last_modified") {
                    if let Some(ts) = extract_timestamp(&local, "last_modified") {
                        repair.insert("last_modified".to_string(), Value::String(ts.to_rfc3339()));
                    }
                }
                if !repair.is_empty() {
                    self.store
                        .update_one(collection, &query, Update::Set(Value::Object(repair)))
                        .await?;
                    tracing::info!(collection, document_id, "fixed string timestamps, local wins");
                } else {
                    tracing::info!(collection, document_id, "resolved conflict, local wins");
                }
            }
            crate::conflict::Resolution::Unresolved => {
                tracing::warn!(collection, document_id, "could not resolve conflict, missing timestamps");
            }
        }
        Ok(())
    }

    async fn last_sync_time(&self, peer: &str) -> crate::error::Result<Option<DateTime<Utc>>> {
        let query = Query::eq("local_region", self.region.as_str()).and_eq("remote_region", peer.to_string());
        let metadata = self.store.find_one(Collection::SyncMetadata.as_str(), &query).await?;
        Ok(metadata.and_then(|m| extract_timestamp(&m, "last_sync_time")))
    }

    async fn set_last_sync_time(&self, peer: &str, at: DateTime<Utc>) -> crate::error::Result<()> {
        let query = Query::eq("local_region", self.region.as_str()).and_eq("remote_region", peer.to_string());
        let existing = self.store.find_one(Collection::SyncMetadata.as_str(), &query).await?;

        let fields = serde_json::json!({
            "local_region": self.region,
            "remote_region": peer,
            "last_sync_time": at.to_rfc3339(),
            "last_updated": Utc::now().to_rfc3339(),
        });

        if existing.is_some() {
            self.store
                .update_one(Collection::SyncMetadata.as_str(), &query, Update::Set(fields))
                .await?;
        } else {
            self.store.insert_one(Collection::SyncMetadata.as_str(), fields).await?;
        }
        Ok(())
    }
}
