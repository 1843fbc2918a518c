//! Shared HTTP-layer state: the handles every handler needs, built once at
//! startup and cloned cheaply (everything inside is an `Arc`).

use std::sync::Arc;

use crate::conflict::ConflictResolver;
use crate::config::Config;
use crate::liveness::LivenessTracker;
use crate::oplog::OperationLog;
use crate::partitioning::ConsistentHashRing;
use crate::replication::ReplicationDaemon;
use crate::router::QueryRouter;
use crate::store::StoreAdapter;

/// Default replica-set member names used for the partitioning advisory when
/// none are configured.
const DEFAULT_PARTITION_NODES: &[&str] = &["primary", "secondary1", "secondary2"];

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn StoreAdapter>,
    pub oplog: Arc<OperationLog>,
    pub resolver: Arc<ConflictResolver>,
    pub liveness: Arc<LivenessTracker>,
    pub router: Arc<QueryRouter>,
    pub daemon: Arc<ReplicationDaemon>,
    pub partition_ring: ConsistentHashRing,
    pub partition_nodes: Vec<String>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn StoreAdapter>,
        oplog: Arc<OperationLog>,
        resolver: Arc<ConflictResolver>,
        liveness: Arc<LivenessTracker>,
        router: Arc<QueryRouter>,
        daemon: Arc<ReplicationDaemon>,
    ) -> Self {
        let partition_nodes: Vec<String> = DEFAULT_PARTITION_NODES.iter().map(|s| s.to_string()).collect();
        let partition_ring = ConsistentHashRing::new(&partition_nodes);
        Self {
            config,
            store,
            oplog,
            resolver,
            liveness,
            router,
            daemon,
            partition_ring,
            partition_nodes,
        }
    }
}

pub type SharedState = Arc<AppState>;
