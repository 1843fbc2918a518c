//! Entry point: loads configuration, wires the replication plane together,
//! starts the background sync daemon, and serves the HTTP surface until
//! shutdown.

use std::sync::Arc;

use meshnet_region::api::server::ApiServer;
use meshnet_region::api::types::AppState;
use meshnet_region::conflict::ConflictResolver;
use meshnet_region::liveness::LivenessTracker;
use meshnet_region::oplog::OperationLog;
use meshnet_region::replication::ReplicationDaemon;
use meshnet_region::router::QueryRouter;
use meshnet_region::store::{InMemoryStore, StoreAdapter};
use meshnet_region::{Config, VERSION};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    print_banner();

    let config = Config::from_env();
    info!(version = VERSION, region = %config.region, "starting meshnet-region");
    info!(
        port = config.port,
        peers = ?config.remote_regions,
        sync_interval_s = config.sync_interval.as_secs(),
        request_timeout_s = config.request_timeout.as_secs(),
        "loaded configuration"
    );

    let store: Arc<dyn StoreAdapter> = InMemoryStore::shared();
    if let Err(err) = store.check_health().await {
        error!(%err, "store is unavailable at startup");
        std::process::exit(1);
    }

    let oplog = Arc::new(OperationLog::new(store.clone(), config.region.clone()));
    let resolver = Arc::new(ConflictResolver::new());
    let liveness = Arc::new(LivenessTracker::new(&config.remote_regions));
    let query_router = Arc::new(QueryRouter::new(
        config.remote_regions.clone(),
        config.request_timeout,
    ));

    let daemon = Arc::new(ReplicationDaemon::new(
        config.region.clone(),
        config.remote_regions.clone(),
        config.sync_interval,
        config.request_timeout,
        store.clone(),
        oplog.clone(),
        resolver.clone(),
        liveness.clone(),
    ));
    daemon.start().await;

    let addr = format!("0.0.0.0:{}", config.port);
    let state = Arc::new(AppState::new(
        config,
        store,
        oplog,
        resolver,
        liveness,
        query_router,
        daemon.clone(),
    ));
    let api = ApiServer::new(state);

    let result = tokio::select! {
        result = api.run(&addr) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
            Ok(())
        }
    };

    daemon.stop().await;

    match result {
        Ok(()) => {
            info!("shutdown complete");
        }
        Err(err) => {
            warn!(%err, "server stopped with error");
            std::process::exit(1);
        }
    }
}

fn print_banner() {
    println!("╔══════════════════════════════════════════════════╗");
    println!("║  meshnet-region — disaster-resilience data plane  ║");
    println!("╚══════════════════════════════════════════════════╝");
}
