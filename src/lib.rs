//! meshnet-region - regional node of a geo-distributed disaster-resilience
//! data service. Each process serves local CRUD over HTTP and asynchronously
//! replicates mutations to its configured peer regions.

pub mod api;
pub mod config;
pub mod conflict;
pub mod error;
pub mod liveness;
pub mod oplog;
pub mod partitioning;
pub mod replication;
pub mod router;
pub mod store;

pub use config::Config;
pub use error::{DbError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
