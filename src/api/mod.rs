//! HTTP surface: public CRUD, `/internal/sync` + `/internal/changes` for
//! peer traffic, and `/status`/`/health` telemetry.

pub mod handlers;
pub mod server;
pub mod types;
