//! Process configuration, loaded once at startup from environment variables,
//! plus the `VALID_POST_TYPES`/`VALID_REGIONS` closed sets and the
//! `region_display_name`/`validate_region`/`validate_post_type` helpers the
//! HTTP handlers depend on.

use std::time::Duration;

pub const VALID_POST_TYPES: &[&str] =
    &["shelter", "food", "medical", "water", "safety", "help"];

pub const VALID_REGIONS: &[&str] = &["north_america", "europe", "asia_pacific"];

#[derive(Debug, Clone)]
pub struct Config {
    pub region: String,
    pub port: u16,
    pub mongodb_uri: String,
    pub mongodb_replica_set: String,
    pub remote_regions: Vec<String>,
    pub sync_interval: Duration,
    pub request_timeout: Duration,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: "north_america".to_string(),
            port: 5010,
            mongodb_uri: "mongodb://localhost:27017/meshnetwork".to_string(),
            mongodb_replica_set: "rs-na".to_string(),
            remote_regions: Vec::new(),
            sync_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(3),
            debug: false,
        }
    }
}

impl Config {
    /// Load configuration from the environment, falling back to defaults for
    /// anything unset or malformed (a malformed `REMOTE_REGIONS` JSON array
    /// degrades to `[]`).
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let region = std::env::var("REGION").unwrap_or(defaults.region);
        let port = std::env::var("FLASK_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);
        let mongodb_uri = std::env::var("MONGODB_URI").unwrap_or(defaults.mongodb_uri);
        let mongodb_replica_set =
            std::env::var("MONGODB_REPLICA_SET").unwrap_or(defaults.mongodb_replica_set);

        let remote_regions = std::env::var("REMOTE_REGIONS")
            .ok()
            .and_then(|raw| serde_json::from_str::<Vec<String>>(&raw).ok())
            .unwrap_or_default();

        let sync_interval = std::env::var("SYNC_INTERVAL")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.sync_interval);

        let request_timeout = std::env::var("REQUEST_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);

        let debug = std::env::var("DEBUG")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(defaults.debug);

        Self {
            region,
            port,
            mongodb_uri,
            mongodb_replica_set,
            remote_regions,
            sync_interval,
            request_timeout,
            debug,
        }
    }

    pub fn region_display_name(&self) -> &'static str {
        match self.region.as_str() {
            "north_america" => "North America",
            "europe" => "Europe",
            "asia_pacific" => "Asia-Pacific",
            _ => "Unknown",
        }
    }

    pub fn validate_region(region: &str) -> bool {
        VALID_REGIONS.contains(&region)
    }

    pub fn validate_post_type(post_type: &str) -> bool {
        VALID_POST_TYPES.contains(&post_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_north_america_on_port_5010() {
        let cfg = Config::default();
        assert_eq!(cfg.region, "north_america");
        assert_eq!(cfg.port, 5010);
        assert_eq!(cfg.sync_interval, Duration::from_secs(5));
        assert_eq!(cfg.request_timeout, Duration::from_secs(3));
    }

    #[test]
    fn rejects_unknown_post_type() {
        assert!(Config::validate_post_type("help"));
        assert!(!Config::validate_post_type("garbage"));
    }

    #[test]
    fn rejects_unknown_region() {
        assert!(Config::validate_region("europe"));
        assert!(!Config::validate_region("atlantis"));
    }
}
