//! Per-peer liveness tracking and island-mode detection.
//!
//! Island mode is advisory only: it is surfaced on `/status` for operators
//! and never gates local reads or writes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

const DEFAULT_THRESHOLD_SECONDS: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IslandState {
    Connected,
    Suspect,
    Island,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeerLiveness {
    pub peer: String,
    pub connected: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

impl PeerLiveness {
    fn new(peer: String) -> Self {
        Self {
            peer,
            connected: true,
            last_success: None,
            last_attempt: None,
            consecutive_failures: 0,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IslandStatus {
    pub state: IslandState,
    pub connected_peers: usize,
    pub total_peers: usize,
    pub isolation_start: Option<DateTime<Utc>>,
    pub threshold_seconds: i64,
    pub peers: Vec<PeerLiveness>,
}

/// Tracks every configured peer's reachability and drives the 3-state
/// island FSM: `CONNECTED` while any peer is currently
/// reachable or no peers are configured, `SUSPECT` from the moment every
/// peer starts failing until `threshold_seconds` elapse, `ISLAND` past that
/// threshold. `isolation_start` is the timestamp of that first all-failing
/// cycle, set once and cleared the instant any peer succeeds again.
pub struct LivenessTracker {
    peers: RwLock<HashMap<String, PeerLiveness>>,
    isolation_start: Mutex<Option<DateTime<Utc>>>,
    threshold_seconds: i64,
}

impl LivenessTracker {
    pub fn new(peer_urls: &[String]) -> Self {
        Self::with_threshold(peer_urls, DEFAULT_THRESHOLD_SECONDS)
    }

    pub fn with_threshold(peer_urls: &[String], threshold_seconds: i64) -> Self {
        let peers = peer_urls
            .iter()
            .map(|p| (p.clone(), PeerLiveness::new(p.clone())))
            .collect();
        Self {
            peers: RwLock::new(peers),
            isolation_start: Mutex::new(None),
            threshold_seconds,
        }
    }

    pub fn record_success(&self, peer: &str) {
        let mut peers = self.peers.write();
        let entry = peers
            .entry(peer.to_string())
            .or_insert_with(|| PeerLiveness::new(peer.to_string()));
        let now = Utc::now();
        entry.connected = true;
        entry.last_success = Some(now);
        entry.last_attempt = Some(now);
        entry.consecutive_failures = 0;
        drop(peers);

        // Any successful peer contact demotes directly to CONNECTED.
        *self.isolation_start.lock() = None;
    }

    pub fn record_failure(&self, peer: &str) {
        let mut peers = self.peers.write();
        let entry = peers
            .entry(peer.to_string())
            .or_insert_with(|| PeerLiveness::new(peer.to_string()));
        entry.connected = false;
        entry.last_attempt = Some(Utc::now());
        entry.consecutive_failures += 1;
        let all_failing = !peers.is_empty() && peers.values().all(|p| !p.connected);
        drop(peers);

        if all_failing {
            let mut isolation_start = self.isolation_start.lock();
            if isolation_start.is_none() {
                *isolation_start = Some(Utc::now());
            }
        }
    }

    pub fn status(&self) -> IslandStatus {
        let peers = self.peers.read();
        let total_peers = peers.len();
        let connected_peers = peers.values().filter(|p| p.connected).count();
        let isolation_start = *self.isolation_start.lock();

        let state = if total_peers == 0 || connected_peers > 0 {
            IslandState::Connected
        } else {
            match isolation_start {
                Some(start) if (Utc::now() - start).num_seconds() >= self.threshold_seconds => {
                    IslandState::Island
                }
                _ => IslandState::Suspect,
            }
        };

        IslandStatus {
            state,
            connected_peers,
            total_peers,
            isolation_start,
            threshold_seconds: self.threshold_seconds,
            peers: peers.values().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peers() -> Vec<String> {
        vec!["http://eu".to_string(), "http://ap".to_string()]
    }

    #[test]
    fn starts_connected_with_no_attempts() {
        let tracker = LivenessTracker::new(&peers());
        assert_eq!(tracker.status().state, IslandState::Connected);
        assert!(tracker.status().isolation_start.is_none());
    }

    #[test]
    fn any_peer_success_keeps_connected() {
        let tracker = LivenessTracker::new(&peers());
        tracker.record_failure("http://eu");
        tracker.record_success("http://ap");
        assert_eq!(tracker.status().state, IslandState::Connected);
    }

    #[test]
    fn all_peers_failing_but_under_threshold_is_suspect() {
        let tracker = LivenessTracker::with_threshold(&peers(), 10_000);
        tracker.record_failure("http://eu");
        tracker.record_failure("http://ap");
        let status = tracker.status();
        assert_eq!(status.state, IslandState::Suspect);
        assert!(status.isolation_start.is_some());
    }

    #[test]
    fn all_peers_failing_past_threshold_is_island() {
        let tracker = LivenessTracker::with_threshold(&peers(), 0);
        tracker.record_failure("http://eu");
        tracker.record_failure("http://ap");
        assert_eq!(tracker.status().state, IslandState::Island);
    }

    #[test]
    fn single_success_demotes_island_back_to_connected_immediately() {
        let tracker = LivenessTracker::with_threshold(&peers(), 0);
        tracker.record_failure("http://eu");
        tracker.record_failure("http://ap");
        assert_eq!(tracker.status().state, IslandState::Island);

        tracker.record_success("http://eu");
        let status = tracker.status();
        assert_eq!(status.state, IslandState::Connected);
        assert!(status.isolation_start.is_none());
    }

    #[test]
    fn no_configured_peers_is_always_connected() {
        let tracker = LivenessTracker::new(&[]);
        assert_eq!(tracker.status().state, IslandState::Connected);
    }
}
