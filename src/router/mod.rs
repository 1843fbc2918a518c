//! Scatter-gather query router: fans a read out to every configured peer in
//! parallel, merges the responses with local results, and reports which
//! regions answered.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;

use crate::store::{Sort, SortOrder};

#[derive(Debug, Serialize)]
pub struct ScatterGatherMetadata {
    pub total_regions_queried: usize,
    pub successful_regions: Vec<String>,
    pub failed_regions: Vec<String>,
    pub success_rate: f64,
    pub query_time_seconds: f64,
    #[serde(rename = "timeout_per_region")]
    pub timeout_per_region_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct ScatterGatherResult {
    pub results: Vec<Value>,
    pub metadata: ScatterGatherMetadata,
}

pub struct QueryRouter {
    remote_regions: Vec<String>,
    default_timeout: Duration,
    http: reqwest::Client,
}

impl QueryRouter {
    pub fn new(remote_regions: Vec<String>, default_timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(default_timeout)
            .build()
            .expect("reqwest client configuration is valid");
        Self {
            remote_regions,
            default_timeout,
            http,
        }
    }

    /// `GET {peer}/health` against every peer, used by `/status`'s network
    /// health summary.
    pub async fn check_network_health(&self) -> HashMap<String, bool> {
        let checks = self.remote_regions.iter().map(|peer| async move {
            let url = format!("{peer}/health");
            let reachable = self
                .http
                .get(&url)
                .send()
                .await
                .map(|r| r.status().is_success())
                .unwrap_or(false);
            (peer.clone(), reachable)
        });
        join_all(checks).await.into_iter().collect()
    }

    /// Queries every peer's `endpoint` concurrently, bounded per-peer by
    /// `timeout_per_region` (defaulting to the router's request timeout) and
    /// in aggregate by twice that.
    pub async fn scatter_gather(
        &self,
        endpoint: &str,
        params: &[(String, String)],
        timeout_per_region: Option<Duration>,
        local_results: Vec<Value>,
        sort_field: &str,
        limit: usize,
    ) -> ScatterGatherResult {
        let started = Instant::now();
        let timeout = timeout_per_region.unwrap_or(self.default_timeout);
        let aggregate_ceiling = timeout * 2;

        let queries = self
            .remote_regions
            .iter()
            .map(|peer| self.query_region(peer, endpoint, params, timeout));

        let fan_out = tokio::time::timeout(aggregate_ceiling, join_all(queries));
        let per_peer_results = fan_out.await.unwrap_or_default();

        let mut results = local_results;
        let mut successful_regions = Vec::new();
        let mut failed_regions = Vec::new();

        for (peer, outcome) in self.remote_regions.iter().zip(per_peer_results) {
            match outcome {
                Some(mut peer_results) => {
                    successful_regions.push(peer.clone());
                    results.append(&mut peer_results);
                }
                None => failed_regions.push(peer.clone()),
            }
        }

        Sort::by(sort_field, SortOrder::Descending).apply(&mut results);
        results.truncate(limit.max(1));

        let total = self.remote_regions.len();
        let metadata = ScatterGatherMetadata {
            total_regions_queried: total,
            successful_regions: successful_regions.clone(),
            failed_regions,
            success_rate: if total == 0 {
                0.0
            } else {
                successful_regions.len() as f64 / total as f64
            },
            query_time_seconds: started.elapsed().as_secs_f64(),
            timeout_per_region_seconds: timeout.as_secs(),
        };

        ScatterGatherResult { results, metadata }
    }

    async fn query_region(
        &self,
        peer: &str,
        endpoint: &str,
        params: &[(String, String)],
        timeout: Duration,
    ) -> Option<Vec<Value>> {
        let url = format!("{peer}{endpoint}");
        let request = self.http.get(&url).query(params).timeout(timeout);
        let response = request.send().await.ok()?;
        if !response.status().is_success() {
            tracing::warn!(peer, status = %response.status(), "peer returned non-success status");
            return None;
        }
        let body: Value = response.json().await.ok()?;
        Some(flatten_response(body))
    }
}

/// Peer endpoints answer either a bare JSON array or an object with a named
/// array field (e.g. `{"posts": [...]}`); this normalizes both shapes to a
/// flat `Vec<Value>`.
fn flatten_response(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(map) => map
            .into_values()
            .find_map(|v| match v {
                Value::Array(items) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_bare_array_and_wrapped_object() {
        assert_eq!(flatten_response(json!([{"a": 1}])), vec![json!({"a": 1})]);
        assert_eq!(
            flatten_response(json!({"posts": [{"a": 1}, {"a": 2}]})),
            vec![json!({"a": 1}), json!({"a": 2})]
        );
        assert!(flatten_response(json!({"count": 3})).is_empty());
    }

    #[tokio::test]
    async fn scatter_gather_with_no_peers_returns_only_local_results() {
        let router = QueryRouter::new(vec![], Duration::from_secs(1));
        let local = vec![json!({"post_id": "p1", "timestamp": "2026-01-01T00:00:00Z"})];
        let result = router
            .scatter_gather("/api/posts", &[], None, local, "timestamp", 50)
            .await;
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.metadata.total_regions_queried, 0);
        assert_eq!(result.metadata.success_rate, 0.0);
    }
}
