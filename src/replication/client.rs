//! HTTP transport for the replication daemon: `POST /internal/sync` to push,
//! `GET /internal/changes?since=` to pull.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::oplog::OplogEntry;

#[derive(Serialize)]
struct SyncRequest<'a> {
    operations: &'a [OplogEntry],
}

#[derive(Deserialize)]
struct ChangesResponse {
    operations: Vec<OplogEntry>,
}

pub struct PeerClient {
    http: reqwest::Client,
}

impl PeerClient {
    pub fn new(request_timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("reqwest client configuration is valid");
        Self { http }
    }

    /// Pushes a batch of operations to `peer`. Returns `Ok(true)` on a 200,
    /// `Ok(false)` on any other status.
    pub async fn push(&self, peer: &str, operations: &[OplogEntry]) -> Result<bool> {
        let url = format!("{peer}/internal/sync");
        let response = self
            .http
            .post(&url)
            .json(&SyncRequest { operations })
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    /// Fetches operations newer than `since` (or everything, if `None`).
    pub async fn pull(&self, peer: &str, since: Option<DateTime<Utc>>) -> Result<Vec<OplogEntry>> {
        let url = format!("{peer}/internal/changes");
        let mut request = self.http.get(&url);
        if let Some(since) = since {
            request = request.query(&[("since", since.to_rfc3339())]);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Ok(Vec::new());
        }
        let body: ChangesResponse = response.json().await?;
        Ok(body.operations)
    }
}
