//! Leadership oracle: is this process currently the cluster's leader?

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

/// Answers whether the local process is the elected leader.
///
/// Implementations must never report two leaders at the same time; the
/// control loops rely on that for cross-process mutual exclusion.
#[async_trait]
pub trait LeadershipOracle: Send + Sync {
    async fn is_leader(&self) -> anyhow::Result<bool>;
}

/// Asks the local OpenSearch node whether it is the elected cluster manager.
pub struct OpenSearchLeadership {
    http: Client,
    base_url: String,
    username: String,
    password: String,
}

impl OpenSearchLeadership {
    pub fn new(
        base_url: &str,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("building leadership http client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    async fn get_json(&self, path: &str) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("GET {url} returned {status}"));
        }
        response
            .json()
            .await
            .with_context(|| format!("decoding response from {url}"))
    }
}

#[async_trait]
impl LeadershipOracle for OpenSearchLeadership {
    async fn is_leader(&self) -> anyhow::Result<bool> {
        let local = self.get_json("/_nodes/_local").await?;
        let local_id = local_node_id(&local)
            .ok_or_else(|| anyhow!("no local node in /_nodes/_local response"))?;

        let state = self.get_json("/_cluster/state/master_node").await?;
        let elected = elected_node_id(&state);

        debug!(local = %local_id, elected = ?elected, "leadership checked");
        Ok(elected == Some(local_id))
    }
}

/// The single node id in a `/_nodes/_local` response.
fn local_node_id(body: &Value) -> Option<&str> {
    body.get("nodes")?.as_object()?.keys().next().map(String::as_str)
}

/// The elected manager from a cluster state response. Newer clusters
/// report `cluster_manager_node`, older ones only `master_node`.
fn elected_node_id(body: &Value) -> Option<&str> {
    body.get("cluster_manager_node")
        .or_else(|| body.get("master_node"))
        .and_then(Value::as_str)
}

/// Fixed leadership answer, flipped by hand.
///
/// Used for single-process deployments and in tests.
#[derive(Debug, Default)]
pub struct StaticLeadership(AtomicBool);

impl StaticLeadership {
    pub fn new(leader: bool) -> Self {
        Self(AtomicBool::new(leader))
    }

    pub fn set(&self, leader: bool) {
        self.0.store(leader, Ordering::SeqCst);
    }
}

#[async_trait]
impl LeadershipOracle for StaticLeadership {
    async fn is_leader(&self) -> anyhow::Result<bool> {
        Ok(self.0.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_local_node() {
        let body = json!({ "nodes": { "aBc123": { "name": "os-node-1" } } });
        assert_eq!(local_node_id(&body), Some("aBc123"));
        assert_eq!(local_node_id(&json!({ "nodes": {} })), None);
    }

    #[test]
    fn parses_elected_manager() {
        assert_eq!(
            elected_node_id(&json!({ "cluster_manager_node": "n1" })),
            Some("n1")
        );
        assert_eq!(elected_node_id(&json!({ "master_node": "n2" })), Some("n2"));
        assert_eq!(elected_node_id(&json!({ "cluster_name": "c" })), None);
    }

    #[tokio::test]
    async fn static_leadership_flips() {
        let oracle = StaticLeadership::new(false);
        assert!(!oracle.is_leader().await.unwrap());
        oracle.set(true);
        assert!(oracle.is_leader().await.unwrap());
    }
}
