//! Metric sources consulted by the rule evaluator.

use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use searchscale_core::Stat;

/// Index the external collector writes node statistics into.
pub const STATS_INDEX: &str = "monitor-stats-1";

/// Timestamp field on collected statistics documents.
const TIMESTAMP_FIELD: &str = "Timestamp";

/// A source of aggregated cluster metrics.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Aggregate `metric` with `stat` over the last `period_minutes`.
    async fn stat(&self, metric: &str, stat: Stat, period_minutes: u32) -> anyhow::Result<f64>;
}

fn http_client(timeout: Duration) -> anyhow::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("building metrics http client")
}

/// Reads metrics from the load simulator's stats endpoints.
pub struct SimulatorMetrics {
    http: Client,
    base_url: String,
}

impl SimulatorMetrics {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn stat_url(&self, metric: &str, stat: Stat, period_minutes: u32) -> String {
        let path = match stat {
            Stat::Avg => "avg",
            Stat::Count => "count",
        };
        format!("{}/stats/{path}/{metric}/{period_minutes}", self.base_url)
    }
}

#[async_trait]
impl MetricSource for SimulatorMetrics {
    async fn stat(&self, metric: &str, stat: Stat, period_minutes: u32) -> anyhow::Result<f64> {
        let url = self.stat_url(metric, stat, period_minutes);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("GET {url} returned {status}"));
        }
        let body: Value = response.json().await.context("decoding simulator stat")?;
        body.get("value")
            .and_then(Value::as_f64)
            .ok_or_else(|| anyhow!("simulator response for {metric} has no numeric value"))
    }
}

/// Aggregates collected statistics stored in OpenSearch.
pub struct OpenSearchMetrics {
    http: Client,
    base_url: String,
    index: String,
    username: String,
    password: String,
}

impl OpenSearchMetrics {
    pub fn new(
        base_url: &str,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            index: STATS_INDEX.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    pub fn with_index(mut self, index: &str) -> Self {
        self.index = index.to_string();
        self
    }
}

fn aggregation_query(metric: &str, stat: Stat, period_minutes: u32) -> Value {
    let agg = match stat {
        Stat::Avg => json!({ "avg": { "field": metric } }),
        Stat::Count => json!({ "value_count": { "field": metric } }),
    };
    json!({
        "size": 0,
        "query": {
            "range": {
                TIMESTAMP_FIELD: { "gte": format!("now-{period_minutes}m") }
            }
        },
        "aggs": { "stat": agg }
    })
}

/// Extract `aggregations.stat.value`. An average over no documents comes
/// back as `null`, which is reported as an error rather than zero.
fn aggregation_value(body: &Value) -> Option<f64> {
    body.pointer("/aggregations/stat/value").and_then(Value::as_f64)
}

#[async_trait]
impl MetricSource for OpenSearchMetrics {
    async fn stat(&self, metric: &str, stat: Stat, period_minutes: u32) -> anyhow::Result<f64> {
        let url = format!("{}/{}/_search", self.base_url, self.index);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&aggregation_query(metric, stat, period_minutes))
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("POST {url} returned {status}"));
        }
        let body: Value = response.json().await.context("decoding aggregation")?;
        aggregation_value(&body)
            .ok_or_else(|| anyhow!("no {metric} samples in the last {period_minutes}m"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulator_urls() {
        let sim = SimulatorMetrics::new("http://localhost:5000/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            sim.stat_url("cpu", Stat::Avg, 5),
            "http://localhost:5000/stats/avg/cpu/5"
        );
        assert_eq!(
            sim.stat_url("shardsbusy", Stat::Count, 10),
            "http://localhost:5000/stats/count/shardsbusy/10"
        );
    }

    #[test]
    fn query_uses_window_and_stat() {
        let q = aggregation_query("cpu", Stat::Avg, 15);
        assert_eq!(q["query"]["range"]["Timestamp"]["gte"], "now-15m");
        assert_eq!(q["aggs"]["stat"]["avg"]["field"], "cpu");

        let q = aggregation_query("mem", Stat::Count, 1);
        assert_eq!(q["aggs"]["stat"]["value_count"]["field"], "mem");
    }

    #[test]
    fn reads_aggregation_value() {
        let body = json!({ "aggregations": { "stat": { "value": 81.5 } } });
        assert_eq!(aggregation_value(&body), Some(81.5));
        let empty = json!({ "aggregations": { "stat": { "value": null } } });
        assert_eq!(aggregation_value(&empty), None);
    }
}
