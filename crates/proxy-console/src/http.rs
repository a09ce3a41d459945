use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::ConsoleConfig;
use crate::error::{ConsoleError, Result};
use crate::metrics::{samples_from_json, LookBack, MetricSample, MetricSeries};
use crate::WireRecord;

/// Body of `GET /api/logs/tail`.
#[derive(Debug, Deserialize)]
struct TailResponse {
    #[serde(default)]
    logs: Vec<WireRecord>,
}

/// Blocking client for the backend's REST endpoints.
#[derive(Clone)]
pub struct RestClient {
    agent: ureq::Agent,
    config: ConsoleConfig,
}

impl RestClient {
    pub fn new(config: &ConsoleConfig) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.request_timeout))
            .build()
            .into();
        Self {
            agent,
            config: config.clone(),
        }
    }

    /// Fetches the last `lines` log records
    pub fn fetch_log_tail(&self, lines: usize) -> Result<Vec<WireRecord>> {
        let mut url = self.config.rest_url("/api/logs/tail")?;
        url.query_pairs_mut()
            .append_pair("lines", &lines.clamp(1, 1000).to_string());
        let body: TailResponse = self.get_json(url)?;
        Ok(body.logs)
    }

    /// Fetches the raw sample history of one series
    pub fn fetch_metrics_history(
        &self,
        series: MetricSeries,
        seconds: u32,
    ) -> Result<Vec<MetricSample>> {
        let mut url = self
            .config
            .rest_url(&format!("/api/{}/metrics/history", series.as_str()))?;
        url.query_pairs_mut()
            .append_pair("seconds", &seconds.to_string());
        let body: Value = self.get_json(url)?;
        Ok(samples_from_json(&body))
    }

    /// Fetches server-side roll-ups for a look-back window
    pub fn fetch_aggregated(&self, lookback: LookBack) -> Result<Vec<MetricSample>> {
        let mut url = self
            .config
            .rest_url("/api/performance/metrics/aggregated")?;
        url.query_pairs_mut()
            .append_pair("hours", &lookback.hours().to_string())
            .append_pair("interval_minutes", &lookback.interval_minutes().to_string());
        let body: Value = self.get_json(url)?;

        // Either a bare array of buckets or an object wrapping one.
        let buckets = match &body {
            Value::Object(map) => map
                .get("buckets")
                .or_else(|| map.get("data"))
                .cloned()
                .unwrap_or(Value::Null),
            _ => body,
        };
        Ok(samples_from_json(&buckets))
    }

    fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!(%url, "GET");
        let mut request = self.agent.get(url.as_str());
        if let Some(bearer) = self.config.bearer() {
            request = request.header("Authorization", bearer);
        }
        let mut response = request
            .call()
            .map_err(|e| ConsoleError::http(url.as_str(), e))?;
        response
            .body_mut()
            .read_json::<T>()
            .map_err(|e| ConsoleError::http(url.as_str(), e))
    }
}
