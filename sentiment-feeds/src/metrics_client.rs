//! Numeric metric sources for sub-score providers
//!
//! A metric source is any upstream that returns a flat map of numeric
//! readings (active addresses, DXY change, whale volume, ...) or fails.
//! Providers never see HTTP; they only see `RawMetrics`.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::FeedError;

/// Flat metric name -> value mapping
pub type RawMetrics = HashMap<String, f64>;

/// Upstream that returns a numeric payload or fails
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Fetch the latest readings
    async fn fetch(&self) -> Result<RawMetrics, FeedError>;
}

/// HTTP client for endpoints returning a JSON object of numeric fields.
///
/// Nested objects are flattened with `.` separators, so
/// `{"exchange": {"netflow": -120}}` becomes `exchange.netflow = -120`.
/// Numeric strings are accepted; everything else is ignored.
pub struct JsonMetricsClient {
    http: Client,
    name: String,
    url: Option<String>,
}

impl JsonMetricsClient {
    /// Create a client; `url = None` yields a source that always reports
    /// `NotConfigured` so the provider falls back instead of crashing.
    pub fn new(name: &str, url: Option<String>) -> Result<Self, FeedError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("SentimentIndex/1.0")
            .build()
            .map_err(|e| FeedError::RequestFailed(e.to_string()))?;

        match &url {
            Some(url) => info!("[{}] Metric source configured: {}", name, url_host(url)),
            None => info!("[{}] Metric source not configured", name),
        }

        Ok(Self {
            http,
            name: name.to_string(),
            url,
        })
    }
}

/// Host part of `url` for logging; the path and query may hold API keys
fn url_host(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "<invalid url>".to_string())
}

#[async_trait]
impl MetricSource for JsonMetricsClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<RawMetrics, FeedError> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| FeedError::NotConfigured(self.name.clone()))?;

        debug!("[{}] Fetching metrics from: {}", self.name, url_host(url));

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FeedError::from(e.without_url()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(FeedError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FeedError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| FeedError::ParseError(e.without_url().to_string()))?;

        if !body.is_object() {
            return Err(FeedError::ParseError(format!(
                "[{}] expected a JSON object",
                self.name
            )));
        }

        let metrics = flatten_numeric(&body);
        debug!("[{}] Fetched {} metrics", self.name, metrics.len());
        Ok(metrics)
    }
}

/// Flatten every numeric leaf of a JSON document into `RawMetrics`
pub fn flatten_numeric(value: &Value) -> RawMetrics {
    let mut out = RawMetrics::new();
    collect_numeric(value, String::new(), &mut out);
    out
}

fn collect_numeric(value: &Value, prefix: String, out: &mut RawMetrics) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                collect_numeric(child, path, out);
            }
        }
        Value::Number(n) => {
            if let Some(v) = n.as_f64().filter(|v| v.is_finite()) {
                out.insert(prefix, v);
            }
        }
        Value::String(s) => {
            if let Ok(v) = s.trim().parse::<f64>() {
                if v.is_finite() {
                    out.insert(prefix, v);
                }
            }
        }
        _ => {}
    }
}

/// Source returning fixed readings, or `NotConfigured` when built empty
pub struct StaticMetricSource {
    name: String,
    metrics: Option<RawMetrics>,
}

impl StaticMetricSource {
    pub fn new(name: &str, metrics: RawMetrics) -> Self {
        Self {
            name: name.to_string(),
            metrics: Some(metrics),
        }
    }

    pub fn from_pairs(name: &str, pairs: &[(&str, f64)]) -> Self {
        let metrics = pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        Self::new(name, metrics)
    }

    /// A source that always fails
    pub fn unavailable(name: &str) -> Self {
        Self {
            name: name.to_string(),
            metrics: None,
        }
    }
}

#[async_trait]
impl MetricSource for StaticMetricSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<RawMetrics, FeedError> {
        self.metrics
            .clone()
            .ok_or_else(|| FeedError::NotConfigured(self.name.clone()))
    }
}
