//! Alert Monitor
//!
//! Periodically gathers current metric values (spot prices plus the
//! composite index under [`FEAR_GREED_METRIC`]) and runs an alert pass.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use sentiment_feeds::{PriceSource, SinkStatus};

use crate::alert_evaluator::{AlertError, AlertEvaluator, EvaluationSummary};
use crate::composite_scorer::CompositeScorer;

/// Metric name alerts use to watch the composite index
pub const FEAR_GREED_METRIC: &str = "FEAR_GREED";

/// Default cadence of scheduled alert passes (5 minutes)
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub struct AlertMonitor {
    evaluator: Arc<AlertEvaluator>,
    scorer: Arc<CompositeScorer>,
    prices: Arc<dyn PriceSource>,
    symbols: Vec<String>,
}

impl AlertMonitor {
    pub fn new(
        evaluator: Arc<AlertEvaluator>,
        scorer: Arc<CompositeScorer>,
        prices: Arc<dyn PriceSource>,
        symbols: Vec<String>,
    ) -> Self {
        let symbols = symbols.into_iter().map(|s| s.trim().to_uppercase()).collect();
        Self {
            evaluator,
            scorer,
            prices,
            symbols,
        }
    }

    /// Whether triggered alerts can actually be delivered anywhere
    pub fn notifier_status(&self) -> SinkStatus {
        self.evaluator.sink().status()
    }

    /// Current value of every metric alerts can watch.
    ///
    /// A failing price source only drops the prices. The composite index is
    /// left out when it carries no real data (degraded, or every provider
    /// fell back), so alerts on it wait for the next pass.
    pub async fn current_metrics(&self) -> HashMap<String, f64> {
        let mut metrics = if self.symbols.is_empty() {
            HashMap::new()
        } else {
            match self.prices.prices(&self.symbols).await {
                Ok(prices) => prices,
                Err(e) => {
                    warn!("[AlertMonitor] Price fetch failed, evaluating without prices: {}", e);
                    HashMap::new()
                }
            }
        };

        let index = self.scorer.current().await;
        if index.degraded || index.fallback_count() == index.breakdown.len() {
            warn!(
                "[AlertMonitor] Composite index has no live inputs, skipping {} alerts",
                FEAR_GREED_METRIC
            );
        } else {
            metrics.insert(FEAR_GREED_METRIC.to_string(), index.value);
        }
        metrics
    }

    /// Gather metrics and run one alert pass
    pub async fn run_once(&self) -> Result<EvaluationSummary, AlertError> {
        let metrics = self.current_metrics().await;
        self.evaluator.evaluate_all(&metrics).await
    }

    /// Run a pass every `every`, starting one interval from now
    pub fn spawn(self: &Arc<Self>, every: Duration) -> MonitorHandle {
        let monitor = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval.tick().await;

            info!("[AlertMonitor] Scheduled alert checks every {:?}", every);

            loop {
                interval.tick().await;

                match monitor.run_once().await {
                    Ok(summary) => info!(
                        "[AlertMonitor] Checked {} alerts, {} triggered",
                        summary.checked, summary.triggered
                    ),
                    Err(e) => error!("[AlertMonitor] Alert pass failed: {}", e),
                }
            }
        });

        MonitorHandle { handle }
    }
}

/// Owner handle for the scheduled alert task; aborts it when dropped
#[derive(Debug)]
pub struct MonitorHandle {
    handle: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
