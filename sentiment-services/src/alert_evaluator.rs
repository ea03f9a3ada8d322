//! Alert Evaluator
//!
//! Checks every pending alert against the current metric values and fires
//! the ones whose condition holds.
//!
//! An alert is marked triggered *before* its notification is sent, and the
//! mark is a conditional update. Whoever wins that update is the only one
//! that notifies, so overlapping passes (or processes sharing the
//! database) can never deliver the same alert twice. A failed delivery is
//! logged and the alert stays triggered.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use sentiment_core::AlertDefinition;
use sentiment_feeds::{Notification, NotificationSink};

use crate::alert_storage::AlertStorage;
use crate::snapshot_storage::StorageError;

/// Result of one evaluation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationSummary {
    /// Pending alerts loaded for this pass
    pub checked: usize,
    /// Alerts that moved to triggered during this pass
    pub triggered: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("Alert storage error: {0}")]
    Storage(#[from] StorageError),
}

pub struct AlertEvaluator {
    storage: Arc<AlertStorage>,
    sink: Arc<dyn NotificationSink>,
    /// Held for a whole pass so passes never interleave
    pass_lock: Mutex<()>,
}

impl AlertEvaluator {
    pub fn new(storage: Arc<AlertStorage>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            storage,
            sink,
            pass_lock: Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &Arc<AlertStorage> {
        &self.storage
    }

    pub fn sink(&self) -> &Arc<dyn NotificationSink> {
        &self.sink
    }

    /// Evaluate all pending alerts against `metrics` (upper-case keys).
    ///
    /// Alerts whose metric is absent are skipped without error.
    pub async fn evaluate_all(
        &self,
        metrics: &HashMap<String, f64>,
    ) -> Result<EvaluationSummary, AlertError> {
        let _pass = self.pass_lock.lock().await;

        let pending = self.storage.pending_alerts()?;
        let mut summary = EvaluationSummary {
            checked: pending.len(),
            triggered: 0,
        };

        for alert in &pending {
            let Some(current) = metrics.get(&alert.symbol_or_metric).copied() else {
                debug!(
                    "[Alerts] No value for {}, skipping alert {}",
                    alert.symbol_or_metric, alert.id
                );
                continue;
            };

            if !current.is_finite() || !alert.is_satisfied_by(current) {
                continue;
            }

            if !self.storage.mark_triggered(alert.id, Utc::now())? {
                debug!("[Alerts] Alert {} already triggered elsewhere", alert.id);
                continue;
            }

            summary.triggered += 1;
            info!(
                "[Alerts] Alert {} triggered: {} {} {} (current: {})",
                alert.id, alert.symbol_or_metric, alert.condition, alert.target_value, current
            );
            self.notify(alert, current).await;
        }

        if summary.triggered > 0 {
            info!(
                "[Alerts] Pass complete: {} checked, {} triggered",
                summary.checked, summary.triggered
            );
        }
        Ok(summary)
    }

    async fn notify(&self, alert: &AlertDefinition, current: f64) {
        let notification = Notification::new(
            format!("{} alert", alert.symbol_or_metric),
            alert.format_message(current),
        );

        if let Err(e) = self.sink.send(&notification).await {
            warn!(
                "[Alerts] Notification for alert {} via {} failed: {}",
                alert.id,
                self.sink.name(),
                e
            );
        }
    }
}
