use std::sync::Arc;
use std::time::Duration;

use sentiment_core::HistorySeries;
use sentiment_feeds::{NotificationSink, PriceSource};
use sentiment_services::{
    AlertEvaluator, AlertMonitor, AlertStorage, CompositeScorer, RateLimiter, SnapshotStorage,
    TtlCache,
};

use crate::config::ApiConfig;

/// How long a computed history response is reused
pub const HISTORY_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub scorer: Arc<CompositeScorer>,
    pub snapshots: Arc<SnapshotStorage>,
    pub alerts: Arc<AlertStorage>,
    pub monitor: Arc<AlertMonitor>,
    pub limiter: Arc<RateLimiter>,
    /// `history:{days}` -> downsampled response
    pub history_cache: Arc<TtlCache<String, HistorySeries>>,
}

impl AppState {
    /// Wire the alert pipeline around already-built storage and scorer
    pub fn new(
        config: ApiConfig,
        scorer: Arc<CompositeScorer>,
        snapshots: Arc<SnapshotStorage>,
        alerts: Arc<AlertStorage>,
        sink: Arc<dyn NotificationSink>,
        prices: Arc<dyn PriceSource>,
    ) -> Self {
        let evaluator = Arc::new(AlertEvaluator::new(Arc::clone(&alerts), sink));
        let monitor = Arc::new(AlertMonitor::new(
            evaluator,
            Arc::clone(&scorer),
            prices,
            config.price_symbols.clone(),
        ));

        Self {
            config: Arc::new(config),
            scorer,
            snapshots,
            alerts,
            monitor,
            limiter: Arc::new(RateLimiter::new("api")),
            history_cache: Arc::new(TtlCache::new("history")),
        }
    }
}
