//! Composite Scorer
//!
//! Fans out to every registered [`SubScoreProvider`], substitutes the
//! neutral fallback for any provider that errors, panics or misses its
//! deadline, and folds the results into one weighted index.
//!
//! ## Side Effects of a Computation
//!
//! 1. The snapshot is appended to the in-memory [`HistoryStore`]
//! 2. The index is cached under [`INDEX_CACHE_KEY`] for `cache_ttl`
//! 3. At most once per `persist_interval` the snapshot is written to
//!    [`SnapshotStorage`]; a failed write is logged and otherwise ignored

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use sentiment_core::index::clamp_score;
use sentiment_core::{CompositeIndex, HistorySnapshot, SubScoreResult, Trend};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{validate_weights, CompositeConfig, ConfigError};
use crate::history_store::HistoryStore;
use crate::providers::SubScoreProvider;
use crate::snapshot_storage::SnapshotStorage;
use crate::ttl_cache::TtlCache;

/// Cache key of the latest computed index
pub const INDEX_CACHE_KEY: &str = "composite_index";

/// Builder for [`CompositeScorer`]
pub struct CompositeScorerBuilder {
    config: CompositeConfig,
    providers: Vec<Arc<dyn SubScoreProvider>>,
    history: Option<Arc<HistoryStore>>,
    cache: Option<Arc<TtlCache<String, CompositeIndex>>>,
    snapshots: Option<Arc<SnapshotStorage>>,
}

impl CompositeScorerBuilder {
    pub fn provider(mut self, provider: Arc<dyn SubScoreProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn history(mut self, history: Arc<HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn cache(mut self, cache: Arc<TtlCache<String, CompositeIndex>>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn snapshot_storage(mut self, storage: Arc<SnapshotStorage>) -> Self {
        self.snapshots = Some(storage);
        self
    }

    /// Validate the weight table against the registered providers.
    ///
    /// Every provider needs a weight, every weight needs a provider, and
    /// the weights must be non-negative and sum to one.
    pub fn build(self) -> Result<CompositeScorer, ConfigError> {
        let mut names = HashSet::new();
        for provider in &self.providers {
            if !names.insert(provider.name().to_string()) {
                return Err(ConfigError::DuplicateProvider(provider.name().to_string()));
            }
            if !self.config.weights.contains_key(provider.name()) {
                return Err(ConfigError::MissingWeight(provider.name().to_string()));
            }
        }

        if let Some(unknown) = self.config.weights.keys().find(|k| !names.contains(k.as_str())) {
            return Err(ConfigError::UnknownProvider(unknown.clone()));
        }

        validate_weights(&self.config.weights)?;
        self.config
            .thresholds
            .validate()
            .map_err(|e| ConfigError::Thresholds(e.to_string()))?;

        let history = self
            .history
            .unwrap_or_else(|| Arc::new(HistoryStore::new(self.config.history_capacity)));
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(TtlCache::new("composite")));

        Ok(CompositeScorer {
            config: self.config,
            providers: self.providers,
            history,
            cache,
            snapshots: self.snapshots,
            last_persisted: Mutex::new(None),
        })
    }
}

/// Weighted composite of all sub-score providers
pub struct CompositeScorer {
    config: CompositeConfig,
    providers: Vec<Arc<dyn SubScoreProvider>>,
    history: Arc<HistoryStore>,
    cache: Arc<TtlCache<String, CompositeIndex>>,
    snapshots: Option<Arc<SnapshotStorage>>,
    /// Recording time of the last durable snapshot
    last_persisted: Mutex<Option<DateTime<Utc>>>,
}

impl CompositeScorer {
    pub fn builder(config: CompositeConfig) -> CompositeScorerBuilder {
        CompositeScorerBuilder {
            config,
            providers: Vec::new(),
            history: None,
            cache: None,
            snapshots: None,
        }
    }

    pub fn config(&self) -> &CompositeConfig {
        &self.config
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    pub fn cache(&self) -> &Arc<TtlCache<String, CompositeIndex>> {
        &self.cache
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Seed the in-memory history from durable storage after a restart.
    ///
    /// Also primes the persistence throttle so a restart does not write a
    /// snapshot sooner than `persist_interval` after the last stored one.
    pub fn warm_start(&self) -> usize {
        let Some(storage) = &self.snapshots else {
            return 0;
        };

        match storage.latest_snapshots(self.history.capacity()) {
            Ok(rows) => {
                *self.last_persisted.lock() = rows.last().map(|s| s.recorded_at);
                let loaded = self.history.load(rows);
                info!("[Scorer] Warm start loaded {} snapshots from storage", loaded);
                loaded
            }
            Err(e) => {
                error!("[Scorer] Failed to load stored snapshots: {}", e);
                0
            }
        }
    }

    /// Latest index, served from cache while fresh.
    ///
    /// If the computation itself faults, a degraded neutral index is
    /// returned instead of an error.
    pub async fn current(self: &Arc<Self>) -> CompositeIndex {
        if let Some(cached) = self.cache.get(INDEX_CACHE_KEY) {
            debug!("[Scorer] Cache hit for {}", INDEX_CACHE_KEY);
            return cached;
        }
        debug!("[Scorer] Cache miss for {}, recomputing", INDEX_CACHE_KEY);

        let scorer = Arc::clone(self);
        match tokio::spawn(async move { scorer.compute_index().await }).await {
            Ok(index) => index,
            Err(e) => {
                error!("[Scorer] Index computation failed, serving neutral default: {}", e);
                CompositeIndex::neutral_default(Utc::now())
            }
        }
    }

    /// Compute a fresh index. Never fails: unavailable providers count as
    /// neutral fallbacks.
    #[instrument(skip(self), fields(providers = self.providers.len()))]
    pub async fn compute_index(&self) -> CompositeIndex {
        let results = self.collect_sub_scores().await;

        let weighted: f64 = results
            .iter()
            .map(|r| self.config.weights.get(&r.provider_name).copied().unwrap_or(0.0) * r.score)
            .sum();
        let value = clamp_score(round_to(weighted, self.config.precision));
        let level = self.config.thresholds.classify(value);

        let breakdown: BTreeMap<String, SubScoreResult> = results
            .into_iter()
            .map(|r| (r.provider_name.clone(), r))
            .collect();

        let mut index = CompositeIndex {
            value,
            level,
            breakdown,
            computed_at: Utc::now(),
            trend: None,
            degraded: false,
        };

        let snapshot = HistorySnapshot::from_index(&index);
        // Trend against the tail this snapshot landed on, not whatever a
        // concurrent computation appended since
        let trend = match self.history.append(snapshot.clone()) {
            Ok(Some(prior)) => Trend::between(prior.index_value, value),
            Ok(None) => Trend::flat(),
            Err(e) => {
                warn!("[Scorer] Snapshot not added to history: {}", e);
                self.history
                    .latest()
                    .map(|latest| Trend::between(latest.index_value, value))
                    .unwrap_or_else(Trend::flat)
            }
        };
        index.trend = Some(trend);

        self.cache
            .set(INDEX_CACHE_KEY.to_string(), index.clone(), self.config.cache_ttl);
        self.maybe_persist(&snapshot);

        info!(
            "[Scorer] Composite index {} ({}), {} fallback(s)",
            index.value,
            index.level,
            index.fallback_count()
        );
        index
    }

    /// Run every provider concurrently under its own deadline
    async fn collect_sub_scores(&self) -> Vec<SubScoreResult> {
        let timeout = self.config.provider_timeout;

        let tasks = self.providers.iter().map(|provider| {
            let provider = Arc::clone(provider);
            let name = provider.name().to_string();

            async move {
                let mut task = tokio::spawn(async move { provider.score().await });

                match tokio::time::timeout(timeout, &mut task).await {
                    Ok(Ok(Ok(sub))) => {
                        debug!("[Scorer] {} scored {:.2} ({:?})", name, sub.score, sub.signal);
                        SubScoreResult::new(name, sub.score, sub.signal)
                    }
                    Ok(Ok(Err(e))) => {
                        warn!("[Scorer] {} failed, using fallback: {}", name, e);
                        SubScoreResult::fallback(name)
                    }
                    Ok(Err(e)) => {
                        warn!("[Scorer] {} task aborted or panicked, using fallback: {}", name, e);
                        SubScoreResult::fallback(name)
                    }
                    Err(_) => {
                        task.abort();
                        warn!("[Scorer] {} timed out after {:?}, using fallback", name, timeout);
                        SubScoreResult::fallback(name)
                    }
                }
            }
        });

        join_all(tasks).await
    }

    fn maybe_persist(&self, snapshot: &HistorySnapshot) {
        let Some(storage) = &self.snapshots else {
            return;
        };

        let mut last = self.last_persisted.lock();
        if let Some(previous) = *last {
            let elapsed = snapshot.recorded_at.signed_duration_since(previous);
            let interval = chrono::Duration::from_std(self.config.persist_interval)
                .unwrap_or_else(|_| chrono::Duration::MAX);
            if elapsed < interval {
                return;
            }
        }

        match storage.store_snapshot(snapshot) {
            Ok(()) => {
                *last = Some(snapshot.recorded_at);
                debug!("[Scorer] Persisted snapshot at {}", snapshot.recorded_at);
            }
            Err(e) => error!("[Scorer] Failed to persist snapshot: {}", e),
        }
    }
}

/// Round half away from zero to `precision` decimal places
fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ProviderError, SubScore};
    use async_trait::async_trait;
    use sentiment_core::{SentimentLevel, Signal, TrendDirection};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct FixedProvider {
        name: &'static str,
        score: f64,
        calls: AtomicUsize,
    }

    impl FixedProvider {
        fn new(name: &'static str, score: f64) -> Arc<Self> {
            Arc::new(Self {
                name,
                score,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SubScoreProvider for FixedProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn score(&self) -> Result<SubScore, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SubScore::from_score(self.score))
        }
    }

    struct FailingProvider(&'static str);

    #[async_trait]
    impl SubScoreProvider for FailingProvider {
        fn name(&self) -> &str {
            self.0
        }

        async fn score(&self) -> Result<SubScore, ProviderError> {
            Err(ProviderError::MissingInput("vix".to_string()))
        }
    }

    struct PanickingProvider(&'static str);

    #[async_trait]
    impl SubScoreProvider for PanickingProvider {
        fn name(&self) -> &str {
            self.0
        }

        async fn score(&self) -> Result<SubScore, ProviderError> {
            panic!("provider exploded");
        }
    }

    struct SlowProvider {
        name: &'static str,
        finished: Arc<AtomicBool>,
    }

    #[async_trait]
    impl SubScoreProvider for SlowProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn score(&self) -> Result<SubScore, ProviderError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(SubScore::from_score(100.0))
        }
    }

    fn config(weights: &[(&str, f64)]) -> CompositeConfig {
        CompositeConfig {
            weights: weights.iter().map(|(n, w)| (n.to_string(), *w)).collect(),
            ..CompositeConfig::default()
        }
    }

    fn two_provider_scorer(a: Arc<dyn SubScoreProvider>, b: Arc<dyn SubScoreProvider>) -> CompositeScorer {
        CompositeScorer::builder(config(&[("a", 0.4), ("b", 0.6)]))
            .provider(a)
            .provider(b)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_weighted_composite() {
        let scorer = two_provider_scorer(FixedProvider::new("a", 80.0), FixedProvider::new("b", 60.0));

        let index = scorer.compute_index().await;
        assert_eq!(index.value, 68.0);
        assert_eq!(index.level, SentimentLevel::Greed);
        assert_eq!(index.breakdown.len(), 2);
        assert_eq!(index.breakdown["a"].signal, Signal::Bullish);
        assert!(!index.degraded);
        assert_eq!(index.fallback_count(), 0);
    }

    #[tokio::test]
    async fn test_failing_provider_falls_back() {
        let scorer = two_provider_scorer(FixedProvider::new("a", 80.0), Arc::new(FailingProvider("b")));

        let index = scorer.compute_index().await;
        // 0.4 * 80 + 0.6 * 50
        assert_eq!(index.value, 62.0);
        assert!(index.breakdown["b"].is_fallback);
        assert_eq!(index.breakdown["b"].signal, Signal::Unknown);
        assert_eq!(index.breakdown["b"].score, 50.0);
    }

    #[tokio::test]
    async fn test_every_provider_failing_is_neutral() {
        let scorer = two_provider_scorer(Arc::new(FailingProvider("a")), Arc::new(PanickingProvider("b")));

        let index = scorer.compute_index().await;
        assert_eq!(index.value, 50.0);
        assert_eq!(index.level, SentimentLevel::Neutral);
        assert_eq!(index.fallback_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out_and_is_aborted() {
        let finished = Arc::new(AtomicBool::new(false));
        let slow = Arc::new(SlowProvider {
            name: "b",
            finished: Arc::clone(&finished),
        });
        let scorer = two_provider_scorer(FixedProvider::new("a", 100.0), slow);

        let started = tokio::time::Instant::now();
        let index = scorer.compute_index().await;

        assert!(started.elapsed() < Duration::from_secs(60));
        assert!(index.breakdown["b"].is_fallback);
        assert_eq!(index.value, 70.0);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_current_uses_cache() {
        let a = FixedProvider::new("a", 80.0);
        let scorer = Arc::new(two_provider_scorer(a.clone(), FixedProvider::new("b", 60.0)));

        let first = scorer.current().await;
        let second = scorer.current().await;

        assert_eq!(first, second);
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);

        scorer.cache().invalidate(INDEX_CACHE_KEY);
        scorer.current().await;
        assert_eq!(a.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_history_and_trend() {
        let scorer = two_provider_scorer(FixedProvider::new("a", 80.0), FixedProvider::new("b", 60.0));

        let first = scorer.compute_index().await;
        assert_eq!(first.trend.map(|t| t.direction), Some(TrendDirection::Neutral));

        scorer.compute_index().await;
        assert_eq!(scorer.history().len(), 2);
        assert_eq!(scorer.history().latest().unwrap().raw_breakdown["a"], 80.0);
    }

    #[tokio::test]
    async fn test_trend_uses_tail_replaced_by_append() {
        let history = Arc::new(HistoryStore::new(1));
        history
            .append(HistorySnapshot::new(
                40.0,
                SentimentLevel::Neutral,
                Utc::now() - chrono::Duration::minutes(5),
            ))
            .unwrap();

        let scorer = CompositeScorer::builder(config(&[("a", 1.0)]))
            .provider(FixedProvider::new("a", 60.0))
            .history(Arc::clone(&history))
            .build()
            .unwrap();

        let trend = scorer.compute_index().await.trend.unwrap();
        assert_eq!(trend.direction, TrendDirection::Up);
        assert_eq!(trend.delta, 20.0);
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_persistence_is_throttled() {
        let storage = Arc::new(SnapshotStorage::new_in_memory().unwrap());
        let scorer = CompositeScorer::builder(config(&[("a", 1.0)]))
            .provider(FixedProvider::new("a", 30.0))
            .snapshot_storage(Arc::clone(&storage))
            .build()
            .unwrap();

        scorer.compute_index().await;
        scorer.compute_index().await;
        scorer.compute_index().await;

        assert_eq!(scorer.history().len(), 3);
        assert_eq!(storage.count().unwrap(), 1);
        assert_eq!(storage.latest_snapshots(1).unwrap()[0].level, SentimentLevel::Fear);
    }

    #[tokio::test]
    async fn test_warm_start_loads_history() {
        let storage = Arc::new(SnapshotStorage::new_in_memory().unwrap());
        for minutes_ago in [30, 20, 10] {
            let at = Utc::now() - chrono::Duration::minutes(minutes_ago);
            storage
                .store_snapshot(&HistorySnapshot::new(40.0, SentimentLevel::Neutral, at))
                .unwrap();
        }

        let scorer = CompositeScorer::builder(config(&[("a", 1.0)]))
            .provider(FixedProvider::new("a", 60.0))
            .snapshot_storage(Arc::clone(&storage))
            .build()
            .unwrap();

        assert_eq!(scorer.warm_start(), 3);

        let index = scorer.compute_index().await;
        let trend = index.trend.unwrap();
        assert_eq!(trend.direction, TrendDirection::Up);
        assert_eq!(trend.delta, 20.0);
        // Last stored row is ten minutes old, within the persist interval
        assert_eq!(storage.count().unwrap(), 3);
    }

    #[test]
    fn test_build_validates_weights() {
        let build = |weights: &[(&str, f64)]| {
            CompositeScorer::builder(config(weights))
                .provider(FixedProvider::new("a", 50.0))
                .provider(FixedProvider::new("b", 50.0))
                .build()
                .err()
        };

        assert!(build(&[("a", 0.5), ("b", 0.5)]).is_none());
        assert!(matches!(build(&[("a", 0.5), ("b", 0.6)]), Some(ConfigError::WeightSum(_))));
        assert!(matches!(build(&[("a", 1.0)]), Some(ConfigError::MissingWeight(_))));
        assert!(matches!(
            build(&[("a", 0.5), ("b", 0.25), ("c", 0.25)]),
            Some(ConfigError::UnknownProvider(_))
        ));
        assert!(matches!(
            build(&[("a", 1.5), ("b", -0.5)]),
            Some(ConfigError::NegativeWeight(_))
        ));

        let duplicate = CompositeScorer::builder(config(&[("a", 1.0)]))
            .provider(FixedProvider::new("a", 50.0))
            .provider(FixedProvider::new("a", 50.0))
            .build();
        assert!(matches!(duplicate, Err(ConfigError::DuplicateProvider(_))));
    }

    #[test]
    fn test_round_to_precision() {
        assert_eq!(round_to(67.96, 1), 68.0);
        assert_eq!(round_to(67.94, 1), 67.9);
        assert_eq!(round_to(67.5, 0), 68.0);
    }
}
