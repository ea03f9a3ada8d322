//! Services for the composite sentiment index
//!
//! This crate holds the engine: provider fan-out and weighting, history,
//! caching, rate limiting, durable storage and alert evaluation.

pub mod alert_evaluator;
pub mod alert_monitor;
pub mod alert_storage;
pub mod composite_scorer;
pub mod config;
pub mod demo;
pub mod history_store;
pub mod providers;
pub mod rate_limiter;
pub mod snapshot_storage;
pub mod sweeper;
pub mod ttl_cache;

pub use alert_evaluator::{AlertError, AlertEvaluator, EvaluationSummary};
pub use alert_monitor::{AlertMonitor, MonitorHandle, DEFAULT_CHECK_INTERVAL, FEAR_GREED_METRIC};
pub use alert_storage::AlertStorage;
pub use composite_scorer::{CompositeScorer, CompositeScorerBuilder, INDEX_CACHE_KEY};
pub use config::{CompositeConfig, ConfigError};
pub use demo::demo_history;
pub use history_store::{downsample, HistoryError, HistoryStore, DEFAULT_HISTORY_CAPACITY};
pub use providers::{
    MacroProvider, OnChainProvider, ProviderError, RiskProvider, SocialProvider, SubScore,
    SubScoreProvider,
};
pub use rate_limiter::{RateDecision, RateLimiter, RateLimiterStats};
pub use snapshot_storage::{SnapshotStorage, StorageError};
pub use sweeper::{spawn_sweeper, Sweep, SweeperHandle};
pub use ttl_cache::{CacheStats, TtlCache, DEFAULT_SWEEP_INTERVAL};
