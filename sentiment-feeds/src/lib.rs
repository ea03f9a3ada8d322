//! Upstream collaborators for the composite sentiment engine
//!
//! This crate provides:
//! - Metric sources: numeric payloads for sub-score providers (HTTP JSON)
//! - Price sources: spot prices for alert evaluation (CoinGecko)
//! - Notification sinks: Discord webhooks, Telegram bots, or a no-op sink

pub mod error;
pub mod metrics_client;
pub mod notify;
pub mod price_feed;

pub use error::FeedError;
pub use metrics_client::{JsonMetricsClient, MetricSource, RawMetrics, StaticMetricSource};
pub use notify::{
    build_notifier, DiscordWebhookSink, FanoutSink, Notification, NotificationSink,
    NotifierConfig, NoopSink, SinkStatus, TelegramConfig, TelegramSink,
};
pub use price_feed::{CoinGeckoClient, PriceSource, StaticPriceSource};
