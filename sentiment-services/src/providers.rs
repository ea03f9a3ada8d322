//! Sub-score providers
//!
//! Each provider turns the raw readings of one data domain into a bounded
//! score (0 - 100) and a qualitative signal. Fetching is delegated to a
//! [`MetricSource`]; the scoring itself is a pure function so the tuning
//! can be tested without any upstream.
//!
//! A provider reports failure by returning `Err`; substituting the neutral
//! fallback is the composite scorer's job, not the provider's.

use std::sync::Arc;

use async_trait::async_trait;
use sentiment_core::index::clamp_score;
use sentiment_core::Signal;
use sentiment_feeds::{FeedError, MetricSource, RawMetrics};

/// Errors a provider can report
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Upstream unavailable: {0}")]
    Upstream(#[from] FeedError),

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Malformed input {field}: {value}")]
    Malformed { field: String, value: f64 },
}

/// Score and signal produced by a provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubScore {
    pub score: f64,
    pub signal: Signal,
}

impl SubScore {
    /// Clamp `score` into range and derive the signal from it
    pub fn from_score(score: f64) -> Self {
        let score = clamp_score(score);
        Self {
            score,
            signal: Signal::from_score(score),
        }
    }
}

/// A pluggable scoring strategy for one data domain
#[async_trait]
pub trait SubScoreProvider: Send + Sync {
    /// Stable name, used as the breakdown key and the weight key
    fn name(&self) -> &str;

    async fn score(&self) -> Result<SubScore, ProviderError>;
}

/// Read a required finite input
fn input(metrics: &RawMetrics, field: &str) -> Result<f64, ProviderError> {
    let value = *metrics
        .get(field)
        .ok_or_else(|| ProviderError::MissingInput(field.to_string()))?;

    if !value.is_finite() {
        return Err(ProviderError::Malformed {
            field: field.to_string(),
            value,
        });
    }
    Ok(value)
}

/// Linear contribution of `value * factor`, bounded to `±limit` points
fn contribution(value: f64, factor: f64, limit: f64) -> f64 {
    (value * factor).clamp(-limit, limit)
}

// ============================================================================
// On-chain activity
// ============================================================================

/// On-chain provider inputs:
/// - `active_addresses_change_pct`: day-over-day change in active addresses
/// - `exchange_netflow`: coins moved onto exchanges (negative = outflow)
/// - `large_tx_change_pct`: change in transactions above $100k
pub struct OnChainProvider {
    source: Arc<dyn MetricSource>,
}

impl OnChainProvider {
    pub const NAME: &'static str = "onchain";

    pub fn new(source: Arc<dyn MetricSource>) -> Self {
        Self { source }
    }
}

/// Growing activity and exchange outflows read as accumulation (greed)
pub fn score_onchain(metrics: &RawMetrics) -> Result<SubScore, ProviderError> {
    let active = input(metrics, "active_addresses_change_pct")?;
    let netflow = input(metrics, "exchange_netflow")?;
    let large_tx = input(metrics, "large_tx_change_pct")?;

    let score = 50.0
        + contribution(active, 1.5, 25.0)
        + contribution(-netflow / 1000.0, 10.0, 15.0)
        + contribution(large_tx, 0.5, 10.0);

    Ok(SubScore::from_score(score))
}

#[async_trait]
impl SubScoreProvider for OnChainProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn score(&self) -> Result<SubScore, ProviderError> {
        let metrics = self.source.fetch().await?;
        score_onchain(&metrics)
    }
}

// ============================================================================
// Macro indicators
// ============================================================================

/// Macro provider inputs:
/// - `dxy_change_pct`: dollar index daily change
/// - `sp500_change_pct`: S&P 500 daily change
/// - `vix`: volatility index level
pub struct MacroProvider {
    source: Arc<dyn MetricSource>,
}

impl MacroProvider {
    pub const NAME: &'static str = "macro";

    pub fn new(source: Arc<dyn MetricSource>) -> Self {
        Self { source }
    }
}

/// Weak dollar, rising equities and a calm VIX are risk-on
pub fn score_macro(metrics: &RawMetrics) -> Result<SubScore, ProviderError> {
    let dxy = input(metrics, "dxy_change_pct")?;
    let sp500 = input(metrics, "sp500_change_pct")?;
    let vix = input(metrics, "vix")?;

    if vix < 0.0 {
        return Err(ProviderError::Malformed {
            field: "vix".to_string(),
            value: vix,
        });
    }

    let score = 50.0
        + contribution(-dxy, 10.0, 15.0)
        + contribution(sp500, 5.0, 15.0)
        + contribution(20.0 - vix, 1.5, 20.0);

    Ok(SubScore::from_score(score))
}

#[async_trait]
impl SubScoreProvider for MacroProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn score(&self) -> Result<SubScore, ProviderError> {
        let metrics = self.source.fetch().await?;
        score_macro(&metrics)
    }
}

// ============================================================================
// Social / whale activity
// ============================================================================

/// Social provider inputs:
/// - `whale_buy_volume` / `whale_sell_volume`: large-wallet flows (USD)
/// - `social_volume_change_pct`: change in mentions across social feeds
pub struct SocialProvider {
    source: Arc<dyn MetricSource>,
}

impl SocialProvider {
    pub const NAME: &'static str = "social";

    pub fn new(source: Arc<dyn MetricSource>) -> Self {
        Self { source }
    }
}

/// 70% whale buy share, 30% social momentum
pub fn score_social(metrics: &RawMetrics) -> Result<SubScore, ProviderError> {
    let buys = input(metrics, "whale_buy_volume")?;
    let sells = input(metrics, "whale_sell_volume")?;
    let social_change = input(metrics, "social_volume_change_pct")?;

    if buys < 0.0 || sells < 0.0 {
        return Err(ProviderError::Malformed {
            field: "whale_volume".to_string(),
            value: buys.min(sells),
        });
    }

    let total = buys + sells;
    let buy_share = if total > 0.0 { buys / total * 100.0 } else { 50.0 };
    let momentum = (50.0 + social_change).clamp(0.0, 100.0);

    Ok(SubScore::from_score(buy_share * 0.7 + momentum * 0.3))
}

#[async_trait]
impl SubScoreProvider for SocialProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn score(&self) -> Result<SubScore, ProviderError> {
        let metrics = self.source.fetch().await?;
        score_social(&metrics)
    }
}

// ============================================================================
// Per-asset risk
// ============================================================================

/// Risk provider inputs, per configured asset:
/// - `{ASSET}_volatility_pct`: annualised volatility
/// - `{ASSET}_drawdown_pct`: distance from the recent high
///
/// The score is `100 - average risk`, so calm markets near highs read as
/// greed and volatile, drawn-down markets as fear.
pub struct RiskProvider {
    source: Arc<dyn MetricSource>,
    assets: Vec<String>,
}

impl RiskProvider {
    pub const NAME: &'static str = "risk";

    pub fn new(source: Arc<dyn MetricSource>, assets: Vec<String>) -> Self {
        let assets = assets.into_iter().map(|a| a.to_uppercase()).collect();
        Self { source, assets }
    }
}

/// Risk of a single asset on a 0 - 100 scale
pub fn asset_risk(volatility_pct: f64, drawdown_pct: f64) -> f64 {
    (volatility_pct * 0.5 + drawdown_pct.abs()).clamp(0.0, 100.0)
}

pub fn score_risk(metrics: &RawMetrics, assets: &[String]) -> Result<SubScore, ProviderError> {
    if assets.is_empty() {
        return Err(ProviderError::MissingInput("risk asset list".to_string()));
    }

    let mut total_risk = 0.0;
    for asset in assets {
        let volatility = input(metrics, &format!("{}_volatility_pct", asset))?;
        let drawdown = input(metrics, &format!("{}_drawdown_pct", asset))?;
        total_risk += asset_risk(volatility, drawdown);
    }

    let average = total_risk / assets.len() as f64;
    Ok(SubScore::from_score(100.0 - average))
}

#[async_trait]
impl SubScoreProvider for RiskProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn score(&self) -> Result<SubScore, ProviderError> {
        let metrics = self.source.fetch().await?;
        score_risk(&metrics, &self.assets)
    }
}
