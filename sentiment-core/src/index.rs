//! Composite index data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::SentimentError;

/// Neutral score substituted for a provider that could not produce a result
pub const FALLBACK_SCORE: f64 = 50.0;

/// Qualitative direction reported alongside a sub-score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    Bullish,
    Bearish,
    Neutral,
    /// Provider failed; the score is a fallback
    Unknown,
}

impl Signal {
    /// Derive a signal from a bounded score: >= 60 bullish, <= 40 bearish
    pub fn from_score(score: f64) -> Self {
        if score >= 60.0 {
            Signal::Bullish
        } else if score <= 40.0 {
            Signal::Bearish
        } else {
            Signal::Neutral
        }
    }
}

/// Result of a single sub-score provider for one computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubScoreResult {
    pub provider_name: String,
    /// Bounded score (0 - 100)
    pub score: f64,
    pub signal: Signal,
    /// True when the provider failed or timed out and a neutral value was used
    pub is_fallback: bool,
}

impl SubScoreResult {
    /// Create a real (non-fallback) result, clamping the score into [0, 100]
    pub fn new(provider_name: impl Into<String>, score: f64, signal: Signal) -> Self {
        Self {
            provider_name: provider_name.into(),
            score: clamp_score(score),
            signal,
            is_fallback: false,
        }
    }

    /// Neutral substitute for a failed provider
    pub fn fallback(provider_name: impl Into<String>) -> Self {
        Self {
            provider_name: provider_name.into(),
            score: FALLBACK_SCORE,
            signal: Signal::Unknown,
            is_fallback: true,
        }
    }
}

/// Sentiment classification of a composite value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SentimentLevel {
    ExtremeFear,
    Fear,
    Neutral,
    Greed,
    ExtremeGreed,
}

impl SentimentLevel {
    /// Get the full display name
    pub fn display_name(&self) -> &'static str {
        match self {
            SentimentLevel::ExtremeFear => "Extreme Fear",
            SentimentLevel::Fear => "Fear",
            SentimentLevel::Neutral => "Neutral",
            SentimentLevel::Greed => "Greed",
            SentimentLevel::ExtremeGreed => "Extreme Greed",
        }
    }

    /// Stable storage identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLevel::ExtremeFear => "EXTREME_FEAR",
            SentimentLevel::Fear => "FEAR",
            SentimentLevel::Neutral => "NEUTRAL",
            SentimentLevel::Greed => "GREED",
            SentimentLevel::ExtremeGreed => "EXTREME_GREED",
        }
    }
}

impl fmt::Display for SentimentLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for SentimentLevel {
    type Err = SentimentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace([' ', '-'], "_").as_str() {
            "EXTREME_FEAR" => Ok(SentimentLevel::ExtremeFear),
            "FEAR" => Ok(SentimentLevel::Fear),
            "NEUTRAL" => Ok(SentimentLevel::Neutral),
            "GREED" => Ok(SentimentLevel::Greed),
            "EXTREME_GREED" => Ok(SentimentLevel::ExtremeGreed),
            _ => Err(SentimentError::parse(format!("Unknown sentiment level: {}", s))),
        }
    }
}

/// Upper bounds (exclusive) of the first four level bands.
///
/// A value below `extreme_fear` is `ExtremeFear`, below `fear` is `Fear`,
/// and so on; anything at or above `greed` is `ExtremeGreed`. Validated
/// thresholds are strictly increasing inside (0, 100), so the bands are
/// monotonic and cover [0, 100] without gaps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelThresholds {
    pub extreme_fear: f64,
    pub fear: f64,
    pub neutral: f64,
    pub greed: f64,
}

impl Default for LevelThresholds {
    fn default() -> Self {
        Self {
            extreme_fear: 20.0,
            fear: 40.0,
            neutral: 60.0,
            greed: 80.0,
        }
    }
}

impl LevelThresholds {
    /// Build thresholds, rejecting non-increasing or out-of-range bounds
    pub fn new(extreme_fear: f64, fear: f64, neutral: f64, greed: f64) -> Result<Self, SentimentError> {
        let thresholds = Self {
            extreme_fear,
            fear,
            neutral,
            greed,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<(), SentimentError> {
        let bounds = [self.extreme_fear, self.fear, self.neutral, self.greed];

        if bounds.iter().any(|b| !b.is_finite() || *b <= 0.0 || *b >= 100.0) {
            return Err(SentimentError::config(format!(
                "Level thresholds must lie strictly between 0 and 100: {:?}",
                bounds
            )));
        }

        if bounds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(SentimentError::config(format!(
                "Level thresholds must be strictly increasing: {:?}",
                bounds
            )));
        }

        Ok(())
    }

    /// Classify a composite value into its level band
    pub fn classify(&self, value: f64) -> SentimentLevel {
        if value.is_nan() {
            return SentimentLevel::Neutral;
        }

        if value < self.extreme_fear {
            SentimentLevel::ExtremeFear
        } else if value < self.fear {
            SentimentLevel::Fear
        } else if value < self.neutral {
            SentimentLevel::Neutral
        } else if value < self.greed {
            SentimentLevel::Greed
        } else {
            SentimentLevel::ExtremeGreed
        }
    }
}

/// Direction of change between two composite values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Neutral,
}

/// Change of the current value relative to the previous snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub delta: f64,
    /// Percentage change relative to the previous value (0 when undefined)
    pub percentage: f64,
    pub direction: TrendDirection,
}

impl Trend {
    /// Trend reported when there is nothing to compare against
    pub fn flat() -> Self {
        Self {
            delta: 0.0,
            percentage: 0.0,
            direction: TrendDirection::Neutral,
        }
    }

    /// Compare `current` against `previous`
    pub fn between(previous: f64, current: f64) -> Self {
        let delta = current - previous;

        let direction = if delta > 0.0 {
            TrendDirection::Up
        } else if delta < 0.0 {
            TrendDirection::Down
        } else {
            TrendDirection::Neutral
        };

        let percentage = if previous == 0.0 {
            0.0
        } else {
            delta / previous * 100.0
        };

        Self {
            delta,
            percentage,
            direction,
        }
    }
}

/// The composite sentiment index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeIndex {
    /// Weighted composite value (0 - 100)
    #[serde(rename = "index")]
    pub value: f64,
    pub level: SentimentLevel,
    /// Per-provider results keyed by provider name
    pub breakdown: BTreeMap<String, SubScoreResult>,
    #[serde(rename = "timestamp")]
    pub computed_at: DateTime<Utc>,
    /// Change against the previous snapshot, if history was available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<Trend>,
    /// Set when the computation failed entirely and this is a safe default
    #[serde(default)]
    pub degraded: bool,
}

impl CompositeIndex {
    /// Last-known-safe default returned when the whole computation faulted
    pub fn neutral_default(computed_at: DateTime<Utc>) -> Self {
        Self {
            value: FALLBACK_SCORE,
            level: SentimentLevel::Neutral,
            breakdown: BTreeMap::new(),
            computed_at,
            trend: None,
            degraded: true,
        }
    }

    /// Number of providers that fell back to the neutral default
    pub fn fallback_count(&self) -> usize {
        self.breakdown.values().filter(|r| r.is_fallback).count()
    }

    /// Raw score per provider, as recorded in history snapshots
    pub fn raw_breakdown(&self) -> BTreeMap<String, f64> {
        self.breakdown
            .iter()
            .map(|(name, result)| (name.clone(), result.score))
            .collect()
    }
}

/// Clamp into [0, 100]; non-finite scores collapse to the neutral fallback
pub fn clamp_score(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 100.0)
    } else {
        FALLBACK_SCORE
    }
}
