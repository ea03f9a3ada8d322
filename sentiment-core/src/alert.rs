//! Alert definitions and trigger conditions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::SentimentError;

/// Maximum length accepted for metric names and owner ids
const MAX_IDENTIFIER_LEN: usize = 64;

/// Threshold comparison for an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCondition {
    #[serde(alias = "ABOVE")]
    Above,
    #[serde(alias = "BELOW")]
    Below,
}

impl AlertCondition {
    /// Inclusive comparison: `Above` fires at `current >= target`
    pub fn is_satisfied(&self, current: f64, target: f64) -> bool {
        match self {
            AlertCondition::Above => current >= target,
            AlertCondition::Below => current <= target,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertCondition::Above => "above",
            AlertCondition::Below => "below",
        }
    }
}

impl fmt::Display for AlertCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AlertCondition {
    type Err = SentimentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "above" | ">=" => Ok(AlertCondition::Above),
            "below" | "<=" => Ok(AlertCondition::Below),
            _ => Err(SentimentError::parse(format!("Unknown alert condition: {}", s))),
        }
    }
}

/// A persisted alert.
///
/// `triggered` only ever moves from false to true; clearing it is an
/// operator action outside the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDefinition {
    pub id: i64,
    pub owner_id: String,
    /// Price symbol (e.g. "BTC") or metric name (e.g. "FEAR_GREED")
    pub symbol_or_metric: String,
    pub condition: AlertCondition,
    pub target_value: f64,
    pub triggered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AlertDefinition {
    pub fn is_pending(&self) -> bool {
        !self.triggered
    }

    /// Whether `current` satisfies this alert's condition
    pub fn is_satisfied_by(&self, current: f64) -> bool {
        self.condition.is_satisfied(current, self.target_value)
    }

    /// Human readable notification text
    pub fn format_message(&self, current: f64) -> String {
        format!(
            "🚨 Alert: {} is {} {} (current: {})",
            self.symbol_or_metric, self.condition, self.target_value, current
        )
    }
}

/// Request to record a new alert definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    pub metric: String,
    pub condition: AlertCondition,
    pub target_value: f64,
    pub owner_id: String,
}

impl NewAlert {
    /// Validate and normalize: trims identifiers and upper-cases the metric
    pub fn validated(self) -> Result<Self, SentimentError> {
        let metric = self.metric.trim().to_uppercase();
        let owner_id = self.owner_id.trim().to_string();

        if metric.is_empty() {
            return Err(SentimentError::validation("metric must not be empty"));
        }
        if metric.len() > MAX_IDENTIFIER_LEN {
            return Err(SentimentError::validation("metric name is too long"));
        }
        if !metric
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(SentimentError::validation(format!(
                "metric contains invalid characters: {}",
                metric
            )));
        }
        if owner_id.is_empty() {
            return Err(SentimentError::validation("owner_id must not be empty"));
        }
        if owner_id.len() > MAX_IDENTIFIER_LEN {
            return Err(SentimentError::validation("owner_id is too long"));
        }
        if !self.target_value.is_finite() {
            return Err(SentimentError::validation("target_value must be a finite number"));
        }

        Ok(Self {
            metric,
            condition: self.condition,
            target_value: self.target_value,
            owner_id,
        })
    }
}
