//! Composite index tuning, read from the environment

use std::collections::BTreeMap;
use std::time::Duration;

use sentiment_core::LevelThresholds;

use crate::history_store::DEFAULT_HISTORY_CAPACITY;

pub const DEFAULT_WEIGHTS: &str = "onchain=0.3,macro=0.25,social=0.25,risk=0.2";
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(8);
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);
pub const DEFAULT_PERSIST_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_PRECISION: u32 = 1;

/// Largest rounding precision honoured; beyond this f64 rounding is noise
const MAX_PRECISION: u32 = 6;

/// Tolerance when checking that weights sum to one
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },

    #[error("Weights must sum to 1.0, got {0}")]
    WeightSum(f64),

    #[error("Weight for {0} is negative or not finite")]
    NegativeWeight(String),

    #[error("No weight configured for provider {0}")]
    MissingWeight(String),

    #[error("Weight configured for unknown provider {0}")]
    UnknownProvider(String),

    #[error("Provider {0} registered twice")]
    DuplicateProvider(String),

    #[error("Invalid level thresholds: {0}")]
    Thresholds(String),
}

impl ConfigError {
    fn invalid(key: &str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Settings of the composite scorer
#[derive(Debug, Clone)]
pub struct CompositeConfig {
    /// Provider name -> weight
    pub weights: BTreeMap<String, f64>,
    pub thresholds: LevelThresholds,
    pub provider_timeout: Duration,
    pub cache_ttl: Duration,
    /// Decimal places kept in the composite value
    pub precision: u32,
    pub history_capacity: usize,
    /// Minimum spacing of durable snapshots
    pub persist_interval: Duration,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            weights: default_weights(),
            thresholds: LevelThresholds::default(),
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            cache_ttl: DEFAULT_CACHE_TTL,
            precision: DEFAULT_PRECISION,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            persist_interval: DEFAULT_PERSIST_INTERVAL,
        }
    }
}

fn default_weights() -> BTreeMap<String, f64> {
    [("onchain", 0.3), ("macro", 0.25), ("social", 0.25), ("risk", 0.2)]
        .into_iter()
        .map(|(name, weight)| (name.to_string(), weight))
        .collect()
}

impl CompositeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset or blank keys use defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(raw) = get("SENTIMENT_WEIGHTS") {
            config.weights = parse_weights(&raw)?;
        }
        if let Some(raw) = get("SENTIMENT_BANDS") {
            config.thresholds = parse_bands(&raw)?;
        }
        if let Some(secs) = parse_u64(&get, "PROVIDER_TIMEOUT_SECS")? {
            if secs == 0 {
                return Err(ConfigError::invalid("PROVIDER_TIMEOUT_SECS", "must be positive"));
            }
            config.provider_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_u64(&get, "INDEX_CACHE_TTL_SECS")? {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(precision) = parse_u64(&get, "INDEX_PRECISION")? {
            if precision > MAX_PRECISION as u64 {
                return Err(ConfigError::invalid(
                    "INDEX_PRECISION",
                    format!("must be at most {}", MAX_PRECISION),
                ));
            }
            config.precision = precision as u32;
        }
        if let Some(capacity) = parse_u64(&get, "HISTORY_CAPACITY")? {
            if capacity == 0 {
                return Err(ConfigError::invalid("HISTORY_CAPACITY", "must be positive"));
            }
            config.history_capacity = capacity as usize;
        }
        if let Some(secs) = parse_u64(&get, "SNAPSHOT_PERSIST_INTERVAL_SECS")? {
            config.persist_interval = Duration::from_secs(secs);
        }

        validate_weights(&config.weights)?;
        Ok(config)
    }
}

fn parse_u64<G>(get: &G, key: &str) -> Result<Option<u64>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.parse::<u64>()
                .map_err(|_| ConfigError::invalid(key, format!("expected an integer, got {:?}", raw)))
        })
        .transpose()
}

/// Parse `"onchain=0.3,macro=0.25"` into a weight table
pub fn parse_weights(raw: &str) -> Result<BTreeMap<String, f64>, ConfigError> {
    let mut weights = BTreeMap::new();

    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, weight) = pair
            .split_once('=')
            .ok_or_else(|| ConfigError::invalid("SENTIMENT_WEIGHTS", format!("expected name=weight, got {:?}", pair)))?;

        let name = name.trim().to_lowercase();
        let weight: f64 = weight.trim().parse().map_err(|_| {
            ConfigError::invalid("SENTIMENT_WEIGHTS", format!("weight for {} is not a number", name))
        })?;

        if weights.insert(name.clone(), weight).is_some() {
            return Err(ConfigError::DuplicateProvider(name));
        }
    }

    if weights.is_empty() {
        return Err(ConfigError::invalid("SENTIMENT_WEIGHTS", "no weights given"));
    }
    Ok(weights)
}

/// Parse `"20,40,60,80"` into validated level thresholds
pub fn parse_bands(raw: &str) -> Result<LevelThresholds, ConfigError> {
    let values = raw
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ConfigError::invalid("SENTIMENT_BANDS", "bands must be numbers"))?;

    match values.as_slice() {
        [extreme_fear, fear, neutral, greed] => {
            LevelThresholds::new(*extreme_fear, *fear, *neutral, *greed)
                .map_err(|e| ConfigError::Thresholds(e.to_string()))
        }
        _ => Err(ConfigError::invalid(
            "SENTIMENT_BANDS",
            format!("expected 4 thresholds, got {}", values.len()),
        )),
    }
}

/// Weights must be finite, non-negative and sum to one
pub fn validate_weights(weights: &BTreeMap<String, f64>) -> Result<(), ConfigError> {
    if let Some((name, _)) = weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
        return Err(ConfigError::NegativeWeight(name.clone()));
    }

    let sum: f64 = weights.values().sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(ConfigError::WeightSum(sum));
    }
    Ok(())
}
