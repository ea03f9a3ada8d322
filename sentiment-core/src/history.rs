//! Historical snapshots of the composite index

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{CompositeIndex, SentimentLevel};

/// Frozen record of one past composite computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub index_value: f64,
    pub level: SentimentLevel,
    pub recorded_at: DateTime<Utc>,
    /// Provider name -> raw sub-score at the time of recording
    #[serde(default)]
    pub raw_breakdown: BTreeMap<String, f64>,
}

impl HistorySnapshot {
    pub fn new(index_value: f64, level: SentimentLevel, recorded_at: DateTime<Utc>) -> Self {
        Self {
            index_value,
            level,
            recorded_at,
            raw_breakdown: BTreeMap::new(),
        }
    }

    /// Project a computed index into a snapshot
    pub fn from_index(index: &CompositeIndex) -> Self {
        Self {
            index_value: index.value,
            level: index.level,
            recorded_at: index.computed_at,
            raw_breakdown: index.raw_breakdown(),
        }
    }
}

/// One point of the public history series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub date: DateTime<Utc>,
    pub index: f64,
    pub level: SentimentLevel,
}

impl From<&HistorySnapshot> for HistoryPoint {
    fn from(snapshot: &HistorySnapshot) -> Self {
        Self {
            date: snapshot.recorded_at,
            index: snapshot.index_value,
            level: snapshot.level,
        }
    }
}

/// History query response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySeries {
    pub points: Vec<HistoryPoint>,
    /// True when the points are synthetic because no real rows exist yet
    pub is_demo: bool,
}
