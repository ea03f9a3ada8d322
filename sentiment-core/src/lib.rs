//! Core types for the composite sentiment index
//!
//! This crate defines the shared data structures used across the engine,
//! including the composite index, sub-score results, history snapshots
//! and alert definitions.

pub mod alert;
pub mod error;
pub mod history;
pub mod index;

pub use alert::{AlertCondition, AlertDefinition, NewAlert};
pub use error::SentimentError;
pub use history::{HistoryPoint, HistorySeries, HistorySnapshot};
pub use index::{
    CompositeIndex, LevelThresholds, SentimentLevel, Signal, SubScoreResult, Trend,
    TrendDirection, FALLBACK_SCORE,
};
