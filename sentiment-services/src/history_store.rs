//! Bounded history of composite index snapshots
//!
//! Holds the most recent `capacity` snapshots in ascending time order
//! (168 by default: one week of hourly samples). Appends past capacity
//! evict the oldest snapshot first.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sentiment_core::{HistorySnapshot, Trend};
use tracing::{debug, warn};

/// Default number of snapshots kept in memory
pub const DEFAULT_HISTORY_CAPACITY: usize = 168;

/// Errors from history operations
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("Snapshot at {attempted} is older than the latest snapshot at {latest}")]
    OutOfOrder {
        attempted: DateTime<Utc>,
        latest: DateTime<Utc>,
    },
}

/// In-memory ring of snapshots
#[derive(Debug)]
pub struct HistoryStore {
    capacity: usize,
    snapshots: RwLock<VecDeque<HistorySnapshot>>,
}

impl HistoryStore {
    /// Create a store holding at most `capacity` snapshots (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            snapshots: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a snapshot at the tail, evicting from the head when full.
    ///
    /// Snapshots older than the current tail are rejected so the sequence
    /// stays ordered. Returns the tail the snapshot was appended after, read
    /// under the same write lock.
    pub fn append(&self, snapshot: HistorySnapshot) -> Result<Option<HistorySnapshot>, HistoryError> {
        let mut snapshots = self.snapshots.write();

        if let Some(latest) = snapshots.back() {
            if snapshot.recorded_at < latest.recorded_at {
                return Err(HistoryError::OutOfOrder {
                    attempted: snapshot.recorded_at,
                    latest: latest.recorded_at,
                });
            }
        }

        let prior = snapshots.back().cloned();
        snapshots.push_back(snapshot);
        while snapshots.len() > self.capacity {
            snapshots.pop_front();
        }

        Ok(prior)
    }

    /// Warm-start from persisted snapshots; out-of-order rows are skipped
    pub fn load<I>(&self, snapshots: I) -> usize
    where
        I: IntoIterator<Item = HistorySnapshot>,
    {
        let mut sorted: Vec<HistorySnapshot> = snapshots.into_iter().collect();
        sorted.sort_by_key(|s| s.recorded_at);

        let mut loaded = 0;
        for snapshot in sorted {
            match self.append(snapshot) {
                Ok(_) => loaded += 1,
                Err(e) => warn!("Skipping persisted snapshot: {}", e),
            }
        }

        debug!("Loaded {} snapshots into history", loaded);
        loaded.min(self.capacity)
    }

    pub fn latest(&self) -> Option<HistorySnapshot> {
        self.snapshots.read().back().cloned()
    }

    /// The snapshot recorded immediately before `latest()`
    pub fn previous(&self) -> Option<HistorySnapshot> {
        let snapshots = self.snapshots.read();
        let len = snapshots.len();
        if len < 2 {
            return None;
        }
        snapshots.get(len - 2).cloned()
    }

    /// Snapshot with minimal distance to `t`; ties go to the earlier one
    pub fn nearest_to(&self, t: DateTime<Utc>) -> Option<HistorySnapshot> {
        let snapshots = self.snapshots.read();
        if snapshots.is_empty() {
            return None;
        }

        // First index recorded at or after `t`
        let idx = snapshots.partition_point(|s| s.recorded_at < t);

        // Equal timestamps: step back to the first of the group
        let before = idx.checked_sub(1).and_then(|i| snapshots.get(i)).map(|b| {
            let first = snapshots.partition_point(|s| s.recorded_at < b.recorded_at);
            &snapshots[first]
        });
        let after = snapshots.get(idx);

        match (before, after) {
            (Some(b), Some(a)) => {
                let dist_before = t - b.recorded_at;
                let dist_after = a.recorded_at - t;
                if dist_before <= dist_after {
                    Some(b.clone())
                } else {
                    Some(a.clone())
                }
            }
            (Some(b), None) => Some(b.clone()),
            (None, Some(a)) => Some(a.clone()),
            (None, None) => None,
        }
    }

    /// Change of `current_value` relative to `previous()`
    pub fn trend(&self, current_value: f64) -> Trend {
        match self.previous() {
            Some(previous) => Trend::between(previous.index_value, current_value),
            None => Trend::flat(),
        }
    }

    /// At most `max_points` snapshots evenly sampled across the history
    pub fn range(&self, max_points: usize) -> Vec<HistorySnapshot> {
        let snapshots = self.snapshots.read();
        downsample_indices(snapshots.len(), max_points)
            .into_iter()
            .filter_map(|i| snapshots.get(i).cloned())
            .collect()
    }

    /// Snapshots recorded at or after `cutoff`
    pub fn since(&self, cutoff: DateTime<Utc>) -> Vec<HistorySnapshot> {
        let snapshots = self.snapshots.read();
        let start = snapshots.partition_point(|s| s.recorded_at < cutoff);
        snapshots.range(start..).cloned().collect()
    }

    pub fn snapshots(&self) -> Vec<HistorySnapshot> {
        self.snapshots.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

/// Indices `floor(i * len / max_points)` for `i in 0..max_points`, or every
/// index when `len <= max_points`. Deterministic for a given input.
pub fn downsample_indices(len: usize, max_points: usize) -> Vec<usize> {
    if len <= max_points {
        return (0..len).collect();
    }
    (0..max_points).map(|i| i * len / max_points).collect()
}

/// Sample `items` down to at most `max_points` entries
pub fn downsample<T: Clone>(items: &[T], max_points: usize) -> Vec<T> {
    downsample_indices(items.len(), max_points)
        .into_iter()
        .map(|i| items[i].clone())
        .collect()
}
