//! Shared sliding-window rate limiter
//!
//! Bounds how often an identifier (client address, API key, cron caller)
//! may be admitted within a trailing window.
//!
//! ## Key Design: Per-Identifier Atomicity
//!
//! Each identifier's window lives in its own shard entry of a `DashMap`.
//! The purge-check-append sequence runs while holding that entry, so two
//! concurrent requests for the same identifier can never both take the
//! last slot. Different identifiers never contend on a shared lock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::sweeper::Sweep;

/// Admission timestamps of one identifier within its trailing window
#[derive(Debug)]
struct RateWindow {
    window: Duration,
    timestamps: VecDeque<Instant>,
}

impl RateWindow {
    fn new(window: Duration) -> Self {
        Self {
            window,
            timestamps: VecDeque::new(),
        }
    }

    /// Drop every timestamp that has left the trailing window
    fn purge(&mut self, now: Instant) {
        while let Some(oldest) = self.timestamps.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Outcome of an admission check
#[derive(Debug, Clone, Serialize)]
pub struct RateDecision {
    pub allowed: bool,
    /// Admissions left in the current window
    pub remaining: usize,
    /// When the oldest admission in the window expires
    pub reset_at: DateTime<Utc>,
    /// Time until `reset_at`
    #[serde(skip)]
    pub retry_after: Duration,
}

/// Sliding-window limiter keyed by identifier
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
    /// Name for logging purposes
    name: String,
    admitted: AtomicU64,
    denied: AtomicU64,
}

impl RateLimiter {
    pub fn new(name: &str) -> Self {
        Self {
            windows: DashMap::new(),
            name: name.to_string(),
            admitted: AtomicU64::new(0),
            denied: AtomicU64::new(0),
        }
    }

    /// Admit or deny one request for `identifier`.
    ///
    /// At most `max_requests` admissions are recorded within any trailing
    /// `window`, whatever the call pattern.
    pub fn admit(&self, identifier: &str, max_requests: usize, window: Duration) -> RateDecision {
        let now = Instant::now();

        let mut entry = self
            .windows
            .entry(identifier.to_string())
            .or_insert_with(|| RateWindow::new(window));
        let rate_window = entry.value_mut();

        rate_window.window = window;
        rate_window.purge(now);

        let in_window = rate_window.timestamps.len();

        if in_window >= max_requests {
            let reset = rate_window
                .timestamps
                .front()
                .map(|oldest| *oldest + window)
                .unwrap_or(now + window);
            let retry_after = reset.saturating_duration_since(now);

            self.denied.fetch_add(1, Ordering::Relaxed);
            debug!(
                "[RATE_LIMITER:{}] DENIED {} - {} in window, retry after {:?}",
                self.name, identifier, in_window, retry_after
            );

            return RateDecision {
                allowed: false,
                remaining: 0,
                reset_at: to_wall_clock(retry_after),
                retry_after,
            };
        }

        rate_window.timestamps.push_back(now);
        let remaining = max_requests - rate_window.timestamps.len();
        let reset = rate_window
            .timestamps
            .front()
            .map(|oldest| *oldest + window)
            .unwrap_or(now + window);
        let retry_after = reset.saturating_duration_since(now);

        self.admitted.fetch_add(1, Ordering::Relaxed);
        debug!(
            "[RATE_LIMITER:{}] ADMITTED {} - {} remaining",
            self.name, identifier, remaining
        );

        RateDecision {
            allowed: true,
            remaining,
            reset_at: to_wall_clock(retry_after),
            retry_after,
        }
    }

    /// Drop identifiers whose windows are empty
    pub fn purge_idle(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();

        self.windows.retain(|_, w| {
            w.purge(now);
            !w.timestamps.is_empty()
        });

        before.saturating_sub(self.windows.len())
    }

    /// Number of identifiers currently tracked
    pub fn tracked_identifiers(&self) -> usize {
        self.windows.len()
    }

    /// Get statistics about this rate limiter (for debugging)
    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            name: self.name.clone(),
            admitted: self.admitted.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            tracked_identifiers: self.windows.len(),
        }
    }
}

impl Sweep for RateLimiter {
    fn sweep(&self) -> usize {
        self.purge_idle()
    }
}

fn to_wall_clock(after: Duration) -> DateTime<Utc> {
    let offset = chrono::Duration::from_std(after).unwrap_or_else(|_| chrono::Duration::zero());
    Utc::now() + offset
}

/// Statistics about rate limiter usage
#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterStats {
    pub name: String,
    pub admitted: u64,
    pub denied: u64,
    pub tracked_identifiers: usize,
}
