//! Synthetic history for fresh deployments
//!
//! Until real snapshots have accumulated, the history endpoint serves a
//! seeded random walk tagged `is_demo`. Demo points are never stored.

use chrono::{DateTime, Duration, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use sentiment_core::{HistoryPoint, HistorySeries, LevelThresholds};

const START_VALUE: f64 = 50.0;

/// Largest hourly move of the walk, in index points
const MAX_STEP: f64 = 3.0;

/// Hourly random walk covering the last `days` days up to `now`.
///
/// The same `seed`, `days` and `now` always produce the same series.
pub fn demo_history(
    days: u32,
    seed: u64,
    now: DateTime<Utc>,
    thresholds: &LevelThresholds,
) -> HistorySeries {
    let mut rng = StdRng::seed_from_u64(seed);
    let hours = i64::from(days) * 24;

    let end = now
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);

    let mut value = START_VALUE;
    let points = (0..=hours)
        .rev()
        .map(|hours_ago| {
            value = (value + rng.random_range(-MAX_STEP..=MAX_STEP)).clamp(0.0, 100.0);
            let index = (value * 10.0).round() / 10.0;

            HistoryPoint {
                date: end - Duration::hours(hours_ago),
                index,
                level: thresholds.classify(index),
            }
        })
        .collect();

    HistorySeries {
        points,
        is_demo: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 34, 56).unwrap()
    }

    #[test]
    fn test_hourly_points_over_period() {
        let series = demo_history(7, 42, now(), &LevelThresholds::default());

        assert!(series.is_demo);
        assert_eq!(series.points.len(), 7 * 24 + 1);
        assert_eq!(series.points.last().unwrap().date, Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());
        assert!(series
            .points
            .windows(2)
            .all(|w| w[1].date - w[0].date == Duration::hours(1)));
    }

    #[test]
    fn test_values_bounded_and_classified() {
        let thresholds = LevelThresholds::default();
        let series = demo_history(90, 7, now(), &thresholds);

        for point in &series.points {
            assert!((0.0..=100.0).contains(&point.index));
            assert_eq!(point.level, thresholds.classify(point.index));
        }
        assert!(series
            .points
            .windows(2)
            .all(|w| (w[1].index - w[0].index).abs() <= MAX_STEP + 0.1));
    }

    #[test]
    fn test_same_seed_same_series() {
        let thresholds = LevelThresholds::default();
        let a = demo_history(3, 99, now(), &thresholds);
        let b = demo_history(3, 99, now(), &thresholds);
        let c = demo_history(3, 100, now(), &thresholds);

        assert_eq!(a.points, b.points);
        assert_ne!(a.points, c.points);
    }
}
