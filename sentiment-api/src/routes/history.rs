//! Index history endpoint

use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use sentiment_core::{HistoryPoint, HistorySeries};
use sentiment_services::{demo_history, downsample};

use crate::error::ApiError;
use crate::state::HISTORY_CACHE_TTL;
use crate::AppState;

pub const DEFAULT_DAYS: u32 = 7;
pub const MAX_DAYS: u32 = 90;

/// Query parameters for index history
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Look-back period in days (1 - 90)
    pub days: Option<u32>,
}

/// Stored snapshots over the requested period, downsampled.
///
/// When the store cannot be read, the scorer's in-memory history answers
/// instead. Falls back to a demo series (`is_demo: true`) while nothing has
/// been recorded for the period yet.
async fn get_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistorySeries>, ApiError> {
    let days = params.days.unwrap_or(DEFAULT_DAYS);
    if !(1..=MAX_DAYS).contains(&days) {
        return Err(ApiError::BadRequest(format!(
            "days must be between 1 and {}",
            MAX_DAYS
        )));
    }

    let cache_key = format!("history:{}", days);
    if let Some(series) = state.history_cache.get(&cache_key) {
        return Ok(Json(series));
    }

    let now = Utc::now();
    let cutoff = now - Duration::days(i64::from(days));
    let (rows, from_store) = match state.snapshots.snapshots_since(cutoff) {
        Ok(rows) => (rows, true),
        Err(e) => {
            warn!("Snapshot store unavailable, serving in-memory history: {}", e);
            (state.scorer.history().since(cutoff), false)
        }
    };
    let max_points = state.config.history_max_points;

    let series = if rows.is_empty() {
        info!("No stored history for {} days, serving demo series", days);
        // Stable within the hour so repeated requests agree
        let seed = (now.timestamp() / 3600) as u64 ^ u64::from(days);
        let demo = demo_history(days, seed, now, &state.scorer.config().thresholds);
        HistorySeries {
            points: downsample(&demo.points, max_points),
            is_demo: true,
        }
    } else {
        let points: Vec<HistoryPoint> = rows.iter().map(HistoryPoint::from).collect();
        HistorySeries {
            points: downsample(&points, max_points),
            is_demo: false,
        }
    };

    if from_store {
        state
            .history_cache
            .set(cache_key, series.clone(), HISTORY_CACHE_TTL);
    }
    Ok(Json(series))
}

/// Create history routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/index/history", get(get_history))
}
