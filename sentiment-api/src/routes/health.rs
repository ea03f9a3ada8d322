//! Health check endpoints

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::Serialize;

use sentiment_feeds::SinkStatus;
use sentiment_services::RateLimiterStats;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    providers: Vec<String>,
    history_points: usize,
    stored_snapshots: Option<usize>,
    notifier: SinkStatus,
    rate_limiter: RateLimiterStats,
}

/// Health check handler
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    // A failing snapshot store is the only thing that degrades the service
    let stored_snapshots = state.snapshots.count().ok();

    let status = if stored_snapshots.is_some() {
        "healthy"
    } else {
        "degraded"
    };

    let response = HealthResponse {
        status: status.to_string(),
        providers: state
            .scorer
            .provider_names()
            .into_iter()
            .map(str::to_string)
            .collect(),
        history_points: state.scorer.history().len(),
        stored_snapshots,
        notifier: state.monitor.notifier_status(),
        rate_limiter: state.limiter.stats(),
    };

    let code = if status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (code, Json(response))
}

/// Simple liveness check (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Create health routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
}
