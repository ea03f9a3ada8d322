//! Scheduler-triggered alert pass

use axum::{
    extract::State,
    http::HeaderMap,
    response::Json,
    routing::post,
    Router,
};
use tracing::{info, warn};

use sentiment_services::EvaluationSummary;

use crate::auth::authorize_cron;
use crate::error::ApiError;
use crate::AppState;

/// Run one alert pass for an external scheduler.
///
/// The secret is checked before anything is read or evaluated.
async fn check_alerts(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<EvaluationSummary>, ApiError> {
    if !authorize_cron(&headers, state.config.cron_secret.as_deref()) {
        warn!("Rejected unauthorized cron call");
        return Err(ApiError::Unauthorized);
    }

    let summary = state.monitor.run_once().await?;
    info!(
        "Cron alert pass: {} checked, {} triggered",
        summary.checked, summary.triggered
    );

    Ok(Json(summary))
}

/// Create cron routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/cron/check-alerts", post(check_alerts).get(check_alerts))
}
