//! Alert definition endpoints

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use sentiment_core::{AlertDefinition, NewAlert};

use crate::error::ApiError;
use crate::AppState;

/// Query parameters for listing alerts
#[derive(Debug, Deserialize)]
pub struct ListAlertsQuery {
    pub owner_id: Option<String>,
}

/// Response for listing alerts
#[derive(Debug, Serialize)]
pub struct AlertsResponse {
    pub alerts: Vec<AlertDefinition>,
    pub count: usize,
}

/// Record a new pending alert
async fn create_alert(
    State(state): State<AppState>,
    payload: Result<Json<NewAlert>, JsonRejection>,
) -> Result<(StatusCode, Json<AlertDefinition>), ApiError> {
    let Json(new_alert) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let alert = state.alerts.create_alert(new_alert)?;
    info!(
        "Created alert {} for {}: {} {} {}",
        alert.id, alert.owner_id, alert.symbol_or_metric, alert.condition, alert.target_value
    );

    Ok((StatusCode::CREATED, Json(alert)))
}

/// List one owner's alerts, newest first
async fn list_alerts(
    State(state): State<AppState>,
    Query(params): Query<ListAlertsQuery>,
) -> Result<Json<AlertsResponse>, ApiError> {
    let owner_id = params
        .owner_id
        .filter(|o| !o.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("owner_id is required".to_string()))?;

    let alerts = state.alerts.alerts_for_owner(&owner_id)?;
    let count = alerts.len();

    Ok(Json(AlertsResponse { alerts, count }))
}

/// Create alert routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/alerts", get(list_alerts).post(create_alert))
}
