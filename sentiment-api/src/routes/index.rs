//! Composite index endpoint

use axum::{extract::State, response::Json, routing::get, Router};
use sentiment_core::CompositeIndex;
use tracing::debug;

use crate::AppState;

/// Latest composite index. Always answers; degraded results carry
/// fallbacks in the breakdown.
async fn get_index(State(state): State<AppState>) -> Json<CompositeIndex> {
    let index = state.scorer.current().await;
    debug!("Serving composite index {} ({})", index.value, index.level);
    Json(index)
}

/// Create index routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/index", get(get_index))
}
