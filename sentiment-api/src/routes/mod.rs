//! API route definitions

mod alerts;
mod cron;
mod health;
mod history;
mod index;

use axum::Router;
use crate::AppState;

/// Create all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(index::routes())
        .merge(history::routes())
        .merge(alerts::routes())
        .merge(cron::routes())
        .merge(health::routes())
}
