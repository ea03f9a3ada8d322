//! Composite Sentiment Index API
//!
//! HTTP surface over the scorer, history and alert services. The binary in
//! `main.rs` wires real upstreams; tests build the same router around
//! in-memory stores.

pub mod auth;
pub mod config;
pub mod error;
pub mod rate_limit;
mod routes;
pub mod state;

use std::sync::Arc;

use axum::{
    http::{header, Method},
    middleware, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use sentiment_feeds::{FeedError, JsonMetricsClient};
use sentiment_services::{
    MacroProvider, OnChainProvider, RiskProvider, SocialProvider, SubScoreProvider,
};

pub use config::ApiConfig;
pub use error::ApiError;
pub use state::AppState;

/// Build the full router: `/api` routes behind the rate limiter, CORS and
/// request tracing.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::HeaderName::from_static(auth::CRON_SECRET_HEADER),
        ]);

    let api = routes::api_routes().layer(middleware::from_fn_with_state(
        state.clone(),
        rate_limit::rate_limit,
    ));

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// The four sub-score providers, each reading its own metrics endpoint.
///
/// An endpoint left unconfigured yields a provider that always falls back.
pub fn build_providers(config: &ApiConfig) -> Result<Vec<Arc<dyn SubScoreProvider>>, FeedError> {
    let onchain = JsonMetricsClient::new(OnChainProvider::NAME, config.onchain_metrics_url.clone())?;
    let macro_source = JsonMetricsClient::new(MacroProvider::NAME, config.macro_metrics_url.clone())?;
    let social = JsonMetricsClient::new(SocialProvider::NAME, config.social_metrics_url.clone())?;
    let risk = JsonMetricsClient::new(RiskProvider::NAME, config.risk_metrics_url.clone())?;

    Ok(vec![
        Arc::new(OnChainProvider::new(Arc::new(onchain))),
        Arc::new(MacroProvider::new(Arc::new(macro_source))),
        Arc::new(SocialProvider::new(Arc::new(social))),
        Arc::new(RiskProvider::new(Arc::new(risk), config.risk_assets.clone())),
    ])
}
