//! Per-client rate limiting for `/api`

use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::AppState;

pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Axum middleware: admit the request through the shared sliding-window
/// limiter or answer 429 with `Retry-After`.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let identifier = client_identifier(request.headers(), peer, &state.config.trusted_proxies);

    let decision = state.limiter.admit(
        &identifier,
        state.config.rate_limit_max,
        state.config.rate_limit_window,
    );

    if !decision.allowed {
        // Round up so clients never retry early
        let retry_after = decision.retry_after.as_secs()
            + u64::from(decision.retry_after.subsec_nanos() > 0);

        let body = json!({
            "error": "rate limit exceeded",
            "reset_at": decision.reset_at,
        });
        let mut response = (StatusCode::TOO_MANY_REQUESTS, axum::Json(body)).into_response();
        let headers = response.headers_mut();
        headers.insert("retry-after", HeaderValue::from(retry_after.max(1)));
        headers.insert(REMAINING_HEADER, HeaderValue::from(0u64));
        return response;
    }

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(REMAINING_HEADER, HeaderValue::from(decision.remaining as u64));
    response
}

/// First `x-forwarded-for` hop when the peer is a trusted proxy, else the
/// peer address
fn client_identifier(headers: &HeaderMap, peer: Option<IpAddr>, trusted: &[IpAddr]) -> String {
    let behind_proxy = peer.is_some_and(|ip| trusted.contains(&ip));
    let forwarded = if behind_proxy {
        headers.get("x-forwarded-for")
    } else {
        None
    };

    forwarded
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|ip| ip.to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
