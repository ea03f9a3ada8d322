//! HTTP handler tests for the sentiment API.
//!
//! Every test builds the real router around in-memory stores and stub
//! upstreams, then drives it with `tower::ServiceExt::oneshot`.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use sentiment_api::{build_router, ApiConfig, AppState};
use sentiment_core::{AlertCondition, HistorySnapshot, NewAlert, SentimentLevel};
use sentiment_feeds::{NoopSink, StaticPriceSource};
use sentiment_services::{
    AlertStorage, CompositeConfig, CompositeScorer, ProviderError, SnapshotStorage, SubScore,
    SubScoreProvider,
};

const SECRET: &str = "cron-secret";

struct FixedProvider {
    name: &'static str,
    score: f64,
}

#[async_trait]
impl SubScoreProvider for FixedProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn score(&self) -> Result<SubScore, ProviderError> {
        Ok(SubScore::from_score(self.score))
    }
}

struct FailingProvider;

#[async_trait]
impl SubScoreProvider for FailingProvider {
    fn name(&self) -> &str {
        "b"
    }

    async fn score(&self) -> Result<SubScore, ProviderError> {
        Err(ProviderError::MissingInput("vix".to_string()))
    }
}

struct TestApp {
    router: Router,
    state: AppState,
}

fn test_config() -> ApiConfig {
    ApiConfig {
        cron_secret: Some(SECRET.to_string()),
        rate_limit_max: 1000,
        rate_limit_window: Duration::from_secs(60),
        price_symbols: vec!["BTC".to_string()],
        ..ApiConfig::default()
    }
}

fn build_app(config: ApiConfig, b: Arc<dyn SubScoreProvider>) -> TestApp {
    let snapshots = Arc::new(SnapshotStorage::new_in_memory().unwrap());
    build_app_with_snapshots(config, b, snapshots)
}

fn build_app_with_snapshots(
    config: ApiConfig,
    b: Arc<dyn SubScoreProvider>,
    snapshots: Arc<SnapshotStorage>,
) -> TestApp {
    let composite = CompositeConfig {
        weights: [("a".to_string(), 0.4), ("b".to_string(), 0.6)]
            .into_iter()
            .collect(),
        ..CompositeConfig::default()
    };

    let scorer = CompositeScorer::builder(composite)
        .provider(Arc::new(FixedProvider { name: "a", score: 80.0 }))
        .provider(b)
        .snapshot_storage(Arc::clone(&snapshots))
        .build()
        .unwrap();

    let prices = StaticPriceSource::new(HashMap::from([("BTC".to_string(), 100500.0)]));

    let state = AppState::new(
        config,
        Arc::new(scorer),
        snapshots,
        Arc::new(AlertStorage::new_in_memory().unwrap()),
        Arc::new(NoopSink),
        Arc::new(prices),
    );

    TestApp {
        router: build_router(state.clone()),
        state,
    }
}

fn default_app() -> TestApp {
    build_app(test_config(), Arc::new(FixedProvider { name: "b", score: 60.0 }))
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn cron_request(auth: Option<(&str, &str)>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri("/api/cron/check-alerts");
    if let Some((name, value)) = auth {
        builder = builder.header(name, value);
    }
    builder.body(Body::empty()).unwrap()
}

const PROXY: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000);

/// Liveness request arriving from `peer`, optionally carrying `x-forwarded-for`
fn live_request(peer: SocketAddr, forwarded_for: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .uri("/api/health/live")
        .extension(ConnectInfo(peer));
    if let Some(value) = forwarded_for {
        builder = builder.header("x-forwarded-for", value);
    }
    builder.body(Body::empty()).unwrap()
}

fn btc_alert() -> NewAlert {
    NewAlert {
        metric: "BTC".to_string(),
        condition: AlertCondition::Above,
        target_value: 100000.0,
        owner_id: "user-1".to_string(),
    }
}

// ============================================================================
// Index
// ============================================================================

#[tokio::test]
async fn test_index_returns_weighted_composite() {
    let app = default_app();

    let (status, body) = send(&app.router, get("/api/index")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["index"], 68.0);
    assert_eq!(body["level"], "GREED");
    assert_eq!(body["breakdown"]["a"]["score"], 80.0);
    assert_eq!(body["breakdown"]["b"]["is_fallback"], false);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_index_with_failing_provider_still_answers() {
    let app = build_app(test_config(), Arc::new(FailingProvider));

    let (status, body) = send(&app.router, get("/api/index")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["index"], 62.0);
    assert_eq!(body["breakdown"]["b"]["is_fallback"], true);
    assert_eq!(body["breakdown"]["b"]["signal"], "UNKNOWN");
}

// ============================================================================
// History
// ============================================================================

#[tokio::test]
async fn test_history_without_data_is_demo() {
    let app = default_app();

    let (status, body) = send(&app.router, get("/api/index/history?days=7")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_demo"], true);
    let points = body["points"].as_array().unwrap();
    assert!(!points.is_empty());
    assert!(points.len() <= 168);
    assert!(points[0]["date"].is_string());
}

#[tokio::test]
async fn test_history_uses_stored_snapshots() {
    let app = default_app();
    for hours_ago in [30, 20, 10] {
        let at = Utc::now() - chrono::Duration::hours(hours_ago);
        app.state
            .snapshots
            .store_snapshot(&HistorySnapshot::new(25.0, SentimentLevel::Fear, at))
            .unwrap();
    }

    let (status, body) = send(&app.router, get("/api/index/history?days=1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_demo"], false);
    assert_eq!(body["points"].as_array().unwrap().len(), 2);
    assert_eq!(body["points"][0]["index"], 25.0);
    assert_eq!(body["points"][0]["level"], "FEAR");
}

#[tokio::test]
async fn test_history_survives_unreadable_store() {
    let db_path = std::env::temp_dir().join(format!("sentiment-api-history-{}.db", std::process::id()));
    let _ = std::fs::remove_file(&db_path);
    let snapshots = Arc::new(SnapshotStorage::new(&db_path).unwrap());
    let app = build_app_with_snapshots(
        test_config(),
        Arc::new(FixedProvider { name: "b", score: 60.0 }),
        snapshots,
    );

    rusqlite::Connection::open(&db_path)
        .unwrap()
        .execute_batch("DROP TABLE index_snapshots;")
        .unwrap();

    // Nothing in memory yet: demo series rather than a 500
    let (status, body) = send(&app.router, get("/api/index/history?days=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_demo"], true);

    // A computed index is served from the in-memory history
    let (status, _) = send(&app.router, get("/api/index")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app.router, get("/api/index/history?days=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_demo"], false);
    assert_eq!(body["points"].as_array().unwrap().len(), 1);
    assert_eq!(body["points"][0]["index"], 68.0);

    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_history_rejects_out_of_range_days() {
    let app = default_app();

    let (status, body) = send(&app.router, get("/api/index/history?days=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = send(&app.router, get("/api/index/history?days=91")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Alerts
// ============================================================================

#[tokio::test]
async fn test_create_alert_returns_201() {
    let app = default_app();

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/alerts",
            json!({"metric": "btc", "condition": "ABOVE", "target_value": 100000, "owner_id": "user-1"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["symbol_or_metric"], "BTC");
    assert_eq!(body["condition"], "above");
    assert_eq!(body["triggered"], false);

    let (status, body) = send(&app.router, get("/api/alerts?owner_id=user-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn test_create_alert_rejects_invalid_input() {
    let app = default_app();

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/alerts",
            json!({"metric": "", "condition": "above", "target_value": 1, "owner_id": "user-1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = send(
        &app.router,
        post_json("/api/alerts", json!({"metric": "BTC", "condition": "sideways"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app.router, get("/api/alerts")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(app.state.alerts.pending_alerts().unwrap().is_empty());
}

// ============================================================================
// Cron
// ============================================================================

#[tokio::test]
async fn test_cron_triggers_alerts_once() {
    let app = default_app();
    app.state.alerts.create_alert(btc_alert()).unwrap();

    let bearer = format!("Bearer {}", SECRET);
    let (status, body) = send(
        &app.router,
        cron_request(Some(("authorization", bearer.as_str()))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"checked": 1, "triggered": 1}));

    let (status, body) = send(&app.router, cron_request(Some(("x-cron-secret", SECRET)))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"checked": 0, "triggered": 0}));
}

#[tokio::test]
async fn test_cron_unauthorized_has_no_side_effects() {
    let app = default_app();
    app.state.alerts.create_alert(btc_alert()).unwrap();

    let (status, body) = send(&app.router, cron_request(Some(("x-cron-secret", "wrong")))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = send(&app.router, cron_request(None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(app.state.alerts.pending_alerts().unwrap().len(), 1);
    // The scorer was never consulted either
    assert!(app.state.scorer.history().is_empty());
}

#[tokio::test]
async fn test_cron_without_configured_secret_is_rejected() {
    let config = ApiConfig {
        cron_secret: None,
        ..test_config()
    };
    let app = build_app(config, Arc::new(FixedProvider { name: "b", score: 60.0 }));
    app.state.alerts.create_alert(btc_alert()).unwrap();

    let (status, _) = send(&app.router, cron_request(Some(("x-cron-secret", SECRET)))).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.state.alerts.pending_alerts().unwrap().len(), 1);
}

// ============================================================================
// Rate limiting and health
// ============================================================================

#[tokio::test]
async fn test_rate_limit_returns_429() {
    let config = ApiConfig {
        rate_limit_max: 2,
        trusted_proxies: vec![PROXY.ip()],
        ..test_config()
    };
    let app = build_app(config, Arc::new(FixedProvider { name: "b", score: 60.0 }));

    let request = || live_request(PROXY, Some("203.0.113.9"));

    for expected_remaining in ["1", "0"] {
        let response = app.router.clone().oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["x-ratelimit-remaining"].to_str().unwrap(),
            expected_remaining
        );
    }

    let response = app.router.clone().oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));

    // Other clients behind the same proxy are unaffected
    let response = app
        .router
        .clone()
        .oneshot(live_request(PROXY, Some("198.51.100.1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit_ignores_spoofed_forwarded_for() {
    let config = ApiConfig {
        rate_limit_max: 2,
        ..test_config()
    };
    let app = build_app(config, Arc::new(FixedProvider { name: "b", score: 60.0 }));
    let client = SocketAddr::from(([198, 51, 100, 20], 51000));

    // A fresh header value per request does not buy a fresh window
    let mut statuses = Vec::new();
    for forwarded in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
        let response = app
            .router
            .clone()
            .oneshot(live_request(client, Some(forwarded)))
            .await
            .unwrap();
        statuses.push(response.status());
    }

    assert_eq!(
        statuses,
        vec![StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
    );
}

#[tokio::test]
async fn test_health_reports_services() {
    let app = default_app();

    let (status, body) = send(&app.router, get("/api/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["providers"], json!(["a", "b"]));
    assert_eq!(body["notifier"], "unconfigured");
    assert_eq!(body["stored_snapshots"], 0);
}
