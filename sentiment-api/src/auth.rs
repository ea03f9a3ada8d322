use axum::http::HeaderMap;

/// Header accepted as an alternative to `Authorization: Bearer`
pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

/// Check the cron caller's secret.
///
/// Accepts `Authorization: Bearer <secret>` or `x-cron-secret: <secret>`.
/// With no secret configured every caller is rejected.
pub fn authorize_cron(headers: &HeaderMap, secret: Option<&str>) -> bool {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return false;
    };

    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let header = headers
        .get(CRON_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());

    [bearer, header]
        .into_iter()
        .flatten()
        .any(|candidate| constant_time_eq(candidate.trim().as_bytes(), secret.as_bytes()))
}

/// Constant-time comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
