use std::env;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use sentiment_services::{DEFAULT_CHECK_INTERVAL, DEFAULT_HISTORY_CAPACITY};

/// Server configuration derived from environment variables.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub port: u16,
    pub db_path: PathBuf,
    /// Shared secret for the cron trigger. `None` rejects every cron call.
    pub cron_secret: Option<String>,

    // ── Rate limiting ──────────────────────────────────────────────
    pub rate_limit_max: usize,
    pub rate_limit_window: Duration,
    /// Peers whose `x-forwarded-for` header names the real client
    pub trusted_proxies: Vec<IpAddr>,

    // ── Alerts ─────────────────────────────────────────────────────
    pub alert_check_interval: Duration,
    pub price_symbols: Vec<String>,
    pub coingecko_api_key: Option<String>,

    // ── History ────────────────────────────────────────────────────
    pub history_max_points: usize,

    // ── Provider inputs ────────────────────────────────────────────
    pub onchain_metrics_url: Option<String>,
    pub macro_metrics_url: Option<String>,
    pub social_metrics_url: Option<String>,
    pub risk_metrics_url: Option<String>,
    pub risk_assets: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            db_path: PathBuf::from("data/sentiment.db"),
            cron_secret: None,
            rate_limit_max: 60,
            rate_limit_window: Duration::from_secs(60),
            trusted_proxies: Vec::new(),
            alert_check_interval: DEFAULT_CHECK_INTERVAL,
            price_symbols: csv("BTC,ETH,SOL"),
            coingecko_api_key: None,
            history_max_points: DEFAULT_HISTORY_CAPACITY,
            onchain_metrics_url: None,
            macro_metrics_url: None,
            social_metrics_url: None,
            risk_metrics_url: None,
            risk_assets: csv("BTC,ETH"),
        }
    }
}

fn env_str(name: &str, default: &str) -> String {
    env_opt(name).unwrap_or_else(|| default.to_string())
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Comma-separated IP addresses; unparsable entries are dropped
fn ip_list(raw: &str) -> Vec<IpAddr> {
    raw.split(',').filter_map(|s| s.trim().parse().ok()).collect()
}

fn csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            port: env_u16("SERVER_PORT", defaults.port),
            db_path: PathBuf::from(env_str("SENTIMENT_DB_PATH", "data/sentiment.db")),
            cron_secret: env_opt("CRON_SECRET"),

            rate_limit_max: env_u64("RATE_LIMIT_MAX", defaults.rate_limit_max as u64) as usize,
            rate_limit_window: Duration::from_secs(
                env_u64("RATE_LIMIT_WINDOW_SECS", defaults.rate_limit_window.as_secs()).max(1),
            ),
            trusted_proxies: ip_list(&env_str("TRUSTED_PROXIES", "")),

            alert_check_interval: Duration::from_secs(
                env_u64("ALERT_CHECK_INTERVAL_SECS", defaults.alert_check_interval.as_secs()).max(1),
            ),
            price_symbols: csv(&env_str("PRICE_SYMBOLS", "BTC,ETH,SOL")),
            coingecko_api_key: env_opt("COINGECKO_API_KEY"),

            history_max_points: env_u64("HISTORY_MAX_POINTS", defaults.history_max_points as u64)
                .max(1) as usize,

            onchain_metrics_url: env_opt("ONCHAIN_METRICS_URL"),
            macro_metrics_url: env_opt("MACRO_METRICS_URL"),
            social_metrics_url: env_opt("SOCIAL_METRICS_URL"),
            risk_metrics_url: env_opt("RISK_METRICS_URL"),
            risk_assets: csv(&env_str("RISK_ASSETS", "BTC,ETH")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_normalizes_symbols() {
        assert_eq!(csv(" btc, eth ,,sol"), vec!["BTC", "ETH", "SOL"]);
        assert!(csv("").is_empty());
    }

    #[test]
    fn test_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.port, 3001);
        assert_eq!(config.rate_limit_max, 60);
        assert_eq!(config.history_max_points, 168);
        assert_eq!(config.alert_check_interval, Duration::from_secs(300));
        assert!(config.cron_secret.is_none());
        assert!(config.trusted_proxies.is_empty());
    }

    #[test]
    fn test_ip_list_skips_garbage() {
        let ips = ip_list("10.0.0.1, ::1,not-an-ip,,");
        assert_eq!(ips, vec!["10.0.0.1".parse::<IpAddr>().unwrap(), "::1".parse().unwrap()]);
        assert!(ip_list("").is_empty());
    }
}
