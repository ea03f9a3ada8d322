//! Spot price sources for alert evaluation
//!
//! CoinGecko's simple price endpoint is free and needs no key for low
//! volumes; a demo key is sent when configured.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::FeedError;

const COINGECKO_API_BASE: &str = "https://api.coingecko.com/api/v3";

/// Upstream returning spot prices (USD) keyed by upper-case symbol
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn prices(&self, symbols: &[String]) -> Result<HashMap<String, f64>, FeedError>;
}

/// CoinGecko API client
pub struct CoinGeckoClient {
    http: Client,
    api_key: Option<String>,
}

/// `{"bitcoin": {"usd": 100500.0}}`
type SimplePriceResponse = HashMap<String, CurrencyQuote>;

#[derive(Debug, Deserialize)]
struct CurrencyQuote {
    usd: Option<f64>,
}

impl CoinGeckoClient {
    /// Create a new CoinGecko client
    pub fn new(api_key: Option<String>) -> Result<Self, FeedError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("SentimentIndex/1.0")
            .build()
            .map_err(|e| FeedError::RequestFailed(e.to_string()))?;

        Ok(Self { http, api_key })
    }
}

#[async_trait]
impl PriceSource for CoinGeckoClient {
    async fn prices(&self, symbols: &[String]) -> Result<HashMap<String, f64>, FeedError> {
        let mut ids_by_symbol: Vec<(&'static str, String)> = Vec::new();
        for symbol in symbols {
            match coingecko_id(symbol) {
                Some(id) => ids_by_symbol.push((id, symbol.to_uppercase())),
                None => warn!("[CoinGecko] No asset id known for symbol {}", symbol),
            }
        }

        if ids_by_symbol.is_empty() {
            return Ok(HashMap::new());
        }

        let ids: Vec<&str> = ids_by_symbol.iter().map(|(id, _)| *id).collect();
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies=usd",
            COINGECKO_API_BASE,
            ids.join(",")
        );
        debug!("[CoinGecko] Fetching prices from: {}", url);

        let mut request = self.http.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("x-cg-demo-api-key", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(FeedError::RateLimited);
        }
        if !status.is_success() {
            return Err(FeedError::ApiError {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let quotes: SimplePriceResponse = response
            .json()
            .await
            .map_err(|e| FeedError::ParseError(e.to_string()))?;

        Ok(map_quotes(&ids_by_symbol, &quotes))
    }
}

fn map_quotes(
    ids_by_symbol: &[(&'static str, String)],
    quotes: &SimplePriceResponse,
) -> HashMap<String, f64> {
    ids_by_symbol
        .iter()
        .filter_map(|(id, symbol)| {
            quotes
                .get(*id)
                .and_then(|q| q.usd)
                .filter(|p| p.is_finite())
                .map(|price| (symbol.clone(), price))
        })
        .collect()
}

/// Map a ticker symbol to its CoinGecko asset id
fn coingecko_id(symbol: &str) -> Option<&'static str> {
    match symbol.to_uppercase().as_str() {
        "BTC" => Some("bitcoin"),
        "ETH" => Some("ethereum"),
        "SOL" => Some("solana"),
        "BNB" => Some("binancecoin"),
        "XRP" => Some("ripple"),
        "ADA" => Some("cardano"),
        "DOGE" => Some("dogecoin"),
        "AVAX" => Some("avalanche-2"),
        "LINK" => Some("chainlink"),
        "DOT" => Some("polkadot"),
        _ => None,
    }
}

/// Price source returning fixed quotes
pub struct StaticPriceSource {
    prices: Option<HashMap<String, f64>>,
}

impl StaticPriceSource {
    pub fn new(prices: HashMap<String, f64>) -> Self {
        Self {
            prices: Some(prices),
        }
    }

    /// A price source that always fails
    pub fn unavailable() -> Self {
        Self { prices: None }
    }
}

#[async_trait]
impl PriceSource for StaticPriceSource {
    async fn prices(&self, symbols: &[String]) -> Result<HashMap<String, f64>, FeedError> {
        let prices = self
            .prices
            .as_ref()
            .ok_or_else(|| FeedError::NotConfigured("static prices".to_string()))?;

        Ok(symbols
            .iter()
            .filter_map(|s| {
                let symbol = s.to_uppercase();
                prices.get(&symbol).map(|p| (symbol, *p))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_quotes_by_symbol() {
        let quotes: SimplePriceResponse = serde_json::from_str(
            r#"{"bitcoin": {"usd": 100500.0}, "ethereum": {"usd": 3900.5}, "solana": {}}"#,
        )
        .unwrap();

        let ids = vec![
            ("bitcoin", "BTC".to_string()),
            ("ethereum", "ETH".to_string()),
            ("solana", "SOL".to_string()),
        ];

        let prices = map_quotes(&ids, &quotes);
        assert_eq!(prices.len(), 2);
        assert_eq!(prices["BTC"], 100500.0);
        assert_eq!(prices["ETH"], 3900.5);
        assert!(!prices.contains_key("SOL"));
    }

    #[test]
    fn test_coingecko_id_is_case_insensitive() {
        assert_eq!(coingecko_id("btc"), Some("bitcoin"));
        assert_eq!(coingecko_id("ETH"), Some("ethereum"));
        assert_eq!(coingecko_id("UNKNOWN"), None);
    }

    #[tokio::test]
    async fn test_static_prices_filter_requested_symbols() {
        let source = StaticPriceSource::new(HashMap::from([
            ("BTC".to_string(), 100500.0),
            ("ETH".to_string(), 3900.0),
        ]));

        let prices = source.prices(&["btc".to_string()]).await.unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices["BTC"], 100500.0);

        assert!(StaticPriceSource::unavailable().prices(&[]).await.is_err());
    }
}
