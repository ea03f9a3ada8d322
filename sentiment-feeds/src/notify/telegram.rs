//! Telegram bot sink

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{Notification, NotificationSink, SinkStatus, TelegramConfig};
use crate::FeedError;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

pub struct TelegramSink {
    http: Client,
    config: TelegramConfig,
    api_base: String,
}

/// Envelope of every Bot API response
#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
}

impl TelegramSink {
    pub fn new(config: TelegramConfig) -> Result<Self, FeedError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| FeedError::RequestFailed(e.to_string()))?;

        Ok(Self {
            http,
            config,
            api_base: TELEGRAM_API_BASE.to_string(),
        })
    }
}

/// The request URL carries the bot token, so it never reaches an error message
fn redacted(e: reqwest::Error) -> FeedError {
    FeedError::from(e.without_url())
}

fn message_text(notification: &Notification) -> String {
    format!("{}\n\n{}", notification.title, notification.message)
}

#[async_trait]
impl NotificationSink for TelegramSink {
    fn name(&self) -> &str {
        "telegram"
    }

    fn status(&self) -> SinkStatus {
        SinkStatus::Configured
    }

    async fn send(&self, notification: &Notification) -> Result<(), FeedError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.config.bot_token);

        let response = self
            .http
            .post(&url)
            .json(&json!({
                "chat_id": self.config.chat_id,
                "text": message_text(notification),
                "disable_web_page_preview": true,
            }))
            .send()
            .await
            .map_err(redacted)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(FeedError::RateLimited);
        }

        let body: TelegramResponse = response
            .json()
            .await
            .map_err(|e| FeedError::ParseError(e.without_url().to_string()))?;

        if !body.ok {
            return Err(FeedError::ApiError {
                status: status.as_u16(),
                message: body.description.unwrap_or_default(),
            });
        }

        debug!("[telegram] Delivered notification: {}", notification.title);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_text_puts_title_first() {
        let text = message_text(&Notification::new("Price alert", "BTC is above 100000"));
        assert_eq!(text, "Price alert\n\nBTC is above 100000");
    }

    #[tokio::test]
    async fn test_failed_send_does_not_leak_token() {
        let mut sink = TelegramSink::new(TelegramConfig {
            bot_token: "123456:SECRET-TOKEN".to_string(),
            chat_id: "42".to_string(),
        })
        .unwrap();
        // Nothing listens on port 1
        sink.api_base = "http://127.0.0.1:1".to_string();

        let err = sink
            .send(&Notification::new("Price alert", "BTC is above 100000"))
            .await
            .unwrap_err();

        assert!(matches!(err, FeedError::RequestFailed(_)));
        assert!(!err.to_string().contains("SECRET-TOKEN"));
    }
}
