//! Discord incoming-webhook sink

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{Notification, NotificationSink, SinkStatus};
use crate::FeedError;

/// Orange-red embed colour used for alert messages
const ALERT_EMBED_COLOR: u32 = 0xE8_4A_1C;

pub struct DiscordWebhookSink {
    http: Client,
    webhook_url: String,
}

impl DiscordWebhookSink {
    pub fn new(webhook_url: String) -> Result<Self, FeedError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| FeedError::RequestFailed(e.to_string()))?;

        Ok(Self { http, webhook_url })
    }
}

/// Webhook body with the message as content plus a titled embed
fn webhook_payload(notification: &Notification) -> serde_json::Value {
    json!({
        "content": notification.message,
        "embeds": [{
            "title": notification.title,
            "description": notification.message,
            "color": ALERT_EMBED_COLOR,
        }]
    })
}

#[async_trait]
impl NotificationSink for DiscordWebhookSink {
    fn name(&self) -> &str {
        "discord"
    }

    fn status(&self) -> SinkStatus {
        SinkStatus::Configured
    }

    async fn send(&self, notification: &Notification) -> Result<(), FeedError> {
        let response = self
            .http
            .post(&self.webhook_url)
            .json(&webhook_payload(notification))
            .send()
            .await
            // The webhook URL is a credential
            .map_err(|e| FeedError::from(e.without_url()))?;

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

        debug!("[discord] Delivered notification: {}", notification.title);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_payload_shape() {
        let payload = webhook_payload(&Notification::new("Price alert", "BTC is above 100000"));
        assert_eq!(payload["content"], "BTC is above 100000");
        assert_eq!(payload["embeds"][0]["title"], "Price alert");
        assert_eq!(payload["embeds"][0]["color"], ALERT_EMBED_COLOR);
    }
}
