//! Outbound notification sinks
//!
//! A sink accepts a pre-formatted message and reports success or failure.
//! Missing credentials never crash the engine: they produce a `NoopSink`
//! that reports `SinkStatus::Unconfigured`.

mod config;
mod discord;
mod telegram;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::FeedError;

pub use config::{NotifierConfig, TelegramConfig};
pub use discord::DiscordWebhookSink;
pub use telegram::TelegramSink;

/// Whether a sink can actually deliver messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkStatus {
    Configured,
    Unconfigured,
}

/// A formatted message ready for delivery
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Destination for notifications
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    fn status(&self) -> SinkStatus;

    async fn send(&self, notification: &Notification) -> Result<(), FeedError>;
}

/// Sink used when no transport is configured; accepts and drops everything
#[derive(Debug, Default)]
pub struct NoopSink;

#[async_trait]
impl NotificationSink for NoopSink {
    fn name(&self) -> &str {
        "noop"
    }

    fn status(&self) -> SinkStatus {
        SinkStatus::Unconfigured
    }

    async fn send(&self, notification: &Notification) -> Result<(), FeedError> {
        debug!("[noop] Dropping notification: {}", notification.title);
        Ok(())
    }
}

/// Delivers to every inner sink; succeeds if at least one delivery succeeds
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl NotificationSink for FanoutSink {
    fn name(&self) -> &str {
        "fanout"
    }

    fn status(&self) -> SinkStatus {
        if self.sinks.iter().any(|s| s.status() == SinkStatus::Configured) {
            SinkStatus::Configured
        } else {
            SinkStatus::Unconfigured
        }
    }

    async fn send(&self, notification: &Notification) -> Result<(), FeedError> {
        let results = join_all(self.sinks.iter().map(|s| s.send(notification))).await;

        let mut last_error = None;
        let mut delivered = 0;
        for (sink, result) in self.sinks.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("[{}] Notification delivery failed: {}", sink.name(), e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if delivered == 0 => Err(e),
            _ => Ok(()),
        }
    }
}

/// Build the notification sink described by `config`.
///
/// A transport whose client cannot be built is skipped with a warning; with
/// nothing left the result is a [`NoopSink`].
pub fn build_notifier(config: &NotifierConfig) -> Arc<dyn NotificationSink> {
    let mut sinks: Vec<Arc<dyn NotificationSink>> = Vec::new();

    if let Some(url) = &config.discord_webhook_url {
        match DiscordWebhookSink::new(url.clone()) {
            Ok(sink) => sinks.push(Arc::new(sink)),
            Err(e) => warn!("Discord notifications disabled: {}", e),
        }
    }
    if let Some(telegram) = &config.telegram {
        match TelegramSink::new(telegram.clone()) {
            Ok(sink) => sinks.push(Arc::new(sink)),
            Err(e) => warn!("Telegram notifications disabled: {}", e),
        }
    }

    let sink: Arc<dyn NotificationSink> = match sinks.len() {
        0 => {
            info!("No notification transport configured - alerts will be recorded only");
            Arc::new(NoopSink)
        }
        1 => sinks.remove(0),
        n => {
            info!("Notifications fan out to {} transports", n);
            Arc::new(FanoutSink::new(sinks))
        }
    };

    sink
}
