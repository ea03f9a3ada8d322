//! Notification transport configuration

use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;

/// Telegram bot credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token from @BotFather
    pub bot_token: String,
    /// Target chat or channel id
    pub chat_id: String,
}

/// Configuration for all notification transports
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Discord incoming webhook URL
    pub discord_webhook_url: Option<String>,
    pub telegram: Option<TelegramConfig>,
}

impl NotifierConfig {
    /// Load notifier configuration from environment variables
    ///
    /// Reads:
    /// - DISCORD_WEBHOOK_URL: Discord incoming webhook
    /// - TELEGRAM_BOT_TOKEN + TELEGRAM_CHAT_ID: Telegram bot delivery
    ///
    /// Unset variables simply leave that transport disabled. A transport
    /// with incomplete or invalid credentials is disabled with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, reading values through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let discord_webhook_url = match get("DISCORD_WEBHOOK_URL") {
            Some(url) if !url.starts_with("https://") => {
                warn!("DISCORD_WEBHOOK_URL must be an https URL, Discord notifications disabled");
                None
            }
            other => other,
        };

        let telegram = match (get("TELEGRAM_BOT_TOKEN"), get("TELEGRAM_CHAT_ID")) {
            (Some(bot_token), Some(chat_id)) => Some(TelegramConfig { bot_token, chat_id }),
            (None, None) => None,
            (Some(_), None) => {
                warn!("TELEGRAM_BOT_TOKEN is set but TELEGRAM_CHAT_ID is not, Telegram notifications disabled");
                None
            }
            (None, Some(_)) => {
                warn!("TELEGRAM_CHAT_ID is set but TELEGRAM_BOT_TOKEN is not, Telegram notifications disabled");
                None
            }
        };

        Self {
            discord_webhook_url,
            telegram,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_nothing_configured() {
        let config = NotifierConfig::from_lookup(lookup(&[]));
        assert!(config.discord_webhook_url.is_none());
        assert!(config.telegram.is_none());
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let config = NotifierConfig::from_lookup(lookup(&[("DISCORD_WEBHOOK_URL", "  ")]));
        assert!(config.discord_webhook_url.is_none());
    }

    #[test]
    fn test_parse_both_transports() {
        let config = NotifierConfig::from_lookup(lookup(&[
            ("DISCORD_WEBHOOK_URL", "https://discord.com/api/webhooks/1/abc"),
            ("TELEGRAM_BOT_TOKEN", "123:token"),
            ("TELEGRAM_CHAT_ID", "-100200"),
        ]));

        assert_eq!(
            config.discord_webhook_url.as_deref(),
            Some("https://discord.com/api/webhooks/1/abc")
        );
        let telegram = config.telegram.unwrap();
        assert_eq!(telegram.chat_id, "-100200");
    }

    #[test]
    fn test_half_set_telegram_is_disabled() {
        let config = NotifierConfig::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "123:token")]));
        assert!(config.telegram.is_none());

        let config = NotifierConfig::from_lookup(lookup(&[("TELEGRAM_CHAT_ID", "-100200")]));
        assert!(config.telegram.is_none());
    }

    #[test]
    fn test_half_set_telegram_keeps_discord() {
        let config = NotifierConfig::from_lookup(lookup(&[
            ("DISCORD_WEBHOOK_URL", "https://discord.com/api/webhooks/1/abc"),
            ("TELEGRAM_CHAT_ID", "-100200"),
        ]));

        assert!(config.telegram.is_none());
        assert!(config.discord_webhook_url.is_some());
    }

    #[test]
    fn test_discord_requires_https() {
        let config = NotifierConfig::from_lookup(lookup(&[("DISCORD_WEBHOOK_URL", "http://insecure")]));
        assert!(config.discord_webhook_url.is_none());
    }
}
