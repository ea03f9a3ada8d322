//! Error types shared across the sentiment engine

use thiserror::Error;

/// Engine-wide error type
#[derive(Error, Debug)]
pub enum SentimentError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SentimentError {
    pub fn validation(msg: impl Into<String>) -> Self {
        SentimentError::Validation(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        SentimentError::Parse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        SentimentError::Config(msg.into())
    }
}
