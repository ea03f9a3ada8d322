//! Error types for upstream feeds and notification sinks

use thiserror::Error;

/// Errors that can occur when talking to an external collaborator
#[derive(Debug, Error)]
pub enum FeedError {
    /// HTTP request failed
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// API returned an error response
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from API
        message: String,
    },

    /// Failed to parse API response
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The source has no endpoint or credentials configured
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimited,
}

impl From<reqwest::Error> for FeedError {
    fn from(e: reqwest::Error) -> Self {
        FeedError::RequestFailed(e.to_string())
    }
}
