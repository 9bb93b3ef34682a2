//! Transport error types.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when talking to a chat platform API.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The bot token was rejected.
    #[error("authentication failed: {0}")]
    Unauthorized(String),

    /// The API returned an error response.
    #[error("API error (code {status}): {message}")]
    Api { status: i64, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    Network(String),

    /// The response body was not what the API documents.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Map a `reqwest` send error, given the client timeout in seconds.
    pub(crate) fn from_request(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(timeout_secs)
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

/// Build the HTTP client shared by the platform adapters.
pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, TransportError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| TransportError::Network(format!("failed to build HTTP client: {e}")))
}
