//! Error types for the Azure Resource Manager client.

use serde::Deserialize;
use thiserror::Error;

/// Errors raised by [`super::AzureClient`].
#[derive(Debug, Error)]
pub enum AzureClientError {
    /// Raised when the client configuration is incomplete.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when a bearer token cannot be obtained.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Raised when the request never produced a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Raised when Resource Manager rejects a request.
    #[error("Azure API error {status} ({code}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Provider error code.
        code: String,
        /// Provider error message.
        message: String,
    },
    /// Raised when a response body cannot be decoded.
    #[error("unexpected response: {0}")]
    Decode(String),
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Builds an [`AzureClientError::Api`] from a non-success response body.
///
/// Bodies that do not follow the `{"error": {"code", "message"}}` envelope
/// are reported verbatim.
#[must_use]
pub fn api_error(status: u16, body: &str) -> AzureClientError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => AzureClientError::Api {
            status,
            code: envelope
                .error
                .code
                .unwrap_or_else(|| String::from("Unknown")),
            message: envelope.error.message.unwrap_or_default(),
        },
        Err(_) => AzureClientError::Api {
            status,
            code: String::from("Unknown"),
            message: body.trim().to_owned(),
        },
    }
}
