//! Error types for the Clerk client.

use thiserror::Error;

/// Errors that can occur when exporting from Clerk.
#[derive(Debug, Error)]
pub enum ClerkError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Writing the snapshot failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Rate limited.
    #[error("rate limited on {endpoint}{}", retry_after_secs.map(|s| format!(" (retry after {}s)", s)).unwrap_or_default())]
    RateLimited {
        endpoint: String,
        retry_after_secs: Option<u64>,
    },

    /// Error response from the API.
    #[error("API error on {endpoint} ({status}): {message}")]
    Api {
        endpoint: String,
        status: u16,
        message: String,
    },

    /// Invalid response from server.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ClerkError {
    /// Check if an error is transient and worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            ClerkError::Http(e) => e.is_timeout() || e.is_connect(),
            ClerkError::Api { status, .. } => *status >= 500,
            ClerkError::RateLimited { .. } => true,
            _ => false,
        }
    }
}
