//! Error types for the WorkOS client.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when talking to the destination directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Rate limited.
    #[error("rate limited{}", match (endpoint, retry_after_secs) {
        (Some(ep), Some(secs)) => format!(" on {} (retry after {}s)", ep, secs),
        (Some(ep), None) => format!(" on {}", ep),
        (None, Some(secs)) => format!(" (retry after {}s)", secs),
        (None, None) => String::new(),
    })]
    RateLimited {
        /// The endpoint that was rate limited (optional).
        endpoint: Option<String>,
        /// Seconds to wait before retrying (from Retry-After header, optional).
        retry_after_secs: Option<u64>,
    },

    /// The entity already exists (duplicate email, external id or membership).
    #[error("conflict: {message}")]
    Conflict {
        code: Option<String>,
        message: String,
    },

    /// Entity not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other error response from the API.
    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Invalid response from server.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl DirectoryError {
    /// Whether this error is the destination asking us to slow down.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, DirectoryError::RateLimited { .. })
    }

    /// Whether this error means the entity already exists.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DirectoryError::Conflict { .. })
    }

    /// The server-provided wait before retrying, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            DirectoryError::RateLimited {
                retry_after_secs: Some(secs),
                ..
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}
