//! Error types for the API client

use thiserror::Error;

/// API client error
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request never produced a response (DNS, connect, timeout)
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Server rejected request ({status}): {}", .reason.as_deref().unwrap_or("no reason given"))]
    Rejected { status: u16, reason: Option<String> },

    /// Response body did not have the expected shape
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Client could not be constructed from its configuration
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl ApiError {
    /// Whether the server refused the identity token
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Rejected { status: 401, .. })
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Malformed(err.to_string())
    }
}

/// Result type for API operations
pub type Result<T> = std::result::Result<T, ApiError>;
