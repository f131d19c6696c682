//! Error types for Okapi requests.
//!
//! Every non-success response is classified once, here, so callers can decide
//! between retrying, resolving a conflict, or failing without re-reading
//! status codes.

use thiserror::Error;

/// Result alias for Okapi client operations.
pub type FolioClientResult<T> = Result<T, FolioClientError>;

/// Error returned by [`crate::client::OkapiClient`] operations.
#[derive(Debug, Error)]
pub enum FolioClientError {
    /// The request never produced a response (connect failure, timeout, reset).
    #[error("Okapi unreachable: {0}")]
    Unreachable(String),

    /// 401/403 from Okapi. The token is missing, expired or lacks permissions.
    #[error("authentication failed: {0}")]
    AuthError(String),

    /// 404 on a single-record request.
    #[error("not found: {0}")]
    NotFound(String),

    /// 422 (or 409): FOLIO rejected the payload, usually because a unique
    /// field already exists.
    #[error("validation rejected (HTTP {status}): {detail}")]
    Validation { status: u16, detail: String },

    /// 429 from Okapi.
    #[error("rate limited by Okapi (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Any other non-success status.
    #[error("HTTP {status}: {detail}")]
    Http { status: u16, detail: String },

    /// 2xx response whose body is not what the endpoint promises.
    #[error("malformed response: {0}")]
    ParseError(String),

    /// Client construction or request configuration problem.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Retry policy gave up on a retryable error.
    #[error("{message}")]
    MaxRetriesExceeded { attempts: u32, message: String },
}

impl FolioClientError {
    /// Network-level and rate-limit failures that may succeed when repeated.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FolioClientError::Unreachable(_) | FolioClientError::RateLimited { .. }
        )
    }

    /// 5xx responses.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, FolioClientError::Http { status, .. } if *status >= 500)
    }

    /// 422/409: the server refused the write as a duplicate or invalid record.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, FolioClientError::Validation { .. })
    }

    /// 429 and 503: the server is asking callers to slow down.
    #[must_use]
    pub fn is_backpressure(&self) -> bool {
        match self {
            FolioClientError::RateLimited { .. } => true,
            FolioClientError::Http { status, .. } => *status == 503,
            _ => false,
        }
    }

    /// HTTP status associated with the error, if there was a response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            FolioClientError::AuthError(_) => Some(401),
            FolioClientError::NotFound(_) => Some(404),
            FolioClientError::Validation { status, .. } | FolioClientError::Http { status, .. } => {
                Some(*status)
            }
            FolioClientError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FolioClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            FolioClientError::InvalidConfig(e.to_string())
        } else if e.is_decode() {
            FolioClientError::ParseError(e.to_string())
        } else if e.is_timeout() {
            FolioClientError::Unreachable(format!("request timed out: {e}"))
        } else {
            FolioClientError::Unreachable(e.to_string())
        }
    }
}

impl From<serde_json::Error> for FolioClientError {
    fn from(e: serde_json::Error) -> Self {
        FolioClientError::ParseError(e.to_string())
    }
}
