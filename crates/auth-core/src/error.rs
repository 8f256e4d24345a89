//! Error types for token endpoint and storage operations

/// Errors from exchange and storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network-level failure or 5xx from the token endpoint. Retryable.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The token endpoint explicitly rejected the code or refresh token
    /// (400/401/403). Not retryable — a new authorization is required.
    #[error("rejected by token endpoint: {0}")]
    Rejected(String),

    /// The endpoint returned 2xx but the body was not a usable grant.
    #[error("invalid token response: {0}")]
    InvalidResponse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("token record parse error: {0}")]
    Parse(String),
}

impl Error {
    /// Whether a retry per the backoff policy can plausibly succeed.
    ///
    /// Only network/5xx failures qualify; retrying a rejected refresh token
    /// wastes time and risks rate-limit penalties.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Http(_))
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
