//! Error types for lifecycle operations
//!
//! Every variant tells the caller which fix applies: "wait and retry" for
//! transient escalations, "re-run interactive authorization" for terminal
//! states. The enum is `Clone` so a single-flight outcome can be handed to
//! every coalesced waiter.

/// Errors from token lifecycle operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// No persisted or cached tokens exist. Interactive authorization required.
    #[error("no tokens found; run interactive authorization")]
    NoTokens,

    /// The refresh token is missing or past its expiry. Interactive
    /// authorization required; retrying cannot help.
    #[error("refresh token expired; re-run interactive authorization")]
    RefreshTokenExpired,

    /// The authorization server explicitly invalidated the refresh token.
    /// Not retried. Interactive authorization required.
    #[error("refresh token rejected ({0}); re-run interactive authorization")]
    RefreshRejected(String),

    /// Transient failures exhausted the retry budget. Wait and retry later.
    #[error("token refresh failed after {attempts} attempt(s); wait and retry ({last})")]
    RefreshFailed { attempts: u32, last: String },

    /// The token record could not be written. The in-memory token remains
    /// usable, but the next process start will not see it.
    #[error("token persistence failed: {0}")]
    Persistence(String),

    /// Rejected before persistence: a save was requested for an unusable set.
    #[error("invalid token set: {0}")]
    InvalidTokenSet(String),
}

/// Result alias for lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;
