//! Callback capture errors.
//!
//! Every variant is terminal for the current authorization attempt; the
//! caller restarts the flow rather than retrying against a dead listener.

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// No callback arrived before the configured deadline.
    #[error("timed out waiting for the authorization callback")]
    Timeout,

    /// The authorization server redirected with an explicit error.
    #[error("authorization callback returned error: {code}")]
    OAuth {
        code: String,
        description: Option<String>,
    },

    /// The callback request carried neither a `code` nor an `error` parameter.
    #[error("callback request had neither code nor error parameter")]
    MalformedCallback,

    /// The local socket could not be bound.
    #[error("failed to bind callback listener: {0}")]
    Bind(String),

    /// The listener was already resolved, waited on, or stopped.
    #[error("callback listener is no longer accepting a result")]
    Closed,
}

pub type Result<T> = std::result::Result<T, Error>;
