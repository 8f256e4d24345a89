//! Core OAuth credential types and persistence
//!
//! Provides the token data model, durable file-backed storage, the retry
//! backoff schedule, and the token-endpoint exchange contract used by the
//! lifecycle manager. This crate is a standalone library with no dependency
//! on the manager or the callback listener — it can be tested and used
//! independently.
//!
//! Credential flow:
//! 1. Caller completes the browser flow and obtains an authorization code
//! 2. `exchange::HttpExchangeClient::exchange_code()` trades it for a grant
//! 3. `TokenSet::from_grant()` converts the grant to absolute expiries
//! 4. `store::TokenStore::save()` persists it atomically
//! 5. Later refreshes go through `ExchangeClient::refresh()`, with prior
//!    refresh-token fields carried forward when the endpoint omits them

pub mod backoff;
pub mod error;
pub mod exchange;
pub mod store;
pub mod token_set;

pub use backoff::BackoffPolicy;
pub use error::{Error, Result};
pub use exchange::{ExchangeClient, HttpExchangeClient, OAuthEndpoints, TokenGrant};
pub use store::TokenStore;
pub use token_set::{TokenSet, TokenSource, now_millis};
