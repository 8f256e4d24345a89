//! Token lifecycle manager
//!
//! Owns the current `TokenSet`, decides validity, refreshes through an
//! injected `ExchangeClient`, and persists results through `TokenStore`.
//! The core guarantee is single-flight refresh: concurrent callers that hit
//! an expired access token coalesce onto one network call and all receive
//! the same outcome, because issuing two refreshes with one refresh token
//! risks the authorization server invalidating the pair.
//!
//! Token lifecycle:
//! 1. Caller asks for a valid access token
//! 2. Unexpired cached/stored token is returned with zero network calls
//! 3. Expired-but-refreshable triggers a coalesced refresh and atomic save
//! 4. No tokens or expired refresh token means interactive authorization,
//!    driven by the caller through the callback listener

pub mod error;
pub mod manager;

pub use error::{Error, Result};
pub use manager::TokenManager;
