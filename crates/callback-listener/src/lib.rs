//! One-shot localhost listener for the OAuth authorization redirect.
//!
//! The authorization server redirects the user's browser exactly once per
//! flow, so this listener is deliberately single-shot: it captures the first
//! callback request, hands the authorization code (or error) to the waiting
//! caller, and tears itself down. Extra requests to the same origin, such
//! as browser retries, are answered but never alter the captured result.

pub mod error;
pub mod server;

pub use error::{Error, Result};
pub use server::CallbackServer;
