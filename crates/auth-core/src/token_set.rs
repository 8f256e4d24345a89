//! Token pair snapshot with absolute expiry instants
//!
//! A `TokenSet` is an immutable snapshot of the access/refresh pair. Expiries
//! are absolute unix-millisecond timestamps (computed once at grant time from
//! the endpoint's `expires_in` deltas), so validity checks never recompute
//! against a drifting base. Sets are replaced wholesale on every refresh or
//! authorization, never partially mutated.

use serde::{Deserialize, Serialize};

use crate::exchange::TokenGrant;

/// Where a token set came from, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    /// Interactive authorization-code exchange
    InitialAuth,
    /// Automatic refresh-token grant
    Refresh,
    /// Loaded from the persisted record
    #[default]
    Cache,
}

/// An access/refresh token pair with expiry metadata.
///
/// `access_expires_at` and `refresh_expires_at` are normally both set or
/// both absent. A set with an access token but no refresh token is valid
/// until access expiry, but cannot self-heal afterward.
///
/// Deserialization ignores unknown fields, so legacy records that carry a
/// stray derived field (older builds serialized a `display_info` summary)
/// load cleanly. No derived field is ever written back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix timestamp in milliseconds (absolute, not a delta)
    #[serde(default)]
    pub access_expires_at: Option<u64>,
    /// Unix timestamp in milliseconds (absolute, not a delta)
    #[serde(default)]
    pub refresh_expires_at: Option<u64>,
    #[serde(default)]
    pub source: TokenSource,
}

impl TokenSet {
    /// Whether the access token is usable at `now` (unix millis).
    ///
    /// A set without an access expiry is treated as expired rather than
    /// eternal — the safe direction for an opaque credential.
    pub fn is_access_valid_at(&self, now: u64) -> bool {
        !self.access_token.is_empty() && self.access_expires_at.is_some_and(|at| now < at)
    }

    /// Whether a refresh is possible at `now`: a refresh token is present
    /// and its expiry, when known, has not passed.
    pub fn can_refresh_at(&self, now: u64) -> bool {
        match &self.refresh_token {
            Some(rt) if !rt.is_empty() => self.refresh_expires_at.is_none_or(|at| now < at),
            _ => false,
        }
    }

    /// Build a new set from a token-endpoint grant.
    ///
    /// `expires_in` deltas are anchored at `now`. When the grant omits the
    /// refresh token (rotation is provider-dependent), the prior set's
    /// refresh token and its expiry are carried forward unchanged — losing
    /// that value would block all future automatic refreshes. A grant that
    /// returns a refresh token without an expiry keeps the prior expiry.
    pub fn from_grant(
        grant: &TokenGrant,
        now: u64,
        source: TokenSource,
        prior: Option<&TokenSet>,
    ) -> TokenSet {
        let granted_refresh = grant
            .refresh_token
            .as_deref()
            .filter(|rt| !rt.is_empty())
            .map(str::to_owned);

        let (refresh_token, refresh_expires_at) = match granted_refresh {
            Some(rt) => {
                let expires = grant
                    .refresh_token_expires_in
                    .map(|secs| now + secs * 1000)
                    .or_else(|| prior.and_then(|p| p.refresh_expires_at));
                (Some(rt), expires)
            }
            None => match prior {
                Some(p) => (p.refresh_token.clone(), p.refresh_expires_at),
                None => (None, None),
            },
        };

        TokenSet {
            access_token: grant.access_token.clone(),
            refresh_token,
            access_expires_at: Some(now + grant.expires_in * 1000),
            refresh_expires_at,
            source,
        }
    }
}

/// Current unix time in milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
