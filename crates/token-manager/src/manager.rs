//! Validity decisions and single-flight refresh
//!
//! One `tokio::sync::Mutex` guards the in-memory `TokenSet` and the
//! in-flight refresh marker, so readers never observe a half-updated set.
//! The first caller to detect an expired-but-refreshable token spawns the
//! refresh on a detached task; everyone, that caller included, subscribes
//! to a broadcast of the task's outcome instead of issuing a second network
//! call. Because the flight is detached, a caller that is cancelled mid-wait
//! (timeout, shutdown) cannot abandon the flight with the marker still set:
//! the task always finishes, clears the marker, and publishes the outcome.
//!
//! Cross-process callers sharing the same token file are not serialized
//! here. The store's atomic writes plus a re-load before each refresh
//! decision narrow that race window; the intended deployment is a single
//! active writer at a time.

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

use auth_core::{
    BackoffPolicy, ExchangeClient, TokenGrant, TokenSet, TokenSource, TokenStore, now_millis,
};

use crate::error::{Error, Result};

type RefreshOutcome = Result<TokenSet>;

/// Lifecycle state behind the coalescing guard.
#[derive(Default)]
struct Inner {
    cached: Option<TokenSet>,
    inflight: Option<broadcast::Sender<RefreshOutcome>>,
}

/// Produces currently-valid access tokens, refreshing or signaling
/// re-authorization as needed.
pub struct TokenManager {
    store: TokenStore,
    exchange: Arc<dyn ExchangeClient>,
    backoff: BackoffPolicy,
    inner: Arc<Mutex<Inner>>,
}

impl TokenManager {
    pub fn new(store: TokenStore, exchange: Arc<dyn ExchangeClient>, backoff: BackoffPolicy) -> Self {
        Self {
            store,
            exchange,
            backoff,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Return a currently-valid access token.
    ///
    /// An unexpired token is returned with zero network calls. An expired
    /// access token with a live refresh token triggers a coalesced refresh.
    /// `NoTokens` and `RefreshTokenExpired` are terminal: the caller must
    /// run interactive authorization, not retry.
    pub async fn get_valid_access_token(&self) -> Result<String> {
        let rx = {
            let mut inner = self.inner.lock().await;
            let now = now_millis();
            self.sync_cache(&mut inner, now).await;

            let tokens = inner.cached.as_ref().ok_or(Error::NoTokens)?;
            if tokens.is_access_valid_at(now) {
                debug!("access token still valid, no refresh needed");
                return Ok(tokens.access_token.clone());
            }
            if !tokens.can_refresh_at(now) {
                return Err(Error::RefreshTokenExpired);
            }
            let prior = tokens.clone();
            self.spawn_or_join(&mut inner, prior)
        };

        let set = Self::await_outcome(rx).await?;
        Ok(set.access_token)
    }

    /// Refresh now, regardless of remaining access-token validity.
    ///
    /// Still coalesces with any in-flight refresh and honors the same
    /// retry policy. Used for diagnostics and explicit re-sync.
    pub async fn force_refresh(&self) -> Result<TokenSet> {
        let rx = {
            let mut inner = self.inner.lock().await;
            let now = now_millis();
            if inner.cached.is_none() {
                inner.cached = self.store.load().await;
            }

            let tokens = inner.cached.as_ref().ok_or(Error::NoTokens)?;
            if !tokens.can_refresh_at(now) {
                return Err(Error::RefreshTokenExpired);
            }
            let prior = tokens.clone();
            self.spawn_or_join(&mut inner, prior)
        };

        Self::await_outcome(rx).await
    }

    /// Non-throwing probe: whether a token set is present and its access
    /// token unexpired. Never triggers a refresh or any network call, but
    /// re-reads the store the same way the getter does, so a token
    /// refreshed by another process is reported as valid.
    pub async fn has_valid_tokens(&self) -> bool {
        let mut inner = self.inner.lock().await;
        let now = now_millis();
        self.sync_cache(&mut inner, now).await;
        inner
            .cached
            .as_ref()
            .is_some_and(|t| t.is_access_valid_at(now))
    }

    /// Validate and persist a token set obtained outside the refresh path
    /// (typically from an initial authorization-code exchange).
    pub async fn save_tokens(&self, set: &TokenSet) -> Result<()> {
        if set.access_token.is_empty() {
            return Err(Error::InvalidTokenSet("access token is empty".into()));
        }
        if matches!(set.refresh_token.as_deref(), Some("")) {
            return Err(Error::InvalidTokenSet(
                "refresh token is present but empty".into(),
            ));
        }

        let mut inner = self.inner.lock().await;
        inner.cached = Some(set.clone());
        self.store
            .save(set)
            .await
            .map_err(|e| Error::Persistence(e.to_string()))
    }

    /// Drop the cached set and remove the persisted record.
    pub async fn clear(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.cached = None;
        self.store
            .clear()
            .await
            .map_err(|e| Error::Persistence(e.to_string()))
    }

    /// Refresh the in-memory copy from the store when it is absent or its
    /// access token has expired. Another process sharing the file may have
    /// refreshed already; picking that up avoids a redundant network call.
    /// A store that has gone absent does not evict a live in-memory set
    /// (covers a save that failed after a successful refresh).
    async fn sync_cache(&self, inner: &mut Inner, now: u64) {
        let stale = inner
            .cached
            .as_ref()
            .is_none_or(|t| !t.is_access_valid_at(now));
        if stale && let Some(stored) = self.store.load().await {
            inner.cached = Some(stored);
        }
    }

    /// Subscribe to the in-flight refresh, starting one when none is
    /// running. The flight runs detached from any caller: it updates the
    /// cache, persists, clears the in-flight marker, and only then
    /// publishes, so waiters are released exactly once per flight even if
    /// the caller that started it has since been dropped.
    fn spawn_or_join(
        &self,
        inner: &mut Inner,
        prior: TokenSet,
    ) -> broadcast::Receiver<RefreshOutcome> {
        if let Some(tx) = &inner.inflight {
            debug!("refresh already in flight, waiting for its outcome");
            return tx.subscribe();
        }

        let (tx, rx) = broadcast::channel(1);
        inner.inflight = Some(tx.clone());

        let store = self.store.clone();
        let exchange = self.exchange.clone();
        let backoff = self.backoff;
        let shared = self.inner.clone();
        tokio::spawn(async move {
            let outcome = run_refresh(exchange.as_ref(), backoff, prior).await;

            let mut inner = shared.lock().await;
            if let Ok(set) = &outcome {
                inner.cached = Some(set.clone());
                // Persistence failure is non-fatal here: the caller still gets
                // a usable token, but durability is compromised until the next
                // save.
                if let Err(e) = store.save(set).await {
                    warn!(error = %e, "refreshed token could not be persisted; next process start will not see it");
                }
                info!("token refresh succeeded");
            }
            inner.inflight = None;
            let _ = tx.send(outcome);
        });

        rx
    }

    async fn await_outcome(mut rx: broadcast::Receiver<RefreshOutcome>) -> Result<TokenSet> {
        match rx.recv().await {
            Ok(outcome) => outcome,
            // Only reachable if the refresh task panicked
            Err(_) => Err(Error::RefreshFailed {
                attempts: 0,
                last: "refresh task ended without reporting an outcome".into(),
            }),
        }
    }
}

async fn run_refresh(
    exchange: &dyn ExchangeClient,
    backoff: BackoffPolicy,
    prior: TokenSet,
) -> RefreshOutcome {
    match prior.refresh_token.as_deref() {
        Some(rt) if !rt.is_empty() => {
            refresh_with_retry(exchange, backoff, rt).await.map(|grant| {
                TokenSet::from_grant(&grant, now_millis(), TokenSource::Refresh, Some(&prior))
            })
        }
        _ => Err(Error::RefreshTokenExpired),
    }
}

/// Call the exchange client, retrying transient failures per the backoff
/// policy. A rejection fails immediately without retry.
async fn refresh_with_retry(
    exchange: &dyn ExchangeClient,
    backoff: BackoffPolicy,
    refresh_token: &str,
) -> Result<TokenGrant> {
    let mut last = String::new();
    for attempt in 1..=backoff.max_attempts {
        match exchange.refresh(refresh_token).await {
            Ok(grant) => return Ok(grant),
            Err(e) if e.is_transient() => {
                warn!(attempt, error = %e, "transient refresh failure");
                last = e.to_string();
                if attempt < backoff.max_attempts {
                    tokio::time::sleep(backoff.delay(attempt)).await;
                }
            }
            Err(auth_core::Error::Rejected(msg)) => {
                return Err(Error::RefreshRejected(msg));
            }
            Err(e) => {
                return Err(Error::RefreshFailed {
                    attempts: attempt,
                    last: e.to_string(),
                });
            }
        }
    }
    Err(Error::RefreshFailed {
        attempts: backoff.max_attempts,
        last,
    })
}
