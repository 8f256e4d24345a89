//! Single-shot authorization callback server.
//!
//! Lifecycle: bound → listening → resolved (code, error, or timeout) →
//! stopped. Resolution happens at most once; the guard is a `oneshot`
//! sender slot that the first callback request takes. Later requests find
//! the slot empty, get an HTTP answer so the browser does not hang, and
//! change nothing.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, Notify, oneshot};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

const SUCCESS_PAGE: &str = "<!DOCTYPE html>\
<html><head><title>Authorization Complete</title></head>\
<body><h1>Authorization complete</h1>\
<p>You can close this window and return to the application.</p></body></html>";

const ERROR_PAGE: &str = "<!DOCTYPE html>\
<html><head><title>Authorization Failed</title></head>\
<body><h1>Authorization failed</h1>\
<p>The authorization server did not return a usable code. \
Close this window and try again from the application.</p></body></html>";

type Outcome = Result<String>;

/// Shared with the request handler; the `resolver` slot enforces
/// single resolution.
struct HandlerState {
    resolver: Mutex<Option<oneshot::Sender<Outcome>>>,
    shutdown: Arc<Notify>,
}

/// Captures exactly one authorization redirect on `127.0.0.1`.
pub struct CallbackServer {
    port: u16,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    outcome: Mutex<Option<oneshot::Receiver<Outcome>>>,
}

impl CallbackServer {
    /// Bind `127.0.0.1:port` and start serving. Port `0` picks an
    /// ephemeral port; read the actual one back with [`port`](Self::port).
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))
            .await
            .map_err(|e| Error::Bind(e.to_string()))?;
        let port = listener
            .local_addr()
            .map_err(|e| Error::Bind(e.to_string()))?
            .port();

        let (tx, rx) = oneshot::channel();
        let shutdown = Arc::new(Notify::new());
        let state = Arc::new(HandlerState {
            resolver: Mutex::new(Some(tx)),
            shutdown: shutdown.clone(),
        });

        let running = Arc::new(AtomicBool::new(true));
        let task_running = running.clone();
        let task_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let serve = axum::serve(listener, router(state)).with_graceful_shutdown(async move {
                // notify_one stores a permit, so a stop() that fires before
                // this future is first polled is not lost
                task_shutdown.notified().await;
            });
            if let Err(e) = serve.await {
                warn!(error = %e, "callback listener exited with error");
            }
            task_running.store(false, Ordering::SeqCst);
        });

        info!(port, "authorization callback listener started");
        Ok(Self {
            port,
            running,
            shutdown,
            outcome: Mutex::new(Some(rx)),
        })
    }

    /// The bound local port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether the listener is still accepting connections.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Wait for the single callback, up to `timeout`.
    ///
    /// Resolves exactly once per server: with the authorization code, an
    /// OAuth error relayed by the redirect, `MalformedCallback` for a
    /// parameterless request, or `Timeout`. The listener is stopped on
    /// every path before this returns.
    pub async fn wait_for_code(&self, timeout: Duration) -> Result<String> {
        let rx = match self.outcome.lock().await.take() {
            Some(rx) => rx,
            None => return Err(Error::Closed),
        };

        let result = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            // Sender dropped without resolving: the server was stopped
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => {
                debug!(port = self.port, "no callback before the deadline");
                Err(Error::Timeout)
            }
        };
        self.stop();
        result
    }

    /// Begin shutdown. Idempotent; safe on an already-stopped server.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            debug!(port = self.port, "stopping callback listener");
        }
        self.shutdown.notify_one();
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        self.shutdown.notify_one();
    }
}

/// Only `/` participates in resolution. Favicon fetches and other stray
/// browser requests get axum's default 404 and cannot consume the slot.
fn router(state: Arc<HandlerState>) -> Router {
    Router::new()
        .route("/", get(handle_callback))
        .with_state(state)
}

async fn handle_callback(
    State(state): State<Arc<HandlerState>>,
    RawQuery(query): RawQuery,
) -> Response {
    let outcome = parse_callback(query.as_deref());

    match state.resolver.lock().await.take() {
        Some(tx) => {
            match &outcome {
                Ok(_) => info!("authorization code received"),
                Err(e) => warn!(error = %e, "authorization callback failed"),
            }
            let _ = tx.send(outcome.clone());
            // Graceful shutdown drains this response before the socket closes
            state.shutdown.notify_one();
        }
        None => debug!("callback request after resolution, answering without effect"),
    }

    match outcome {
        Ok(_) => (StatusCode::OK, Html(SUCCESS_PAGE)).into_response(),
        Err(_) => (StatusCode::BAD_REQUEST, Html(ERROR_PAGE)).into_response(),
    }
}

/// Extract the authorization result from the redirect's query string.
/// `code` wins; otherwise `error` (with optional `error_description`);
/// otherwise the request is malformed.
fn parse_callback(query: Option<&str>) -> Outcome {
    let raw = query.unwrap_or("");
    let mut code = None;
    let mut error_code = None;
    let mut description = None;
    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "error" => error_code = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(code) = code.filter(|c| !c.is_empty()) {
        Ok(code)
    } else if let Some(code) = error_code {
        Err(Error::OAuth { code, description })
    } else {
        Err(Error::MalformedCallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[test]
    fn parse_prefers_code_and_percent_decodes() {
        let code = parse_callback(Some("code=ABC%2F123&state=xyz")).unwrap();
        assert_eq!(code, "ABC/123");
    }

    #[test]
    fn parse_reports_oauth_error_with_description() {
        let err = parse_callback(Some("error=access_denied&error_description=user%20denied"))
            .unwrap_err();
        match err {
            Error::OAuth { code, description } => {
                assert_eq!(code, "access_denied");
                assert_eq!(description.as_deref(), Some("user denied"));
            }
            other => panic!("expected OAuth error, got: {other}"),
        }
    }

    #[test]
    fn parse_rejects_empty_code_and_missing_params() {
        assert!(matches!(
            parse_callback(Some("code=")),
            Err(Error::MalformedCallback)
        ));
        assert!(matches!(
            parse_callback(Some("state=xyz")),
            Err(Error::MalformedCallback)
        ));
        assert!(matches!(parse_callback(None), Err(Error::MalformedCallback)));
    }

    #[tokio::test]
    async fn callback_with_code_resolves_success() {
        let server = CallbackServer::bind(0).await.unwrap();
        assert!(server.port() > 0);
        assert!(server.is_running());

        let url = format!("http://127.0.0.1:{}/?code=ABC123", server.port());
        let (code, resp) = tokio::join!(
            server.wait_for_code(Duration::from_secs(5)),
            reqwest::get(&url)
        );

        assert_eq!(resp.unwrap().status(), 200);
        assert_eq!(code.unwrap(), "ABC123");
    }

    #[tokio::test]
    async fn callback_with_error_resolves_failure() {
        let server = CallbackServer::bind(0).await.unwrap();
        let url = format!(
            "http://127.0.0.1:{}/?error=access_denied&error_description=denied",
            server.port()
        );
        let (outcome, resp) = tokio::join!(
            server.wait_for_code(Duration::from_secs(5)),
            reqwest::get(&url)
        );

        assert_eq!(resp.unwrap().status(), 400);
        match outcome.unwrap_err() {
            Error::OAuth { code, description } => {
                assert_eq!(code, "access_denied");
                assert_eq!(description.as_deref(), Some("denied"));
            }
            other => panic!("expected OAuth error, got: {other}"),
        }
    }

    #[tokio::test]
    async fn parameterless_callback_is_malformed() {
        let server = CallbackServer::bind(0).await.unwrap();
        let url = format!("http://127.0.0.1:{}/", server.port());
        let (outcome, resp) = tokio::join!(
            server.wait_for_code(Duration::from_secs(5)),
            reqwest::get(&url)
        );

        assert_eq!(resp.unwrap().status(), 400);
        assert!(matches!(outcome.unwrap_err(), Error::MalformedCallback));
    }

    #[tokio::test]
    async fn duplicate_callback_is_answered_but_ignored() {
        let (tx, rx) = oneshot::channel();
        let state = Arc::new(HandlerState {
            resolver: Mutex::new(Some(tx)),
            shutdown: Arc::new(Notify::new()),
        });
        let app = router(state);

        let first = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/?code=FIRST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(
                Request::builder()
                    .uri("/?code=SECOND")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::OK, "duplicate still answered");

        assert_eq!(rx.await.unwrap().unwrap(), "FIRST");
    }

    #[tokio::test]
    async fn no_callback_times_out_and_stops() {
        let server = CallbackServer::bind(0).await.unwrap();
        let err = server
            .wait_for_code(Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout), "got: {err}");
        assert!(!server.is_running());

        // A second wait finds the slot consumed
        let err = server
            .wait_for_code(Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Closed), "got: {err}");
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let server = CallbackServer::bind(0).await.unwrap();
        server.stop();
        server.stop();
        assert!(!server.is_running());
    }
}
