//! token-cron: unattended OAuth token maintenance.
//!
//! Designed to run from cron with no user interaction. The default mode
//! ensures a valid access token exists (refreshing if needed) and exits 0,
//! or exits 1 when manual re-authorization is required. `--authorize` runs
//! the one-time interactive flow with a local callback listener.
//!
//! Modes:
//!   (default)    ensure a valid access token, refreshing if necessary
//!   --check      report token health without refreshing
//!   --force      refresh now regardless of remaining validity
//!   --authorize  interactive authorization via browser redirect

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use auth_core::{
    BackoffPolicy, ExchangeClient, HttpExchangeClient, OAuthEndpoints, TokenSet, TokenSource,
    TokenStore, now_millis,
};
use callback_listener::CallbackServer;
use token_manager::TokenManager;

use config::Config;

enum Mode {
    Ensure,
    Check,
    Force,
    Authorize,
}

#[tokio::main]
async fn main() {
    // Tracing with LOG_LEVEL / RUST_LOG support, info by default
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "token maintenance failed");
        eprintln!("ERROR: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let mode = if args.iter().any(|a| a == "--check") {
        Mode::Check
    } else if args.iter().any(|a| a == "--force") {
        Mode::Force
    } else if args.iter().any(|a| a == "--authorize") {
        Mode::Authorize
    } else {
        Mode::Ensure
    };

    // CLI: simple --config flag parsing
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let store = TokenStore::new(config.tokens.path.clone());
    let endpoints = OAuthEndpoints {
        token_url: config.oauth.token_url.clone(),
        client_id: config.oauth.client_id.clone(),
        client_secret: config.oauth.client_secret.clone(),
        redirect_uri: config.oauth.redirect_uri.clone(),
    };
    let exchange: Arc<dyn ExchangeClient> =
        Arc::new(HttpExchangeClient::new(reqwest::Client::new(), endpoints));
    let backoff = BackoffPolicy::new(
        Duration::from_secs(config.refresh.base_delay_secs),
        config.refresh.max_attempts,
    );
    let manager = TokenManager::new(store.clone(), exchange.clone(), backoff);

    match mode {
        Mode::Ensure => {
            manager.get_valid_access_token().await?;
            info!("access token is valid");
            Ok(())
        }
        Mode::Check => check_health(&store).await,
        Mode::Force => {
            let set = manager.force_refresh().await?;
            info!(source = ?set.source, "forced refresh complete");
            Ok(())
        }
        Mode::Authorize => authorize(&config, exchange.as_ref(), &manager).await,
    }
}

/// Report how much life the stored tokens have left. Never refreshes.
/// Exits nonzero only when unattended operation is no longer possible.
async fn check_health(store: &TokenStore) -> Result<()> {
    let Some(tokens) = store.load().await else {
        bail!("no tokens found; run with --authorize first");
    };
    let now = now_millis();

    match tokens.access_expires_at {
        Some(at) if at <= now => warn!("access token expired, next run will refresh"),
        Some(at) => {
            let hours = (at - now) / 3_600_000;
            if hours < 1 {
                warn!("access token expires within the hour");
            } else {
                info!(hours_left = hours, "access token valid");
            }
        }
        None => warn!("access token has no recorded expiry"),
    }

    match tokens.refresh_expires_at {
        Some(at) if at <= now => {
            bail!("refresh token expired; re-run interactive authorization")
        }
        Some(at) => {
            let days = (at - now) / 86_400_000;
            if days <= 2 {
                warn!(days_left = days, "refresh token expires soon, consider re-authorizing");
            } else {
                info!(days_left = days, "refresh token valid");
            }
        }
        None => info!("refresh token has no recorded expiry"),
    }

    Ok(())
}

/// One-time interactive flow: print the authorization URL, capture the
/// redirect on a local listener, exchange the code, persist the tokens.
async fn authorize(
    config: &Config,
    exchange: &dyn ExchangeClient,
    manager: &TokenManager,
) -> Result<()> {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("client_id", &config.oauth.client_id)
        .append_pair("redirect_uri", &config.oauth.redirect_uri)
        .append_pair("response_type", "code")
        .finish();
    let authorize_url = format!("{}?{query}", config.oauth.authorize_url);

    let server = CallbackServer::bind(config.callback.port).await?;
    info!(port = server.port(), "waiting for the authorization redirect");
    println!("Open this URL in your browser to authorize:\n\n  {authorize_url}\n");

    let code = server
        .wait_for_code(Duration::from_secs(config.callback.timeout_secs))
        .await?;
    info!("authorization code received, exchanging for tokens");

    let grant = exchange.exchange_code(&code).await?;
    let set = TokenSet::from_grant(&grant, now_millis(), TokenSource::InitialAuth, None);
    manager.save_tokens(&set).await?;
    info!(path = %config.tokens.path.display(), "tokens saved");
    Ok(())
}
