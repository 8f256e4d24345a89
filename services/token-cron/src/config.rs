//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The client secret is loaded from the OAUTH_CLIENT_SECRET env var or
//! client_secret_file, never stored in the TOML directly to avoid
//! leaking secrets.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub oauth: OAuthConfig,
    pub tokens: TokenFileConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub callback: CallbackConfig,
}

/// Authorization server endpoints and client identity
#[derive(Debug, Deserialize)]
pub struct OAuthConfig {
    pub authorize_url: String,
    pub token_url: String,
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<String>,
    /// Path to a file containing the client secret (alternative to the
    /// OAUTH_CLIENT_SECRET env var)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    pub redirect_uri: String,
}

/// Where the token record lives
#[derive(Debug, Deserialize)]
pub struct TokenFileConfig {
    pub path: PathBuf,
}

/// Retry schedule for transient refresh failures
#[derive(Debug, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// Local listener settings for the interactive authorization flow
#[derive(Debug, Deserialize)]
pub struct CallbackConfig {
    #[serde(default = "default_callback_port")]
    pub port: u16,
    #[serde(default = "default_callback_timeout")]
    pub timeout_secs: u64,
}

fn default_base_delay() -> u64 {
    1
}

fn default_max_attempts() -> u32 {
    3
}

fn default_callback_port() -> u16 {
    8182
}

fn default_callback_timeout() -> u64 {
    300
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: default_base_delay(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            port: default_callback_port(),
            timeout_secs: default_callback_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Client secret resolution order:
    /// 1. OAUTH_CLIENT_SECRET env var
    /// 2. client_secret_file path from config
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut config: Config = toml::from_str(&contents)?;

        for (name, value) in [
            ("authorize_url", &config.oauth.authorize_url),
            ("token_url", &config.oauth.token_url),
        ] {
            if !value.starts_with("http://") && !value.starts_with("https://") {
                bail!("{name} must start with http:// or https://, got: {value}");
            }
        }

        if config.refresh.max_attempts == 0 {
            bail!("refresh.max_attempts must be greater than 0");
        }

        if config.callback.timeout_secs == 0 {
            bail!("callback.timeout_secs must be greater than 0");
        }

        // Resolve client secret: env var takes precedence over file
        if let Ok(secret) = std::env::var("OAUTH_CLIENT_SECRET") {
            config.oauth.client_secret = Some(secret);
        } else if let Some(ref secret_file) = config.oauth.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).with_context(|| {
                format!("failed to read client_secret_file {}", secret_file.display())
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                config.oauth.client_secret = Some(secret);
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("token-cron.toml")
    }
}
