use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::AuthOptions;

// Project API location: <protocol>://<project id>.<host>.<domain>:<port>
pub const API_PROTOCOL: &str = "https";
pub const API_HOST: &str = "app";
pub const API_DOMAIN: &str = "jexia.com";
pub const API_PORT: u16 = 443;

/// Authentication endpoint path
pub const API_AUTH: &str = "auth";

/// Token refresh endpoint path
pub const API_REFRESH: &str = "auth/refresh";

/// Dataset endpoint prefix
pub const API_DATA: &str = "ds";

/// Alias used for API key logins when none is given
pub const APIKEY_DEFAULT_ALIAS: &str = "apikey";

/// Period between two refreshes of the same alias group
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(20 * 60);

/// Upper bound for a single login or refresh round-trip
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default settings file looked up next to the working directory
const DEFAULT_SETTINGS_FILE: &str = "jexia.toml";

/// Jexia Records - dump all records of a dataset
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Project ID
    #[arg(short = 'p', long, env = "JEXIA_PROJECT_ID")]
    pub project_id: Option<String>,

    /// Project API key
    #[arg(short = 'k', long, env = "JEXIA_API_KEY")]
    pub key: Option<String>,

    /// Project API secret
    #[arg(short = 's', long, env = "JEXIA_API_SECRET")]
    pub secret: Option<String>,

    /// Dataset to read records from
    #[arg(short = 'd', long, env = "JEXIA_DATASET")]
    pub dataset: Option<String>,

    /// Authentication alias
    #[arg(short = 'a', long, env = "JEXIA_AUTH_ALIAS")]
    pub alias: Option<String>,

    /// Override the project URL (self-hosted or local test servers)
    #[arg(long, env = "JEXIA_API_URL")]
    pub api_url: Option<String>,

    /// Keep tokens in the persistent store between runs
    #[arg(long, env = "JEXIA_REMEMBER")]
    pub remember: bool,

    /// Settings file (TOML, JSON or YAML)
    #[arg(short = 'c', long, env = "JEXIA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "60")]
    pub http_timeout: u64,

    /// HTTP max retries
    #[arg(long, env = "HTTP_MAX_RETRIES", default_value = "3")]
    pub http_retries: u32,
}

/// Values that may come from the settings file
#[derive(Debug, Default, Deserialize)]
pub struct FileSettings {
    pub project_id: Option<String>,
    pub key: Option<String>,
    pub secret: Option<String>,
    pub dataset: Option<String>,
    pub auth: Option<String>,
    pub api_url: Option<String>,
    pub remember: Option<bool>,
    /// Seconds between token refreshes
    pub refresh_interval: Option<u64>,
    /// Seconds allowed for one login or refresh round-trip
    pub auth_timeout: Option<u64>,
    pub max_refresh_failures: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Project
    pub project_id: String,
    pub api_url: Option<String>,
    pub dataset: String,

    // Authentication
    pub auth_alias: String,
    pub key: Option<String>,
    pub secret: Option<String>,
    pub remember: bool,
    pub refresh_interval: Duration,
    pub auth_timeout: Duration,
    pub max_refresh_failures: Option<u32>,

    // HTTP client
    pub http_max_connections: usize,
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,
    pub http_max_retries: u32,

    // Logging
    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > settings file > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        let settings = load_settings(args.config.as_deref())?;

        Ok(Self::merge(args, settings))
    }

    fn merge(args: CliArgs, settings: FileSettings) -> Self {
        Config {
            project_id: args.project_id.or(settings.project_id).unwrap_or_default(),
            api_url: args.api_url.or(settings.api_url),
            dataset: args.dataset.or(settings.dataset).unwrap_or_default(),

            auth_alias: args
                .alias
                .or(settings.auth)
                .unwrap_or_else(|| APIKEY_DEFAULT_ALIAS.to_string()),
            key: args.key.or(settings.key),
            secret: args.secret.or(settings.secret),
            remember: args.remember || settings.remember.unwrap_or(false),
            refresh_interval: settings
                .refresh_interval
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REFRESH_INTERVAL),
            auth_timeout: settings
                .auth_timeout
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_AUTH_TIMEOUT),
            max_refresh_failures: settings.max_refresh_failures,

            http_max_connections: std::env::var("HTTP_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20),

            http_connect_timeout: std::env::var("HTTP_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),

            http_request_timeout: args.http_timeout,
            http_max_retries: args.http_retries,

            log_level: args.log_level,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.project_id.trim().is_empty() {
            anyhow::bail!("JEXIA_PROJECT_ID is required (use -p or set JEXIA_PROJECT_ID env var)");
        }

        if self.dataset.trim().is_empty() {
            anyhow::bail!("JEXIA_DATASET is required (use -d or set JEXIA_DATASET env var)");
        }

        if self.key.is_some() != self.secret.is_some() {
            anyhow::bail!("API key and secret must be supplied together");
        }

        Ok(())
    }

    /// Authentication options for the token manager
    pub fn auth_options(&self) -> AuthOptions {
        let mut options = AuthOptions::new(&self.project_id)
            .with_alias(&self.auth_alias)
            .with_refresh_interval(self.refresh_interval)
            .with_request_timeout(Some(self.auth_timeout))
            .with_remember(self.remember);

        if let (Some(key), Some(secret)) = (&self.key, &self.secret) {
            options = options.with_credentials(key, secret);
        }
        if let Some(url) = &self.api_url {
            options = options.with_api_url(url);
        }
        if let Some(limit) = self.max_refresh_failures {
            options = options.with_max_refresh_failures(limit);
        }

        options
    }
}

/// Read the settings file and JEXIA_* environment through the layered config loader
pub fn load_settings(path: Option<&Path>) -> Result<FileSettings> {
    let mut builder = ::config::Config::builder();

    builder = match path {
        Some(path) => builder.add_source(::config::File::from(path).required(true)),
        None => {
            builder.add_source(
                ::config::File::new(DEFAULT_SETTINGS_FILE, ::config::FileFormat::Toml)
                    .required(false),
            )
        },
    };

    let settings = builder
        .add_source(::config::Environment::with_prefix("JEXIA"))
        .build()
        .context("Failed to read settings")?
        .try_deserialize::<FileSettings>()
        .context("Failed to parse settings")?;

    Ok(settings)
}

/// Base URL of a project on the hosted platform
pub fn project_url(project_id: &str) -> String {
    format!(
        "{}://{}.{}.{}:{}",
        API_PROTOCOL, project_id, API_HOST, API_DOMAIN, API_PORT
    )
}
