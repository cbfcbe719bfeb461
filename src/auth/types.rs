// Authentication types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::config::{
    self, API_AUTH, API_REFRESH, APIKEY_DEFAULT_ALIAS, DEFAULT_AUTH_TIMEOUT,
    DEFAULT_REFRESH_INTERVAL,
};

/// Access/refresh token pair returned by the authentication service
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    /// Short-lived bearer credential
    pub access_token: String,

    /// Long-lived credential used to obtain a new pair; the server may rotate it
    #[serde(default)]
    pub refresh_token: String,
}

impl Tokens {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }
}

// Token values stay out of logs
impl fmt::Debug for Tokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokens")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &if self.has_refresh_token() { "<redacted>" } else { "" })
            .finish()
    }
}

/// Authorization options of the project
#[derive(Clone)]
pub struct AuthOptions {
    /// Project ID, mandatory
    pub project_id: String,

    /// Authentication alias, `apikey` when not set
    pub auth: Option<String>,

    /// Project API key
    pub key: Option<String>,

    /// Project API secret
    pub secret: Option<String>,

    /// Period between refreshes of one alias group
    pub refresh_interval: Option<Duration>,

    /// Keep tokens in the persistent store
    pub remember: bool,

    /// Project URL override
    pub api_url: Option<String>,

    /// Upper bound for one login/refresh round-trip, `None` waits forever
    pub request_timeout: Option<Duration>,

    /// Consecutive failed refreshes of a group before the session is terminated
    pub max_refresh_failures: Option<u32>,
}

impl AuthOptions {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            auth: None,
            key: None,
            secret: None,
            refresh_interval: None,
            remember: false,
            api_url: None,
            request_timeout: Some(DEFAULT_AUTH_TIMEOUT),
            max_refresh_failures: None,
        }
    }

    pub fn with_credentials(mut self, key: impl Into<String>, secret: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self.secret = Some(secret.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.auth = Some(alias.into());
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = Some(interval);
        self
    }

    pub fn with_remember(mut self, remember: bool) -> Self {
        self.remember = remember;
        self
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_refresh_failures(mut self, limit: u32) -> Self {
        self.max_refresh_failures = Some(limit);
        self
    }

    /// Alias the API key login is stored under
    pub fn alias(&self) -> &str {
        self.auth
            .as_deref()
            .filter(|alias| !alias.is_empty())
            .unwrap_or(APIKEY_DEFAULT_ALIAS)
    }

    /// Key and secret are both present, so init performs a login
    pub fn has_credentials(&self) -> bool {
        matches!(
            (&self.key, &self.secret),
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty()
        )
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval.unwrap_or(DEFAULT_REFRESH_INTERVAL)
    }
}

impl fmt::Debug for AuthOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthOptions")
            .field("project_id", &self.project_id)
            .field("auth", &self.auth)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("refresh_interval", &self.refresh_interval)
            .field("remember", &self.remember)
            .field("api_url", &self.api_url)
            .field("request_timeout", &self.request_timeout)
            .field("max_refresh_failures", &self.max_refresh_failures)
            .finish()
    }
}

/// Resolved project endpoints
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoints {
    pub project_url: String,
}

impl Endpoints {
    pub fn from_options(options: &AuthOptions) -> Self {
        let project_url = match &options.api_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => config::project_url(&options.project_id),
        };
        Self { project_url }
    }

    pub fn auth_url(&self) -> String {
        format!("{}/{}", self.project_url, API_AUTH)
    }

    pub fn refresh_url(&self) -> String {
        format!("{}/{}", self.project_url, API_REFRESH)
    }
}

/// API key login request
#[derive(Serialize)]
pub struct ApiKeyLoginRequest<'a> {
    pub method: &'static str,
    pub key: &'a str,
    pub secret: &'a str,
}

impl<'a> ApiKeyLoginRequest<'a> {
    pub fn new(key: &'a str, secret: &'a str) -> Self {
        Self {
            method: "apk",
            key,
            secret,
        }
    }
}

/// Refresh request
#[derive(Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}
