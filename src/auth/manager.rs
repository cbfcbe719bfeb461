use futures::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::refresh::RefreshDigest;
use super::storage::TokenStorage;
use super::types::{ApiKeyLoginRequest, AuthOptions, Endpoints, RefreshRequest, Tokens};
use crate::config::{APIKEY_DEFAULT_ALIAS, DEFAULT_AUTH_TIMEOUT, DEFAULT_REFRESH_INTERVAL};
use crate::error::{Result, SdkError};
use crate::transport::{RequestAdapter, RequestOptions};

/// Outcome of one login/refresh round-trip, awaitable by any number of callers
type PendingAuth = Shared<BoxFuture<'static, Result<Tokens>>>;

/// Completion of `init()`
type InitSignal = Shared<BoxFuture<'static, Result<()>>>;

struct PendingEntry {
    id: u64,
    auth: PendingAuth,
    /// Aliases of callers that joined with a wider group; they receive the pair too
    joined: Vec<String>,
}

/// What to do with a freshly obtained token pair
enum Grant {
    /// Store under the alias, make it the default and schedule its refresh
    Login { alias: String },
    /// Overwrite the pair of every alias in an existing group
    Refresh { aliases: Vec<String> },
}

struct State {
    endpoints: Option<Endpoints>,
    refresh_interval: Duration,
    request_timeout: Option<Duration>,
    max_refresh_failures: Option<u32>,

    init: Option<InitSignal>,

    /// In-flight authentications by alias
    pending: HashMap<String, PendingEntry>,
    next_pending_id: u64,

    /// Active refresh schedules, one per alias group
    refreshes: Vec<RefreshDigest>,

    /// Bumped by terminate(); results tagged with an older value are dropped
    generation: u64,
}

impl Default for State {
    fn default() -> Self {
        Self {
            endpoints: None,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            request_timeout: Some(DEFAULT_AUTH_TIMEOUT),
            max_refresh_failures: None,
            init: None,
            pending: HashMap::new(),
            next_pending_id: 0,
            refreshes: Vec::new(),
            generation: 0,
        }
    }
}

impl State {
    fn endpoints(&self) -> Result<&Endpoints> {
        self.endpoints
            .as_ref()
            .ok_or_else(|| SdkError::Config("Token manager is not initialized".to_string()))
    }
}

pub(super) struct Inner {
    transport: Arc<dyn RequestAdapter>,
    storage: Arc<dyn TokenStorage>,
    state: Mutex<State>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for digest in self.state.get_mut().refreshes.drain(..) {
            digest.cancel();
        }
    }
}

/// Token manager
/// Keeps token pairs for any number of aliases and refreshes them periodically
///
/// Cloning is cheap; all clones share the same state.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl TokenManager {
    /// Create a manager over the given transport and storage
    pub fn new(transport: Arc<dyn RequestAdapter>, storage: Arc<dyn TokenStorage>) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                storage,
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub(super) fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    /// Initialize the manager for a project
    ///
    /// Logs in with the API key when both key and secret are supplied. Every
    /// `token()` call waits for this to finish.
    pub async fn init(&self, options: AuthOptions) -> Result<&Self> {
        if options.project_id.trim().is_empty() {
            return Err(SdkError::Config(
                "Please supply a valid Jexia project ID.".to_string(),
            ));
        }
        let interval = options.refresh_interval();
        if interval.is_zero() {
            return Err(SdkError::Config(
                "Refresh interval must be greater than zero".to_string(),
            ));
        }
        if tokio::time::Instant::now().checked_add(interval).is_none() {
            return Err(SdkError::Config(format!(
                "Refresh interval {:?} is too large",
                interval
            )));
        }

        let signal = {
            let mut state = self.inner.state.lock();
            state.endpoints = Some(Endpoints::from_options(&options));
            state.refresh_interval = options.refresh_interval();
            state.request_timeout = options.request_timeout;
            state.max_refresh_failures = options.max_refresh_failures;

            let signal: InitSignal = match (&options.key, &options.secret) {
                (Some(key), Some(secret)) if options.has_credentials() => {
                    let login = self.login(&mut state, options.alias(), key, secret)?;
                    async move { login.await.map(|_| ()) }.boxed().shared()
                }
                _ => future::ready(Ok(())).boxed().shared(),
            };

            state.init = Some(signal.clone());
            signal
        };

        signal.await?;
        tracing::info!("Token manager initialized for project {}", options.project_id);

        Ok(self)
    }

    /// Access token for `alias`, or for the default alias when `None`
    ///
    /// Waits for initialization and for every authentication in flight at the
    /// time of the call, whichever alias it belongs to.
    pub async fn token(&self, alias: Option<&str>) -> Result<String> {
        self.resolved().await?;

        let tokens = self
            .inner
            .storage
            .get_tokens(alias)?
            .ok_or(SdkError::TokenNotAvailable)?;

        Ok(tokens.access_token)
    }

    async fn resolved(&self) -> Result<()> {
        let (init, pending) = {
            let state = self.inner.state.lock();
            let pending: Vec<PendingAuth> =
                state.pending.values().map(|entry| entry.auth.clone()).collect();
            (state.init.clone(), pending)
        };

        if let Some(init) = init {
            init.await?;
        }

        // Failed round-trips leave the store as it was; readers only need them settled
        future::join_all(pending).await;

        Ok(())
    }

    /// Store an externally obtained pair under every alias and refresh them as one group
    ///
    /// Empty aliases are skipped. Only the first alias can become the default.
    /// Must be called within a tokio runtime.
    pub fn add_tokens<I, S>(&self, aliases: I, tokens: Tokens, make_default: bool) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let aliases: Vec<String> = aliases
            .into_iter()
            .map(|alias| alias.as_ref().to_string())
            .filter(|alias| !alias.is_empty())
            .collect();

        if aliases.is_empty() {
            tracing::warn!("add_tokens called without any alias, nothing stored");
            return Ok(());
        }

        let mut state = self.inner.state.lock();
        self.store_group(&mut state, aliases, &tokens, make_default)
    }

    /// Refresh the pair of an alias group now
    ///
    /// Joins the round-trip already in flight for the group's first alias
    /// instead of starting a second one.
    pub async fn refresh<S: AsRef<str>>(&self, aliases: &[S]) -> Result<Tokens> {
        let pending = self.start_refresh(aliases)?;
        pending.await
    }

    /// Make `alias` the default for `token(None)`
    pub fn set_default(&self, alias: &str) -> Result<()> {
        self.inner.storage.set_default(alias)
    }

    /// Switch the default back to the API key alias
    pub fn reset_default(&self) -> Result<()> {
        self.inner.storage.set_default(APIKEY_DEFAULT_ALIAS)
    }

    /// Clear all tokens and stop every refresh schedule
    ///
    /// Round-trips still in flight are not awaited; their results are dropped.
    pub fn terminate(&self) {
        let mut state = self.inner.state.lock();

        state.generation += 1;
        state.init = None;
        state.endpoints = None;
        state.pending.clear();

        for digest in state.refreshes.drain(..) {
            digest.cancel();
        }

        if let Err(e) = self.inner.storage.clear() {
            tracing::error!("Failed to clear token storage: {}", e);
        }

        tracing::info!("Token manager terminated");
    }

    /// Base URL of the initialized project
    pub fn project_url(&self) -> Option<String> {
        let state = self.inner.state.lock();
        state
            .endpoints
            .as_ref()
            .map(|endpoints| endpoints.project_url.clone())
    }

    /// Alias groups that currently have a refresh schedule
    pub fn refresh_groups(&self) -> Vec<Vec<String>> {
        let state = self.inner.state.lock();
        state
            .refreshes
            .iter()
            .map(|digest| digest.aliases().to_vec())
            .collect()
    }

    fn login(&self, state: &mut State, alias: &str, key: &str, secret: &str) -> Result<PendingAuth> {
        let url = state.endpoints()?.auth_url();
        let body = serde_json::to_value(ApiKeyLoginRequest::new(key, secret))?;

        Ok(self.obtain_tokens(
            state,
            alias,
            url,
            body,
            Grant::Login {
                alias: alias.to_string(),
            },
        ))
    }

    fn start_refresh<S: AsRef<str>>(&self, aliases: &[S]) -> Result<PendingAuth> {
        let aliases: Vec<String> = aliases
            .iter()
            .map(|alias| alias.as_ref().to_string())
            .filter(|alias| !alias.is_empty())
            .collect();

        let alias = aliases
            .first()
            .cloned()
            .ok_or_else(|| SdkError::Config("No alias to refresh".to_string()))?;

        let mut state = self.inner.state.lock();

        if let Some(entry) = state.pending.get_mut(&alias) {
            tracing::debug!("Joining authentication already in flight for {}", alias);
            for extra in &aliases[1..] {
                if !entry.joined.contains(extra) {
                    entry.joined.push(extra.clone());
                }
            }
            return Ok(entry.auth.clone());
        }

        let refresh_token = match self.inner.storage.get_tokens(Some(&alias))? {
            Some(tokens) if tokens.has_refresh_token() => tokens.refresh_token,
            _ => return Err(SdkError::NoRefreshToken(alias)),
        };

        let url = state.endpoints()?.refresh_url();
        let body = serde_json::to_value(RefreshRequest {
            refresh_token: &refresh_token,
        })?;

        Ok(self.obtain_tokens(&mut state, &alias, url, body, Grant::Refresh { aliases }))
    }

    /// Start (or join) the round-trip for `alias` and register it as pending
    fn obtain_tokens(
        &self,
        state: &mut State,
        alias: &str,
        url: String,
        body: Value,
        grant: Grant,
    ) -> PendingAuth {
        if let Some(entry) = state.pending.get(alias) {
            return entry.auth.clone();
        }

        let id = state.next_pending_id;
        state.next_pending_id += 1;
        let generation = state.generation;
        let timeout = state.request_timeout;

        let manager = self.clone();
        let key = alias.to_string();
        let handle = tokio::spawn(async move {
            let outcome = manager.round_trip(&url, body, timeout).await;
            manager.settle(&key, id, generation, grant, outcome)
        });

        let auth = async move {
            handle.await.unwrap_or_else(|e| {
                Err(SdkError::Internal(format!("Authentication task failed: {}", e)))
            })
        }
        .boxed()
        .shared();

        state.pending.insert(
            alias.to_string(),
            PendingEntry {
                id,
                auth: auth.clone(),
                joined: Vec::new(),
            },
        );

        auth
    }

    async fn round_trip(&self, url: &str, body: Value, timeout: Option<Duration>) -> Result<Tokens> {
        let request = self
            .inner
            .transport
            .execute(url, RequestOptions::post(body));

        let value = match timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .map_err(|_| SdkError::Timeout(limit))??,
            None => request.await?,
        };

        let tokens: Tokens = serde_json::from_value(value)?;
        if tokens.access_token.is_empty() {
            return Err(SdkError::InvalidResponse(
                "response does not contain access_token".to_string(),
            ));
        }

        Ok(tokens)
    }

    /// Apply a round-trip outcome and release its pending entry in one step
    fn settle(
        &self,
        alias: &str,
        id: u64,
        generation: u64,
        grant: Grant,
        outcome: Result<Tokens>,
    ) -> Result<Tokens> {
        let mut state = self.inner.state.lock();

        let joined = match state.pending.get(alias) {
            Some(entry) if entry.id == id => state
                .pending
                .remove(alias)
                .map(|entry| entry.joined)
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        let tokens = match outcome {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::error!("Unable to get tokens for {}: {}", alias, e);
                return Err(SdkError::Auth(e.to_string()));
            }
        };

        if state.generation != generation {
            tracing::debug!("Dropping tokens for {}: manager was terminated", alias);
            return Err(SdkError::Auth(
                "token manager was terminated during authentication".to_string(),
            ));
        }

        let granted = match grant {
            Grant::Login { alias } => {
                self.store_group(&mut state, vec![alias.clone()], &tokens, true)?;
                tracing::info!("Logged in as {}", alias);
                vec![alias]
            }
            Grant::Refresh { aliases } => {
                for alias in &aliases {
                    self.inner.storage.set_tokens(alias, &tokens, false)?;
                }
                tracing::info!("Refreshed tokens for {:?}", aliases);
                aliases
            }
        };

        for alias in joined.iter().filter(|alias| !granted.contains(alias)) {
            self.inner.storage.set_tokens(alias, &tokens, false)?;
        }

        Ok(tokens)
    }

    fn store_group(
        &self,
        state: &mut State,
        aliases: Vec<String>,
        tokens: &Tokens,
        make_default: bool,
    ) -> Result<()> {
        for (index, alias) in aliases.iter().enumerate() {
            self.inner
                .storage
                .set_tokens(alias, tokens, index == 0 && make_default)?;
        }

        let digest = RefreshDigest::start(
            Arc::downgrade(&self.inner),
            aliases,
            state.refresh_interval,
            state.max_refresh_failures,
        );
        state.refreshes.push(digest);

        Ok(())
    }
}
