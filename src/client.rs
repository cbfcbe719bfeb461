use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

use crate::auth::{AuthOptions, MemoryTokenStorage, SqliteTokenStorage, TokenManager, TokenStorage};
use crate::dataops::Dataset;
use crate::error::{Result, SdkError};
use crate::executer::RequestExecuter;
use crate::transport::RequestAdapter;

/// Entry point of the SDK: owns the token manager and hands out datasets
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn RequestAdapter>,
    token_manager: TokenManager,

    /// Storage was chosen by the caller, `remember` does not override it
    custom_storage: bool,

    /// Set by a successful `init()`
    executer: Option<Arc<RequestExecuter>>,
}

impl Client {
    /// Create a client with in-memory token storage
    pub fn new(transport: Arc<dyn RequestAdapter>) -> Self {
        let token_manager = TokenManager::new(transport.clone(), Arc::new(MemoryTokenStorage::new()));
        Self {
            transport,
            token_manager,
            custom_storage: false,
            executer: None,
        }
    }

    /// Keep tokens in `storage` instead
    pub fn with_storage(mut self, storage: Arc<dyn TokenStorage>) -> Self {
        self.token_manager.terminate();
        self.token_manager = TokenManager::new(self.transport.clone(), storage);
        self.custom_storage = true;
        self.executer = None;
        self
    }

    /// Initialize the token manager and resolve the project URL
    ///
    /// With `remember` set and no custom storage, tokens are persisted in the
    /// default SQLite database.
    pub async fn init(mut self, options: AuthOptions) -> Result<Self> {
        if options.remember && !self.custom_storage {
            let storage = SqliteTokenStorage::open_default()?;
            self = self.with_storage(Arc::new(storage));
        }

        self.token_manager.init(options).await?;

        let project_url = self
            .token_manager
            .project_url()
            .ok_or_else(|| SdkError::Internal("Project URL not resolved after init".to_string()))?;

        tracing::info!(project_url = %project_url, "Client initialized");

        self.executer = Some(Arc::new(RequestExecuter::new(
            project_url,
            self.transport.clone(),
            self.token_manager.clone(),
        )));
        Ok(self)
    }

    /// Typed handle to the dataset `name`
    pub fn dataset<T: Serialize + DeserializeOwned>(&self, name: &str) -> Result<Dataset<T>> {
        let executer = self
            .executer
            .as_ref()
            .ok_or_else(|| SdkError::Config("Client is not initialized".to_string()))?;
        Ok(Dataset::new(name, Arc::clone(executer)))
    }

    pub fn token_manager(&self) -> &TokenManager {
        &self.token_manager
    }

    /// Terminate the token manager; datasets of this client stop authenticating
    pub fn terminate(&mut self) {
        self.token_manager.terminate();
        self.executer = None;
    }
}
