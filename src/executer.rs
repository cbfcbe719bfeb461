use serde_json::Value;
use std::sync::Arc;

use crate::auth::TokenManager;
use crate::dataops::DataRequest;
use crate::error::Result;
use crate::transport::{RequestAdapter, RequestOptions};

/// Dispatches data requests with a bearer token from the token manager
#[derive(Clone)]
pub struct RequestExecuter {
    project_url: String,

    /// Authentication alias, default alias when `None`
    alias: Option<String>,

    transport: Arc<dyn RequestAdapter>,
    token_manager: TokenManager,
}

impl RequestExecuter {
    pub fn new(
        project_url: impl Into<String>,
        transport: Arc<dyn RequestAdapter>,
        token_manager: TokenManager,
    ) -> Self {
        Self {
            project_url: project_url.into(),
            alias: None,
            transport,
            token_manager,
        }
    }

    /// Use the token stored under `alias`
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Execute a data request
    ///
    /// Token and transport failures are returned as they are, without retry.
    pub async fn execute_request(&self, request: DataRequest) -> Result<Value> {
        let token = self.token_manager.token(self.alias.as_deref()).await?;
        let url = request.url(&self.project_url)?;

        let mut options = RequestOptions::new(request.action.method())
            .with_header("Authorization", format!("Bearer {}", token));
        if let Some(body) = request.body {
            options = options.with_body(body);
        }

        tracing::debug!(
            dataset = %request.dataset,
            action = ?request.action,
            "Executing data request"
        );

        self.transport.execute(&url, options).await
    }
}
