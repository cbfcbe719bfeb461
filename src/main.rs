use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;

use jexia_sdk::config::Config;
use jexia_sdk::{Client, HttpRequestAdapter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        project_id = %config.project_id,
        dataset = %config.dataset,
        "Fetching records"
    );

    let transport = Arc::new(HttpRequestAdapter::new(
        config.http_max_connections,
        config.http_connect_timeout,
        config.http_request_timeout,
        config.http_max_retries,
    )?);

    let mut client = Client::new(transport)
        .init(config.auth_options())
        .await
        .context("Failed to initialize client")?;

    match client.token_manager().token(None).await {
        Ok(token) => {
            tracing::info!("Authentication successful (token: {}...)", token_preview(&token));
        }
        Err(e) => {
            tracing::warn!("No token available, request will fail: {}", e);
        }
    }

    let result = client
        .dataset::<Value>(&config.dataset)?
        .select()
        .execute()
        .await;

    client.terminate();

    let records = result.with_context(|| format!("Failed to select from {}", config.dataset))?;
    tracing::info!("Received {} records", records.len());
    println!("{}", serde_json::to_string_pretty(&records)?);

    Ok(())
}

/// First characters of a token, safe to log
fn token_preview(token: &str) -> String {
    token.chars().take(20).collect()
}
