//! CLI command implementations.

pub(crate) mod backfill;
pub(crate) mod query;
pub(crate) mod session;
pub(crate) mod sweep;
pub(crate) mod worker;

use anyhow::{Context, Result};
use chartfeed_lib::prelude::*;
use tracing::debug;

/// Reads settings from the environment and applies command-line overrides.
pub(crate) fn settings(redis_url: Option<String>, upstream_url: Option<String>) -> Settings {
    let mut settings = Settings::from_env();
    if let Some(url) = redis_url {
        settings.redis_url = url;
    }
    if let Some(url) = upstream_url {
        settings.upstream.base_url = url;
    }
    settings
}

/// Returns a supervised upstream feed. No connection is opened until the first fetch.
pub(crate) fn upstream(settings: &Settings) -> Arc<Supervisor<HttpConnector>> {
    Arc::new(Supervisor::new(
        HttpConnector::new(settings.upstream.clone()),
        settings.upstream.backoff(),
    ))
}

/// Connects to Redis and builds the history service.
pub(crate) async fn service(settings: &Settings) -> Result<HistoryService> {
    let store = RedisStore::connect(&settings.redis_url)
        .await
        .with_context(|| format!("Failed to connect to {}", settings.redis_url))?;
    debug!(upstream = %settings.upstream.base_url, "history service ready");
    Ok(HistoryService::new(Arc::new(store), upstream(settings), settings))
}
