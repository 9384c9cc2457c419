//! Session commands.

use crate::display::print_json;
use anyhow::{Context, Result};
use chartfeed_lib::prelude::*;
use serde_json::json;

/// Start a session and print its token.
pub(crate) async fn new_session(settings: &Settings) -> Result<()> {
    let service = super::service(settings).await?;
    let token = service
        .initiate_session()
        .await
        .context("Failed to start a session")?;
    print_json(&json!({ "session": token }))
}

/// Refresh a session's heartbeat.
pub(crate) async fn heartbeat(settings: &Settings, token: &str) -> Result<()> {
    let service = super::service(settings).await?;
    service
        .heartbeat(token)
        .await
        .with_context(|| format!("Heartbeat for session {token} failed"))?;
    print_json(&json!({ "session": token, "alive": true }))
}
