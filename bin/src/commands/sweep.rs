//! Sweep command.

use crate::display::print_json;
use anyhow::{Context, Result};
use chartfeed_lib::prelude::*;
use tracing::info;

/// Run one sweep, or sweep periodically until interrupted.
pub(crate) async fn sweep(settings: &Settings, once: bool) -> Result<()> {
    let service = super::service(settings).await?;

    if once {
        let report = service.sweep().await.context("Sweep failed")?;
        return print_json(&report);
    }

    let sweeper = SweepScheduler::spawn(service.sessions().clone(), settings.sweep_interval);
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for interrupt")?;
    info!("interrupted, stopping sweeper");
    sweeper.stop().await;
    Ok(())
}
