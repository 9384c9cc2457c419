//! Long-running worker.
//!
//! Reads one JSON request per line from stdin and writes one JSON response per
//! line to stdout. Fan-out and the expiry sweep run in the same process.

use anyhow::{Context, Result};
use chartfeed_lib::prelude::*;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

/// A request line, tagged by `op`.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request {
    Initiate,
    Heartbeat { session: String },
    Initial(ChartQuery),
    Page {
        handle: String,
        #[serde(default)]
        offset: usize,
        limit: usize,
    },
}

/// Serve requests until stdin closes or the process is interrupted.
pub(crate) async fn worker(settings: &Settings) -> Result<()> {
    let service = super::service(settings).await?;
    let pool = Arc::new(FanoutPool::spawn(
        service.results().clone(),
        settings.fanout_workers,
        settings.fanout_queue,
    ));
    let service = service.with_fanout(Arc::clone(&pool));
    let sweeper = SweepScheduler::spawn(service.sessions().clone(), settings.sweep_interval);
    info!(
        workers = settings.fanout_workers,
        sweep_secs = settings.sweep_interval.as_secs(),
        "worker started"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let mut out = handle_line(&service, &line).await.to_string();
                out.push('\n');
                stdout.write_all(out.as_bytes()).await?;
                stdout.flush().await?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    sweeper.stop().await;
    pool.close().await;
    info!("worker stopped");
    Ok(())
}

async fn handle_line(service: &HistoryService, line: &str) -> Value {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => return json!({ "error": format!("invalid request: {e}"), "status": 400 }),
    };
    match handle(service, request).await {
        Ok(value) => value,
        Err(e) => {
            let status = e.rejection().status_code();
            if status >= 500 {
                warn!(error = %e, "request failed");
            }
            json!({ "error": e.to_string(), "status": status })
        }
    }
}

async fn handle(service: &HistoryService, request: Request) -> Result<Value, QueryError> {
    let value = match request {
        Request::Initiate => json!({ "session": service.initiate_session().await? }),
        Request::Heartbeat { session } => {
            service.heartbeat(&session).await?;
            json!({ "session": session, "alive": true })
        }
        Request::Initial(query) => to_value(&service.get_initial(&query).await?),
        Request::Page {
            handle,
            offset,
            limit,
        } => to_value(&service.get_page(&handle, offset, limit).await?),
    };
    Ok(value)
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| json!({ "error": e.to_string(), "status": 500 }))
}
