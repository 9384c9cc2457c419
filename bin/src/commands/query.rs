//! Query and page commands.

use crate::display::{parse_range, print_json};
use anyhow::{Context, Result};
use chartfeed_lib::prelude::*;
use serde::Serialize;

#[derive(Serialize)]
struct QueryOutput {
    session: String,
    #[serde(flatten)]
    response: InitialResponse,
}

/// Resolve a series and print the session, handle and first page.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn query(
    settings: &Settings,
    exchange: &str,
    symbol: &str,
    interval: &str,
    start: &str,
    end: &str,
    session: Option<String>,
    limit: Option<usize>,
) -> Result<()> {
    let (start, end) = parse_range(start, end)?;
    let service = super::service(settings).await?;

    let session = match session {
        Some(session) => session,
        None => service
            .initiate_session()
            .await
            .context("Failed to start a session")?,
    };

    let mut query = ChartQuery::new(exchange, symbol, interval, start, end, &session);
    query.page_limit = limit;
    let response = service
        .get_initial(&query)
        .await
        .with_context(|| format!("Query for {exchange}:{symbol} {interval} failed"))?;

    print_json(&QueryOutput { session, response })
}

/// Print a slice of a materialized result.
pub(crate) async fn page(settings: &Settings, handle: &str, offset: usize, limit: usize) -> Result<()> {
    let service = super::service(settings).await?;
    let page = service
        .get_page(handle, offset, limit)
        .await
        .with_context(|| format!("Failed to read {handle}"))?;
    print_json(&page)
}
