//! chartfeed CLI - session-scoped OHLCV history cache.

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod display;

#[derive(Parser)]
#[command(name = "chartfeed")]
#[command(about = "Session-scoped OHLCV history cache", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Redis URL (overrides CHARTFEED_REDIS_URL)
    #[arg(long, global = true)]
    redis_url: Option<String>,

    /// Upstream gateway URL (overrides CHARTFEED_UPSTREAM_URL)
    #[arg(long, global = true)]
    upstream_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a series and print its most recent page
    Query {
        /// Exchange (e.g., NASDAQ)
        exchange: String,

        /// Symbol (e.g., AAPL)
        symbol: String,

        /// Interval (1s, 5s, 10s, 15s, 30s, 45s, 1m, 5m, 10m, 15m, 30m, 45m, 1h, 1d)
        #[arg(short, long, default_value = "1m")]
        interval: String,

        /// Start (RFC 3339 or YYYY-MM-DD)
        #[arg(short, long)]
        start: String,

        /// End (RFC 3339 or YYYY-MM-DD, a date means the end of that day)
        #[arg(short, long)]
        end: String,

        /// Session token. A new session is started if omitted.
        #[arg(long)]
        session: Option<String>,

        /// Bars in the first page (defaults to CHARTFEED_INITIAL_PAGE_LIMIT)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Print a slice of a materialized result
    Page {
        /// Result handle returned by `query`
        handle: String,

        /// Index of the first bar
        #[arg(short, long, default_value = "0")]
        offset: usize,

        /// Maximum bars to return
        #[arg(short, long, default_value = "5000")]
        limit: usize,
    },

    /// Start or refresh a session
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Reclaim idle sessions
    Sweep {
        /// Run one sweep and exit instead of sweeping periodically
        #[arg(long)]
        once: bool,
    },

    /// Serve JSON requests from stdin with fan-out and sweeping in-process
    Worker,

    /// Fetch 1-second history into the local store and aggregate it
    Backfill {
        /// Exchange (e.g., NASDAQ)
        exchange: String,

        /// Symbol (e.g., AAPL)
        symbol: String,

        /// Start (RFC 3339 or YYYY-MM-DD)
        #[arg(short, long)]
        start: String,

        /// End (RFC 3339 or YYYY-MM-DD, a date means the end of that day)
        #[arg(short, long)]
        end: String,

        /// Target intervals (defaults to 5s, 1m, 5m, 15m, 1h, 1d)
        #[arg(short, long, value_delimiter = ',')]
        targets: Vec<String>,

        /// Data directory (defaults to the platform data directory)
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Maximum concurrent day fetches
        #[arg(long, default_value = "4")]
        concurrency: usize,
    },
}

/// Session actions.
#[derive(Subcommand)]
enum SessionAction {
    /// Start a session and print its token
    New,

    /// Mark a session as alive
    Heartbeat {
        /// Session token
        token: String,
    },
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // Stdout carries JSON results
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    // Show help if no command provided
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let settings = commands::settings(cli.redis_url, cli.upstream_url);

    match command {
        Commands::Query {
            exchange,
            symbol,
            interval,
            start,
            end,
            session,
            limit,
        } => {
            commands::query::query(
                &settings, &exchange, &symbol, &interval, &start, &end, session, limit,
            )
            .await
        }
        Commands::Page {
            handle,
            offset,
            limit,
        } => commands::query::page(&settings, &handle, offset, limit).await,
        Commands::Session { action } => match action {
            SessionAction::New => commands::session::new_session(&settings).await,
            SessionAction::Heartbeat { token } => {
                commands::session::heartbeat(&settings, &token).await
            }
        },
        Commands::Sweep { once } => commands::sweep::sweep(&settings, once).await,
        Commands::Worker => commands::worker::worker(&settings).await,
        Commands::Backfill {
            exchange,
            symbol,
            start,
            end,
            targets,
            data_dir,
            concurrency,
        } => {
            commands::backfill::backfill(
                &settings,
                &exchange,
                &symbol,
                &start,
                &end,
                &targets,
                data_dir,
                concurrency,
            )
            .await
        }
    }
}
