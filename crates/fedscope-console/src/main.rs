//! FedScope terminal dashboard binary.

mod config;
mod console;
mod export;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fedscope_backend::{connect_metric_feed, load_all_experiments, BackendClient};
use fedscope_store::{StoreHandle, StoreService};

use crate::config::ConsoleConfig;
use crate::console::{run_dashboard_console, ConsoleEvent};

#[derive(Parser, Debug)]
#[command(
    name = "fedscope-console",
    about = "Terminal dashboard for hierarchical federated training runs",
    version
)]
struct Cli {
    /// Path to a TOML config file (default: the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend HTTP base URL, overriding the config file
    #[arg(long)]
    http_base: Option<String>,

    /// Backend WebSocket feed URL, overriding the config file
    #[arg(long)]
    ws_url: Option<String>,

    /// Directory for CSV exports, overriding the config file
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Log level filter (e.g. info, debug, fedscope_backend=trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Append logs to this file; without it logs are discarded while the
    /// dashboard owns the terminal
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).context("invalid log level")?;
    match &cli.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .with_target(true)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::sink)
                .init();
        }
    }

    let mut config = ConsoleConfig::load(cli.config.as_deref())?;
    if let Some(http_base) = cli.http_base {
        config.backend.http_base = http_base;
    }
    if let Some(ws_url) = cli.ws_url {
        config.backend.ws_url = ws_url;
    }
    if let Some(export_dir) = cli.export_dir {
        config.export_dir = export_dir;
    }
    info!(http_base = %config.backend.http_base, "starting fedscope console");

    let (service, store) = StoreService::new();
    tokio::spawn(service.run());

    let client = BackendClient::new(&config.backend)?;
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    // First load in the background so the dashboard comes up immediately.
    {
        let client = client.clone();
        let store = store.clone();
        let events = events_tx.clone();
        tokio::spawn(async move {
            let event = match load_all_experiments(&client, &store).await {
                Ok(report) => ConsoleEvent::ReloadFinished(report),
                Err(error) => ConsoleEvent::ReloadFailed(error.to_string()),
            };
            let _ = events.send(event);
        });
    }

    tokio::spawn(run_feed(config.clone(), store.clone(), events_tx.clone()));

    run_dashboard_console(store, client, config, events_tx, events_rx).await
}

/// Open the live feed once and report how it ends.
///
/// The feed carries no acknowledgements and there is no reconnect policy:
/// when the connection drops, the task ends and the disconnect shows up in
/// the event log and status line.
async fn run_feed(
    config: ConsoleConfig,
    store: StoreHandle,
    events: mpsc::UnboundedSender<ConsoleEvent>,
) {
    match connect_metric_feed(&config.backend).await {
        Ok(feed) => {
            if events.send(ConsoleEvent::FeedUp).is_err() {
                return;
            }
            let reason = match feed.run(&store).await {
                Ok(()) => "server closed the feed".to_string(),
                Err(error) => error.to_string(),
            };
            let _ = events.send(ConsoleEvent::FeedDown(reason));
        }
        Err(error) => {
            let _ = events.send(ConsoleEvent::FeedDown(error.to_string()));
        }
    }
}
