//! Simulated HFL monitoring backend: serves the API and streams a run.

use std::time::Duration;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use fedscope_sim::{GeneratorConfig, RoundGenerator, SimServer};

/// Serves the backend API and plays a scripted hierarchical run against it.
#[derive(Parser)]
#[command(name = "fedscope-sim", about)]
struct Cli {
    /// Address to serve the backend API on.
    #[arg(long, default_value = "127.0.0.1:8000")]
    bind: String,

    /// Number of leaf clients.
    #[arg(long, default_value_t = 8)]
    clients: usize,

    /// Clients reporting to each edge server.
    #[arg(long, default_value_t = 4)]
    clients_per_edge: usize,

    /// Training rounds to simulate.
    #[arg(long, default_value_t = 10)]
    rounds: u64,

    /// Milliseconds between rounds.
    #[arg(long, default_value_t = 500)]
    pace_ms: u64,

    /// RNG seed for a reproducible run.
    #[arg(long)]
    seed: Option<u64>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    ensure!(cli.clients > 0, "--clients must be positive");
    ensure!(cli.clients_per_edge > 0, "--clients-per-edge must be positive");

    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;
    fmt().with_env_filter(filter).with_target(true).init();

    let server = SimServer::bind(&cli.bind)
        .await
        .with_context(|| format!("binding {}", cli.bind))?;

    let generator = RoundGenerator::new(
        GeneratorConfig {
            num_clients: cli.clients,
            clients_per_edge: cli.clients_per_edge,
            rounds: cli.rounds,
            pace: Duration::from_millis(cli.pace_ms),
            seed: cli.seed,
        },
        server.store(),
        server.feed_sender(),
    );

    tokio::spawn(async move {
        // Let the console connect its feed before the first rounds play.
        tokio::time::sleep(Duration::from_millis(200)).await;
        if let Err(error) = generator.run().await {
            tracing::error!(error = %error, "generator stopped");
        }
    });

    server.run().await
}
