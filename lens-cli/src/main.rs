//! Lens CLI
//!
//! Command-line interface for running investment research jobs.

mod attachments;
mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use lens_research::BackendKind;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Log filter used when `RUST_LOG` is unset
const DEFAULT_LOG_FILTER: &str = "lens=info";

#[derive(Parser)]
#[command(name = "lens")]
#[command(about = "Lens Navigator investment research CLI", long_about = None)]
struct Cli {
    /// Analysis backend (openai, azure or zapier)
    #[arg(long, env = "LENS_BACKEND")]
    backend: Option<BackendKind>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so reports can be piped
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.backend)?;

    handle_command(cli.command, &config).await
}
