//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod cache;
mod collection;
mod job;
mod research;

pub use cache::CacheCommands;
pub use collection::CollectionCommands;
pub use job::JobCommands;
pub use research::{MultiLensArgs, ResearchArgs};

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run one research job and print the report
    Research(ResearchArgs),
    /// Run all four lenses concurrently and combine the reports
    MultiLens(MultiLensArgs),
    /// Inspect or cancel a submitted job
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Document collection management
    Collection {
        #[command(subcommand)]
        command: CollectionCommands,
    },
    /// Result cache management
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Research(args) => research::handle_research(args, config).await,
        Commands::MultiLens(args) => research::handle_multi_lens(args, config).await,
        Commands::Job { command } => job::handle_job_command(command, config).await,
        Commands::Collection { command } => {
            collection::handle_collection_command(command, config).await
        }
        Commands::Cache { command } => cache::handle_cache_command(command, config),
    }
}
