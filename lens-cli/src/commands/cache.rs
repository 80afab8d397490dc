//! Cache command handlers

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;

use crate::config::Config;

/// Cache subcommands
#[derive(Subcommand)]
pub enum CacheCommands {
    /// Remove every cached research result
    Clear,
}

pub fn handle_cache_command(command: CacheCommands, config: &Config) -> Result<()> {
    match command {
        CacheCommands::Clear => {
            let cache = config
                .research
                .open_cache()
                .context("Failed to open result cache")?;
            let removed = cache.clear();
            println!(
                "{}",
                format!("✓ Removed {} cached result(s)", removed).green()
            );
            Ok(())
        }
    }
}
