//! Job command handlers
//!
//! Queries and cancels jobs that were submitted earlier, by their backend
//! handle. Only backends that run jobs in the background support these.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use lens_core::domain::job::{JobHandle, JobResult, JobState};
use lens_core::dto::job::JobStatusReport;

use crate::config::Config;

/// Job subcommands
#[derive(Subcommand)]
pub enum JobCommands {
    /// Show the current state of a job
    Status {
        /// Backend job handle (e.g., resp_...)
        id: String,
    },
    /// Ask the backend to cancel a job
    Cancel {
        /// Backend job handle (e.g., resp_...)
        id: String,
    },
}

/// Handle job commands
pub async fn handle_job_command(command: JobCommands, config: &Config) -> Result<()> {
    let backend = config.research.build_backend();

    match command {
        JobCommands::Status { id } => {
            let report = backend
                .get_status(&JobHandle::new(id.as_str()))
                .await
                .with_context(|| format!("Failed to get status of job {}", id))?;
            print_report(&report);
            Ok(())
        }
        JobCommands::Cancel { id } => {
            backend
                .cancel(&JobHandle::new(id.as_str()))
                .await
                .with_context(|| format!("Failed to cancel job {}", id))?;
            println!("{}", format!("✓ Cancellation requested for {}", id).green());
            Ok(())
        }
    }
}

/// Print a status report
fn print_report(report: &JobStatusReport) {
    println!("{}", "Job Details:".bold());
    println!("  ID:     {}", report.id.as_str().cyan());
    println!("  Status: {}", colorize_state(report.state));

    if let Some(error) = &report.error {
        println!("\n{}", "Error:".bold());
        println!("{}", error.red());
    }

    if report.state == JobState::Completed {
        if let Some(result) = report.clone().into_result() {
            println!();
            print_result(&result);
        }
    }
}

/// Print a completed research result with its citations
pub fn print_result(result: &JobResult) {
    println!("{}", "Research Report:".bold());
    println!("{}", "─".repeat(80).dimmed());
    println!("{}", result.output());
    println!("{}", "─".repeat(80).dimmed());

    if !result.citations().is_empty() {
        println!("\n{}", "Citations:".bold());
        for (i, citation) in result.citations().iter().enumerate() {
            println!(
                "  [{}] {} {}",
                i + 1,
                citation.title.cyan(),
                citation.url.dimmed()
            );
        }
    }
}

/// Colorize job state for display
pub fn colorize_state(state: JobState) -> colored::ColoredString {
    let label = state.label();
    match state {
        JobState::Queued => label.yellow(),
        JobState::InProgress => label.blue(),
        JobState::Completed => label.green(),
        JobState::Failed => label.red(),
        JobState::Cancelled | JobState::Incomplete => label.dimmed(),
    }
}
