//! Research command handlers
//!
//! Runs a research job in the foreground, streaming progress lines while it
//! polls. Ctrl-C asks the backend to cancel the job, or every lens job of
//! a multi-lens run.

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use lens_core::domain::request::{DEFAULT_MAX_TOOL_CALLS, JobRequest, JobRequestBuilder, Lens};
use lens_research::{ResearchError, ResearchState, run_multi_lens};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::job::print_result;
use crate::attachments::read_attachments;
use crate::config::Config;

/// Fields shared by every research request
#[derive(Args)]
pub struct SubjectArgs {
    /// Company under analysis
    #[arg(short, long)]
    company: String,

    /// Research question or prompt
    #[arg(short, long)]
    query: String,

    #[arg(long)]
    sector: Option<String>,

    /// Funding stage (e.g., Seed, Series A)
    #[arg(long)]
    stage: Option<String>,

    #[arg(long)]
    location: Option<String>,

    /// Documents to attach (repeatable)
    #[arg(short, long = "file")]
    files: Vec<PathBuf>,

    /// Ignore and do not update the result cache
    #[arg(long)]
    no_cache: bool,
}

impl SubjectArgs {
    async fn builder(&self) -> Result<JobRequestBuilder> {
        let attachments = read_attachments(&self.files).await?;

        let mut builder =
            JobRequest::builder(self.company.clone(), self.query.clone()).attachments(attachments);
        if let Some(sector) = &self.sector {
            builder = builder.sector(sector.clone());
        }
        if let Some(stage) = &self.stage {
            builder = builder.stage(stage.clone());
        }
        if let Some(location) = &self.location {
            builder = builder.location(location.clone());
        }
        Ok(builder)
    }
}

/// Arguments of `lens research`
#[derive(Args)]
pub struct ResearchArgs {
    #[command(flatten)]
    subject: SubjectArgs,

    /// Analytical lens (skeptical, contrarian, optimistic, cfo, unified)
    #[arg(short, long, default_value = "unified")]
    lens: Lens,

    /// Existing document collection to search (at most two)
    #[arg(long = "collection")]
    collections: Vec<String>,

    /// Disable web search
    #[arg(long)]
    no_web_search: bool,

    /// Enable the code interpreter tool
    #[arg(long)]
    code_interpreter: bool,

    /// Maximum tool calls the backend may make
    #[arg(long, default_value_t = DEFAULT_MAX_TOOL_CALLS)]
    max_tool_calls: u32,
}

/// Arguments of `lens multi-lens`
#[derive(Args)]
pub struct MultiLensArgs {
    #[command(flatten)]
    subject: SubjectArgs,
}

/// Run one research job in the foreground
pub async fn handle_research(args: ResearchArgs, config: &Config) -> Result<()> {
    let mut builder = args
        .subject
        .builder()
        .await?
        .lens(args.lens)
        .web_search(!args.no_web_search)
        .code_interpreter(args.code_interpreter)
        .max_tool_calls(args.max_tool_calls);
    for collection in args.collections {
        builder = builder.collection(collection);
    }
    let request = builder.build();

    let controller = Arc::new(config.controller(!args.subject.no_cache)?);
    let progress = spawn_progress_printer(controller.subscribe());

    println!(
        "{}",
        format!(
            "Researching {} ({} lens) on {}. Press Ctrl-C to cancel.",
            request.company(),
            request.lens(),
            controller.backend().name()
        )
        .bold()
    );

    let mut run = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.start_research(request).await })
    };

    let outcome = tokio::select! {
        joined = &mut run => joined.context("Research task panicked")?,
        _ = tokio::signal::ctrl_c() => {
            println!("{}", "Cancelling research...".yellow());
            if !controller.cancel_research().await {
                warn!("Cancellation was not accepted; waiting for the job to finish");
            }
            run.await.context("Research task panicked")?
        }
    };

    // The printer stops once the last controller handle is gone
    drop(controller);
    let _ = progress.await;

    match outcome {
        Ok(result) => {
            println!();
            print_result(&result);
            Ok(())
        }
        Err(ResearchError::Cancelled) => {
            println!("{}", "Research cancelled".yellow());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Run all single lenses and print the combined report
pub async fn handle_multi_lens(args: MultiLensArgs, config: &Config) -> Result<()> {
    let request = args.subject.builder().await?.build();

    let cache = if args.subject.no_cache {
        None
    } else {
        Some(
            config
                .research
                .open_cache()
                .context("Failed to open result cache")?,
        )
    };

    println!(
        "{}",
        format!(
            "Running {} lens analyses for {}...",
            Lens::SINGLE.len(),
            request.company()
        )
        .bold()
    );

    let backend = config.research.build_backend();
    let policy = config.research.poll_policy();
    let cancel = CancellationToken::new();

    let run = run_multi_lens(backend, cache, &policy, &request, &cancel);
    tokio::pin!(run);

    let outcome = tokio::select! {
        outcome = &mut run => outcome,
        _ = tokio::signal::ctrl_c() => {
            println!("{}", "Cancelling lens analyses...".yellow());
            cancel.cancel();
            run.await
        }
    };

    let report = match outcome {
        Ok(report) => report,
        Err(ResearchError::Cancelled) => {
            println!("{}", "Research cancelled".yellow());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if report.is_partial() {
        let failed: Vec<&str> = report.failed_lenses.iter().map(|l| l.label()).collect();
        println!(
            "{}",
            format!("⚠ Failed to complete: {}", failed.join(", ")).yellow()
        );
    }
    println!();
    print_result(&report.result);

    Ok(())
}

/// Prints each new progress line until the controller goes away
fn spawn_progress_printer(mut states: watch::Receiver<ResearchState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last = String::new();
        while states.changed().await.is_ok() {
            let progress = states.borrow_and_update().progress.clone();
            if !progress.is_empty() && progress != last {
                println!("  {} {}", "▸".cyan(), progress.dimmed());
                last = progress;
            }
        }
    })
}
