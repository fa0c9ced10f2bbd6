// Copyright (c) 2026 Meridian Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # Meridian Registry Server
//!
//! The `meridian` binary runs the capability registry that agents and tools
//! register with, and the event hub that streams workflow execution progress
//! to dashboards.
//!
//! ## Commands
//!
//! - `meridian serve` - Run the registry HTTP server

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod serve;

/// Meridian capability registry - agent and tool discovery with liveness
/// tracking and execution event streaming
#[derive(Parser)]
#[command(name = "meridian")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "MERIDIAN_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the registry HTTP server
    Serve(serve::ServeArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Serve(args) => serve::run(args).await,
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
