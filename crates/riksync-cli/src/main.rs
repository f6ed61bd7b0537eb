//! riksync CLI - Command-line interface for riksync
//!
//! Provides commands for:
//! - Running sync cycles and the strategic plan
//! - Viewing per-resource progress
//! - Browsing the sync attempt log
//! - Resetting cursors
//! - Managing configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use riksync_core::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    audit::AuditCommand, config::ConfigCommand, reset::ResetCommand, status::StatusCommand,
    sync::SyncCommand, CliContext,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "riksync",
    version,
    about = "Incremental sync of the Riksdag open-data API into SQLite"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a sync cycle, the strategic plan, or a preview
    Sync(SyncCommand),
    /// Show per-resource sync progress
    Status(StatusCommand),
    /// View the sync attempt log
    Audit(AuditCommand),
    /// Rewind cursors so resources are fetched again
    Reset(ResetCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

fn init_tracing(verbose: u8, logging: &LoggingConfig) {
    let level = match verbose {
        0 => logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let ctx = CliContext::load(cli.config.as_deref())?;

    init_tracing(cli.verbose, &ctx.config.logging);

    let format = OutputFormat::from_json_flag(cli.json);

    match &cli.command {
        Commands::Sync(cmd) => cmd.execute(&ctx, format).await,
        Commands::Status(cmd) => cmd.execute(&ctx, format).await,
        Commands::Audit(cmd) => cmd.execute(&ctx, format).await,
        Commands::Reset(cmd) => cmd.execute(&ctx, format).await,
        Commands::Config(cmd) => cmd.execute(&ctx, format).await,
    }
}
