//! Magnetdav CLI - Command-line interface
//!
//! Runs the server and gives offline access to the catalog.

mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use magnetdav_core::MagnetdavConfig;
use magnetdav_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "magnetdav")]
#[command(about = "Serve magnet-linked content as seekable WebDAV files")]
#[command(version)]
struct Cli {
    /// Console log level
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info, global = true)]
    log_level: CliLogLevel,

    /// Directory for the full trace log
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,

    /// Catalog database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_level.into(), cli.logs_dir.as_deref())
        .context("Failed to initialize tracing")?;

    let mut config = MagnetdavConfig::from_env();
    if let Some(db) = cli.db {
        config.catalog.database_path = db;
    }

    commands::handle_command(cli.command, config).await
}
