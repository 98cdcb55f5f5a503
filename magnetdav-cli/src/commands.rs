//! CLI command implementations

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Subcommand;
use magnetdav_core::catalog::CatalogStore;
use magnetdav_core::{ContentId, LifecycleManager, MagnetdavConfig, SimulatedSwarm, SqliteCatalog};
use magnetdav_web::{run_server, shutdown_signal};
use tracing::info;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the WebDAV and API server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
        /// Directory whose sub-directories are seeded into the simulated swarm
        #[arg(long)]
        seed_dir: Option<PathBuf>,
        /// Seconds to wait for content metadata
        #[arg(long)]
        metadata_timeout: Option<u64>,
    },
    /// Inspect or edit the catalog without starting the server
    Catalog {
        #[command(subcommand)]
        action: CatalogCommand,
    },
}

#[derive(Subcommand)]
pub enum CatalogCommand {
    /// List all records
    List,
    /// List the files of one record
    Files {
        /// Content identifier
        id: String,
    },
    /// Delete a record and its files
    Remove {
        /// Content identifier
        id: String,
    },
}

/// Handle the CLI command
///
/// # Errors
///
/// Returns the error of whichever step of the command failed
pub async fn handle_command(command: Commands, mut config: MagnetdavConfig) -> Result<()> {
    match command {
        Commands::Serve {
            host,
            port,
            seed_dir,
            metadata_timeout,
        } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if seed_dir.is_some() {
                config.swarm.seed_dir = seed_dir;
            }
            if let Some(seconds) = metadata_timeout {
                config.swarm.metadata_timeout = Duration::from_secs(seconds);
            }
            serve(config).await
        }
        Commands::Catalog { action } => {
            let catalog = open_catalog(&config)?;
            match action {
                CatalogCommand::List => list_records(&catalog).await,
                CatalogCommand::Files { id } => list_files(&catalog, &id).await,
                CatalogCommand::Remove { id } => remove_record(&catalog, &id).await,
            }
        }
    }
}

fn open_catalog(config: &MagnetdavConfig) -> Result<SqliteCatalog> {
    let path = &config.catalog.database_path;
    SqliteCatalog::open(path, config.catalog.busy_timeout)
        .with_context(|| format!("Failed to open catalog at {}", path.display()))
}

fn magnet_link(id: &ContentId) -> String {
    format!("magnet:?xt=urn:btih:{id}")
}

async fn serve(config: MagnetdavConfig) -> Result<()> {
    let catalog = open_catalog(&config)?;

    let swarm = match &config.swarm.seed_dir {
        Some(dir) => SimulatedSwarm::from_directory(dir)
            .with_context(|| format!("Failed to read seed directory {}", dir.display()))?,
        None => SimulatedSwarm::new(),
    };
    for id in swarm.content_ids() {
        info!("Seeded: {}", magnet_link(&id));
    }

    let manager = LifecycleManager::new(
        Arc::new(catalog),
        Arc::new(swarm),
        config.swarm.metadata_timeout,
    );
    let recovered = manager.recover().await?;
    info!("Re-acquiring {} ready records", recovered);

    run_server(&config, manager, shutdown_signal()).await?;
    Ok(())
}

async fn list_records(catalog: &SqliteCatalog) -> Result<()> {
    let records = catalog.list_records().await?;
    if records.is_empty() {
        println!("No content in catalog");
        return Ok(());
    }

    println!("{:<42} {:<8} {:>6} {:>14}  NAME", "ID", "STATUS", "FILES", "BYTES");
    for record in records {
        println!(
            "{:<42} {:<8} {:>6} {:>14}  {}",
            record.id.as_str(),
            record.status.as_str(),
            record.file_count,
            record.total_size,
            record.name
        );
        if let Some(reason) = record.error_message {
            println!("    error: {reason}");
        }
    }
    Ok(())
}

async fn list_files(catalog: &SqliteCatalog, id: &str) -> Result<()> {
    let id = ContentId::new(id.to_lowercase());
    if catalog.get_record(&id).await?.is_none() {
        anyhow::bail!("Content {id} not found");
    }

    for file in catalog.files_for(&id).await? {
        println!(
            "{:>4} {:>14}  {:<24} {}",
            file.file_index, file.size, file.media_type, file.path
        );
    }
    Ok(())
}

async fn remove_record(catalog: &SqliteCatalog, id: &str) -> Result<()> {
    let id = ContentId::new(id.to_lowercase());
    if !catalog.remove_record(&id).await? {
        anyhow::bail!("Content {id} not found");
    }
    println!("Removed {id}");
    Ok(())
}
