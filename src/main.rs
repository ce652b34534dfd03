//! # Shoebox - Photo Ingestion CLI
//!
//! Ingests photos into a self-hosted photo library: deduplicates them by
//! content hash, renders thumbnail/small/full variants into a sharded cache,
//! corrects EXIF orientation and catalogs the result with folder-derived tags.
//!
//! ## Features
//!
//! - **Content Deduplication**: Identical bytes are cataloged once, whatever the file name
//! - **Background Processing**: Uploads are queued and processed by a worker
//! - **Orientation Correction**: EXIF rotation is baked into the cached variants
//! - **Configurable**: Folder layout and sizes via a JSON config file or `SHOEBOX_*` variables
//! - **Signal Handling**: Graceful shutdown on SIGINT
//!
//! ## Usage
//!
//! ```bash
//! # Ingest uploaded files for a user
//! shoebox ingest --user alice ~/Downloads/vacation.jpg
//!
//! # Catalog everything under the index root
//! shoebox index --user alice
//!
//! # Show what the catalog holds
//! shoebox status
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shoebox::commands::{index::IndexCommand, ingest::IngestCommand, status::StatusCommand};
use shoebox::config::Config;

/// Shoebox - Asynchronous photo ingestion for a self-hosted photo library
#[derive(Parser)]
#[command(
    name = "shoebox",
    about = "Asynchronous photo ingestion for a self-hosted photo library",
    long_about = "Deduplicates photos by content, renders thumbnail/small/full variants with orientation correction, and catalogs them with folder-derived tags.",
    version
)]
struct Cli {
    /// Path to a JSON config file
    #[arg(long, short = 'c', global = true, env = "SHOEBOX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Ingest files as uploads; originals are moved into the mobile root
    Ingest {
        /// Image files to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// User the upload belongs to
        #[arg(long, short = 'u')]
        user: String,
        /// Extra tag to attach (repeatable)
        #[arg(long = "tag", short = 't')]
        tags: Vec<String>,
    },
    /// Catalog every image under the index root
    Index {
        /// User the scan runs as
        #[arg(long, short = 'u')]
        user: String,
        /// Index root (defaults to the configured one)
        #[arg(long, short = 'r')]
        root: Option<PathBuf>,
    },
    /// Summarize the catalog
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shoebox=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let result = run(cli).await;

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env(),
    };

    match cli.command {
        Commands::Ingest { files, user, tags } => {
            info!("Starting ingest of {} files for {}", files.len(), user);
            IngestCommand::new(files, user, tags, config).execute().await?;
        }
        Commands::Index { user, root } => {
            if let Some(root) = root {
                config.index_root = root;
            }
            info!(
                "Starting index of {:?} for {}",
                config.index_root, user
            );
            IndexCommand::new(user, config).execute().await?;
        }
        Commands::Status => {
            let status_cmd = StatusCommand::new(config.catalog_path.clone());
            let report = status_cmd.execute()?;
            status_cmd.print_report(&report);
        }
    }

    Ok(())
}
