//! Mask-extraction and migration CLI for stored rasters.
//!
//! Clips rasters against a mask raster through the storage service,
//! moves rasters between file roots and a Postgres database, and
//! inspects stored headers.

mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{BackendArgs, MaskArgs};

#[derive(Parser)]
#[command(name = "rastermask")]
#[command(about = "Mask extraction and migration for stored rasters", long_about = None)]
struct Cli {
    /// Log level
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clip rasters against a mask raster
    Mask(MaskArgs),

    /// Copy one raster, possibly across backends
    Copy {
        /// Source file-backend root
        #[arg(long)]
        src_root: Option<PathBuf>,

        /// Source database URL
        #[arg(long)]
        src_database_url: Option<String>,

        /// Destination file-backend root
        #[arg(long)]
        dst_root: Option<PathBuf>,

        /// Destination database URL
        #[arg(long)]
        dst_database_url: Option<String>,

        /// Source raster name
        source: String,

        /// Destination raster name
        dest: String,
    },

    /// Rename a raster in place
    Rename {
        #[command(flatten)]
        backend: BackendArgs,

        old_name: String,
        new_name: String,
    },

    /// Remove a raster (no error if absent)
    Rm {
        #[command(flatten)]
        backend: BackendArgs,

        name: String,
    },

    /// Print a stored raster's header as JSON
    Info {
        #[command(flatten)]
        backend: BackendArgs,

        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Mask(args) => commands::mask(args).await,
        Commands::Copy {
            src_root,
            src_database_url,
            dst_root,
            dst_database_url,
            source,
            dest,
        } => {
            let src = BackendArgs::from_parts(src_root, src_database_url);
            let dst = BackendArgs::from_parts(dst_root, dst_database_url);
            commands::copy(src, dst, &source, &dest).await
        }
        Commands::Rename {
            backend,
            old_name,
            new_name,
        } => commands::rename(backend, &old_name, &new_name).await,
        Commands::Rm { backend, name } => commands::rm(backend, &name).await,
        Commands::Info { backend, name } => commands::info(backend, &name).await,
    }
}
