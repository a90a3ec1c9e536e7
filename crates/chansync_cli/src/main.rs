//! Chansync CLI
//!
//! Operator tools for running parts of the sync pipeline by hand.
//!
//! # Commands
//!
//! - `import-resources` - Push a resource manifest to the import endpoint
//! - `diff-skus` - Diff two SKU field snapshots
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Chansync command-line tools.
#[derive(Parser)]
#[command(name = "chansync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Import the resources described by a manifest
    ImportResources {
        /// Resource manifest XML
        #[arg(short, long)]
        manifest: PathBuf,

        /// Directory resource paths are resolved against
        #[arg(short, long)]
        base_dir: PathBuf,

        /// Base URL of the import API
        #[arg(short, long, env = "CHANSYNC_ENDPOINT")]
        endpoint: String,

        /// API key sent with every request
        #[arg(short, long, env = "CHANSYNC_API_KEY", hide_env_values = true)]
        api_key: String,

        /// Maximum records per batch
        #[arg(long, default_value_t = chansync_engine::DEFAULT_MAX_BATCH_SIZE)]
        batch_size: usize,

        /// Per-request timeout in seconds
        #[arg(long, default_value = "3600")]
        timeout_secs: u64,
    },

    /// Diff two SKU field snapshots
    DiffSkus {
        /// Previous snapshot
        old: PathBuf,

        /// Current snapshot
        new: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::ImportResources {
            manifest,
            base_dir,
            endpoint,
            api_key,
            batch_size,
            timeout_secs,
        } => {
            commands::import_resources::run(
                &manifest,
                &base_dir,
                &endpoint,
                &api_key,
                batch_size,
                timeout_secs,
            )?;
        }
        Commands::DiffSkus { old, new, format } => {
            commands::diff_skus::run(&old, &new, format)?;
        }
        Commands::Version => {
            println!("Chansync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
