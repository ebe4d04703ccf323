//! ChatSync CLI
//!
//! Command-line tools for ChatSync local stores.
//!
//! # Commands
//!
//! - `inspect` - Display conversation counts and store metadata
//! - `verify` - Check every record of the store
//! - `export` - Write the conversation set as JSON
//! - `import` - Save conversations from a JSON file
//! - `repair` - Rebuild damaged side records

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ChatSync command-line store tools.
#[derive(Parser)]
#[command(name = "chatsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display conversation counts and store metadata
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check every record of the store
    Verify,

    /// Write the conversation set as JSON
    Export {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Save conversations from a JSON file (array or id map)
    Import {
        /// File to import
        file: PathBuf,

        /// Replace stored conversations even if they are newer
        #[arg(long)]
        force: bool,
    },

    /// Rebuild damaged order, active and version records
    Repair,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, &format).await?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Store path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Export { output } => {
            let path = cli.path.ok_or("Store path required for export")?;
            commands::export::run(&path, output.as_deref()).await?;
        }
        Commands::Import { file, force } => {
            let path = cli.path.ok_or("Store path required for import")?;
            commands::import::run(&path, &file, force).await?;
        }
        Commands::Repair => {
            let path = cli.path.ok_or("Store path required for repair")?;
            commands::repair::run(&path).await?;
        }
        Commands::Version => {
            println!("ChatSync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
