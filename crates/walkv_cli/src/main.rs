//! walkv CLI
//!
//! Command-line tools for inspecting walkv write-ahead logs.
//!
//! # Commands
//!
//! - `dump` - List the records of a log file
//! - `verify` - Scan a log file and classify its transactions
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// walkv write-ahead log tools.
#[derive(Parser)]
#[command(name = "walkv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List log records from the truncation offset on
    Dump {
        /// Path to the log file
        log: PathBuf,

        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Start from this offset instead of the truncation offset
        #[arg(short, long)]
        offset: Option<u64>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Verify that a log file can be recovered
    Verify {
        /// Path to the log file
        log: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
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
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Dump {
            log,
            limit,
            offset,
            format,
        } => {
            commands::dump::run(&log, limit, offset, format)?;
        }
        Commands::Verify { log, format } => {
            commands::verify::run(&log, format)?;
        }
        Commands::Version => {
            println!("walkv CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("walkv core v{}", walkv_core::VERSION);
        }
    }

    Ok(())
}
