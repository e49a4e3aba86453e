mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use config::ConfigArgs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docsync")]
#[command(author, version, about = "Keep a semantic vector index in sync with a directory")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the directory, then keep the index in sync until Ctrl-C
    Watch {
        /// Directory to watch
        #[arg(default_value = ".")]
        root: PathBuf,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Run a single reconciliation pass and exit
    Scan {
        /// Directory to scan
        #[arg(default_value = ".")]
        root: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Show record and index statistics
    Stats {
        /// Watched directory
        #[arg(short, long, default_value = ".")]
        root: PathBuf,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Show the record and index entry for one file
    Status {
        /// File to inspect
        path: PathBuf,

        /// Watched directory
        #[arg(short, long, default_value = ".")]
        root: PathBuf,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Search the index for documents close to a query
    Search {
        /// Search query
        query: String,

        /// Maximum results
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Watched directory
        #[arg(short, long, default_value = ".")]
        root: PathBuf,

        #[command(flatten)]
        config: ConfigArgs,
    },
}

fn init_logging(verbose: bool, format: LogFormat) {
    // RUST_LOG wins over --verbose when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

// Synchronous on purpose: the blocking HTTP embedding client must be created
// and dropped outside the async runtime, so only `watch` starts one.
fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    match cli.command {
        Commands::Watch { root, config } => commands::watch(&root, &config),
        Commands::Scan { root, json, config } => commands::scan(&root, json, &config),
        Commands::Stats { root, config } => commands::stats(&root, &config),
        Commands::Status { path, root, config } => commands::status(&path, &root, &config),
        Commands::Search {
            query,
            limit,
            root,
            config,
        } => commands::search(&query, limit, &root, &config),
    }
}
