//! stumbler-sync - uploads queued location reports to the submission service.

mod app;

use std::path::PathBuf;

use app::NetworkKind;
use clap::{Parser, Subcommand};
use stumbler_config_and_utils::{init_logging, Config, Paths};

/// stumbler-sync command-line interface.
#[derive(Parser)]
#[command(name = "stumbler-sync")]
#[command(about = "Upload queued location reports")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, env = "STUMBLER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Base directory for runtime files (database, logs, config). Defaults to ~/.stumbler
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Drain the queue once
    Sync {
        /// Upload regardless of network policy
        #[arg(short, long)]
        force: bool,

        /// Current network type
        #[arg(long, value_enum, default_value_t = NetworkKind::Unmetered)]
        network: NetworkKind,
    },
    /// Show cumulative upload stats and queue depth
    Stats,
    /// Queue reports from a JSONL file
    Enqueue {
        /// File with one report object per line
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;
    let config = Config::load(&paths)?;

    let level = cli.log_level.unwrap_or_else(|| config.log_level.clone());
    init_logging(&level, &paths);

    match cli.command {
        Commands::Sync { force, network } => {
            let report = app::run_sync(&config, &paths, network, force).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Stats => {
            let summary = app::queue_summary(&paths)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Enqueue { file } => {
            let queued = app::enqueue_file(&paths, &file)?;
            println!("{}", serde_json::json!({ "queued": queued }));
        }
    }

    Ok(())
}
