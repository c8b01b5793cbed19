//! mailqueue - operator CLI for the durable email queue.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mailqueue_core::{init_logging, Config, Paths};

use commands::{enqueue::EnqueueArgs, send::SendArgs, stats::StatsArgs, AppContext};

/// mailqueue command-line interface.
#[derive(Parser, Debug)]
#[command(name = "mailqueue")]
#[command(about = "Durable outbound email queue worker")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config and data. Defaults to ~/.mailqueue
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Queue database file, overriding the configuration
    #[arg(long, global = true)]
    database: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Claim a batch of due emails and deliver them (default)
    Send(SendArgs),
    /// Release every lock in the queue. Run only while no worker is active
    ClearLocks,
    /// Add an email to the queue
    Enqueue(EnqueueArgs),
    /// Show queue counts and stale locks
    Stats(StatsArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let mut config = Config::load(&paths)?;
    if let Some(database) = cli.database {
        config.database_path = Some(database);
    }

    let log_level = cli.log_level.unwrap_or_else(|| config.log_level.clone());
    init_logging(&log_level);
    tracing::debug!(base_dir = %paths.base_dir().display(), "Configuration loaded");

    let ctx = AppContext::new(config, paths);

    match cli.command {
        Some(Commands::Send(args)) => commands::send::run(&ctx, args).await?,
        None => commands::send::run(&ctx, SendArgs::default()).await?,
        Some(Commands::ClearLocks) => commands::locks::clear(&ctx).await?,
        Some(Commands::Enqueue(args)) => commands::enqueue::run(&ctx, args).await?,
        Some(Commands::Stats(args)) => commands::stats::run(&ctx, args).await?,
    }

    Ok(())
}
