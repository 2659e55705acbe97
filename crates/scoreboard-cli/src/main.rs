//! CLI entry point for Scoreboard.
//!
//! This binary provides the `scoreboard` command: run the store with its
//! daily backup scheduler, take a one-off backup, or print status.

mod config;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scoreboard_backup::BackupScheduler;
use scoreboard_store::{Database, ScoreStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, DEFAULT_CONFIG_PATH};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// Scoreboard: score persistence and scheduled backups for a chat game.
#[derive(Parser)]
#[command(name = "scoreboard", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the store and run the backup scheduler until Ctrl-C.
    Run,

    /// Take one backup now and print the snapshot path.
    Backup,

    /// Show store location, record count and snapshot count.
    Status,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    let config = AppConfig::load(&cli.config)?;
    init_tracing(&config.log_level);

    match cli.command {
        Commands::Run => cmd_run(config).await,
        Commands::Backup => cmd_backup(config).await,
        Commands::Status => cmd_status(config).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

async fn cmd_run(config: AppConfig) -> Result<()> {
    let db = open_store(&config).await?;
    let scheduler =
        BackupScheduler::new(db, config.backup).context("invalid backup configuration")?;
    let handle = scheduler.start();

    info!("scoreboard running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    scheduler.shutdown();
    handle.await.context("backup scheduler task failed")?;
    info!("shutdown complete");
    Ok(())
}

async fn cmd_backup(config: AppConfig) -> Result<()> {
    let db = open_store(&config).await?;
    let scheduler =
        BackupScheduler::new(db, config.backup).context("invalid backup configuration")?;

    let path = scheduler.run_once().await.context("backup failed")?;
    println!("{}", path.display());
    Ok(())
}

async fn cmd_status(config: AppConfig) -> Result<()> {
    let db = open_store(&config).await?;
    let records = ScoreStore::new(db)
        .count()
        .await
        .context("failed to count records")?;
    let snapshots = count_snapshots(&config.backup.backup_dir, &config.backup.file_prefix)?;

    println!();
    println!("  Scoreboard Status");
    println!("  =================");
    println!("  Store:     {}", config.store.path().display());
    println!("  Records:   {records}");
    println!(
        "  Backups:   {snapshots} in {} (every {}s)",
        config.backup.backup_dir.display(),
        config.backup.interval_secs
    );
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Bootstrap the store on the blocking pool.
async fn open_store(config: &AppConfig) -> Result<Database> {
    let store_config = config.store.clone();
    let path = store_config.path();
    tokio::task::spawn_blocking(move || Database::bootstrap(&store_config))
        .await
        .context("store bootstrap task failed")?
        .with_context(|| format!("failed to open store at {}", path.display()))
}

/// Number of snapshot files in `dir`; a missing directory counts as zero.
fn count_snapshots(dir: &Path, prefix: &str) -> Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", dir.display())),
    };
    let mut count = 0;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read {}", dir.display()))?;
        if entry.file_name().to_string_lossy().starts_with(prefix) {
            count += 1;
        }
    }
    Ok(count)
}

/// Initialize the tracing subscriber with the given default log level.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
