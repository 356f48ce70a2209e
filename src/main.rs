//! bilifav: incremental Bilibili favorites to Markdown sync.
//!
//! Each run lists a favorites folder, compares it with a SQLite record store
//! and writes one Markdown note per video that has not been synced yet.
//! Failed items are retried on the next run; removed items are left alone.

#![warn(clippy::all)]

mod bilibili;
mod cli;
mod config;
mod markdown;
mod retry;
mod shutdown;
mod state;
mod sync;
mod types;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use bilibili::{BiliClient, CookieHeader};
use cli::{Command, StatusArgs, SyncArgs};
use config::{FileConfig, SyncConfig};
use markdown::MarkdownWriter;
use state::{RecordStore, SqliteRecordStore};
use sync::{Reconciler, SyncError};

/// Exit status when the run finished but some items could not be synced.
const EXIT_PARTIAL_FAILURE: u8 = 2;

fn main() -> ExitCode {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: cli::Cli) -> anyhow::Result<ExitCode> {
    let file = FileConfig::load(cli.config.as_deref())?;
    match cli.command {
        Some(Command::Status(args)) => {
            run_status(args, &file).await?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Command::Sync(args)) => run_sync(args, &file).await,
        None => run_sync(SyncArgs::default(), &file).await,
    }
}

async fn run_sync(args: SyncArgs, file: &FileConfig) -> anyhow::Result<ExitCode> {
    let config = SyncConfig::resolve(args, file)?;
    tracing::info!(
        media_id = config.media_id,
        output_dir = %config.output_dir.display(),
        state_db = %config.state_db.display(),
        dry_run = config.options.dry_run,
        "Starting bilifav"
    );

    let store = SqliteRecordStore::open(&config.state_db)
        .await
        .map_err(SyncError::from)?;

    let cookie = match &config.cookie_path {
        Some(path) => Some(CookieHeader::load(path).await?),
        None => {
            tracing::info!("No cookie file configured, only public favorites are readable");
            None
        }
    };
    let client = BiliClient::new(config.client.clone(), cookie.as_ref())?;
    let writer = MarkdownWriter::new(&config.output_dir);
    let shutdown = shutdown::install_signal_handler()?;

    let reconciler = Reconciler::new(&client, &client, &writer, &store, config.options.clone());
    let report = reconciler.synchronize(config.media_id, &shutdown).await?;
    println!("{}", report);

    if report.has_failures() {
        Ok(ExitCode::from(EXIT_PARTIAL_FAILURE))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

async fn run_status(args: StatusArgs, file: &FileConfig) -> anyhow::Result<()> {
    let db_path = file.state_db(args.state_db.as_deref());
    if !db_path.exists() {
        println!("No state database found at {}", db_path.display());
        println!("Run a sync first to create the database.");
        return Ok(());
    }

    let store = SqliteRecordStore::open(&db_path)
        .await
        .map_err(SyncError::from)?;
    let collections = match args.media_id {
        Some(id) => vec![id],
        None => store.collections().await?,
    };

    println!("State Database: {}", db_path.display());
    if collections.is_empty() {
        println!();
        println!("No collections synced yet.");
    }
    for collection_id in collections {
        print_collection(&store, collection_id, args.failed).await?;
    }
    Ok(())
}

async fn print_collection(
    store: &SqliteRecordStore,
    collection_id: u64,
    show_failed: bool,
) -> anyhow::Result<()> {
    let summary = store.get_summary(collection_id).await?;

    println!();
    println!("Collection {}:", collection_id);
    println!("  Total:  {}", summary.total_records);
    println!("  Synced: {}", summary.synced);
    println!("  Failed: {}", summary.failed);
    if let Some(started) = &summary.last_sync_started {
        println!(
            "  Last sync started:   {}",
            started.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    if let Some(completed) = &summary.last_sync_completed {
        println!(
            "  Last sync completed: {}",
            completed.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    if show_failed && summary.failed > 0 {
        println!("  Failed items:");
        for record in store.get_failed(collection_id).await? {
            println!(
                "    {} {} (attempts: {}) - {}",
                record.id,
                record.title,
                record.attempts,
                record.last_error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    Ok(())
}
