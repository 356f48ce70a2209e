use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "bilifav",
    version,
    about = "Sync a Bilibili favorites folder into Markdown notes"
)]
pub struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, env = "BILIFAV_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (RUST_LOG overrides this)
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch the favorites list and write notes for new items (default)
    Sync(SyncArgs),

    /// Show what the record store knows about each collection
    Status(StatusArgs),
}

#[derive(Args, Debug, Default, Clone)]
pub struct SyncArgs {
    /// Favorites folder id (media_id)
    #[arg(env = "BILIFAV_MEDIA_ID")]
    pub media_id: Option<u64>,

    /// File holding the Cookie header (SESSDATA=...; bili_jct=...)
    #[arg(short = 'c', long)]
    pub cookie: Option<String>,

    /// Directory for the Markdown notes
    #[arg(short = 'o', long)]
    pub output_dir: Option<String>,

    /// SQLite file tracking which items are synced
    #[arg(long)]
    pub state_db: Option<String>,

    /// Commit the record store after every N items
    #[arg(long)]
    pub commit_every: Option<usize>,

    /// List pending items without fetching details or writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress_bar: bool,
}

#[derive(Args, Debug, Default, Clone)]
pub struct StatusArgs {
    /// Only show this collection
    pub media_id: Option<u64>,

    /// SQLite file tracking which items are synced
    #[arg(long)]
    pub state_db: Option<String>,

    /// List failed items with their last error
    #[arg(long)]
    pub failed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_no_subcommand() {
        let cli = parse(&["bilifav"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level, LogLevel::Info);
    }

    #[test]
    fn test_sync_args() {
        let cli = parse(&[
            "bilifav",
            "sync",
            "3656879060",
            "--cookie",
            "~/cookie.txt",
            "-o",
            "notes",
            "--commit-every",
            "5",
            "--dry-run",
        ]);
        match cli.command {
            Some(Command::Sync(args)) => {
                assert_eq!(args.media_id, Some(3656879060));
                assert_eq!(args.cookie.as_deref(), Some("~/cookie.txt"));
                assert_eq!(args.output_dir.as_deref(), Some("notes"));
                assert_eq!(args.commit_every, Some(5));
                assert!(args.dry_run);
                assert!(!args.no_progress_bar);
            }
            other => panic!("expected sync, got {:?}", other),
        }
    }

    #[test]
    fn test_status_args_with_global_flags() {
        let cli = parse(&[
            "bilifav",
            "status",
            "--failed",
            "--log-level",
            "warn",
            "--config",
            "/etc/bilifav.toml",
        ]);
        assert_eq!(cli.log_level, LogLevel::Warn);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/bilifav.toml")));
        match cli.command {
            Some(Command::Status(args)) => {
                assert!(args.failed);
                assert!(args.media_id.is_none());
            }
            other => panic!("expected status, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_non_numeric_media_id() {
        assert!(Cli::try_parse_from(["bilifav", "sync", "abc"]).is_err());
    }
}
