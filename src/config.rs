use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::bilibili::ClientConfig;
use crate::cli::SyncArgs;
use crate::retry::RetryPolicy;
use crate::sync::{PacingConfig, SyncOptions};

const DEFAULT_OUTPUT_DIR: &str = "output/markdown";
const DEFAULT_STATE_DB: &str = "output/sync_state.db";
const DEFAULT_CONFIG_PATH: &str = "~/.config/bilifav-rs/config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("No favorites folder id given. Pass MEDIA_ID or set sync.media_id in the config file")]
    MissingMediaId,

    #[error("{field} must be at least 1")]
    Zero { field: &'static str },
}

/// Contents of the TOML config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub sync: SyncSection,
    pub fetch: FetchSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSection {
    pub media_id: Option<u64>,
    pub cookie_path: Option<String>,
    pub output_dir: Option<String>,
    pub state_db: Option<String>,
    pub commit_every: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchSection {
    pub page_size: Option<u32>,
    pub request_delay_ms: Option<u64>,
    pub request_jitter_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_delay_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Load the config file.
    ///
    /// An explicitly given path must exist. The default location is optional
    /// and an absent file yields an empty config.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match explicit {
            Some(p) => (p.to_path_buf(), true),
            None => (expand_tilde(DEFAULT_CONFIG_PATH), false),
        };
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if required {
                    return Err(ConfigError::FileNotFound(path));
                }
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        let config = Self::parse(&path, &contents)?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    pub fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// State database path, CLI first.
    pub fn state_db(&self, cli: Option<&str>) -> PathBuf {
        expand_tilde(
            cli.or(self.sync.state_db.as_deref())
                .unwrap_or(DEFAULT_STATE_DB),
        )
    }
}

/// Everything a `sync` run needs, after merging CLI flags over the file.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub media_id: u64,
    pub cookie_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub state_db: PathBuf,
    pub client: ClientConfig,
    pub options: SyncOptions,
}

impl SyncConfig {
    pub fn resolve(args: SyncArgs, file: &FileConfig) -> Result<Self, ConfigError> {
        let media_id = args
            .media_id
            .or(file.sync.media_id)
            .ok_or(ConfigError::MissingMediaId)?;

        let cookie_path = args
            .cookie
            .as_deref()
            .or(file.sync.cookie_path.as_deref())
            .filter(|p| !p.is_empty())
            .map(expand_tilde);
        let output_dir = expand_tilde(
            args.output_dir
                .as_deref()
                .or(file.sync.output_dir.as_deref())
                .unwrap_or(DEFAULT_OUTPUT_DIR),
        );
        let state_db = file.state_db(args.state_db.as_deref());

        let commit_every = args.commit_every.or(file.sync.commit_every).unwrap_or(1);
        if commit_every == 0 {
            return Err(ConfigError::Zero {
                field: "commit_every",
            });
        }

        let fetch = &file.fetch;
        let page_size = fetch.page_size.unwrap_or(20);
        if page_size == 0 {
            return Err(ConfigError::Zero { field: "page_size" });
        }
        let defaults = PacingConfig::default();
        let pacing = PacingConfig {
            delay: fetch
                .request_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.delay),
            jitter: fetch
                .request_jitter_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.jitter),
        };
        let default_retry = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: fetch.max_retries.unwrap_or(default_retry.max_retries),
            base_delay: fetch
                .retry_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(default_retry.base_delay),
            max_delay: default_retry.max_delay,
        };

        Ok(Self {
            media_id,
            cookie_path,
            output_dir,
            state_db,
            client: ClientConfig {
                page_size,
                timeout: Duration::from_secs(fetch.timeout_secs.unwrap_or(30)),
                retry,
                ..ClientConfig::default()
            },
            options: SyncOptions {
                commit_every,
                pacing,
                dry_run: args.dry_run,
                show_progress: !args.no_progress_bar,
            },
        })
    }
}

pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
