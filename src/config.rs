//! Configuration.
//!
//! Settings come from a TOML file (~/.config/ferry/config.toml by default)
//! and can be overridden from the command line. Everything except the source
//! and the remote target has a default, so a config file is optional.
//!
//! ```toml
//! source_path = "~/zion/zion_memory.db"
//! remote_target = "gdrive:zion-backups"
//! retention_count = 7
//! snapshot_granularity = "daily"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cli::GlobalArgs;
use crate::error::ConfigError;
use crate::platform;
use crate::remote::BackendKind;
use crate::rotation::naming::{Granularity, LiveName};

const DEFAULT_RETENTION: i64 = 7;
const DEFAULT_ARCHIVE_DIR: &str = "archives";
const DEFAULT_TRANSFER_TIMEOUT: &str = "10m";
const DEFAULT_RETRY_BACKOFF: &str = "5s";

/// The config file as written. Every field is optional so CLI flags can
/// fill the gaps.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub source_path: Option<PathBuf>,
    pub remote_target: Option<String>,
    pub retention_count: Option<i64>,
    pub snapshot_granularity: Option<Granularity>,
    pub live_copy_name: Option<String>,
    pub archive_dir: Option<String>,
    pub backend: Option<BackendKind>,
    pub rclone_binary: Option<String>,
    pub transfer_timeout: Option<String>,
    pub retries: Option<u32>,
    pub retry_backoff: Option<String>,
    pub consistent_copy: Option<bool>,
    pub write_summary: Option<bool>,
    pub history: Option<bool>,
    pub history_db: Option<PathBuf>,
}

impl FileConfig {
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads `path`. A missing file is only an error when the user named it.
    pub fn read(path: &Path, explicit: bool) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text, path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => Ok(FileConfig::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub source_path: PathBuf,
    pub remote_target: String,
    pub retention_count: usize,
    pub granularity: Granularity,
    pub live_copy_name: String,
    pub archive_dir: String,
    pub backend: BackendKind,
    pub rclone_binary: String,
    pub transfer_timeout: Duration,
    pub retries: u32,
    pub retry_backoff: Duration,
    pub consistent_copy: bool,
    pub write_summary: bool,
    pub history: bool,
    pub history_db: Option<PathBuf>,
}

impl Config {
    /// Defaults for everything but the two required settings.
    pub fn new(source_path: impl Into<PathBuf>, remote_target: impl Into<String>) -> Self {
        let source_path = source_path.into();
        let live_copy_name = default_live_name(&source_path);

        Config {
            source_path,
            remote_target: remote_target.into(),
            retention_count: DEFAULT_RETENTION as usize,
            granularity: Granularity::default(),
            live_copy_name,
            archive_dir: DEFAULT_ARCHIVE_DIR.to_string(),
            backend: BackendKind::default(),
            rclone_binary: "rclone".to_string(),
            transfer_timeout: Duration::from_secs(600),
            retries: 0,
            retry_backoff: Duration::from_secs(5),
            consistent_copy: true,
            write_summary: false,
            history: true,
            history_db: None,
        }
    }

    /// Loads the config file named by the flags (or the default location)
    /// and applies the flag overrides.
    pub fn load(args: &GlobalArgs) -> Result<Self, ConfigError> {
        let (path, explicit) = match &args.config {
            Some(path) => (Some(path.clone()), true),
            None => (platform::default_config_path(), false),
        };

        let file = match path {
            Some(path) => {
                tracing::debug!(path = %path.display(), "reading config");
                FileConfig::read(&path, explicit)?
            }
            None => FileConfig::default(),
        };

        Self::resolve(file, args)
    }

    pub fn resolve(file: FileConfig, args: &GlobalArgs) -> Result<Self, ConfigError> {
        let source_path = args
            .source
            .clone()
            .or(file.source_path)
            .map(|p| platform::expand_home(&p))
            .ok_or(ConfigError::Missing("source_path"))?;

        let remote_target = args
            .remote
            .clone()
            .or(file.remote_target)
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::Missing("remote_target"))?;

        let retention = args.keep.or(file.retention_count).unwrap_or(DEFAULT_RETENTION);
        let retention_count = validate_retention(retention)?;

        let live_copy_name = match file.live_copy_name {
            Some(name) => validate_name("live_copy_name", name)?,
            None => default_live_name(&source_path),
        };

        let archive_dir = validate_archive_dir(file.archive_dir.unwrap_or_else(|| DEFAULT_ARCHIVE_DIR.to_string()))?;

        if archive_dir == live_copy_name {
            return Err(ConfigError::Invalid {
                key: "archive_dir",
                message: "must differ from live_copy_name".to_string(),
            });
        }

        Ok(Config {
            source_path,
            remote_target,
            retention_count,
            granularity: file.snapshot_granularity.unwrap_or_default(),
            live_copy_name,
            archive_dir,
            backend: file.backend.unwrap_or_default(),
            rclone_binary: file.rclone_binary.unwrap_or_else(|| "rclone".to_string()),
            transfer_timeout: parse_duration(
                "transfer_timeout",
                file.transfer_timeout.as_deref().unwrap_or(DEFAULT_TRANSFER_TIMEOUT),
            )?,
            retries: file.retries.unwrap_or(0),
            retry_backoff: parse_duration(
                "retry_backoff",
                file.retry_backoff.as_deref().unwrap_or(DEFAULT_RETRY_BACKOFF),
            )?,
            consistent_copy: file.consistent_copy.unwrap_or(true),
            write_summary: file.write_summary.unwrap_or(false),
            history: file.history.unwrap_or(true),
            history_db: file.history_db.map(|p| platform::expand_home(&p)),
        })
    }

    pub fn live_name(&self) -> LiveName {
        LiveName::new(&self.live_copy_name)
    }

    pub fn history_path(&self) -> Option<PathBuf> {
        self.history_db.clone().or_else(platform::default_history_path)
    }
}

fn default_live_name(source: &Path) -> String {
    source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "live".to_string())
}

fn validate_retention(count: i64) -> Result<usize, ConfigError> {
    if count < 1 {
        return Err(ConfigError::Invalid {
            key: "retention_count",
            message: format!("must be at least 1, got {count} (refusing to prune every snapshot)"),
        });
    }

    usize::try_from(count).map_err(|_| ConfigError::Invalid {
        key: "retention_count",
        message: format!("{count} is too large"),
    })
}

fn validate_name(key: &'static str, name: String) -> Result<String, ConfigError> {
    let bad = name.is_empty() || name.contains(['/', '\\']) || name == "." || name == "..";
    if bad {
        return Err(ConfigError::Invalid {
            key,
            message: format!("`{name}` is not a plain file name"),
        });
    }
    Ok(name)
}

fn validate_archive_dir(dir: String) -> Result<String, ConfigError> {
    let trimmed = dir.trim_matches('/').to_string();
    let escapes = trimmed.split('/').any(|segment| segment == ".." || segment == ".");

    if trimmed.is_empty() || escapes || dir.starts_with('/') {
        return Err(ConfigError::Invalid {
            key: "archive_dir",
            message: format!("`{dir}` must be a relative path below the remote target"),
        });
    }
    Ok(trimmed)
}

fn parse_duration(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value).map_err(|source| ConfigError::Duration { key, source })
}
