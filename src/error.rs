//! Error kinds.
//!
//! Three layers, each owned by the code that produces it:
//! - RemoteError: what a backend reports for a single list/put/delete call
//! - RotationError: what a rotation step reports, decides exit codes
//! - ConfigError: loading and validating the config file

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("{0}: not found")]
    NotFound(String),

    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout { operation: String, after: Duration },

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} failed: {message}")]
    Command { command: String, message: String },
}

impl RemoteError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            RemoteError::NotFound(path.into())
        } else {
            RemoteError::Io { path: path.into(), source }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }
}

#[derive(Debug, Error)]
pub enum RotationError {
    #[error("source {} does not exist", .0.display())]
    SourceMissing(PathBuf),

    #[error("transfer to {target} failed: {source}")]
    Transfer {
        target: String,
        #[source]
        source: RemoteError,
    },

    #[error("listing {dir} failed: {source}")]
    Listing {
        dir: String,
        #[source]
        source: RemoteError,
    },

    #[error("retention count must be at least 1, got {0}")]
    InvalidRetention(i64),
}

impl RotationError {
    /// Stable short label used in reports and the history ledger.
    pub fn kind(&self) -> &'static str {
        match self {
            RotationError::SourceMissing(_) => "source-missing",
            RotationError::Transfer { .. } => "transfer-error",
            RotationError::Listing { .. } => "listing-error",
            RotationError::InvalidRetention(_) => "invalid-retention",
        }
    }

    /// Retrying cannot fix a missing source or a bad retention count.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RotationError::Transfer { .. } | RotationError::Listing { .. })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid duration for {key}: {source}")]
    Duration {
        key: &'static str,
        #[source]
        source: humantime::DurationError,
    },

    #[error("missing required setting `{0}` (set it in the config file or pass it as a flag)")]
    Missing(&'static str),

    #[error("invalid setting `{key}`: {message}")]
    Invalid { key: &'static str, message: String },
}
