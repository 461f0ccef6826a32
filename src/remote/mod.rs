//! Remote object stores.
//!
//! Rotation only needs three operations on the remote side: list a
//! directory, put a local file under a name, delete a name. Backends:
//! - fs: a local or mounted directory (NAS, synced cloud folder)
//! - rclone: anything rclone can talk to, via the rclone binary
//!
//! Remote paths are `/`-separated and relative to the configured target.

pub mod fs;
pub mod rclone;

#[cfg(test)]
pub(crate) mod memory;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::RemoteError;

/// One file in a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteEntry {
    pub name: String,
    pub size: Option<u64>,
    /// Unix seconds, when the backend reports it.
    pub modified: Option<i64>,
}

pub trait RemoteStore {
    /// Human readable location for logs and reports.
    fn describe(&self) -> String;

    /// Files directly inside `dir`. A directory that does not exist yet is
    /// empty, not an error.
    fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>, RemoteError>;

    /// Uploads `local` to `remote`, replacing whatever was there.
    fn put(&self, local: &Path, remote: &str) -> Result<(), RemoteError>;

    /// Removes `remote`. Reports `RemoteError::NotFound` when it is already gone.
    fn delete(&self, remote: &str) -> Result<(), RemoteError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Auto,
    Fs,
    Rclone,
}

impl BackendKind {
    /// Settles `Auto` by looking at the target.
    pub fn resolve(self, target: &str) -> BackendKind {
        match self {
            BackendKind::Auto if looks_like_rclone_path(target) => BackendKind::Rclone,
            BackendKind::Auto => BackendKind::Fs,
            other => other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Auto => "auto",
            BackendKind::Fs => "fs",
            BackendKind::Rclone => "rclone",
        }
    }
}

/// `gdrive:backups` and `:s3:bucket` are rclone paths; `/mnt/nas`, `C:\backups`
/// and `./archive` are not.
fn looks_like_rclone_path(target: &str) -> bool {
    let Some((remote, _)) = target.split_once(':') else {
        return false;
    };

    if remote.is_empty() {
        return true;
    }

    let drive_letter = remote.len() == 1 && remote.chars().all(|c| c.is_ascii_alphabetic());
    !drive_letter && !remote.contains(['/', '\\'])
}

/// Joins remote path segments, skipping empty ones.
pub fn join(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Builds the backend named by the config.
pub fn open(config: &Config) -> Box<dyn RemoteStore> {
    match config.backend.resolve(&config.remote_target) {
        BackendKind::Rclone => Box::new(rclone::RcloneRemote::new(
            &config.rclone_binary,
            &config.remote_target,
            config.transfer_timeout,
        )),
        _ => Box::new(fs::FsRemote::new(crate::platform::expand_home(Path::new(
            &config.remote_target,
        )))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_detects_rclone_paths() {
        assert_eq!(BackendKind::Auto.resolve("gdrive:backups"), BackendKind::Rclone);
        assert_eq!(BackendKind::Auto.resolve("b2:bucket/zion"), BackendKind::Rclone);
        assert_eq!(BackendKind::Auto.resolve(":local:/tmp/x"), BackendKind::Rclone);
    }

    #[test]
    fn auto_detects_directories() {
        assert_eq!(BackendKind::Auto.resolve("/mnt/nas/backups"), BackendKind::Fs);
        assert_eq!(BackendKind::Auto.resolve("C:\\backups"), BackendKind::Fs);
        assert_eq!(BackendKind::Auto.resolve("./archive"), BackendKind::Fs);
        assert_eq!(BackendKind::Auto.resolve("/data/odd:name"), BackendKind::Fs);
    }

    #[test]
    fn explicit_backend_wins() {
        assert_eq!(BackendKind::Fs.resolve("gdrive:backups"), BackendKind::Fs);
        assert_eq!(BackendKind::Rclone.resolve("/mnt/nas"), BackendKind::Rclone);
    }

    #[test]
    fn join_handles_empty_and_trailing_slash() {
        assert_eq!(join("", "zion.db"), "zion.db");
        assert_eq!(join("archives", "zion.db"), "archives/zion.db");
        assert_eq!(join("archives/", "zion.db"), "archives/zion.db");
    }
}
