//! Directory backend.
//!
//! The remote target is a directory: a second disk, a NAS mount or a folder
//! synced by a cloud client. Uploads land in a hidden `.name.partial` file
//! that is renamed into place, so listings never show half-written copies.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use walkdir::WalkDir;

use super::{RemoteEntry, RemoteStore};
use crate::error::RemoteError;

pub struct FsRemote {
    root: PathBuf,
}

impl FsRemote {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsRemote { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, remote: &str) -> PathBuf {
        remote
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

/// Upload in progress, see `partial_path`. Other dotfiles are listed so a
/// live copy named `.zion.db` still has its snapshots seen.
fn is_partial(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(".partial")
}

fn partial_path(dest: &Path) -> Option<PathBuf> {
    let name = dest.file_name()?.to_string_lossy();
    Some(dest.with_file_name(format!(".{name}.partial")))
}

impl RemoteStore for FsRemote {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        let path = self.resolve(dir);
        let shown = path.display().to_string();

        match fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(RemoteError::Io {
                    path: shown,
                    source: io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
                });
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RemoteError::Io { path: shown, source: e }),
        }

        let mut entries = Vec::new();

        for entry in WalkDir::new(&path).min_depth(1).max_depth(1).follow_links(false) {
            // a listing with holes could hide newer snapshots from prune
            let entry = entry.map_err(|e| RemoteError::Io {
                path: shown.clone(),
                source: io::Error::other(e.to_string()),
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            if is_partial(&name) {
                continue;
            }

            let metadata = entry.metadata().ok();
            let modified = metadata
                .as_ref()
                .and_then(|m| m.modified().ok())
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .and_then(|d| i64::try_from(d.as_secs()).ok());

            entries.push(RemoteEntry {
                name,
                size: metadata.map(|m| m.len()),
                modified,
            });
        }

        Ok(entries)
    }

    fn put(&self, local: &Path, remote: &str) -> Result<(), RemoteError> {
        let dest = self.resolve(remote);
        let shown = dest.display().to_string();

        let partial = partial_path(&dest).ok_or_else(|| RemoteError::Io {
            path: shown.clone(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "remote path has no file name"),
        })?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| RemoteError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        let copied = fs::copy(local, &partial).and_then(|_| fs::rename(&partial, &dest));

        if let Err(e) = copied {
            let _ = fs::remove_file(&partial);
            return Err(RemoteError::Io { path: shown, source: e });
        }

        Ok(())
    }

    fn delete(&self, remote: &str) -> Result<(), RemoteError> {
        let path = self.resolve(remote);
        fs::remove_file(&path).map_err(|e| RemoteError::io(path.display().to_string(), e))
    }
}
