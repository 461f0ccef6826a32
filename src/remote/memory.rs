//! In-memory store for rotation tests. Records every call and can be told
//! to fail specific operations.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::Path;

use super::{RemoteEntry, RemoteStore};
use crate::error::RemoteError;

#[derive(Default)]
pub struct MemoryRemote {
    files: RefCell<BTreeMap<String, Vec<u8>>>,
    created: RefCell<BTreeMap<String, i64>>,
    clock: RefCell<i64>,
    pub puts: RefCell<Vec<String>>,
    pub deletes: RefCell<Vec<String>>,
    fail_list: RefCell<bool>,
    fail_put: RefCell<HashSet<String>>,
    fail_delete: RefCell<HashSet<String>>,
    vanish_on_delete: RefCell<HashSet<String>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files(paths: &[&str]) -> Self {
        let remote = Self::new();
        for path in paths {
            remote.insert(path, b"seed");
        }
        remote
    }

    pub fn insert(&self, path: &str, data: &[u8]) {
        let mut clock = self.clock.borrow_mut();
        *clock += 1;
        self.files.borrow_mut().insert(path.to_string(), data.to_vec());
        self.created.borrow_mut().insert(path.to_string(), *clock);
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.files.borrow().get(path).cloned()
    }

    pub fn names_in(&self, dir: &str) -> Vec<String> {
        self.list(dir)
            .map(|entries| entries.into_iter().map(|e| e.name).collect())
            .unwrap_or_default()
    }

    pub fn fail_listing(&self) {
        *self.fail_list.borrow_mut() = true;
    }

    pub fn fail_put_to(&self, path: &str) {
        self.fail_put.borrow_mut().insert(path.to_string());
    }

    pub fn fail_delete_of(&self, path: &str) {
        self.fail_delete.borrow_mut().insert(path.to_string());
    }

    /// Simulates a concurrent cycle removing `path` between list and delete.
    pub fn vanish_before_delete(&self, path: &str) {
        self.vanish_on_delete.borrow_mut().insert(path.to_string());
    }
}

impl RemoteStore for MemoryRemote {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        if *self.fail_list.borrow() {
            return Err(RemoteError::Command {
                command: "list".to_string(),
                message: "injected failure".to_string(),
            });
        }

        let prefix = if dir.is_empty() { String::new() } else { format!("{dir}/") };
        let created = self.created.borrow();

        Ok(self
            .files
            .borrow()
            .iter()
            .filter_map(|(path, data)| {
                let name = path.strip_prefix(&prefix)?;
                (!name.contains('/')).then(|| RemoteEntry {
                    name: name.to_string(),
                    size: Some(data.len() as u64),
                    modified: created.get(path).copied(),
                })
            })
            .collect())
    }

    fn put(&self, local: &Path, remote: &str) -> Result<(), RemoteError> {
        self.puts.borrow_mut().push(remote.to_string());

        if self.fail_put.borrow().contains(remote) {
            return Err(RemoteError::Io {
                path: remote.to_string(),
                source: io::Error::new(io::ErrorKind::ConnectionReset, "injected failure"),
            });
        }

        let data = std::fs::read(local).map_err(|e| RemoteError::Io {
            path: local.display().to_string(),
            source: e,
        })?;
        self.insert(remote, &data);
        Ok(())
    }

    fn delete(&self, remote: &str) -> Result<(), RemoteError> {
        self.deletes.borrow_mut().push(remote.to_string());

        if self.fail_delete.borrow().contains(remote) {
            return Err(RemoteError::Io {
                path: remote.to_string(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "injected failure"),
            });
        }

        if self.vanish_on_delete.borrow().contains(remote) {
            self.files.borrow_mut().remove(remote);
        }

        match self.files.borrow_mut().remove(remote) {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound(remote.to_string())),
        }
    }
}
