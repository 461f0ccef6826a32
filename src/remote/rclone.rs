//! rclone backend.
//!
//! Shells out to the rclone binary for every operation:
//! - list:   `rclone lsjson --files-only <target>/<dir>`
//! - put:    `rclone copyto <local> <target>/<path>`
//! - delete: `rclone deletefile <target>/<path>`
//!
//! Every call is bounded by the transfer timeout. A call that runs past it
//! is killed and reported as a timeout.
//!
//! rclone exit codes used here: 3 directory not found, 4 file not found.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;

use super::{RemoteEntry, RemoteStore};
use crate::error::RemoteError;

const EXIT_DIR_NOT_FOUND: i32 = 3;
const EXIT_FILE_NOT_FOUND: i32 = 4;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct RcloneRemote {
    binary: String,
    target: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LsJsonItem {
    name: String,
    #[serde(default)]
    size: i64,
    #[serde(default)]
    mod_time: Option<String>,
    #[serde(default)]
    is_dir: bool,
}

struct Finished {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

impl Finished {
    fn code(&self) -> Option<i32> {
        self.status.code()
    }

    fn failure(&self, command: &str) -> RemoteError {
        let message = match self.stderr.trim() {
            "" => format!("exit status {}", self.code().unwrap_or(-1)),
            stderr => stderr.lines().last().unwrap_or(stderr).to_string(),
        };
        RemoteError::Command { command: command.to_string(), message }
    }
}

impl RcloneRemote {
    pub fn new(binary: &str, target: &str, timeout: Duration) -> Self {
        RcloneRemote {
            binary: binary.to_string(),
            target: target.to_string(),
            timeout,
        }
    }

    /// Full rclone path for a path relative to the target.
    pub fn remote_path(&self, relative: &str) -> String {
        let relative = relative.trim_matches('/');
        if relative.is_empty() {
            self.target.clone()
        } else if self.target.ends_with(':') || self.target.ends_with('/') {
            format!("{}{relative}", self.target)
        } else {
            format!("{}/{relative}", self.target)
        }
    }

    fn run(&self, args: &[&str]) -> Result<Finished, RemoteError> {
        let command = format!("{} {}", self.binary, args.first().copied().unwrap_or_default());

        let child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RemoteError::Command {
                command: command.clone(),
                message: format!("failed to start: {e}"),
            })?;

        tracing::debug!(command = %command, args = ?args, "running rclone");
        wait_with_timeout(child, &command, self.timeout)
    }
}

/// Waits for `child`, killing it once `timeout` has passed. Output pipes are
/// drained on their own threads so a chatty child cannot block on a full pipe.
fn wait_with_timeout(mut child: Child, command: &str, timeout: Duration) -> Result<Finished, RemoteError> {
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);
    let start = Instant::now();

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(RemoteError::Timeout {
                        operation: command.to_string(),
                        after: timeout,
                    });
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                return Err(RemoteError::Command {
                    command: command.to_string(),
                    message: format!("failed to wait for process: {e}"),
                });
            }
        }
    };

    let collect = |handle: Option<thread::JoinHandle<String>>| {
        handle.and_then(|h| h.join().ok()).unwrap_or_default()
    };

    Ok(Finished {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn parse_lsjson(stdout: &str) -> Result<Vec<RemoteEntry>, serde_json::Error> {
    let items: Vec<LsJsonItem> = serde_json::from_str(stdout)?;

    Ok(items
        .into_iter()
        .filter(|item| !item.is_dir)
        .map(|item| RemoteEntry {
            name: item.name,
            size: u64::try_from(item.size).ok(),
            modified: item
                .mod_time
                .as_deref()
                .and_then(|t| chrono::DateTime::parse_from_rfc3339(t).ok())
                .map(|dt| dt.timestamp()),
        })
        .collect())
}

/// Only rclone's dedicated exit codes count. Matching stderr text would let
/// an unrelated failure pass as an empty listing.
fn is_not_found(finished: &Finished, exit_code: i32) -> bool {
    finished.code() == Some(exit_code)
}

impl RemoteStore for RcloneRemote {
    fn describe(&self) -> String {
        format!("rclone {}", self.target)
    }

    fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        let path = self.remote_path(dir);
        let finished = self.run(&["lsjson", "--files-only", "--no-mimetype", &path])?;

        if !finished.status.success() {
            if is_not_found(&finished, EXIT_DIR_NOT_FOUND) {
                return Ok(Vec::new());
            }
            return Err(finished.failure("rclone lsjson"));
        }

        parse_lsjson(&finished.stdout).map_err(|e| RemoteError::Command {
            command: "rclone lsjson".to_string(),
            message: format!("unreadable listing: {e}"),
        })
    }

    fn put(&self, local: &Path, remote: &str) -> Result<(), RemoteError> {
        let path = self.remote_path(remote);
        let local = local.to_string_lossy();
        let finished = self.run(&["copyto", &local, &path])?;

        if finished.status.success() {
            Ok(())
        } else {
            Err(finished.failure("rclone copyto"))
        }
    }

    fn delete(&self, remote: &str) -> Result<(), RemoteError> {
        let path = self.remote_path(remote);
        let finished = self.run(&["deletefile", &path])?;

        if finished.status.success() {
            Ok(())
        } else if is_not_found(&finished, EXIT_FILE_NOT_FOUND) {
            Err(RemoteError::NotFound(path))
        } else {
            Err(finished.failure("rclone deletefile"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(target: &str) -> RcloneRemote {
        RcloneRemote::new("rclone", target, Duration::from_secs(5))
    }

    #[test]
    fn remote_paths_join_cleanly() {
        assert_eq!(remote("gdrive:").remote_path("archives"), "gdrive:archives");
        assert_eq!(remote("gdrive:backups").remote_path("archives/a.db"), "gdrive:backups/archives/a.db");
        assert_eq!(remote("gdrive:backups/").remote_path("zion.db"), "gdrive:backups/zion.db");
        assert_eq!(remote("gdrive:backups").remote_path(""), "gdrive:backups");
    }

    #[test]
    fn lsjson_output_parses() {
        let stdout = r#"[
            {"Path":"zion_2024-01-01.db","Name":"zion_2024-01-01.db","Size":4096,"ModTime":"2024-01-01T03:00:00.000000000Z","IsDir":false},
            {"Path":"sub","Name":"sub","Size":-1,"ModTime":"2024-01-01T03:00:00Z","IsDir":true},
            {"Path":"odd","Name":"odd","Size":-1,"IsDir":false}
        ]"#;

        let entries = parse_lsjson(stdout).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "zion_2024-01-01.db");
        assert_eq!(entries[0].size, Some(4096));
        assert_eq!(entries[0].modified, Some(1_704_078_000));
        assert_eq!(entries[1].size, None);
        assert_eq!(entries[1].modified, None);
    }

    #[test]
    fn garbage_listing_is_an_error() {
        assert!(parse_lsjson("not json").is_err());
    }

    #[test]
    fn missing_binary_is_a_command_error() {
        let remote = RcloneRemote::new("ferry-test-no-such-rclone", "gdrive:x", Duration::from_secs(1));
        let err = remote.list("archives").unwrap_err();
        assert!(matches!(err, RemoteError::Command { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn slow_commands_time_out() {
        let child = Command::new("sleep")
            .arg("5")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        let started = Instant::now();
        let err = wait_with_timeout(child, "sleep", Duration::from_millis(200)).err().unwrap();

        assert!(matches!(err, RemoteError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn output_is_collected() {
        let child = Command::new("sh")
            .args(["-c", "echo listed; echo oops >&2; exit 3"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        let finished = wait_with_timeout(child, "sh", Duration::from_secs(5)).ok().unwrap();
        assert_eq!(finished.stdout.trim(), "listed");
        assert_eq!(finished.code(), Some(3));
        assert!(is_not_found(&finished, EXIT_DIR_NOT_FOUND));
        assert!(!is_not_found(&finished, EXIT_FILE_NOT_FOUND));
    }

    #[cfg(unix)]
    #[test]
    fn not_found_text_with_other_exit_code_is_a_failure() {
        let child = Command::new("sh")
            .args(["-c", "echo 'Failed to lsjson: config file not found' >&2; exit 1"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        let finished = wait_with_timeout(child, "sh", Duration::from_secs(5)).ok().unwrap();
        assert!(!is_not_found(&finished, EXIT_DIR_NOT_FOUND));
        assert!(matches!(finished.failure("rclone lsjson"), RemoteError::Command { .. }));
    }
}
