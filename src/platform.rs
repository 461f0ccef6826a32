use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "ferry")
}

pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

/// Default config file location (~/.config/ferry/config.toml or platform equivalent)
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Default history database location (~/.local/share/ferry/history.db or platform equivalent)
pub fn default_history_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join("history.db"))
}

/// Expands a leading `~/` so config files can stay portable between machines.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

pub fn rclone_available(binary: &str) -> bool {
    Command::new(binary)
        .arg("version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
