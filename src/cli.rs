use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ferry")]
#[command(about = "Mirrors a live file to a remote store and rotates dated snapshots")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Defaults to `run` when omitted
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run one rotation cycle: mirror, snapshot, prune
    Run(RunArgs),

    /// List archived snapshots, newest first
    Snapshots(SnapshotsArgs),

    /// Prune the archive without mirroring or snapshotting
    Prune(PruneArgs),

    /// Show previously recorded cycles
    History(HistoryArgs),
}

#[derive(Args, Default)]
pub struct GlobalArgs {
    /// Config file (defaults to ~/.config/ferry/config.toml)
    #[arg(long, global = true, env = "FERRY_CONFIG")]
    pub config: Option<PathBuf>,

    /// File to back up, overrides source_path
    #[arg(long, global = true)]
    pub source: Option<PathBuf>,

    /// Remote target, a directory or an rclone path like gdrive:backups
    #[arg(long, global = true)]
    pub remote: Option<String>,

    /// Number of snapshots to keep, overrides retention_count
    #[arg(long, global = true, allow_negative_numbers = true)]
    pub keep: Option<i64>,

    /// Show debug logging
    #[arg(long, short = 'v', global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Parser, Default)]
pub struct RunArgs {
    /// Output the cycle report as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Parser)]
pub struct SnapshotsArgs {
    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Parser)]
pub struct PruneArgs {
    /// Show what would be deleted without deleting
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Parser)]
pub struct HistoryArgs {
    /// Show a single cycle with all of its steps
    pub id: Option<i64>,

    /// Number of cycles to show
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}
