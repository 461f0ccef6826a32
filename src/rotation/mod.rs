//! Backup rotation.
//!
//! One cycle runs three steps in order:
//! - mirror: overwrite `<target>/<live copy>` with the current source
//! - snapshot: copy the source to `<target>/<archive dir>/<stem>_<stamp>.<ext>`,
//!   unless a snapshot for the current period already exists
//! - prune: delete all but the newest `retention_count` snapshots
//!
//! A failing step never stops the next one. Prune is the exception to
//! "carry on regardless": if the archive cannot be listed nothing is deleted.

pub mod naming;

use std::io::Write;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::config::Config;
use crate::error::RotationError;
use crate::remote::{self, RemoteEntry, RemoteStore};
use crate::staging;
use naming::{archived_snapshots, ArchivedSnapshot, Granularity, LiveName};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILED: i32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum SnapshotOutcome {
    Created { name: String },
    Skipped { existing: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub kept: Vec<String>,
    pub deleted: Vec<String>,
    /// Removed by someone else between listing and deleting.
    pub already_gone: Vec<String>,
    pub failed: Vec<String>,
}

/// Which snapshots a prune would keep and delete, oldest first in both.
#[derive(Debug, Clone, Default)]
pub struct PrunePlan {
    pub keep: Vec<ArchivedSnapshot>,
    pub delete: Vec<ArchivedSnapshot>,
}

/// Re-runs a step on transfer and listing failures, doubling the wait
/// between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn run<T>(&self, step: Step, mut attempt: impl FnMut() -> Result<T, RotationError>) -> Result<T, RotationError> {
        let mut wait = self.backoff;
        let mut tries = 0;

        loop {
            match attempt() {
                Err(e) if e.is_retryable() && tries < self.retries => {
                    tries += 1;
                    tracing::warn!(step = step.as_str(), attempt = tries, error = %e, "retrying in {wait:?}");
                    thread::sleep(wait);
                    wait = wait.saturating_mul(2);
                }
                result => return result,
            }
        }
    }
}

/// Copies `source` over the always-current copy at `remote_path`.
pub fn mirror(remote: &dyn RemoteStore, source: &Path, remote_path: &str) -> Result<(), RotationError> {
    if !source.is_file() {
        return Err(RotationError::SourceMissing(source.to_path_buf()));
    }

    remote.put(source, remote_path).map_err(|e| RotationError::Transfer {
        target: remote_path.to_string(),
        source: e,
    })
}

/// Archives `source` under `remote_dir` unless this period already has a
/// snapshot.
pub fn snapshot(
    remote: &dyn RemoteStore,
    source: &Path,
    remote_dir: &str,
    live: &LiveName,
    granularity: Granularity,
    now: NaiveDateTime,
) -> Result<SnapshotOutcome, RotationError> {
    if !source.is_file() {
        return Err(RotationError::SourceMissing(source.to_path_buf()));
    }

    let entries = remote.list(remote_dir).map_err(|e| RotationError::Listing {
        dir: remote_dir.to_string(),
        source: e,
    })?;

    let existing = archived_snapshots(live, &entries)
        .into_iter()
        .filter(|s| granularity.same_period(s.taken_at, now))
        .last();

    if let Some(existing) = existing {
        // the archive is trusted as is; an empty one is worth a look
        if existing.size == Some(0) {
            tracing::warn!(snapshot = %existing.name, "existing snapshot for this period is empty, not replacing it");
        }
        return Ok(SnapshotOutcome::Skipped { existing: existing.name });
    }

    let name = live.snapshot_name(&granularity.stamp(now));
    let target = remote::join(remote_dir, &name);

    remote.put(source, &target).map_err(|e| RotationError::Transfer { target, source: e })?;

    Ok(SnapshotOutcome::Created { name })
}

/// Splits the snapshots found in `entries` into the newest `keep_count` and
/// the rest. Entries that are not snapshots of `live` are ignored.
pub fn plan_prune(entries: &[RemoteEntry], live: &LiveName, keep_count: usize) -> Result<PrunePlan, RotationError> {
    if keep_count == 0 {
        return Err(RotationError::InvalidRetention(0));
    }

    let mut snapshots = archived_snapshots(live, entries);
    let cut = snapshots.len().saturating_sub(keep_count);
    let keep = snapshots.split_off(cut);

    Ok(PrunePlan { keep, delete: snapshots })
}

/// Deletes all but the newest `keep_count` snapshots in `remote_dir`.
pub fn prune(
    remote: &dyn RemoteStore,
    remote_dir: &str,
    live: &LiveName,
    keep_count: usize,
) -> Result<PruneReport, RotationError> {
    if keep_count == 0 {
        return Err(RotationError::InvalidRetention(0));
    }

    let entries = remote.list(remote_dir).map_err(|e| RotationError::Listing {
        dir: remote_dir.to_string(),
        source: e,
    })?;

    let plan = plan_prune(&entries, live, keep_count)?;
    let mut report = PruneReport {
        kept: plan.keep.into_iter().map(|s| s.name).collect(),
        ..PruneReport::default()
    };

    for snapshot in plan.delete {
        let path = remote::join(remote_dir, &snapshot.name);

        match remote.delete(&path) {
            Ok(()) => {
                tracing::info!(snapshot = %snapshot.name, "pruned");
                report.deleted.push(snapshot.name);
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!(snapshot = %snapshot.name, "already deleted");
                report.already_gone.push(snapshot.name);
            }
            Err(e) => {
                tracing::warn!(snapshot = %snapshot.name, error = %e, "could not prune");
                report.failed.push(snapshot.name);
            }
        }
    }

    Ok(report)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Mirror,
    Snapshot,
    Prune,
    Summary,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Mirror => "mirror",
            Step::Snapshot => "snapshot",
            Step::Prune => "prune",
            Step::Summary => "summary",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Done,
    Skipped,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Done => "done",
            StepStatus::Skipped => "skipped",
            StepStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: Step,
    pub status: StepStatus,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

impl StepReport {
    fn done(step: Step, detail: impl Into<String>) -> Self {
        StepReport { step, status: StepStatus::Done, detail: detail.into(), error_kind: None }
    }

    fn skipped(step: Step, detail: impl Into<String>) -> Self {
        StepReport { step, status: StepStatus::Skipped, detail: detail.into(), error_kind: None }
    }

    fn failed(step: Step, error: &RotationError) -> Self {
        tracing::error!(step = step.as_str(), kind = error.kind(), "{error}");
        StepReport {
            step,
            status: StepStatus::Failed,
            detail: error.to_string(),
            error_kind: Some(error.kind()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    /// Local time the cycle started, `YYYY-MM-DD HH:MM:SS`.
    pub started_at: String,
    pub source: String,
    pub remote: String,
    pub consistent_copy: bool,
    pub steps: Vec<StepReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prune: Option<PruneReport>,
    pub duration_ms: u128,
}

impl CycleReport {
    pub fn step(&self, step: Step) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.step == step)
    }

    /// Nonzero when the mirror did not happen or the source is gone.
    /// Prune and summary trouble never changes it.
    pub fn exit_code(&self) -> i32 {
        let mirror_failed = self
            .step(Step::Mirror)
            .map(|s| s.status == StepStatus::Failed)
            .unwrap_or(true);
        let source_missing = self
            .steps
            .iter()
            .any(|s| s.error_kind == Some("source-missing"));

        if mirror_failed || source_missing {
            EXIT_FAILED
        } else {
            EXIT_OK
        }
    }

    pub fn pruned_count(&self) -> usize {
        self.prune.as_ref().map(|p| p.deleted.len()).unwrap_or(0)
    }
}

/// Runs mirror, snapshot and prune once against `remote`.
pub fn run_cycle(remote: &dyn RemoteStore, config: &Config, now: NaiveDateTime) -> CycleReport {
    let start = Instant::now();
    let live = config.live_name();
    let retry = RetryPolicy { retries: config.retries, backoff: config.retry_backoff };

    tracing::info!(source = %config.source_path.display(), remote = %remote.describe(), "starting cycle");

    let staged = config
        .source_path
        .is_file()
        .then(|| staging::stage(&config.source_path, config.consistent_copy, &std::env::temp_dir()));
    let upload = staged.as_ref().map(|s| s.path()).unwrap_or(config.source_path.as_path());

    let mut report = CycleReport {
        started_at: now.format("%Y-%m-%d %H:%M:%S").to_string(),
        source: config.source_path.display().to_string(),
        remote: remote.describe(),
        consistent_copy: staged.as_ref().map(|s| s.is_consistent_copy()).unwrap_or(false),
        steps: Vec::new(),
        snapshot_name: None,
        prune: None,
        duration_ms: 0,
    };

    let live_path = live.file_name();
    let mirrored = retry.run(Step::Mirror, || mirror(remote, upload, &live_path));
    report.steps.push(match mirrored {
        Ok(()) => {
            tracing::info!(path = %live_path, "mirrored");
            StepReport::done(Step::Mirror, format!("mirrored to {live_path}"))
        }
        Err(e) => StepReport::failed(Step::Mirror, &e),
    });

    let snapped = retry.run(Step::Snapshot, || {
        snapshot(remote, upload, &config.archive_dir, &live, config.granularity, now)
    });
    report.steps.push(match snapped {
        Ok(SnapshotOutcome::Created { name }) => {
            tracing::info!(snapshot = %name, "snapshot created");
            let step = StepReport::done(Step::Snapshot, format!("created {name}"));
            report.snapshot_name = Some(name);
            step
        }
        Ok(SnapshotOutcome::Skipped { existing }) => {
            tracing::info!(snapshot = %existing, "snapshot for this period exists, skipping");
            let step = StepReport::skipped(Step::Snapshot, format!("{existing} already covers this period"));
            report.snapshot_name = Some(existing);
            step
        }
        Err(e) => StepReport::failed(Step::Snapshot, &e),
    });

    report.steps.push(match prune(remote, &config.archive_dir, &live, config.retention_count) {
        Ok(pruned) => {
            let detail = format!(
                "kept {}, deleted {}{}",
                pruned.kept.len(),
                pruned.deleted.len(),
                if pruned.failed.is_empty() { String::new() } else { format!(", {} failed", pruned.failed.len()) }
            );
            report.prune = Some(pruned);
            StepReport::done(Step::Prune, detail)
        }
        Err(e) => StepReport::failed(Step::Prune, &e),
    });

    drop(staged);
    report.duration_ms = start.elapsed().as_millis();

    if config.write_summary {
        let step = upload_summary(remote, &live, &report);
        report.steps.push(step);
    }

    tracing::info!(exit_code = report.exit_code(), duration_ms = report.duration_ms as u64, "cycle finished");
    report
}

/// Remote path of the summary written after each cycle.
pub fn summary_path(live: &LiveName) -> String {
    format!("{}.summary.json", live.stem())
}

/// Writes the rendered report to a fresh temp file, owner-only and removed
/// when the handle drops.
fn write_summary_file(report: &CycleReport) -> std::io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new().prefix("ferry-").suffix(".summary.json").tempfile()?;
    file.write_all(crate::report::json::render_cycle(report).as_bytes())?;
    file.flush()?;
    Ok(file)
}

fn upload_summary(remote: &dyn RemoteStore, live: &LiveName, report: &CycleReport) -> StepReport {
    let target = summary_path(live);

    let result = match write_summary_file(report) {
        Ok(local) => remote.put(local.path(), &target).map_err(|e| RotationError::Transfer {
            target: target.clone(),
            source: e,
        }),
        Err(e) => Err(RotationError::Transfer {
            target: target.clone(),
            source: crate::error::RemoteError::Io { path: "summary temp file".to_string(), source: e },
        }),
    };

    match result {
        Ok(()) => StepReport::done(Step::Summary, format!("wrote {target}")),
        Err(e) => {
            // never fatal, the report still reaches stdout and the ledger
            let mut step = StepReport::failed(Step::Summary, &e);
            step.error_kind = Some("summary-error");
            step
        }
    }
}
