//! Terminal rendering.
//!
//! - Cycle report: one line per step, then prune details
//! - Snapshot listing: newest first with sizes
//! - History: one line per recorded cycle
//! - Prune plan: what a dry run would delete

use crate::rotation::naming::ArchivedSnapshot;
use crate::rotation::{CycleReport, PrunePlan, PruneReport, StepStatus};
use crate::store::CycleRecord;
use crate::util::{format_bytes, format_timestamp};

fn status_marker(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Done => "[ok]",
        StepStatus::Skipped => "[skip]",
        StepStatus::Failed => "[fail]",
    }
}

pub fn render_cycle(report: &CycleReport) -> String {
    let mut output = String::new();

    output.push_str(&format!("cycle {} -> {}\n", report.started_at, report.remote));
    output.push_str(&"-".repeat(50));
    output.push('\n');

    for step in &report.steps {
        output.push_str(&format!(
            "  {:<7} {:<9} {}\n",
            status_marker(step.status),
            step.step.as_str(),
            step.detail
        ));
    }

    if let Some(prune) = &report.prune {
        for name in &prune.deleted {
            output.push_str(&format!("  [-] {name}\n"));
        }
        for name in &prune.already_gone {
            output.push_str(&format!("  [gone] {name} (removed elsewhere)\n"));
        }
        for name in &prune.failed {
            output.push_str(&format!("  [!] {name} could not be deleted\n"));
        }
    }

    if report.consistent_copy {
        output.push_str("\nuploaded a consistent sqlite copy\n");
    }

    output
}

pub fn render_snapshots(snapshots: &[ArchivedSnapshot]) -> String {
    if snapshots.is_empty() {
        return String::from("No snapshots found. Run 'ferry' to create one.\n");
    }

    let mut output = String::new();
    output.push_str(&format!("{:<40} {:<20} {:>10}\n", "Snapshot", "Uploaded", "Size"));
    output.push_str(&"-".repeat(72));
    output.push('\n');

    for snapshot in snapshots.iter().rev() {
        let uploaded = snapshot
            .modified
            .map(format_timestamp)
            .unwrap_or_else(|| "unknown".to_string());
        let size = snapshot
            .size
            .map(format_bytes)
            .unwrap_or_else(|| "?".to_string());

        output.push_str(&format!(
            "{:<40} {:<20} {:>10}\n",
            truncate(&snapshot.name, 40),
            uploaded,
            size
        ));
    }

    let total: u64 = snapshots.iter().filter_map(|s| s.size).sum();
    output.push_str(&format!("\n{} snapshots, {}\n", snapshots.len(), format_bytes(total)));

    output
}

pub fn render_history(cycles: &[CycleRecord]) -> String {
    if cycles.is_empty() {
        return String::from("No cycles recorded yet.\n");
    }

    let mut output = String::new();
    output.push_str(&format!(
        "{:<6} {:<20} {:<5} {:<32} {:>6}\n",
        "ID", "Started", "Exit", "Snapshot", "Pruned"
    ));
    output.push_str(&"-".repeat(73));
    output.push('\n');

    for cycle in cycles {
        output.push_str(&format!(
            "{:<6} {:<20} {:<5} {:<32} {:>6}\n",
            cycle.id,
            cycle.started_at,
            cycle.exit_code,
            truncate(cycle.snapshot_name.as_deref().unwrap_or("-"), 32),
            cycle.pruned
        ));

        for step in cycle.steps.iter().filter(|s| s.status == "failed") {
            output.push_str(&format!("       {} failed: {}\n", step.step, step.detail));
        }
    }

    output
}

pub fn render_cycle_record(cycle: &CycleRecord) -> String {
    let mut output = String::new();

    output.push_str(&format!("cycle #{} at {}\n", cycle.id, cycle.started_at));
    output.push_str(&format!("  source:   {}\n", cycle.source));
    output.push_str(&format!("  remote:   {}\n", cycle.remote));
    output.push_str(&format!("  snapshot: {}\n", cycle.snapshot_name.as_deref().unwrap_or("-")));
    output.push_str(&format!("  exit:     {}\n", cycle.exit_code));
    output.push_str(&"-".repeat(50));
    output.push('\n');

    for step in &cycle.steps {
        output.push_str(&format!("  {:<9} {:<8} {}\n", step.step, step.status, step.detail));
    }

    output.push_str(&format!(
        "\npruned {}, took {:.2}s\n",
        cycle.pruned,
        cycle.duration_ms as f64 / 1000.0
    ));

    output
}

pub fn render_prune_plan(plan: &PrunePlan) -> String {
    let mut output = String::new();

    if plan.delete.is_empty() {
        output.push_str(&format!("nothing to prune, {} snapshots kept\n", plan.keep.len()));
        return output;
    }

    for snapshot in &plan.delete {
        output.push_str(&format!("[dry-run] would delete: {}\n", snapshot.name));
    }

    let bytes: u64 = plan.delete.iter().filter_map(|s| s.size).sum();
    output.push_str(&format!(
        "\n{} snapshots kept, would delete {} ({})\n",
        plan.keep.len(),
        plan.delete.len(),
        format_bytes(bytes)
    ));

    output
}

pub fn render_prune_report(report: &PruneReport) -> String {
    let mut output = String::new();

    for name in &report.deleted {
        output.push_str(&format!("deleted: {name}\n"));
    }
    for name in &report.already_gone {
        output.push_str(&format!("already gone: {name}\n"));
    }
    for name in &report.failed {
        output.push_str(&format!("failed to delete: {name}\n"));
    }

    output.push_str(&format!(
        "\n{} snapshots kept, {} deleted\n",
        report.kept.len(),
        report.deleted.len()
    ));

    output
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{truncated}...")
    }
}
