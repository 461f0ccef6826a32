//! JSON output for scripting and piping.
//!
//! Serialization of these types cannot fail (no maps with non-string keys),
//! the fallback only guards against that changing.

use serde::Serialize;

use crate::rotation::naming::ArchivedSnapshot;
use crate::rotation::CycleReport;
use crate::store::CycleRecord;

fn render<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
}

pub fn render_cycle(report: &CycleReport) -> String {
    render(report)
}

pub fn render_snapshots(snapshots: &[ArchivedSnapshot]) -> String {
    render(snapshots)
}

pub fn render_history(cycles: &[CycleRecord]) -> String {
    render(cycles)
}

pub fn render_cycle_record(cycle: &CycleRecord) -> String {
    render(cycle)
}
