//! SQLite cycle ledger.
//!
//! Persists every finished cycle to a local SQLite database with two tables:
//! - cycles: id, started_at, source, remote, exit_code, snapshot_name, pruned, duration_ms
//! - steps: cycle_id, step, status, detail, error_kind
//!
//! Supports:
//! - Recording after every `ferry run`
//! - Listing recent cycles (`ferry history`)
//! - Loading a specific cycle by ID

pub mod history;

pub use history::{CycleRecord, StepRecord, Store};
