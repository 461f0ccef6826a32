use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::Path;

use crate::rotation::CycleReport;

/// A recorded cycle as read back from the ledger
#[derive(Debug, Clone, Serialize)]
pub struct CycleRecord {
    pub id: i64,
    pub started_at: String,
    pub source: String,
    pub remote: String,
    pub exit_code: i32,
    pub snapshot_name: Option<String>,
    pub pruned: u64,
    pub duration_ms: u64,
    pub steps: Vec<StepRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: String,
    pub status: String,
    pub detail: String,
    pub error_kind: Option<String>,
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cycles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            source TEXT NOT NULL,
            remote TEXT NOT NULL,
            exit_code INTEGER NOT NULL,
            snapshot_name TEXT,
            pruned INTEGER NOT NULL,
            duration_ms INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS steps (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cycle_id INTEGER NOT NULL,
            step TEXT NOT NULL,
            status TEXT NOT NULL,
            detail TEXT NOT NULL,
            error_kind TEXT,
            FOREIGN KEY(cycle_id) REFERENCES cycles(id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_steps_cycle_id ON steps(cycle_id)",
        [],
    )?;

    Ok(())
}

/// Ledger handle. Open once per command.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, Box<dyn std::error::Error>> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, Box<dyn std::error::Error>> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        init_schema(&conn)?;
        Ok(Store { conn })
    }

    /// Append a finished cycle and its steps
    pub fn record_cycle(&mut self, report: &CycleReport) -> Result<i64, Box<dyn std::error::Error>> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO cycles (started_at, source, remote, exit_code, snapshot_name, pruned, duration_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                report.started_at,
                report.source,
                report.remote,
                report.exit_code(),
                report.snapshot_name.as_deref(),
                i64::try_from(report.pruned_count()).unwrap_or(i64::MAX),
                i64::try_from(report.duration_ms).unwrap_or(i64::MAX),
            ],
        )?;

        let cycle_id = tx.last_insert_rowid();

        let mut stmt = tx.prepare_cached(
            "INSERT INTO steps (cycle_id, step, status, detail, error_kind)
             VALUES (?1, ?2, ?3, ?4, ?5)"
        )?;

        for step in &report.steps {
            stmt.execute(params![
                cycle_id,
                step.step.as_str(),
                step.status.as_str(),
                step.detail,
                step.error_kind,
            ])?;
        }

        drop(stmt);
        tx.commit()?;

        Ok(cycle_id)
    }

    /// Most recent cycles first
    pub fn list_cycles(&self, limit: usize) -> Result<Vec<CycleRecord>, Box<dyn std::error::Error>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, started_at, source, remote, exit_code, snapshot_name, pruned, duration_ms
             FROM cycles
             ORDER BY id DESC
             LIMIT ?1"
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut cycles = stmt.query_map(params![limit], cycle_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        for cycle in &mut cycles {
            cycle.steps = self.load_steps(cycle.id)?;
        }

        Ok(cycles)
    }

    /// Get a specific cycle by ID
    pub fn get_cycle(&self, id: i64) -> Result<Option<CycleRecord>, Box<dyn std::error::Error>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, started_at, source, remote, exit_code, snapshot_name, pruned, duration_ms
             FROM cycles
             WHERE id = ?1"
        )?;

        let mut rows = stmt.query(params![id])?;

        if let Some(row) = rows.next()? {
            let mut cycle = cycle_from_row(row)?;
            cycle.steps = self.load_steps(id)?;
            Ok(Some(cycle))
        } else {
            Ok(None)
        }
    }

    fn load_steps(&self, cycle_id: i64) -> rusqlite::Result<Vec<StepRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT step, status, detail, error_kind
             FROM steps
             WHERE cycle_id = ?1
             ORDER BY id"
        )?;

        let steps = stmt.query_map(params![cycle_id], |row| {
            Ok(StepRecord {
                step: row.get(0)?,
                status: row.get(1)?,
                detail: row.get(2)?,
                error_kind: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

        Ok(steps)
    }
}

fn cycle_from_row(row: &rusqlite::Row) -> rusqlite::Result<CycleRecord> {
    Ok(CycleRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        source: row.get(2)?,
        remote: row.get(3)?,
        exit_code: row.get(4)?,
        snapshot_name: row.get(5)?,
        pruned: row.get::<_, i64>(6)?.max(0) as u64,
        duration_ms: row.get::<_, i64>(7)?.max(0) as u64,
        steps: Vec::new(),
    })
}
