use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ferry::remote::fs::FsRemote;
use ferry::remote::{RemoteEntry, RemoteStore};
use ferry::rotation::{self, naming::LiveName};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Fixture generator for archive listings
mod fixtures {
    use super::*;

    /// Daily snapshot names going back `days` days, mixed with unrelated files
    pub fn listing(days: i64) -> Vec<RemoteEntry> {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let mut entries = Vec::with_capacity(days as usize * 2);

        for offset in 0..days {
            let date = start + Duration::days(offset);
            entries.push(RemoteEntry {
                name: format!("zion_{}.db", date.format("%Y-%m-%d")),
                size: Some(4_096),
                modified: Some(offset),
            });
            entries.push(RemoteEntry {
                name: format!("notes-{offset}.txt"),
                size: Some(12),
                modified: Some(offset),
            });
        }

        // listings come back in whatever order the backend likes
        entries.reverse();
        entries
    }

    /// Archive directory on disk with `days` daily snapshots
    pub fn archive_on_disk(root: &Path, days: i64) -> std::io::Result<()> {
        let dir = root.join("archives");
        fs::create_dir_all(&dir)?;
        for entry in listing(days) {
            fs::write(dir.join(&entry.name), b"snapshot")?;
        }
        Ok(())
    }
}

/// Benchmark: selecting prune victims from listings of increasing size
fn bench_plan_prune(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_prune");
    let live = LiveName::new("zion.db");

    for days in [30, 365, 3_650] {
        let entries = fixtures::listing(days);
        group.bench_with_input(BenchmarkId::new("days", days), &entries, |b, entries| {
            b.iter(|| {
                let plan = rotation::plan_prune(black_box(entries), &live, 7).unwrap();
                black_box(plan);
            });
        });
    }

    group.finish();
}

/// Benchmark: listing a large archive through the directory backend
fn bench_fs_listing(c: &mut Criterion) {
    c.bench_function("fs_list_archive", |b| {
        let temp_dir = TempDir::new().unwrap();
        fixtures::archive_on_disk(temp_dir.path(), 365).unwrap();
        let remote = FsRemote::new(temp_dir.path());

        b.iter(|| {
            let entries = remote.list(black_box("archives")).unwrap();
            black_box(entries);
        });
    });
}

criterion_group!(benches, bench_plan_prune, bench_fs_listing);

criterion_main!(benches);
