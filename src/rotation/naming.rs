//! Snapshot names.
//!
//! A snapshot of `zion.db` taken on 2024-01-06 is called
//! `zion_2024-01-06.db`. Hourly snapshots use `zion_2024-01-06_130000.db`.
//! Both stamp shapes are fixed width, so sorting names of one source as
//! strings sorts them by time, and a daily stamp sorts before every hourly
//! stamp of the same day.

use std::cmp::Ordering;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::remote::RemoteEntry;

const DAILY_LEN: usize = "2024-01-01".len();
const HOURLY_LEN: usize = "2024-01-01_130000".len();

/// How often a new snapshot may be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Daily,
    Hourly,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Daily => "daily",
            Granularity::Hourly => "hourly",
        }
    }

    pub fn stamp(&self, at: NaiveDateTime) -> String {
        match self {
            Granularity::Daily => at.format("%Y-%m-%d").to_string(),
            Granularity::Hourly => at.format("%Y-%m-%d_%H0000").to_string(),
        }
    }

    /// Start of the period containing `at`.
    pub fn period_start(&self, at: NaiveDateTime) -> NaiveDateTime {
        match self {
            Granularity::Daily => at.date().and_time(NaiveTime::MIN),
            Granularity::Hourly => at
                .date()
                .and_hms_opt(at.hour(), 0, 0)
                .unwrap_or_else(|| at.date().and_time(NaiveTime::MIN)),
        }
    }

    pub fn same_period(&self, a: NaiveDateTime, b: NaiveDateTime) -> bool {
        self.period_start(a) == self.period_start(b)
    }
}

/// Parses a stamp of either shape. Anything else, including stamps chrono
/// would accept with missing zero padding, is rejected so string order
/// keeps matching time order.
pub fn parse_stamp(stamp: &str) -> Option<NaiveDateTime> {
    let bytes = stamp.as_bytes();
    let date_shape = |b: &[u8]| {
        b.len() >= DAILY_LEN
            && b[4] == b'-'
            && b[7] == b'-'
            && b[..DAILY_LEN]
                .iter()
                .enumerate()
                .all(|(i, c)| i == 4 || i == 7 || c.is_ascii_digit())
    };

    match bytes.len() {
        DAILY_LEN if date_shape(bytes) => NaiveDate::parse_from_str(stamp, "%Y-%m-%d")
            .ok()
            .map(|d| d.and_time(NaiveTime::MIN)),
        HOURLY_LEN
            if date_shape(bytes)
                && bytes[DAILY_LEN] == b'_'
                && bytes[DAILY_LEN + 1..].iter().all(u8::is_ascii_digit) =>
        {
            NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d_%H%M%S").ok()
        }
        _ => None,
    }
}

/// The name under which the live copy is mirrored, split the way snapshot
/// names are built from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveName {
    stem: String,
    ext: Option<String>,
}

impl LiveName {
    pub fn new(file_name: &str) -> Self {
        let path = Path::new(file_name);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.to_string());
        let ext = path.extension().map(|e| e.to_string_lossy().into_owned());

        LiveName { stem, ext }
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn file_name(&self) -> String {
        match &self.ext {
            Some(ext) => format!("{}.{ext}", self.stem),
            None => self.stem.clone(),
        }
    }

    pub fn snapshot_name(&self, stamp: &str) -> String {
        match &self.ext {
            Some(ext) => format!("{}_{stamp}.{ext}", self.stem),
            None => format!("{}_{stamp}", self.stem),
        }
    }

    /// Returns the stamp time if `name` is a snapshot of this live file.
    pub fn parse(&self, name: &str) -> Option<NaiveDateTime> {
        let rest = name.strip_prefix(self.stem.as_str())?.strip_prefix('_')?;
        let stamp = match &self.ext {
            Some(ext) => rest.strip_suffix(ext.as_str())?.strip_suffix('.')?,
            None => rest,
        };
        parse_stamp(stamp)
    }
}

/// A remote entry recognised as a snapshot of the live file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchivedSnapshot {
    pub name: String,
    pub taken_at: NaiveDateTime,
    pub size: Option<u64>,
    pub modified: Option<i64>,
}

impl ArchivedSnapshot {
    pub fn from_entry(live: &LiveName, entry: &RemoteEntry) -> Option<Self> {
        live.parse(&entry.name).map(|taken_at| ArchivedSnapshot {
            name: entry.name.clone(),
            taken_at,
            size: entry.size,
            modified: entry.modified,
        })
    }

    /// Oldest first. Equal stamp times fall back to creation order, then name.
    pub fn chronological(a: &Self, b: &Self) -> Ordering {
        a.taken_at
            .cmp(&b.taken_at)
            .then_with(|| a.modified.cmp(&b.modified))
            .then_with(|| a.name.cmp(&b.name))
    }
}

/// Picks the snapshots of `live` out of a directory listing, oldest first.
pub fn archived_snapshots(live: &LiveName, entries: &[RemoteEntry]) -> Vec<ArchivedSnapshot> {
    let mut snapshots: Vec<_> = entries
        .iter()
        .filter_map(|entry| ArchivedSnapshot::from_entry(live, entry))
        .collect();
    snapshots.sort_by(ArchivedSnapshot::chronological);
    snapshots
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(date: &str, hour: u32) -> NaiveDateTime {
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .unwrap()
            .and_hms_opt(hour, 17, 42)
            .unwrap()
    }

    fn entry(name: &str, modified: Option<i64>) -> RemoteEntry {
        RemoteEntry { name: name.to_string(), size: Some(10), modified }
    }

    #[test]
    fn stamps_per_granularity() {
        assert_eq!(Granularity::Daily.stamp(at("2024-01-06", 13)), "2024-01-06");
        assert_eq!(Granularity::Hourly.stamp(at("2024-01-06", 13)), "2024-01-06_130000");
    }

    #[test]
    fn snapshot_names_keep_the_extension() {
        let live = LiveName::new("zion.db");
        assert_eq!(live.snapshot_name("2024-01-06"), "zion_2024-01-06.db");
        assert_eq!(live.file_name(), "zion.db");

        let bare = LiveName::new("journal");
        assert_eq!(bare.snapshot_name("2024-01-06"), "journal_2024-01-06");
    }

    #[test]
    fn parse_accepts_both_shapes() {
        let live = LiveName::new("zion.db");
        assert_eq!(
            live.parse("zion_2024-01-06.db"),
            NaiveDate::from_ymd_opt(2024, 1, 6).map(|d| d.and_time(NaiveTime::MIN))
        );
        assert_eq!(
            live.parse("zion_2024-01-06_130000.db"),
            NaiveDate::from_ymd_opt(2024, 1, 6).and_then(|d| d.and_hms_opt(13, 0, 0))
        );
    }

    #[test]
    fn parse_rejects_foreign_and_malformed_names() {
        let live = LiveName::new("zion.db");
        assert_eq!(live.parse("zion.db"), None);
        assert_eq!(live.parse("other_2024-01-06.db"), None);
        assert_eq!(live.parse("zion_2024-01-06.sqlite"), None);
        assert_eq!(live.parse("zion_2024-1-6.db"), None);
        assert_eq!(live.parse("zion_2024-02-30.db"), None);
        assert_eq!(live.parse("zion_latest.db"), None);
        assert_eq!(live.parse(".zion_2024-01-06.db.partial"), None);
    }

    #[test]
    fn underscores_in_stem_are_fine() {
        let live = LiveName::new("my_app.db");
        assert!(live.parse("my_app_2024-01-06.db").is_some());
        assert!(live.parse("my_2024-01-06.db").is_none());
    }

    #[test]
    fn string_order_matches_time_order() {
        let mut names = vec![
            "2024-01-10".to_string(),
            "2024-01-02_230000".to_string(),
            "2024-01-02".to_string(),
            "2023-12-31_010000".to_string(),
        ];
        let mut by_time = names.clone();
        names.sort();
        by_time.sort_by_key(|s| parse_stamp(s).unwrap());
        assert_eq!(names, by_time);
    }

    #[test]
    fn daily_period_covers_whole_day() {
        let g = Granularity::Daily;
        assert!(g.same_period(at("2024-01-01", 0), at("2024-01-01", 23)));
        assert!(!g.same_period(at("2024-01-01", 23), at("2024-01-02", 0)));
    }

    #[test]
    fn hourly_period_covers_one_hour() {
        let g = Granularity::Hourly;
        assert!(g.same_period(at("2024-01-01", 9), at("2024-01-01", 9)));
        assert!(!g.same_period(at("2024-01-01", 9), at("2024-01-01", 10)));
    }

    #[test]
    fn archived_snapshots_sorted_and_filtered() {
        let live = LiveName::new("zion.db");
        let entries = vec![
            entry("zion_2024-01-03.db", Some(3)),
            entry("notes.txt", None),
            entry("zion_2024-01-01.db", Some(1)),
            entry("zion_2024-01-02.db", Some(2)),
        ];
        let names: Vec<_> = archived_snapshots(&live, &entries).into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["zion_2024-01-01.db", "zion_2024-01-02.db", "zion_2024-01-03.db"]);
    }

    #[test]
    fn equal_stamp_times_fall_back_to_creation_order() {
        let live = LiveName::new("zion.db");
        let entries = vec![
            entry("zion_2024-01-01_000000.db", Some(5)),
            entry("zion_2024-01-01.db", Some(9)),
        ];
        let names: Vec<_> = archived_snapshots(&live, &entries).into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["zion_2024-01-01_000000.db", "zion_2024-01-01.db"]);
    }
}
