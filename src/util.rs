use chrono::{DateTime, Local};

/// Formats a byte count using decimal units, matching what rclone and most
/// cloud dashboards display.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if bytes < 1_000 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1_000.0 && unit < UNITS.len() - 1 {
        value /= 1_000.0;
        unit += 1;
    }

    format!("{value:.1} {}", UNITS[unit])
}

/// Unix seconds to local `YYYY-MM-DD HH:MM:SS`, the same clock snapshot
/// stamps use. "unknown" when out of range.
pub fn format_timestamp(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
