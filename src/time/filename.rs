//! Timestamps embedded in camera and screenshot filenames

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::LazyLock;
use tracing::trace;

/// Filename patterns, tried in order. Groups are year, month, day and optionally
/// hour, minute, second.
static PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        // IMG_20240115_143000, VID-20240115-143000, DSC20240115143000
        (
            "camera",
            r"(?:IMG|VID|DSC|PXL|MVI|DJI|GOPR)[-_]?(\d{4})(\d{2})(\d{2})[-_]?(\d{2})(\d{2})(\d{2})",
        ),
        // Screenshot_2024-01-15-14-30-00, Screenshot 2024-01-15 at 14.30.00
        (
            "screenshot",
            r"(?i)(?:screenshot|screen shot)[-_\s]*(\d{4})[-_]?(\d{2})[-_]?(\d{2})[-_\s]*(?:at[-_\s]*)?(\d{1,2})[-_.]?(\d{2})[-_.]?(\d{2})",
        ),
        // 20240115_143000, 20240115-143000
        ("compact", r"(\d{4})(\d{2})(\d{2})[_\-](\d{2})(\d{2})(\d{2})"),
        // 2024-01-15_14-30-00
        (
            "separated",
            r"(\d{4})[-_](\d{2})[-_](\d{2})[-_\s](\d{2})[-_](\d{2})[-_](\d{2})",
        ),
        // IMG-20240115-WA0001
        ("messenger", r"(?:IMG|VID)[-_](\d{4})(\d{2})(\d{2})[-_]WA"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).expect("static filename pattern")))
    .collect()
});

/// Parse a timestamp out of a filename
pub fn parse_filename_time(filename: &str) -> Option<NaiveDateTime> {
    let stem = filename
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .filter(|stem| !stem.is_empty())
        .unwrap_or(filename);

    PATTERNS.iter().find_map(|(name, pattern)| {
        let caps = pattern.captures(stem)?;
        let field = |i: usize| -> Option<u32> {
            match caps.get(i) {
                Some(m) => m.as_str().parse().ok(),
                None => Some(0),
            }
        };
        let dt = build_datetime(
            caps.get(1)?.as_str().parse().ok()?,
            field(2)?,
            field(3)?,
            field(4)?,
            field(5)?,
            field(6)?,
        )?;
        trace!(filename, pattern = name, "Matched filename timestamp");
        Some(dt)
    })
}

fn build_datetime(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
) -> Option<NaiveDateTime> {
    if !(1990..=2100).contains(&year) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}
