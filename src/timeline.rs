use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

use crate::reassembly::VideoSegment;

/// Recording times are reported in the camera's local zone, a fixed two
/// hours ahead of UTC.
pub const UTC_OFFSET_SECS: i32 = 2 * 3600;

pub const MANIFEST_FILENAME: &str = "video_list.txt";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const FILENAME_TIME_FORMAT: &str = "%Y-%m-%d_%H:%M:%S";

/// One recovered recording on the timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineEntry {
    pub filename: String,
    pub start_time: String,
    pub end_time: String,
}

/// Derives timeline entries from sealed segments, one entry per segment.
/// Pure and deterministic: the same segments always produce the same
/// entries.
pub struct TimelineBuilder {
    extension: String,
    entries: Vec<TimelineEntry>,
}

impl TimelineBuilder {
    pub fn new(extension: &str) -> Self {
        Self {
            extension: extension.to_string(),
            entries: Vec::new(),
        }
    }

    /// Record one sealed segment. Start and end come from the first and
    /// last capture times folded into it.
    pub fn add(&mut self, segment: &VideoSegment) {
        let start_ms = segment.start_time_ms().unwrap_or(0);
        let end_ms = segment.end_time_ms().unwrap_or(start_ms);
        self.entries.push(TimelineEntry {
            filename: format!("{}.{}", segment.sequence, self.extension),
            start_time: format_timestamp(start_ms),
            end_time: format_timestamp(end_ms),
        });
    }

    pub fn into_entries(self) -> Vec<TimelineEntry> {
        self.entries
    }
}

/// Write the manifest, one line per recovered recording.
pub fn write_manifest(output_dir: &Path, entries: &[TimelineEntry]) -> std::io::Result<PathBuf> {
    let path = output_dir.join(MANIFEST_FILENAME);
    let mut manifest = String::new();
    for entry in entries {
        manifest.push_str(&format!(
            "{}: {} - {}\n",
            entry.filename, entry.start_time, entry.end_time
        ));
    }
    fs::write(&path, manifest)?;
    Ok(path)
}

/// Capture time as human-readable local time.
pub fn format_timestamp(timestamp_ms: i64) -> String {
    format_with(timestamp_ms, TIME_FORMAT)
}

/// Capture time in a form safe to use as an image filename.
pub fn format_timestamp_filename(timestamp_ms: i64) -> String {
    format_with(timestamp_ms, FILENAME_TIME_FORMAT)
}

fn format_with(timestamp_ms: i64, format: &str) -> String {
    let offset = FixedOffset::east_opt(UTC_OFFSET_SECS).expect("offset in range");
    match DateTime::<Utc>::from_timestamp_millis(timestamp_ms) {
        Some(utc) => utc.with_timezone(&offset).format(format).to_string(),
        // Out-of-range capture times come straight from a damaged database;
        // fall back to the raw value rather than failing the run.
        None => timestamp_ms.to_string(),
    }
}
