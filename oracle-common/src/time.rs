//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Format a timestamp as `YYYYMMDD_HHMMSS_mmm` for use inside file names
pub fn file_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S_%3f").to_string()
}

/// Convert seconds to duration
pub fn secs_to_duration(secs: u64) -> std::time::Duration {
    std::time::Duration::from_secs(secs)
}
