//! Time helpers shared across the workspace.
//!
//! All persisted timestamps are Unix epoch milliseconds.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix timestamp in milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Convert whole hours to milliseconds.
pub fn hours_to_ms(hours: u32) -> u64 {
    u64::from(hours) * 3_600_000
}

/// Convert whole seconds to milliseconds.
pub fn secs_to_ms(secs: u64) -> u64 {
    secs * 1_000
}
