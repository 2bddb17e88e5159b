//! Monotonic-ish wall clock helpers for activity tracking and mute windows.
//!
//! AFK and mute accounting only need whole seconds since the Unix epoch, not
//! a true monotonic clock, because both are compared against operator- and
//! client-supplied durations measured in seconds.

use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
