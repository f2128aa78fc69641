//! Miscellaneous helpers

use std::time::{SystemTime, UNIX_EPOCH};

/// Get the current unix time in milliseconds
///
/// A clock set before the epoch reads as zero, which the cache treats as
/// "never updated".
pub fn get_current_time_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or_default()
}
