//! Wall-clock helpers.
//!
//! All contract timestamps are integer Unix seconds. Managers that need
//! testable time take an explicit `now` parameter and offer a thin wrapper
//! that reads the system clock through [`unix_now`].

use std::time::{SystemTime, UNIX_EPOCH};

/// The current wall-clock time as Unix seconds.
pub fn unix_now() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        // Pre-epoch clocks only occur on badly misconfigured hosts; a zero
        // timestamp keeps the contract types well-formed.
        Err(_) => 0,
    }
}
