//! Wall-clock seconds source — monotonic steadiness matters more than
//! calendar accuracy here.
//!
//! Kept as a trait object seam rather than a bare call to `SystemTime::now`
//! so tests can drive the timeout sweep and LRU-2 tie-breaks without real
//! `sleep()` calls.

use std::time::{SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    fn now_secs(&self) -> i64;
}

/// Production clock backed by the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}
