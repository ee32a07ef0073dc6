//! Cache statistics.

use serde::Serialize;

/// A point-in-time snapshot returned by value from `get_stats`, so a caller
/// never observes a torn read of counters mid-mutation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub total_entries: u64,
    pub total_size: u64,
    pub hit_rate: f64,
}

/// The live counters the facade mutates. `snapshot()` recomputes `hit_rate`
/// every time rather than caching a value that could go stale.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub total_entries: u64,
    pub total_size: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the counters that survive a `clear()` call's zeroing: `clear`
    /// zeroes `total_entries`/`total_size` and bumps `invalidations`;
    /// `hits`/`misses`/`stores`/`evictions` are untouched by `clear` since
    /// they describe cumulative cache traffic, not the current resident
    /// set.
    pub fn on_clear(&mut self, removed: u64) {
        self.total_entries = 0;
        self.total_size = 0;
        self.invalidations += removed;
    }

    pub fn snapshot(&self) -> CacheStats {
        let denom = self.hits + self.misses;
        let hit_rate = if denom > 0 {
            self.hits as f64 / denom as f64
        } else {
            0.0
        };
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            stores: self.stores,
            evictions: self.evictions,
            invalidations: self.invalidations,
            total_entries: self.total_entries,
            total_size: self.total_size,
            hit_rate,
        }
    }
}
