//! Round-trip and row counters shared by the backends.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of backend traffic since construction or the last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Calls that reached the engine (one per trait method invocation).
    pub round_trips: u64,
    /// Rows returned by `find` and `select`.
    pub rows_read: u64,
    /// Rows inserted, updated or deleted.
    pub rows_written: u64,
}

impl StoreStats {
    /// Difference between two snapshots taken from the same backend.
    pub fn since(&self, earlier: &StoreStats) -> StoreStats {
        StoreStats {
            round_trips: self.round_trips.saturating_sub(earlier.round_trips),
            rows_read: self.rows_read.saturating_sub(earlier.rows_read),
            rows_written: self.rows_written.saturating_sub(earlier.rows_written),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    round_trips: AtomicU64,
    rows_read: AtomicU64,
    rows_written: AtomicU64,
}

impl StatCounters {
    pub(crate) fn read(&self, rows: usize) {
        self.round_trips.fetch_add(1, Ordering::Relaxed);
        self.rows_read.fetch_add(rows as u64, Ordering::Relaxed);
    }

    pub(crate) fn write(&self, rows: u64) {
        self.round_trips.fetch_add(1, Ordering::Relaxed);
        self.rows_written.fetch_add(rows, Ordering::Relaxed);
    }

    pub(crate) fn control(&self) {
        self.round_trips.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StoreStats {
        StoreStats {
            round_trips: self.round_trips.load(Ordering::Relaxed),
            rows_read: self.rows_read.load(Ordering::Relaxed),
            rows_written: self.rows_written.load(Ordering::Relaxed),
        }
    }
}
