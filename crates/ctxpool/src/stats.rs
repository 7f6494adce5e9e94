//! Pool statistics snapshot for diagnostics.

use serde::Serialize;

/// Point-in-time view of a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Contexts on the free-list.
    pub available: usize,
    /// Contexts tracked by the pool, available or checked out.
    pub live: usize,
    /// Contexts held by callers (running, suspended or dead).
    pub checked_out: usize,
    /// Contexts ever created by this pool.
    pub allocated_total: u64,
    /// Contexts destroyed through `terminate`.
    pub terminated_total: u64,
    /// Contexts destroyed on release because the free-list was full.
    pub trimmed_total: u64,
    /// Index of the running entry.
    pub current: Option<usize>,
}

impl PoolStats {
    /// Share of live contexts currently checked out, 0-100.
    pub fn utilization_pct(&self) -> u8 {
        if self.live == 0 {
            return 0;
        }
        ((self.checked_out * 100) / self.live) as u8
    }
}
