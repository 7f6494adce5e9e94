//! Entry identifiers, lifecycle states and the checkout token.
//!
//! An [`Entry`] is the caller's proof of checkout. It is neither `Clone` nor
//! `Copy`, so two callers can never hold the same checked-out context: every
//! operation that ends a checkout (`release`, `terminate`, `abandon`) takes
//! the token by value.

use serde::Serialize;

/// Unique identifier for a pool.
///
/// Entries carry the id of the pool that issued them so a token can never be
/// redeemed against a different pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolId(uuid::Uuid);

impl PoolId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for PoolId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PoolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Copyable identity of an entry: the issuing pool plus the stable index.
///
/// Indices are assigned from a per-pool counter and never reused, so an
/// `EntryId` stays unambiguous after its entry has been terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId {
    pool: PoolId,
    index: usize,
}

impl EntryId {
    pub(crate) fn new(pool: PoolId, index: usize) -> Self {
        Self { pool, index }
    }

    pub fn pool(&self) -> PoolId {
        self.pool
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.index)
    }
}

/// Lifecycle state of a live entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    /// On the free-list, ready for reuse.
    Available,
    /// Checked out and on the host's call stack. With nested calls several
    /// entries can be running; the pool's running reference names the innermost.
    Running,
    /// Checked out, paused at a yield the engine reported. The token holder
    /// decides what happens next.
    Suspended,
    /// Checked out, script ended in error. Only `terminate` is valid.
    Dead,
}

impl EntryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::Dead => "dead",
        }
    }

    /// True for every state in which a caller holds the token.
    pub fn is_checked_out(&self) -> bool {
        !matches!(self, Self::Available)
    }
}

impl std::fmt::Display for EntryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A checked-out entry.
///
/// Dropping a token without handing it back to the pool leaves the context
/// checked out until the pool itself is dropped; this is logged as an error.
#[must_use = "a checked-out entry must be released, terminated or abandoned"]
#[derive(Debug)]
pub struct Entry {
    id: EntryId,
    armed: bool,
}

impl Entry {
    pub(crate) fn new(id: EntryId) -> Self {
        Self { id, armed: true }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn index(&self) -> usize {
        self.id.index
    }

    /// Consume the token once the pool has taken the checkout back.
    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Entry {
    fn drop(&mut self) {
        if self.armed {
            tracing::error!(
                pool = %self.id.pool,
                index = self.id.index,
                "Entry dropped while checked out - context stays reserved until the pool is dropped"
            );
        }
    }
}
