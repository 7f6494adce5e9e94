//! Context pool with an index arena and a LIFO free-list.
//!
//! Every context lives in an arena slot addressed by a stable index. Indices
//! come from a monotonic counter and are never reused within a pool. The
//! free-list holds the indices of available slots; the most recently
//! released slot is handed out first.
//!
//! The pool is single-threaded and cooperative. The running reference names
//! the entry executing innermost on the host's call stack; moving it never
//! changes another entry's lifecycle state. Only a yield reported by the
//! engine parks an entry, and a parked context stays off the free-list until
//! a later run finishes.

use std::panic::Location;
use std::rc::{Rc, Weak};

use crate::config::PoolConfig;
use crate::engine::Engine;
use crate::entry::{Entry, EntryId, EntryState, PoolId};
use crate::error::{OutstandingEntry, PoolError};
use crate::stats::PoolStats;

pub(crate) struct Slot<C, D> {
    pub(crate) context: C,
    pub(crate) state: EntryState,
    /// Last run ended at a yield and no run has finished since.
    pub(crate) yielded: bool,
    data: Option<Weak<D>>,
    acquired_at: Option<&'static Location<'static>>,
}

/// Pool of reusable execution contexts.
///
/// `D` is the type of the caller data that may be attached to a checked-out
/// entry. The pool only keeps a [`Weak`] to it.
pub struct Pool<E: Engine, D = ()> {
    id: PoolId,
    pub(crate) engine: E,
    config: PoolConfig,
    pub(crate) slots: Vec<Option<Slot<E::Context, D>>>,
    free: Vec<usize>,
    running: Option<usize>,
    allocated_total: u64,
    terminated_total: u64,
    trimmed_total: u64,
}

impl<E: Engine, D> Pool<E, D> {
    /// Create a pool with `preallocate` available contexts.
    pub fn new(engine: E, preallocate: usize) -> Result<Self, PoolError> {
        Self::with_config(engine, PoolConfig::new().with_preallocate(preallocate))
    }

    /// Create a pool from a full configuration.
    ///
    /// Construction is all-or-nothing: if the engine fails partway through
    /// preallocation, the contexts already created are destroyed.
    pub fn with_config(engine: E, config: PoolConfig) -> Result<Self, PoolError> {
        let mut pool = Self {
            id: PoolId::new(),
            engine,
            slots: Vec::with_capacity(config.preallocate),
            free: Vec::with_capacity(config.preallocate),
            config,
            running: None,
            allocated_total: 0,
            terminated_total: 0,
            trimmed_total: 0,
        };

        for _ in 0..pool.config.preallocate {
            // On error `pool` is dropped here, which destroys the partial set.
            pool.allocate()?;
        }
        // Lowest index on top so preallocated entries are handed out in order.
        pool.free.extend((0..pool.slots.len()).rev());

        tracing::debug!(
            pool = %pool.id,
            preallocated = pool.config.preallocate,
            "Context pool created"
        );
        Ok(pool)
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Check out an entry and make it the running one.
    ///
    /// Reuses the most recently released context when one is available,
    /// otherwise allocates a new one. An entry that was running before keeps
    /// its state; it simply stops being current. On allocation failure the
    /// pool is left unchanged.
    #[track_caller]
    pub fn acquire(&mut self) -> Result<Entry, PoolError> {
        let at = Location::caller();

        let index = loop {
            match self.free.pop() {
                Some(index) if self.state_at(index) == Some(EntryState::Available) => break index,
                Some(index) => {
                    tracing::error!(
                        pool = %self.id,
                        index,
                        "Bug: free-list held an entry that is not available, skipping"
                    );
                    continue;
                }
                None => break self.allocate()?,
            }
        };

        if let Some(slot) = self.slot_mut(index) {
            slot.state = EntryState::Running;
            slot.acquired_at = Some(at);
        }
        self.running = Some(index);

        tracing::trace!(pool = %self.id, index, at = %at, "Entry acquired");
        Ok(Entry::new(self.entry_id(index)))
    }

    /// Return an entry whose script finished normally.
    ///
    /// Any `Running` entry can be released, current or not, unless its last
    /// run yielded: a context promoted by `set_current` after a yield is still
    /// mid-script and is rejected with [`PoolError::Unfinished`]. Suspended
    /// and dead entries are rejected too. The token is handed back inside the
    /// error.
    pub fn release(&mut self, entry: Entry) -> Result<(), PoolError> {
        let index = match self.check(&entry, "release", &[EntryState::Running]) {
            Ok(index) => index,
            Err(e) => return Err(e.with_entry(entry)),
        };
        if self.yielded_at(index) {
            tracing::error!(pool = %self.id, index, op = "release", "Bug: entry yielded and has not finished");
            return Err(PoolError::Unfinished {
                id: entry.id(),
                op: "release",
                entry: Some(entry),
            });
        }
        entry.disarm();

        self.clear_running(index);

        if self
            .config
            .max_idle
            .is_some_and(|max| self.free.len() >= max)
        {
            self.destroy(index);
            self.trimmed_total += 1;
            tracing::debug!(pool = %self.id, index, "Free-list full, context trimmed");
            return Ok(());
        }

        if let Some(slot) = self.slot_mut(index) {
            slot.state = EntryState::Available;
            slot.data = None;
            slot.acquired_at = None;
        }
        self.free.push(index);

        tracing::trace!(pool = %self.id, index, "Entry released");
        Ok(())
    }

    /// Destroy an entry whose script ended in error.
    ///
    /// Only a `Dead` entry can be terminated. Its index never comes back.
    pub fn terminate(&mut self, entry: Entry) -> Result<(), PoolError> {
        let index = match self.check(&entry, "terminate", &[EntryState::Dead]) {
            Ok(index) => index,
            Err(e) => return Err(e.with_entry(entry)),
        };
        entry.disarm();

        self.clear_running(index);
        self.destroy(index);
        self.terminated_total += 1;
        tracing::debug!(pool = %self.id, index, "Entry terminated");

        if self.config.replenish_on_terminate
            && self.config.max_idle.is_none_or(|max| self.free.len() < max)
        {
            match self.allocate() {
                Ok(fresh) => self.free.push(fresh),
                Err(e) => {
                    tracing::warn!(pool = %self.id, error = %e, "Failed to replenish terminated context");
                }
            }
        }

        Ok(())
    }

    /// The entry currently executing, if any.
    pub fn current(&self) -> Option<EntryId> {
        self.running.map(|index| self.entry_id(index))
    }

    /// Update the running reference.
    ///
    /// `Some(entry)` points the reference at a running or suspended entry and
    /// promotes a suspended one to `Running`. The entry stays marked as
    /// yielded until a run on it finishes. `None` clears the reference. No
    /// other entry changes state either way.
    pub fn set_current(&mut self, entry: Option<&Entry>) -> Result<(), PoolError> {
        let Some(entry) = entry else {
            if let Some(index) = self.running.take() {
                tracing::trace!(pool = %self.id, index, "Running reference cleared");
            }
            return Ok(());
        };

        let index = self.check(
            entry,
            "set running",
            &[EntryState::Running, EntryState::Suspended],
        )?;

        if self.state_at(index) == Some(EntryState::Suspended) {
            self.set_state(index, EntryState::Running);
        }
        self.running = Some(index);
        tracing::trace!(pool = %self.id, index, "Running reference set");
        Ok(())
    }

    /// Lifecycle state of a checked-out entry.
    pub fn state(&self, entry: &Entry) -> Option<EntryState> {
        self.state_of(entry.id())
    }

    pub fn state_of(&self, id: EntryId) -> Option<EntryState> {
        if id.pool() != self.id {
            return None;
        }
        self.state_at(id.index())
    }

    pub fn context(&self, entry: &Entry) -> Option<&E::Context> {
        self.owned_slot(entry.id()).map(|slot| &slot.context)
    }

    pub fn context_mut(&mut self, entry: &Entry) -> Option<&mut E::Context> {
        let id = entry.id();
        if id.pool() != self.id {
            return None;
        }
        self.slot_mut(id.index()).map(|slot| &mut slot.context)
    }

    /// Where the entry was acquired.
    pub fn location(&self, entry: &Entry) -> Option<&'static Location<'static>> {
        self.owned_slot(entry.id()).and_then(|slot| slot.acquired_at)
    }

    /// Attach caller data to a checked-out entry. The pool keeps only a weak reference.
    pub fn attach(&mut self, entry: &Entry, data: &Rc<D>) -> Result<(), PoolError> {
        let index = self.check(
            entry,
            "attach data to",
            &[EntryState::Running, EntryState::Suspended, EntryState::Dead],
        )?;
        if let Some(slot) = self.slot_mut(index) {
            slot.data = Some(Rc::downgrade(data));
        }
        Ok(())
    }

    /// Remove the attached data reference, returning it.
    pub fn detach(&mut self, entry: &Entry) -> Option<Weak<D>> {
        let id = entry.id();
        if id.pool() != self.id {
            return None;
        }
        self.slot_mut(id.index()).and_then(|slot| slot.data.take())
    }

    /// Attached data, if the caller still holds it alive.
    pub fn data(&self, entry: &Entry) -> Option<Rc<D>> {
        self.data_of(entry.id())
    }

    /// Attached data by id, for continuation logic that only has `current()`.
    pub fn data_of(&self, id: EntryId) -> Option<Rc<D>> {
        self.owned_slot(id)
            .and_then(|slot| slot.data.as_ref())
            .and_then(Weak::upgrade)
    }

    /// Number of contexts on the free-list.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Number of contexts the pool currently tracks, available or checked out.
    pub fn live(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn stats(&self) -> PoolStats {
        let live = self.live();
        PoolStats {
            available: self.free.len(),
            live,
            checked_out: live - self.free.len(),
            allocated_total: self.allocated_total,
            terminated_total: self.terminated_total,
            trimmed_total: self.trimmed_total,
            current: self.running,
        }
    }

    /// Destroy the pool, reporting entries that were still checked out.
    ///
    /// Returns the number of contexts destroyed. Outstanding entries are
    /// destroyed too, but their presence is a caller bug and is returned as
    /// [`PoolError::Outstanding`]. Their tokens can only be dropped afterwards.
    pub fn close(mut self) -> Result<usize, PoolError> {
        let entries = self.outstanding();
        let destroyed = self.destroy_all();

        if entries.is_empty() {
            Ok(destroyed)
        } else {
            Err(PoolError::Outstanding { entries })
        }
    }

    /// Entries currently checked out, with their states and acquisition sites.
    pub fn outstanding(&self) -> Vec<OutstandingEntry> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let slot = slot.as_ref()?;
                slot.state.is_checked_out().then(|| OutstandingEntry {
                    id: self.entry_id(index),
                    state: slot.state,
                    acquired_at: slot.acquired_at,
                })
            })
            .collect()
    }

    fn entry_id(&self, index: usize) -> EntryId {
        EntryId::new(self.id, index)
    }

    fn state_at(&self, index: usize) -> Option<EntryState> {
        self.slots
            .get(index)
            .and_then(Option::as_ref)
            .map(|slot| slot.state)
    }

    fn owned_slot(&self, id: EntryId) -> Option<&Slot<E::Context, D>> {
        if id.pool() != self.id {
            return None;
        }
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, index: usize) -> Option<&mut Slot<E::Context, D>> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    pub(crate) fn set_state(&mut self, index: usize, state: EntryState) {
        let pool = self.id;
        if let Some(slot) = self.slot_mut(index) {
            tracing::trace!(%pool, index, from = %slot.state, to = %state, "Entry state changed");
            slot.state = state;
        }
    }

    /// Validate that `entry` belongs to this pool and is in one of `allowed`.
    pub(crate) fn check(
        &self,
        entry: &Entry,
        op: &'static str,
        allowed: &[EntryState],
    ) -> Result<usize, PoolError> {
        let id = entry.id();
        let Some(state) = self.state_of(id) else {
            tracing::error!(pool = %self.id, entry_pool = %id.pool(), index = id.index(), op, "Bug: entry is not tracked by this pool");
            return Err(PoolError::ForeignEntry { id, entry: None });
        };

        if !allowed.contains(&state) {
            tracing::error!(pool = %self.id, index = id.index(), %state, op, "Bug: entry in wrong state");
            return Err(PoolError::InvalidState {
                id,
                state,
                op,
                entry: None,
            });
        }

        Ok(id.index())
    }

    /// Validate that `entry` is parked at a yield: `Suspended`, or promoted
    /// by `set_current` and not run since.
    pub(crate) fn check_parked(&self, entry: &Entry, op: &'static str) -> Result<usize, PoolError> {
        let index = self.check(entry, op, &[EntryState::Running, EntryState::Suspended])?;
        if self.yielded_at(index) {
            return Ok(index);
        }

        tracing::error!(pool = %self.id, index, op, "Bug: entry has not yielded");
        Err(PoolError::InvalidState {
            id: entry.id(),
            state: EntryState::Running,
            op,
            entry: None,
        })
    }

    pub(crate) fn yielded_at(&self, index: usize) -> bool {
        self.slots
            .get(index)
            .and_then(Option::as_ref)
            .is_some_and(|slot| slot.yielded)
    }

    /// Point the running reference at `index`.
    pub(crate) fn enter(&mut self, index: usize) {
        self.running = Some(index);
    }

    /// Drop the running reference if it names `index`, without touching its state.
    pub(crate) fn clear_running(&mut self, index: usize) {
        if self.running == Some(index) {
            self.running = None;
        }
    }

    /// Create a new context in a fresh `Available` slot.
    fn allocate(&mut self) -> Result<usize, PoolError> {
        let context = self.engine.create_context().map_err(|e| {
            tracing::warn!(pool = %self.id, error = %e, "Context allocation failed");
            PoolError::exhausted(e)
        })?;

        let index = self.slots.len();
        self.slots.push(Some(Slot {
            context,
            state: EntryState::Available,
            yielded: false,
            data: None,
            acquired_at: None,
        }));
        self.allocated_total += 1;

        tracing::debug!(pool = %self.id, index, "Context allocated");
        Ok(index)
    }

    /// Vacate a slot and hand its context back to the engine.
    fn destroy(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index).and_then(Option::take) {
            self.engine.destroy_context(slot.context);
        }
    }

    fn destroy_all(&mut self) -> usize {
        self.free.clear();
        self.running = None;

        let slots = std::mem::take(&mut self.slots);
        let mut destroyed = 0;
        for slot in slots.into_iter().flatten() {
            self.engine.destroy_context(slot.context);
            destroyed += 1;
        }
        destroyed
    }
}

impl<E: Engine, D> Drop for Pool<E, D> {
    fn drop(&mut self) {
        if self.slots.is_empty() {
            return;
        }

        for entry in self.outstanding() {
            tracing::error!(
                pool = %self.id,
                entry = %entry,
                "Pool dropped with entry still checked out"
            );
        }

        let destroyed = self.destroy_all();
        tracing::debug!(pool = %self.id, destroyed, "Context pool destroyed");
    }
}
