//! Run drivers: execute an entry's context and apply the lifecycle rules.
//!
//! [`Pool::run`] is the low-level primitive: it records the new state but
//! leaves release/terminate to the caller. [`Pool::call`] and
//! [`Pool::resume`] settle the entry themselves, so a finished context goes
//! straight back to the free-list and an errored one is destroyed.

use crate::engine::{Engine, Resumption};
use crate::entry::{Entry, EntryId, EntryState};
use crate::error::PoolError;
use crate::pool::Pool;

/// Result of a driven call or resume.
#[derive(Debug)]
pub enum Step<O, X> {
    /// Script returned. The entry is already back in the pool.
    Finished(O),
    /// Script yielded. The caller now owns the suspended entry.
    Yielded { entry: Entry, output: O },
    /// Script raised. The entry has been terminated.
    Failed { id: EntryId, error: X },
}

impl<O, X> Step<O, X> {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished(_))
    }

    pub fn is_yielded(&self) -> bool {
        matches!(self, Self::Yielded { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl<E: Engine, D> Pool<E, D> {
    /// Run a `Running` entry's context once and record the outcome.
    ///
    /// The entry becomes current for the duration of the run.
    ///
    /// - `Finished`: the entry stays `Running` and current; release it next.
    /// - `Yielded`: the entry becomes `Suspended` and the running reference is cleared.
    /// - `Errored`: the entry becomes `Dead`; terminate it next.
    pub fn run(
        &mut self,
        entry: &Entry,
        input: E::Input,
    ) -> Result<Resumption<E::Output, E::Error>, PoolError> {
        let index = self.check(entry, "run", &[EntryState::Running])?;
        let id = entry.id();
        self.enter(index);

        let outcome = match self.slots.get_mut(index).and_then(Option::as_mut) {
            Some(slot) => self.engine.resume(id, &mut slot.context, input),
            None => return Err(PoolError::ForeignEntry { id, entry: None }),
        };

        if let Some(slot) = self.slots.get_mut(index).and_then(Option::as_mut) {
            slot.yielded = outcome.is_yielded();
        }

        match &outcome {
            Resumption::Finished(_) => {
                tracing::trace!(pool = %self.id(), index, "Script finished");
            }
            Resumption::Yielded(_) => {
                self.set_state(index, EntryState::Suspended);
                self.clear_running(index);
                tracing::trace!(pool = %self.id(), index, "Script yielded");
            }
            Resumption::Errored(error) => {
                tracing::debug!(pool = %self.id(), index, %error, "Script errored");
                self.set_state(index, EntryState::Dead);
                self.clear_running(index);
            }
        }

        Ok(outcome)
    }

    /// Run a freshly acquired entry and settle it.
    pub fn call(
        &mut self,
        entry: Entry,
        input: E::Input,
    ) -> Result<Step<E::Output, E::Error>, PoolError> {
        let outcome = match self.run(&entry, input) {
            Ok(outcome) => outcome,
            Err(e) => return Err(e.with_entry(entry)),
        };

        match outcome {
            Resumption::Finished(output) => {
                self.release(entry)?;
                Ok(Step::Finished(output))
            }
            Resumption::Yielded(output) => Ok(Step::Yielded { entry, output }),
            Resumption::Errored(error) => {
                let id = entry.id();
                self.terminate(entry)?;
                Ok(Step::Failed { id, error })
            }
        }
    }

    /// Continue an entry parked at a yield and settle it.
    ///
    /// Accepts a `Suspended` entry, or one already promoted by `set_current`.
    pub fn resume(
        &mut self,
        entry: Entry,
        input: E::Input,
    ) -> Result<Step<E::Output, E::Error>, PoolError> {
        if let Err(e) = self.check_parked(&entry, "resume") {
            return Err(e.with_entry(entry));
        }
        if let Err(e) = self.set_current(Some(&entry)) {
            return Err(e.with_entry(entry));
        }
        self.call(entry, input)
    }

    /// Give up on a yielded entry without resuming it.
    ///
    /// This is the host's hook for deadline policy: the context is treated as
    /// dead and destroyed.
    pub fn abandon(&mut self, entry: Entry) -> Result<(), PoolError> {
        let index = match self.check_parked(&entry, "abandon") {
            Ok(index) => index,
            Err(e) => return Err(e.with_entry(entry)),
        };

        tracing::warn!(pool = %self.id(), index, "Abandoning suspended entry");
        self.set_state(index, EntryState::Dead);
        self.terminate(entry)
    }
}
