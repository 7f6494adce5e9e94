//! Pool errors.
//!
//! Two classes: allocation failure ([`PoolError::Exhausted`]) is a runtime
//! condition the caller may retry; everything else is a contract violation
//! by the caller.

use std::panic::Location;

use crate::entry::{Entry, EntryId, EntryState};

/// An entry still checked out when the pool was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutstandingEntry {
    pub id: EntryId,
    pub state: EntryState,
    pub acquired_at: Option<&'static Location<'static>>,
}

impl std::fmt::Display for OutstandingEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.id, self.state)?;
        if let Some(at) = self.acquired_at {
            write!(f, " acquired at {}", at)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The engine could not create a context. Pool state is unchanged.
    #[error("failed to allocate execution context: {source}")]
    Exhausted {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The entry is in the wrong lifecycle state for the operation.
    ///
    /// When the operation consumed the token, it is handed back in `entry`.
    #[error("cannot {op} entry {id} while {state}")]
    InvalidState {
        id: EntryId,
        state: EntryState,
        op: &'static str,
        entry: Option<Entry>,
    },

    /// The entry's last run yielded and no run on it has finished since.
    ///
    /// Raised when a promoted but unfinished context would go back to the
    /// free-list. The token is handed back in `entry`.
    #[error("cannot {op} entry {id}: its script yielded and has not finished")]
    Unfinished {
        id: EntryId,
        op: &'static str,
        entry: Option<Entry>,
    },

    /// The entry was issued by another pool, or its slot no longer exists.
    #[error("entry {id} is not tracked by this pool")]
    ForeignEntry { id: EntryId, entry: Option<Entry> },

    /// The pool was closed while entries were still checked out.
    #[error("{} entries still checked out: {}", entries.len(), list(entries))]
    Outstanding { entries: Vec<OutstandingEntry> },
}

fn list(entries: &[OutstandingEntry]) -> String {
    entries
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl PoolError {
    pub(crate) fn exhausted<X>(source: X) -> Self
    where
        X: std::error::Error + Send + Sync + 'static,
    {
        Self::Exhausted {
            source: Box::new(source),
        }
    }

    /// Attach a consumed token so the caller can still finish its checkout.
    pub(crate) fn with_entry(self, entry: Entry) -> Self {
        match self {
            Self::InvalidState { id, state, op, .. } => Self::InvalidState {
                id,
                state,
                op,
                entry: Some(entry),
            },
            Self::Unfinished { id, op, .. } => Self::Unfinished {
                id,
                op,
                entry: Some(entry),
            },
            Self::ForeignEntry { id, .. } => Self::ForeignEntry {
                id,
                entry: Some(entry),
            },
            other => other,
        }
    }

    /// Take back the token carried by a rejected operation.
    pub fn into_entry(self) -> Option<Entry> {
        match self {
            Self::InvalidState { entry, .. }
            | Self::Unfinished { entry, .. }
            | Self::ForeignEntry { entry, .. } => entry,
            _ => None,
        }
    }

    pub fn is_contract_violation(&self) -> bool {
        !matches!(self, Self::Exhausted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::PoolId;

    #[derive(Debug, thiserror::Error)]
    #[error("out of memory")]
    struct Oom;

    #[test]
    fn exhausted_display_includes_source() {
        let err = PoolError::exhausted(Oom);
        assert_eq!(
            err.to_string(),
            "failed to allocate execution context: out of memory"
        );
        assert!(!err.is_contract_violation());
    }

    #[test]
    fn invalid_state_display() {
        let err = PoolError::InvalidState {
            id: EntryId::new(PoolId::new(), 4),
            state: EntryState::Suspended,
            op: "release",
            entry: None,
        };
        assert_eq!(err.to_string(), "cannot release entry #4 while suspended");
        assert!(err.is_contract_violation());
    }

    #[test]
    fn unfinished_display_names_operation() {
        let id = EntryId::new(PoolId::new(), 2);
        let err = PoolError::Unfinished {
            id,
            op: "release",
            entry: None,
        }
        .with_entry(Entry::new(id));

        assert_eq!(
            err.to_string(),
            "cannot release entry #2: its script yielded and has not finished"
        );
        assert!(err.is_contract_violation());
        err.into_entry().expect("token should be returned").disarm();
    }

    #[test]
    fn with_entry_hands_token_back() {
        let id = EntryId::new(PoolId::new(), 1);
        let err = PoolError::InvalidState {
            id,
            state: EntryState::Dead,
            op: "release",
            entry: None,
        }
        .with_entry(Entry::new(id));

        let entry = err.into_entry().expect("token should be returned");
        assert_eq!(entry.id(), id);
        entry.disarm();
    }

    #[test]
    fn outstanding_display_lists_entries() {
        let pool = PoolId::new();
        let err = PoolError::Outstanding {
            entries: vec![
                OutstandingEntry {
                    id: EntryId::new(pool, 0),
                    state: EntryState::Suspended,
                    acquired_at: None,
                },
                OutstandingEntry {
                    id: EntryId::new(pool, 2),
                    state: EntryState::Dead,
                    acquired_at: None,
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "2 entries still checked out: #0 (suspended), #2 (dead)"
        );
    }
}
