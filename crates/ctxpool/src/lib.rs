//! ctxpool: reusable pool of suspendable script-execution contexts.
//!
//! A host that runs many short scripts or callbacks checks a context out of a
//! [`Pool`], runs it through its scripting [`Engine`], and then releases it
//! (finished), keeps it (yielded), or terminates it (errored).

mod call;
mod config;
mod engine;
mod entry;
mod error;
mod pool;
mod stats;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use call::Step;
pub use config::{ConfigError, ENV_MAX_IDLE, ENV_PREALLOCATE, ENV_REPLENISH, PoolConfig};
pub use engine::{Engine, Resumption};
pub use entry::{Entry, EntryId, EntryState, PoolId};
pub use error::{OutstandingEntry, PoolError};
pub use pool::Pool;
pub use stats::PoolStats;
