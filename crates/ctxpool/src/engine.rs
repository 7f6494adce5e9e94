//! Scripting engine seam.
//!
//! The pool never executes code itself. It asks an [`Engine`] to create,
//! run and destroy contexts, and applies the lifecycle rules to whatever the
//! engine reports back.

use crate::entry::EntryId;

/// How a single run or resume of a context ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resumption<O, X> {
    /// The script returned normally. The context may be reused.
    Finished(O),
    /// The script yielded. The context holds live state and must not be reused.
    Yielded(O),
    /// The script raised. The context is unusable.
    Errored(X),
}

impl<O, X> Resumption<O, X> {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished(_))
    }

    pub fn is_yielded(&self) -> bool {
        matches!(self, Self::Yielded(_))
    }

    pub fn is_errored(&self) -> bool {
        matches!(self, Self::Errored(_))
    }
}

/// Trait for the scripting engine - abstracts the embedded interpreter.
///
/// The engine value is the shared scripting environment; contexts are the
/// lightweight execution states (coroutines, threads, fibers) created inside it.
pub trait Engine {
    /// One suspendable execution state.
    type Context;
    /// Arguments handed to a run or resume.
    type Input;
    /// Values produced by a finish or a yield.
    type Output;
    /// Allocation and script errors.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Create a fresh context bound to this environment.
    fn create_context(&mut self) -> Result<Self::Context, Self::Error>;

    /// Release a context. Called exactly once per created context.
    fn destroy_context(&mut self, context: Self::Context);

    /// Start or continue execution on `context`.
    ///
    /// `entry` is the pool's running reference for the duration of the call,
    /// so yield points can record which entry to resume later.
    fn resume(
        &mut self,
        entry: EntryId,
        context: &mut Self::Context,
        input: Self::Input,
    ) -> Resumption<Self::Output, Self::Error>;
}
