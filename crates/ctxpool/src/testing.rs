//! Test support: a scripted engine and a log-capturing tracing layer.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use tracing::Subscriber;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use crate::engine::{Engine, Resumption};
use crate::entry::EntryId;

/// What the mock script does when run.
#[derive(Debug, Clone, Copy)]
pub enum Script {
    Finish(i32),
    Yield(i32),
    Fail(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MockError {
    #[error("out of memory")]
    OutOfMemory,
    #[error("script error: {0}")]
    Script(&'static str),
}

#[derive(Debug)]
pub struct MockContext {
    /// Creation order, equal to the pool index when one engine backs one pool.
    pub serial: usize,
    pub runs: usize,
}

/// Engine that replays [`Script`] steps and counts context lifetimes.
pub struct MockEngine {
    created: usize,
    limit: Option<usize>,
    destroyed: Rc<RefCell<Vec<usize>>>,
    seen: Vec<EntryId>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            created: 0,
            limit: None,
            destroyed: Rc::new(RefCell::new(Vec::new())),
            seen: Vec::new(),
        }
    }

    /// Engine that fails every creation after the first `limit`.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new()
        }
    }

    pub fn created(&self) -> usize {
        self.created
    }

    /// Serials of destroyed contexts, in destruction order.
    pub fn destroyed(&self) -> Vec<usize> {
        self.destroyed.borrow().clone()
    }

    /// Shared view of destroyed serials that outlives the pool.
    pub fn destroyed_handle(&self) -> Rc<RefCell<Vec<usize>>> {
        Rc::clone(&self.destroyed)
    }

    /// Entry ids passed to `resume`, in call order.
    pub fn seen(&self) -> &[EntryId] {
        &self.seen
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for MockEngine {
    type Context = MockContext;
    type Input = Script;
    type Output = i32;
    type Error = MockError;

    fn create_context(&mut self) -> Result<MockContext, MockError> {
        if self.limit.is_some_and(|limit| self.created >= limit) {
            return Err(MockError::OutOfMemory);
        }
        let context = MockContext {
            serial: self.created,
            runs: 0,
        };
        self.created += 1;
        Ok(context)
    }

    fn destroy_context(&mut self, context: MockContext) {
        self.destroyed.borrow_mut().push(context.serial);
    }

    fn resume(
        &mut self,
        entry: EntryId,
        context: &mut MockContext,
        input: Script,
    ) -> Resumption<i32, MockError> {
        self.seen.push(entry);
        context.runs += 1;
        match input {
            Script::Finish(value) => Resumption::Finished(value),
            Script::Yield(value) => Resumption::Yielded(value),
            Script::Fail(message) => Resumption::Errored(MockError::Script(message)),
        }
    }
}

/// Layer that records every event as `"LEVEL message key=value ..."`.
struct CaptureLayer {
    lines: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut line = EventLine::default();
        event.record(&mut line);

        let mut text = format!("{} {}", event.metadata().level(), line.message);
        for field in &line.fields {
            text.push(' ');
            text.push_str(field);
        }
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(text);
        }
    }
}

/// Message plus structured fields of one event, in record order.
#[derive(Default)]
struct EventLine {
    message: String,
    fields: Vec<String>,
}

impl tracing::field::Visit for EventLine {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            name => self.fields.push(format!("{name}={value}")),
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{value:?}"),
            name => self.fields.push(format!("{name}={value:?}")),
        }
    }
}

/// Run `f` with a thread-local subscriber and return the captured lines.
pub fn capture_logs(f: impl FnOnce()) -> Vec<String> {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::registry().with(CaptureLayer {
        lines: Arc::clone(&lines),
    });

    tracing::subscriber::with_default(subscriber, f);

    lines.lock().map(|l| l.clone()).unwrap_or_default()
}
