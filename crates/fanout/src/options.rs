//! Run configuration.
//!
//! Options are explicit, typed values validated once at run start. The
//! effective pool width is always `min(item_count, requested)`; a width of
//! zero selects the direct synchronous fallback.

use std::ffi::OsString;
use std::path::PathBuf;

use crate::cpu;

/// Requested pool width.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Width {
    /// Use the detected logical processor count.
    #[default]
    Auto,
    /// Use exactly this many workers. Zero forces the direct fallback.
    Fixed(usize),
}

impl Width {
    /// Effective worker count for a collection of `item_count` items.
    pub(crate) fn resolve(self, item_count: usize) -> usize {
        let requested = match self {
            Width::Auto => cpu::processor_count(),
            Width::Fixed(n) => n,
        };
        requested.min(item_count)
    }
}

/// Instrumentation hook, called with the item and its index.
pub type Hook<T> = Box<dyn Fn(&T, usize) + Send + Sync>;

/// Options for thread-mode (and direct) runs.
pub struct Options<T> {
    /// Requested pool width.
    pub workers: Width,
    pub(crate) on_start: Option<Hook<T>>,
    pub(crate) on_finish: Option<Hook<T>>,
    pub(crate) preserve_results: bool,
}

impl<T> Default for Options<T> {
    fn default() -> Self {
        Self {
            workers: Width::Auto,
            on_start: None,
            on_finish: None,
            preserve_results: true,
        }
    }
}

impl<T> Options<T> {
    /// Default options: auto width, results preserved, no hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use exactly `n` workers.
    pub fn workers(mut self, n: usize) -> Self {
        self.workers = Width::Fixed(n);
        self
    }

    /// Hook invoked immediately before each item's operation.
    pub fn on_start(mut self, hook: impl Fn(&T, usize) + Send + Sync + 'static) -> Self {
        self.on_start = Some(Box::new(hook));
        self
    }

    /// Hook invoked after each item's operation, success or failure.
    pub fn on_finish(mut self, hook: impl Fn(&T, usize) + Send + Sync + 'static) -> Self {
        self.on_finish = Some(Box::new(hook));
        self
    }

    /// Compute results but drop them before aggregation. An optimization
    /// hint used by `each`; has no effect on failure handling.
    pub fn preserve_results(mut self, preserve: bool) -> Self {
        self.preserve_results = preserve;
        self
    }
}

/// How to launch a worker process.
///
/// With no explicit program the binary is located the same way on every
/// spawn: `FANOUT_WORKER_PATH`, then a `fanout-worker` binary next to the
/// current executable, then `$PATH`.
#[derive(Debug, Clone, Default)]
pub struct WorkerCommand {
    pub(crate) program: Option<PathBuf>,
    pub(crate) args: Vec<OsString>,
}

impl WorkerCommand {
    /// Launch a specific worker binary.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: Some(program.into()),
            args: Vec::new(),
        }
    }

    /// Locate the worker binary via the default search order.
    pub fn detected() -> Self {
        Self::default()
    }

    /// Append an argument to the worker command line.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Options for process-mode runs.
pub struct ProcessOptions<T> {
    /// Requested pool width.
    pub workers: Width,
    /// Worker binary to spawn for each pool slot.
    pub worker: WorkerCommand,
    pub(crate) on_start: Option<Hook<T>>,
    pub(crate) on_finish: Option<Hook<T>>,
    pub(crate) preserve_results: bool,
}

impl<T> Default for ProcessOptions<T> {
    fn default() -> Self {
        Self {
            workers: Width::Auto,
            worker: WorkerCommand::default(),
            on_start: None,
            on_finish: None,
            preserve_results: true,
        }
    }
}

impl<T> ProcessOptions<T> {
    /// Default options: auto width, detected worker binary, results
    /// preserved, no hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use exactly `n` worker processes.
    pub fn workers(mut self, n: usize) -> Self {
        self.workers = Width::Fixed(n);
        self
    }

    /// Use a specific worker command.
    pub fn worker(mut self, command: WorkerCommand) -> Self {
        self.worker = command;
        self
    }

    /// Hook invoked immediately before each item is dispatched.
    pub fn on_start(mut self, hook: impl Fn(&T, usize) + Send + Sync + 'static) -> Self {
        self.on_start = Some(Box::new(hook));
        self
    }

    /// Hook invoked after each item's round trip, success or failure.
    pub fn on_finish(mut self, hook: impl Fn(&T, usize) + Send + Sync + 'static) -> Self {
        self.on_finish = Some(Box::new(hook));
        self
    }

    /// Compute results but drop them before aggregation.
    pub fn preserve_results(mut self, preserve: bool) -> Self {
        self.preserve_results = preserve;
        self
    }
}
