//! Execution engine.
//!
//! Three ways to run an operation over a collection:
//!
//! - the **direct fallback**: synchronous, in the caller's context, used
//!   whenever the effective pool width resolves to zero;
//! - [`ThreadPoolExecutor`]: `P` in-process tasks sharing one
//!   [`WorkCounter`] in shared memory;
//! - [`ProcessPoolExecutor`]: `P` isolated worker processes, each owned by
//!   one in-process coordinator task.
//!
//! All three share the same run plumbing: a claim counter handing out each
//! index exactly once, a set-once failure cell, and write-once result slots
//! published in input order only when no failure was captured.

mod counter;
mod process;
mod threads;

pub use counter::WorkCounter;
pub use process::ProcessPoolExecutor;
pub use threads::ThreadPoolExecutor;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::error::{Error, Fault, Result};
use crate::options::Hook;

/// First failure captured by a run.
pub(crate) enum Captured {
    /// Early stop requested; the run resolves with no results and no error.
    Break,
    /// Real failure; becomes the run's one surfaced error.
    Error(Error),
}

impl Captured {
    pub(crate) fn from_fault(fault: Fault) -> Self {
        match fault {
            Fault::Break => Captured::Break,
            Fault::Failure(err) => Captured::Error(Error::Operation(err)),
        }
    }
}

/// Set-once failure cell shared by every worker of one run.
///
/// The boolean doubles as the cooperative stop signal: workers check it
/// before claiming their next index, and the interrupt registry can raise it
/// from the Ctrl-C handler. An in-flight invocation always completes; only
/// the next claim is skipped.
pub(crate) struct FailureCell {
    stop: Arc<AtomicBool>,
    slot: Mutex<Option<Captured>>,
}

impl FailureCell {
    pub(crate) fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            slot: Mutex::new(None),
        }
    }

    /// The stop flag, shareable with the interrupt registry.
    pub(crate) fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Whether workers should stop claiming new work.
    pub(crate) fn observed(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Record a failure. The first capture wins; concurrent losers are
    /// dropped.
    pub(crate) fn capture(&self, captured: Captured) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(captured);
        }
        self.stop.store(true, Ordering::Release);
    }

    pub(crate) fn capture_fault(&self, fault: Fault) {
        self.capture(Captured::from_fault(fault));
    }

    pub(crate) fn into_captured(self) -> Option<Captured> {
        self.slot
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Index-addressed result slots.
///
/// Each index is claimed by exactly one worker, so every cell is written at
/// most once and no cross-slot synchronization is needed.
pub(crate) struct ResultSlots<R> {
    cells: Vec<OnceLock<R>>,
    preserve: bool,
}

impl<R> ResultSlots<R> {
    pub(crate) fn new(len: usize, preserve: bool) -> Self {
        Self {
            cells: (0..len).map(|_| OnceLock::new()).collect(),
            preserve,
        }
    }

    /// Store the result for a claimed index. Dropped immediately when the
    /// run does not retain results.
    pub(crate) fn store(&self, index: usize, value: R) {
        if self.preserve {
            let _ = self.cells[index].set(value);
        }
    }

    fn into_results(self) -> Vec<R> {
        if !self.preserve {
            return Vec::new();
        }
        self.cells
            .into_iter()
            .map(|cell| cell.into_inner().expect("claimed slot left empty"))
            .collect()
    }
}

/// Decide a run's outcome once every worker has finished.
///
/// Either the slots are published fully populated, or they are discarded and
/// the captured failure is surfaced; a captured `Break` yields `Ok(None)`.
pub(crate) fn resolve<R>(failure: FailureCell, slots: ResultSlots<R>) -> Result<Option<Vec<R>>> {
    match failure.into_captured() {
        Some(Captured::Break) => Ok(None),
        Some(Captured::Error(err)) => Err(err),
        None => Ok(Some(slots.into_results())),
    }
}

/// Runs the `on_finish` hook when dropped, so it fires after the operation
/// on success, failure, and unwind alike.
pub(crate) struct FinishGuard<'a, T> {
    hook: Option<&'a Hook<T>>,
    item: &'a T,
    index: usize,
}

impl<'a, T> FinishGuard<'a, T> {
    pub(crate) fn new(hook: Option<&'a Hook<T>>, item: &'a T, index: usize) -> Self {
        Self { hook, item, index }
    }
}

impl<T> Drop for FinishGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(hook) = self.hook {
            hook(self.item, self.index);
        }
    }
}

/// Zero-worker fallback: run the operation synchronously in the caller's
/// own context, strictly in input order, with no pool machinery at all.
pub(crate) fn run_direct<T, R>(
    items: &[T],
    on_start: Option<&Hook<T>>,
    on_finish: Option<&Hook<T>>,
    preserve: bool,
    op: impl Fn(&T, usize) -> std::result::Result<R, Fault>,
) -> Result<Option<Vec<R>>> {
    let mut results = Vec::with_capacity(if preserve { items.len() } else { 0 });
    for (index, item) in items.iter().enumerate() {
        if let Some(hook) = on_start {
            hook(item, index);
        }
        let _finish = FinishGuard::new(on_finish, item, index);
        match op(item, index) {
            Ok(value) => {
                if preserve {
                    results.push(value);
                }
            }
            Err(Fault::Break) => return Ok(None),
            Err(Fault::Failure(err)) => return Err(Error::Operation(err)),
        }
    }
    Ok(Some(results))
}
