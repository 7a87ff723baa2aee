//! Parallel map/each over a pool of threads or isolated worker processes.
//!
//! The engine applies an operation to every element of a collection,
//! distributing the work across a pool of in-process tasks (shared memory)
//! or a pool of worker processes (private channels), and returns results in
//! input order or surfaces the first captured failure.
//!
//! # Thread mode
//!
//! ```
//! use fanout::{Fault, Options};
//!
//! let items = vec![1i64, 2, 3, 4, 5];
//! let results = fanout::map(&items, &Options::new().workers(2), |x| Ok::<_, Fault>(x * x))
//!     .unwrap()
//!     .expect("not stopped early");
//! assert_eq!(results, vec![1, 4, 9, 16, 25]);
//! ```
//!
//! # Process mode
//!
//! A closure cannot cross a process boundary, so process-mode operations are
//! [`Task`] values that a dedicated worker binary also constructs and serves
//! with [`ipc::serve`]:
//!
//! ```no_run
//! use fanout::{Fault, ProcessOptions, Task};
//!
//! struct Square;
//!
//! impl Task for Square {
//!     type Item = i64;
//!     type Output = i64;
//!     fn run(&self, item: &i64, _index: usize) -> Result<i64, Fault> {
//!         Ok(item * item)
//!     }
//! }
//!
//! let items = vec![1i64, 2, 3, 4, 5];
//! let results = fanout::map_in_processes(&items, &ProcessOptions::new().workers(2), &Square)
//!     .unwrap()
//!     .expect("not stopped early");
//! assert_eq!(results, vec![1, 4, 9, 16, 25]);
//! ```
//!
//! # Failure model
//!
//! A run either returns the complete, in-order result sequence, or surfaces
//! exactly one error, the first one captured. Returning
//! [`Fault::Break`] from the operation ends the run early with no results
//! and no error (`Ok(None)`). On Ctrl-C every registered worker of every
//! live run is terminated and the program exits with status 1.

pub mod cpu;
pub mod error;
pub mod execute;
pub mod ipc;
mod interrupt;
pub mod options;
pub mod task;

pub use error::{EnvelopeKind, Error, ErrorEnvelope, Fault, Result};
pub use execute::{ProcessPoolExecutor, ThreadPoolExecutor, WorkCounter};
pub use options::{Options, ProcessOptions, Width, WorkerCommand};
pub use task::Task;

/// Apply `op` to every item on a pool of threads, returning results in
/// input order.
///
/// The pool width is `min(items.len(), requested)`; a width of zero runs
/// the operation synchronously in the caller's context. `Ok(None)` means
/// the run was ended early by [`Fault::Break`].
pub fn map<T, R, F>(items: &[T], options: &Options<T>, op: F) -> Result<Option<Vec<R>>>
where
    T: Sync,
    R: Send + Sync,
    F: Fn(&T) -> std::result::Result<R, Fault> + Sync,
{
    map_with_index(items, options, |item, _index| op(item))
}

/// Like [`map`], passing the item's input index to the operation.
pub fn map_with_index<T, R, F>(items: &[T], options: &Options<T>, op: F) -> Result<Option<Vec<R>>>
where
    T: Sync,
    R: Send + Sync,
    F: Fn(&T, usize) -> std::result::Result<R, Fault> + Sync,
{
    ThreadPoolExecutor::new(options.workers.resolve(items.len())).execute(items, options, op)
}

/// Apply `op` to every item on a pool of threads, discarding per-item
/// results.
///
/// The operation still runs for every element; a [`Fault::Break`] ends the
/// run early without being treated as an error.
pub fn each<T, R, F>(items: &[T], options: &Options<T>, op: F) -> Result<()>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> std::result::Result<R, Fault> + Sync,
{
    each_with_index(items, options, |item, _index| op(item))
}

/// Like [`each`], passing the item's input index to the operation.
pub fn each_with_index<T, R, F>(items: &[T], options: &Options<T>, op: F) -> Result<()>
where
    T: Sync,
    R: Send,
    F: Fn(&T, usize) -> std::result::Result<R, Fault> + Sync,
{
    // Values are dropped as soon as they are computed.
    map_with_index(items, options, |item, index| op(item, index).map(drop)).map(drop)
}

/// Apply a [`Task`] to every item on a pool of isolated worker processes,
/// returning results in input order.
///
/// The worker binary must serve the same task (see [`ipc::serve`]). The
/// pool width is `min(items.len(), requested)`, defaulting to the logical
/// processor count; a width of zero runs the task directly in the caller's
/// context with no worker processes at all.
pub fn map_in_processes<Op: Task>(
    items: &[Op::Item],
    options: &ProcessOptions<Op::Item>,
    op: &Op,
) -> Result<Option<Vec<Op::Output>>> {
    ProcessPoolExecutor::new(options.workers.resolve(items.len())).execute(items, options, op)
}

/// Like [`map_in_processes`], discarding per-item results.
///
/// Outputs still cross the response channel, but they are dropped as they
/// arrive rather than retained until the run resolves.
pub fn each_in_processes<Op: Task>(
    items: &[Op::Item],
    options: &ProcessOptions<Op::Item>,
    op: &Op,
) -> Result<()> {
    ProcessPoolExecutor::new(options.workers.resolve(items.len()))
        .execute_inner(items, options, op, false)
        .map(drop)
}
