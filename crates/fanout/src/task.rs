//! The operation seam for process-mode runs.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Fault;

/// An operation that can run inside an isolated worker process.
///
/// Thread-mode runs take plain closures, but a closure cannot cross a process
/// boundary: process-mode operations are named types that both the driving
/// program and the worker binary construct independently. The worker binary
/// serves the task with [`crate::ipc::serve`]; the driver passes the same
/// task to [`crate::map_in_processes`], where it types the run and handles
/// the zero-width direct fallback.
///
/// Items and outputs cross the boundary as JSON, so both must be
/// serializable. `run` always receives the item's input index.
pub trait Task: Sync {
    /// Input element type.
    type Item: Serialize + DeserializeOwned + Send + Sync;
    /// Per-item result type. Result slots are shared across coordinator
    /// threads, hence the `Sync` bound.
    type Output: Serialize + DeserializeOwned + Send + Sync;

    /// Apply the operation to one claimed item.
    fn run(&self, item: &Self::Item, index: usize) -> Result<Self::Output, Fault>;
}
