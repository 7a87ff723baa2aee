//! Process-pool executor: isolated workers driven by coordinator tasks.

use std::thread;

use crate::error::{Error, Result};
use crate::interrupt::{self, KillTarget};
use crate::ipc::{WorkerHandle, WorkerReply, WorkerRequest};
use crate::options::ProcessOptions;
use crate::task::Task;

use super::{Captured, FailureCell, FinishGuard, ResultSlots, WorkCounter, resolve, run_direct};

/// Executor that spawns `P` isolated worker processes plus `P` in-process
/// coordinator tasks, each coordinator owning one worker's channels.
///
/// Coordinators race on the shared [`WorkCounter`], forward claimed items
/// over their request channel, and store decoded responses. A worker whose
/// channel fails outside the protocol terminates the run with
/// [`Error::DeadWorker`]. Every coordinator closes its channel ends and
/// reaps its worker on every exit path.
pub struct ProcessPoolExecutor {
    workers: usize,
}

impl ProcessPoolExecutor {
    /// Pool of up to `workers` processes; the effective width of a run is
    /// capped by its item count.
    pub fn new(workers: usize) -> Self {
        Self { workers }
    }

    /// Apply the task to every item, returning results in input order.
    ///
    /// `Ok(None)` means the run was ended early by [`crate::Fault::Break`].
    /// With an effective width of zero the task runs directly in the
    /// caller's context and no process is spawned.
    pub fn execute<Op: Task>(
        &self,
        items: &[Op::Item],
        options: &ProcessOptions<Op::Item>,
        op: &Op,
    ) -> Result<Option<Vec<Op::Output>>> {
        self.execute_inner(items, options, op, options.preserve_results)
    }

    /// `execute` with the preserve flag overridden; `each`-style runs force
    /// it off so decoded outputs are dropped as they arrive.
    pub(crate) fn execute_inner<Op: Task>(
        &self,
        items: &[Op::Item],
        options: &ProcessOptions<Op::Item>,
        op: &Op,
        preserve: bool,
    ) -> Result<Option<Vec<Op::Output>>> {
        let width = self.workers.min(items.len());
        if width == 0 {
            return run_direct(
                items,
                options.on_start.as_ref(),
                options.on_finish.as_ref(),
                preserve,
                |item, index| op.run(item, index),
            );
        }

        // Spawn the whole pool up front. On a spawn failure the handles
        // spawned so far are dropped, which kills and reaps them.
        let mut workers = Vec::with_capacity(width);
        for _ in 0..width {
            workers.push(WorkerHandle::spawn(&options.worker)?);
        }

        let failure = FailureCell::new();
        let mut targets: Vec<KillTarget> =
            workers.iter().map(|w| KillTarget::Pid(w.pid())).collect();
        targets.push(KillTarget::Stop(failure.stop_flag()));
        let _guard = interrupt::register(targets);

        let counter = WorkCounter::new(items.len());
        let slots = ResultSlots::new(items.len(), preserve);

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(width);
            for worker in workers.drain(..) {
                let counter = &counter;
                let failure = &failure;
                let slots = &slots;
                handles.push(scope.spawn(move || {
                    coordinate::<Op>(worker, items, options, counter, failure, slots)
                }));
            }
            // Wait on every coordinator, whatever happened to the others.
            for handle in handles {
                if handle.join().is_err() {
                    failure.capture(Captured::Error(Error::Ipc(
                        "coordinator task panicked".to_string(),
                    )));
                }
            }
        });

        resolve(failure, slots)
    }
}

/// Drive one worker until the run ends, then tear it down unconditionally.
fn coordinate<Op: Task>(
    mut worker: WorkerHandle,
    items: &[Op::Item],
    options: &ProcessOptions<Op::Item>,
    counter: &WorkCounter,
    failure: &FailureCell,
    slots: &ResultSlots<Op::Output>,
) {
    let outcome = drive::<Op>(&mut worker, items, options, counter, failure, slots);
    if let Err(err) = outcome {
        tracing::warn!(pid = worker.pid(), %err, "coordinator stopping on error");
        failure.capture(Captured::Error(err));
    }
    // Close both channel ends and reap, on success, failure, and
    // cancellation alike.
    worker.shutdown();
}

fn drive<Op: Task>(
    worker: &mut WorkerHandle,
    items: &[Op::Item],
    options: &ProcessOptions<Op::Item>,
    counter: &WorkCounter,
    failure: &FailureCell,
    slots: &ResultSlots<Op::Output>,
) -> Result<()> {
    loop {
        if failure.observed() {
            return Ok(());
        }
        let Some(index) = counter.claim() else {
            return Ok(());
        };
        let item = &items[index];

        if let Some(hook) = options.on_start.as_ref() {
            hook(item, index);
        }
        let _finish = FinishGuard::new(options.on_finish.as_ref(), item, index);

        let payload = serde_json::to_value(item)
            .map_err(|e| Error::Serialization(format!("failed to encode item {index}: {e}")))?;
        worker.send(&WorkerRequest::Job { index: index as u64, item: payload })?;

        match worker.recv()? {
            WorkerReply::Output { index: echoed, value } => {
                if echoed != index as u64 {
                    return Err(Error::Ipc(format!(
                        "worker answered for index {echoed}, expected {index}"
                    )));
                }
                let value: Op::Output = serde_json::from_value(value).map_err(|e| {
                    Error::Serialization(format!(
                        "failed to decode output for item {index}: {e}"
                    ))
                })?;
                slots.store(index, value);
            }
            WorkerReply::Failed { envelope, .. } => {
                if envelope.is_break() {
                    failure.capture(Captured::Break);
                } else {
                    failure.capture(Captured::Error(Error::Remote(envelope)));
                }
                return Ok(());
            }
            WorkerReply::Pong => {
                return Err(Error::Ipc("unexpected Pong outside the handshake".to_string()));
            }
        }
    }
}
