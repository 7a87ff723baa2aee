//! Thread-pool executor: `P` in-process workers in shared memory.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread;

use crate::error::{Fault, Result, panic_message};
use crate::interrupt::{self, KillTarget};
use crate::options::Options;

use super::{FailureCell, FinishGuard, ResultSlots, WorkCounter, resolve, run_direct};

/// Executor that spawns parallel in-process tasks sharing one
/// [`WorkCounter`], one failure cell, and one slot array.
///
/// Workers race to claim indices until the counter is exhausted or a failure
/// is observed; an in-flight invocation is never interrupted. Every task is
/// joined before the run resolves, success or failure.
pub struct ThreadPoolExecutor {
    workers: usize,
}

impl ThreadPoolExecutor {
    /// Pool of up to `workers` tasks; the effective width of a run is capped
    /// by its item count.
    pub fn new(workers: usize) -> Self {
        Self { workers }
    }

    /// Apply `op` to every item, returning results in input order.
    ///
    /// `Ok(None)` means the run was ended early by [`Fault::Break`].
    pub fn execute<T, R, F>(
        &self,
        items: &[T],
        options: &Options<T>,
        op: F,
    ) -> Result<Option<Vec<R>>>
    where
        T: Sync,
        R: Send + Sync,
        F: Fn(&T, usize) -> std::result::Result<R, Fault> + Sync,
    {
        let width = self.workers.min(items.len());
        if width == 0 {
            return run_direct(
                items,
                options.on_start.as_ref(),
                options.on_finish.as_ref(),
                options.preserve_results,
                op,
            );
        }

        let counter = WorkCounter::new(items.len());
        let failure = FailureCell::new();
        let slots = ResultSlots::new(items.len(), options.preserve_results);
        let _guard = interrupt::register(vec![KillTarget::Stop(failure.stop_flag())]);

        thread::scope(|scope| {
            let handles: Vec<_> = (0..width)
                .map(|_| scope.spawn(|| claim_loop(items, options, &counter, &failure, &slots, &op)))
                .collect();
            // Join every task even after a failure; one handle's outcome must
            // not keep us from waiting on the rest.
            for handle in handles {
                if handle.join().is_err() {
                    // claim_loop catches operation panics, so this means the
                    // pool itself unwound.
                    failure.capture_fault(Fault::failure(anyhow::anyhow!(
                        "worker task panicked outside the operation"
                    )));
                }
            }
        });

        resolve(failure, slots)
    }
}

fn claim_loop<T, R, F>(
    items: &[T],
    options: &Options<T>,
    counter: &WorkCounter,
    failure: &FailureCell,
    slots: &ResultSlots<R>,
    op: &F,
) where
    T: Sync,
    R: Send + Sync,
    F: Fn(&T, usize) -> std::result::Result<R, Fault> + Sync,
{
    loop {
        if failure.observed() {
            break;
        }
        let Some(index) = counter.claim() else { break };
        let item = &items[index];

        if let Some(hook) = options.on_start.as_ref() {
            hook(item, index);
        }
        let _finish = FinishGuard::new(options.on_finish.as_ref(), item, index);

        match catch_unwind(AssertUnwindSafe(|| op(item, index))) {
            Ok(Ok(value)) => slots.store(index, value),
            Ok(Err(fault)) => {
                failure.capture_fault(fault);
                break;
            }
            Err(payload) => {
                failure.capture_fault(Fault::failure(anyhow::anyhow!(
                    "operation panicked: {}",
                    panic_message(payload.as_ref())
                )));
                break;
            }
        }
    }
}
