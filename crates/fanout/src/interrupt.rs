//! Process-wide cancellation registry and interrupt handling.
//!
//! Every pool registers its kill targets for the duration of a run and
//! deregisters them when the pool finishes, so a later run's process ids are
//! never mistaken for live workers. The first run installs a single Ctrl-C
//! handler, which is never removed. On interrupt the handler flattens every
//! registered target set (nested and concurrent runs included), terminates
//! each target, and exits the whole program with status 1.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Once, PoisonError};

/// One force-terminable worker handle.
#[derive(Clone)]
pub(crate) enum KillTarget {
    /// Worker process id, killed with an unconditional termination signal.
    Pid(u32),
    /// Cooperative stop flag for an in-process pool.
    Stop(Arc<AtomicBool>),
}

/// Stack of live runs' kill targets.
struct Registry {
    entries: Vec<(u64, Vec<KillTarget>)>,
    next_id: u64,
}

impl Registry {
    fn push(&mut self, targets: Vec<KillTarget>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, targets));
        id
    }

    fn remove(&mut self, id: u64) {
        self.entries.retain(|(entry_id, _)| *entry_id != id);
    }

    /// Flatten every registered set, innermost run first.
    fn drain_all(&mut self) -> Vec<KillTarget> {
        self.entries
            .drain(..)
            .rev()
            .flat_map(|(_, targets)| targets)
            .collect()
    }
}

static REGISTRY: Mutex<Registry> = Mutex::new(Registry {
    entries: Vec::new(),
    next_id: 0,
});

static INSTALL: Once = Once::new();

fn lock_registry() -> MutexGuard<'static, Registry> {
    REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A run's registry entry; deregisters itself on drop, on every exit path.
pub(crate) struct InterruptGuard {
    id: u64,
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        lock_registry().remove(self.id);
    }
}

/// Register a run's kill targets, installing the interrupt handler on first
/// use.
pub(crate) fn register(targets: Vec<KillTarget>) -> InterruptGuard {
    INSTALL.call_once(|| {
        // The handler runs on its own thread, so locking the registry there
        // is fine. Installation can fail if the embedding application
        // already owns the signal; workers then simply outlive a Ctrl-C.
        if let Err(err) = ctrlc::set_handler(on_interrupt) {
            tracing::warn!(%err, "failed to install interrupt handler");
        }
    });
    let id = lock_registry().push(targets);
    InterruptGuard { id }
}

fn on_interrupt() {
    eprintln!("parallel execution interrupted, exiting ...");
    for target in lock_registry().drain_all() {
        terminate(&target);
    }
    // Not resumable: quit with a failed status however far the runs got.
    std::process::exit(1);
}

fn terminate(target: &KillTarget) {
    match target {
        KillTarget::Stop(flag) => flag.store(true, Ordering::Release),
        KillTarget::Pid(pid) => kill_process(*pid),
    }
}

#[cfg(unix)]
fn kill_process(pid: u32) {
    // ESRCH just means the child is already gone; some environments reap
    // children on their own.
    unsafe {
        libc::kill(pid as i32, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process(pid: u32) {
    tracing::warn!(pid, "hard worker termination is not supported on this platform");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_push_remove() {
        let mut registry = Registry { entries: Vec::new(), next_id: 0 };
        let a = registry.push(vec![KillTarget::Pid(100)]);
        let b = registry.push(vec![KillTarget::Pid(200), KillTarget::Pid(201)]);
        assert_eq!(registry.entries.len(), 2);

        registry.remove(a);
        assert_eq!(registry.entries.len(), 1);
        assert_eq!(registry.entries[0].0, b);

        // Removing twice is harmless.
        registry.remove(a);
        registry.remove(b);
        assert!(registry.entries.is_empty());
    }

    #[test]
    fn test_drain_flattens_nested_runs_innermost_first() {
        let mut registry = Registry { entries: Vec::new(), next_id: 0 };
        registry.push(vec![KillTarget::Pid(1)]);
        registry.push(vec![KillTarget::Pid(2), KillTarget::Pid(3)]);

        let drained = registry.drain_all();
        let pids: Vec<u32> = drained
            .iter()
            .map(|t| match t {
                KillTarget::Pid(pid) => *pid,
                KillTarget::Stop(_) => unreachable!(),
            })
            .collect();
        assert_eq!(pids, vec![2, 3, 1]);
        assert!(registry.entries.is_empty());
    }

    #[test]
    fn test_terminate_raises_stop_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        terminate(&KillTarget::Stop(Arc::clone(&flag)));
        assert!(flag.load(Ordering::Acquire));
    }

    #[test]
    fn test_guard_deregisters_on_drop() {
        let guard = register(vec![KillTarget::Stop(Arc::new(AtomicBool::new(false)))]);
        let id = guard.id;
        assert!(lock_registry().entries.iter().any(|(e, _)| *e == id));
        drop(guard);
        assert!(!lock_registry().entries.iter().any(|(e, _)| *e == id));
    }
}
