//! Tasks served by the `fanout-worker` binary.
//!
//! The parent and the worker must agree on the task a worker serves; the
//! binary selects one by name from its first argument. These tasks double
//! as the integration-test workload.

use fanout::{Fault, Task};

/// Squares 64-bit integers.
pub struct Square;

impl Task for Square {
    type Item = i64;
    type Output = i64;

    fn run(&self, item: &i64, _index: usize) -> Result<i64, Fault> {
        Ok(item * item)
    }
}

/// Reverses strings.
pub struct Reverse;

impl Task for Reverse {
    type Item = String;
    type Output = String;

    fn run(&self, item: &String, _index: usize) -> Result<String, Fault> {
        Ok(item.chars().rev().collect())
    }
}

/// Doubles integers, with deliberate trouble spots: `13` fails the run and
/// any negative item ends it early.
pub struct Fallible;

impl Task for Fallible {
    type Item = i64;
    type Output = i64;

    fn run(&self, item: &i64, index: usize) -> Result<i64, Fault> {
        if *item == 13 {
            return Err(Fault::failure(anyhow::anyhow!(
                "refusing to process item 13 at index {index}"
            )));
        }
        if *item < 0 {
            return Err(Fault::Break);
        }
        Ok(item * 2)
    }
}

/// Announces its process id on stderr, then sleeps far longer than any test
/// is willing to wait. Used to hold a run mid-invocation so interrupt
/// handling can be observed.
pub struct Sleepy;

impl Task for Sleepy {
    type Item = i64;
    type Output = i64;

    fn run(&self, item: &i64, _index: usize) -> Result<i64, Fault> {
        eprintln!("WORKER_PID={}", std::process::id());
        std::thread::sleep(std::time::Duration::from_secs(60));
        Ok(*item)
    }
}
