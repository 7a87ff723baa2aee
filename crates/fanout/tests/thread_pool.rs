//! Integration tests for thread-mode runs.
//!
//! Exercises the public map/each surface end to end: ordering, early
//! termination, failure propagation, and instrumentation hooks.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use fanout::{Error, Fault, Options};

#[test]
fn test_map_preserves_input_order_under_contention() {
    let items: Vec<u64> = (0..1_000).collect();
    let expected: Vec<u64> = items.iter().map(|x| x + 1).collect();

    let results = fanout::map(&items, &Options::new().workers(8), |x| {
        Ok::<_, Fault>(x + 1)
    })
    .unwrap()
    .unwrap();

    assert_eq!(results, expected);
}

#[test]
fn test_width_larger_than_collection_is_harmless() {
    let items = vec!["one", "two"];
    let results = fanout::map(&items, &Options::new().workers(50), |x| {
        Ok::<_, Fault>(x.len())
    })
    .unwrap()
    .unwrap();
    assert_eq!(results, vec![3, 3]);
}

#[test]
fn test_break_ends_the_run_with_no_results() {
    let items: Vec<u64> = (0..100).collect();
    let invoked = AtomicUsize::new(0);

    let results = fanout::map(&items, &Options::new().workers(4), |x| {
        invoked.fetch_add(1, Ordering::Relaxed);
        if *x >= 10 {
            Err(Fault::Break)
        } else {
            Ok(*x)
        }
    })
    .unwrap();

    assert!(results.is_none());
    assert!(invoked.load(Ordering::Relaxed) < items.len());
}

#[test]
fn test_failure_carries_the_operation_error() {
    let items: Vec<u64> = (0..20).collect();
    let err = fanout::map(&items, &Options::new().workers(4), |x| {
        if *x == 7 {
            Err(Fault::failure(anyhow::anyhow!("item 7 is broken")))
        } else {
            Ok(*x)
        }
    })
    .unwrap_err();

    match err {
        Error::Operation(inner) => assert!(inner.to_string().contains("item 7 is broken")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_hooks_bracket_every_item() {
    let items = vec![10u64, 20, 30, 40];
    let started = std::sync::Arc::new(Mutex::new(Vec::new()));
    let finished = std::sync::Arc::new(Mutex::new(Vec::new()));

    let options = Options::new()
        .workers(2)
        .on_start({
            let started = std::sync::Arc::clone(&started);
            move |_item: &u64, index| started.lock().unwrap().push(index)
        })
        .on_finish({
            let finished = std::sync::Arc::clone(&finished);
            move |_item: &u64, index| finished.lock().unwrap().push(index)
        });

    fanout::each(&items, &options, |x| Ok::<_, Fault>(*x)).unwrap();

    let mut started = started.lock().unwrap().clone();
    let mut finished = finished.lock().unwrap().clone();
    started.sort_unstable();
    finished.sort_unstable();
    assert_eq!(started, vec![0, 1, 2, 3]);
    assert_eq!(finished, vec![0, 1, 2, 3]);
}

#[test]
fn test_nested_runs_do_not_interfere() {
    let outer: Vec<u64> = (0..4).collect();
    let results = fanout::map(&outer, &Options::new().workers(2), |x| {
        let inner: Vec<u64> = (0..10).collect();
        let sums = fanout::map(&inner, &Options::new().workers(2), |y| {
            Ok::<_, Fault>(x * 10 + y)
        })
        .map_err(Fault::failure)?
        .expect("inner run not stopped");
        Ok::<_, Fault>(sums.iter().sum::<u64>())
    })
    .unwrap()
    .unwrap();

    assert_eq!(results, vec![45, 145, 245, 345]);
}

#[test]
fn test_panic_in_operation_becomes_an_error() {
    let items = vec![1u64, 2, 3];
    let err = fanout::map(&items, &Options::new().workers(2), |x| {
        if *x == 2 {
            panic!("boom on two");
        }
        Ok::<_, Fault>(*x)
    })
    .unwrap_err();

    assert!(err.to_string().contains("boom on two"));
}
