//! Integration Tests for the Reactive Runtime
//!
//! These tests exercise tracked containers, cells, computed values, effects,
//! and the batching scheduler working together against one runtime.

use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use trellis_core::{Runtime, Tracked, Value};

fn wrap(rt: &Runtime, value: Value) -> Tracked {
    rt.wrap(value).as_tracked().unwrap().clone()
}

/// The canonical counter scenario: an effect that logs `state.count` re-runs
/// once per genuine write.
#[test]
fn counter_effect_reacts_to_writes() {
    let rt = Runtime::new();
    let state = wrap(&rt, Value::map_of([("count", 0)]));
    let log = Arc::new(Mutex::new(Vec::new()));

    let log_clone = log.clone();
    let state_clone = state.clone();
    let _effect = rt.effect(move || {
        let count = state_clone.get("count").as_i64().unwrap();
        log_clone.lock().push(count);
    });

    // Ran once on creation with the initial value.
    assert_eq!(*log.lock(), [0]);

    state.set("count", 1);
    assert_eq!(*log.lock(), [0, 1]);

    // Writing the same value again notifies nobody.
    state.set("count", 1);
    assert_eq!(*log.lock(), [0, 1]);

    state.set("count", 2);
    assert_eq!(*log.lock(), [0, 1, 2]);
}

/// A computed over a cell: lazy on creation, cached between reads, and the
/// getter runs exactly once per invalidated read.
#[test]
fn cell_and_computed_chain() {
    let rt = Runtime::new();
    let count = rt.new_ref(2);
    let getter_calls = Arc::new(AtomicI32::new(0));

    let calls_clone = getter_calls.clone();
    let count_clone = count.clone();
    let doubled = rt.computed(move || {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        Value::Int(count_clone.get().as_i64().unwrap() * 2)
    });

    assert_eq!(doubled.get().as_i64(), Some(4));
    assert_eq!(doubled.get().as_i64(), Some(4));
    assert_eq!(getter_calls.load(Ordering::SeqCst), 1);

    count.set(5);
    assert_eq!(doubled.get().as_i64(), Some(10));
    assert_eq!(getter_calls.load(Ordering::SeqCst), 2);
}

/// An effect over a computed over a cell: the full chain propagates a write
/// synchronously from the cell to the observer.
#[test]
fn full_chain_cell_computed_effect() {
    let rt = Runtime::new();
    let base = rt.new_ref(100);
    let observed = Arc::new(AtomicI64::new(0));

    let base_clone = base.clone();
    let tripled = rt.computed(move || Value::Int(base_clone.get().as_i64().unwrap() * 3));

    let observed_clone = observed.clone();
    let tripled_clone = tripled.clone();
    let _effect = rt.effect(move || {
        observed_clone.store(tripled_clone.get().as_i64().unwrap(), Ordering::SeqCst);
    });

    assert_eq!(observed.load(Ordering::SeqCst), 300);

    base.set(50);
    assert_eq!(observed.load(Ordering::SeqCst), 150);
}

/// Structural map changes reach enumerating effects; nested containers read
/// through a tracked parent come back tracked themselves.
#[test]
fn nested_state_and_enumeration() {
    let rt = Runtime::new();
    let state = wrap(
        &rt,
        Value::map_of([("user", Value::map_of([("name", "ada")]))]),
    );
    let key_counts = Arc::new(AtomicI32::new(0));
    let names = Arc::new(Mutex::new(Vec::new()));

    let counts_clone = key_counts.clone();
    let state_clone = state.clone();
    let _enumerator = rt.effect(move || {
        counts_clone.store(state_clone.len() as i32, Ordering::SeqCst);
    });

    let names_clone = names.clone();
    let state_clone = state.clone();
    let _watcher = rt.effect(move || {
        let user = state_clone.get("user");
        let name = user.as_tracked().unwrap().get("name");
        names_clone.lock().push(name.as_str().unwrap().to_owned());
    });

    assert_eq!(key_counts.load(Ordering::SeqCst), 1);
    assert_eq!(*names.lock(), ["ada"]);

    // A nested write reaches the watcher but not the enumerator.
    state.get("user").as_tracked().unwrap().set("name", "grace");
    assert_eq!(*names.lock(), ["ada", "grace"]);
    assert_eq!(key_counts.load(Ordering::SeqCst), 1);

    // Adding a top-level key reaches the enumerator but not the watcher.
    state.set("theme", "dark");
    assert_eq!(key_counts.load(Ordering::SeqCst), 2);
    assert_eq!(names.lock().len(), 2);
}

/// Tracked lists: pushes notify index and length readers, and writes to
/// untouched slots leave unrelated readers alone.
#[test]
fn list_readers_see_exactly_their_slots() {
    let rt = Runtime::new();
    let items = wrap(&rt, Value::list_of([10, 20]));
    let first_runs = Arc::new(AtomicI32::new(0));
    let len_runs = Arc::new(AtomicI32::new(0));

    let first_clone = first_runs.clone();
    let items_clone = items.clone();
    let _first_reader = rt.effect(move || {
        items_clone.get(0usize);
        first_clone.fetch_add(1, Ordering::SeqCst);
    });

    let len_clone = len_runs.clone();
    let items_clone = items.clone();
    let _len_reader = rt.effect(move || {
        items_clone.len();
        len_clone.fetch_add(1, Ordering::SeqCst);
    });

    // Push: length reader re-runs, slot-0 reader does not.
    items.push(30);
    assert_eq!(len_runs.load(Ordering::SeqCst), 2);
    assert_eq!(first_runs.load(Ordering::SeqCst), 1);

    // In-place write to slot 1: neither re-runs.
    items.set(1usize, 99);
    assert_eq!(len_runs.load(Ordering::SeqCst), 2);
    assert_eq!(first_runs.load(Ordering::SeqCst), 1);

    // Write to slot 0: only the slot reader re-runs.
    items.set(0usize, 11);
    assert_eq!(first_runs.load(Ordering::SeqCst), 2);
    assert_eq!(len_runs.load(Ordering::SeqCst), 2);
}

/// Deferred effects coalesce a burst of writes into one re-run per flush.
#[test]
fn deferred_effect_batches_writes() {
    let rt = Runtime::new();
    let state = wrap(&rt, Value::map_of([("count", 0)]));
    let runs = Arc::new(AtomicI32::new(0));

    let runs_clone = runs.clone();
    let state_clone = state.clone();
    let _effect = rt.effect_deferred(move || {
        state_clone.get("count");
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(runs.load(Ordering::SeqCst), 1);

    state.set("count", 1);
    state.set("count", 2);
    state.set("count", 3);
    // Nothing re-ran yet; the job is queued once.
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(rt.is_flush_pending());

    assert_eq!(rt.flush_jobs(), 1);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(state.get_untracked("count").as_i64(), Some(3));
}

/// Two runtimes never observe each other, even over the same raw data.
#[test]
fn runtimes_are_isolated_end_to_end() {
    let rt_a = Runtime::new();
    let rt_b = Runtime::new();
    let raw = Value::map_of([("n", 0)]);

    let a = wrap(&rt_a, raw.clone());
    let b = wrap(&rt_b, raw.clone());
    let a_runs = Arc::new(AtomicI32::new(0));

    let a_runs_clone = a_runs.clone();
    let a_clone = a.clone();
    let _effect = rt_a.effect(move || {
        a_clone.get("n");
        a_runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    // A write through the other runtime's wrapper mutates the shared raw
    // node but notifies only its own runtime's subscribers.
    b.set("n", 7);
    assert_eq!(a_runs.load(Ordering::SeqCst), 1);
    assert_eq!(a.get_untracked("n").as_i64(), Some(7));
}

/// A small end-to-end scenario: a task list with a computed remaining-count
/// and a deferred renderer.
#[test]
fn task_list_scenario() {
    let rt = Runtime::new();
    let tasks = wrap(&rt, Value::list());
    let renders = Arc::new(AtomicI32::new(0));
    let last_remaining = Arc::new(AtomicI64::new(-1));

    let tasks_clone = tasks.clone();
    let remaining = rt.computed(move || {
        let mut open = 0;
        for key in tasks_clone.keys() {
            let task = tasks_clone.get(key);
            let task = task.as_tracked().unwrap();
            if task.get("done") != Value::Bool(true) {
                open += 1;
            }
        }
        Value::Int(open)
    });

    let renders_clone = renders.clone();
    let remaining_clone = remaining.clone();
    let last_clone = last_remaining.clone();
    let _renderer = rt.effect_deferred(move || {
        last_clone.store(remaining_clone.get().as_i64().unwrap(), Ordering::SeqCst);
        renders_clone.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(last_remaining.load(Ordering::SeqCst), 0);
    assert_eq!(renders.load(Ordering::SeqCst), 1);

    // Two additions in one turn render once.
    tasks.push(Value::map_of([("title", Value::from("write docs")), ("done", Value::Bool(false))]));
    tasks.push(Value::map_of([("title", Value::from("ship it")), ("done", Value::Bool(false))]));
    rt.flush_jobs();
    assert_eq!(renders.load(Ordering::SeqCst), 2);
    assert_eq!(last_remaining.load(Ordering::SeqCst), 2);

    // Completing a task drops the remaining count by one.
    tasks.get(0usize).as_tracked().unwrap().set("done", true);
    rt.flush_jobs();
    assert_eq!(renders.load(Ordering::SeqCst), 3);
    assert_eq!(last_remaining.load(Ordering::SeqCst), 1);
}
