//! Reactivity Benchmarks
//!
//! Measures the hot paths: tracked reads and writes, cell propagation with a
//! fan-out of effects, computed cache hits, and scheduler coalescing.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use trellis_core::{Runtime, Value};

fn tracked_access(c: &mut Criterion) {
    let rt = Runtime::new();
    let state = rt.wrap(Value::map_of([("count", 0)]));
    let state = state.as_tracked().unwrap().clone();

    c.bench_function("tracked_read_untracked_context", |b| {
        b.iter(|| black_box(state.get("count")));
    });

    c.bench_function("tracked_write_no_subscribers", |b| {
        let mut n = 0i64;
        b.iter(|| {
            n += 1;
            state.set("count", n);
        });
    });
}

fn cell_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("cell_set_with_effects");
    for effects in [1usize, 10, 100] {
        group.bench_with_input(
            BenchmarkId::from_parameter(effects),
            &effects,
            |b, &effects| {
                let rt = Runtime::new();
                let cell = rt.new_ref(0);
                let _effects: Vec<_> = (0..effects)
                    .map(|_| {
                        let cell = cell.clone();
                        rt.effect(move || {
                            black_box(cell.get());
                        })
                    })
                    .collect();

                let mut n = 0i64;
                b.iter(|| {
                    n += 1;
                    cell.set(n);
                });
            },
        );
    }
    group.finish();
}

fn computed_cache_hit(c: &mut Criterion) {
    let rt = Runtime::new();
    let cell = rt.new_ref(21);
    let cell_clone = cell.clone();
    let derived = rt.computed(move || Value::Int(cell_clone.get().as_i64().unwrap() * 2));
    derived.get();

    c.bench_function("computed_cached_read", |b| {
        b.iter(|| black_box(derived.get()));
    });
}

fn scheduler_coalescing(c: &mut Criterion) {
    c.bench_function("deferred_writes_then_flush", |b| {
        let rt = Runtime::new();
        let cell = rt.new_ref(0);
        let watched = cell.clone();
        let _effect = rt.effect_deferred(move || {
            black_box(watched.get());
        });

        let mut n = 0i64;
        b.iter(|| {
            for _ in 0..10 {
                n += 1;
                cell.set(n);
            }
            rt.flush_jobs();
        });
    });
}

criterion_group!(
    benches,
    tracked_access,
    cell_fan_out,
    computed_cache_hit,
    scheduler_coalescing
);
criterion_main!(benches);
