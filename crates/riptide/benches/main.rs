//! Microbenchmarks over the public engine API.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use riptide::Engine;

fn arithmetic_non_foldable(c: &mut Criterion) {
    // Inputs arrive through a binding so the constant folder cannot erase
    // the work being measured.
    let mut engine = Engine::new();
    engine.eval("let n = 1000;", "setup.js").unwrap();
    c.bench_function("sum_loop", |b| {
        b.iter(|| {
            let result = engine.eval("let s = 0; for (let i = 0; i < n; i++) s += i; s;", "bench.js").unwrap();
            black_box(result);
        });
    });
}

fn generator_drive(c: &mut Criterion) {
    let mut engine = Engine::new();
    engine
        .eval("function* squares(n) { for (let i = 0; i < n; i++) yield i * i; }", "setup.js")
        .unwrap();
    c.bench_function("generator_drain", |b| {
        b.iter(|| {
            let result = engine.eval("let t = 0; for (let v of squares(200)) t += v; t;", "bench.js").unwrap();
            black_box(result);
        });
    });
}

fn async_roundtrip(c: &mut Criterion) {
    let mut engine = Engine::new();
    engine
        .eval("async function pump(n) { let s = 0; for (let i = 0; i < n; i++) s += await i; return s; }", "setup.js")
        .unwrap();
    c.bench_function("await_loop", |b| {
        b.iter(|| {
            let result = engine.eval("pump(50);", "bench.js").unwrap();
            black_box(result);
        });
    });
}

criterion_group!(benches, arithmetic_non_foldable, generator_drive, async_roundtrip);
criterion_main!(benches);
