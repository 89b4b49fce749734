//! Async functions, promises, the microtask queue, and `for await`.

use riptide::{Engine, ExceptionKind, JsValue};

fn eval(source: &str) -> JsValue {
    let mut engine = Engine::new();
    engine.eval(source, "test.js").unwrap()
}

fn eval_num(source: &str) -> f64 {
    eval(source).as_f64().unwrap_or_else(|| panic!("expected a number from {source}"))
}

fn eval_str(source: &str) -> String {
    eval(source).as_str().map(ToOwned::to_owned).unwrap_or_else(|| panic!("expected a string from {source}"))
}

#[test]
fn await_resolves_plain_values() {
    assert_eq!(eval_num("(async () => (await 5) + 1)();"), 6.0);
}

#[test]
fn async_function_returns_adopted_promise() {
    assert_eq!(eval_num("async function f() { return 41; } f().then(v => v + 1);"), 42.0);
}

#[test]
fn for_await_sums_promises() {
    let source = "
        async function h() {
            let s = 0;
            for await (let v of [Promise.resolve(1), Promise.resolve(2), Promise.resolve(3)]) s += await v;
            return s;
        }
        h();
    ";
    assert_eq!(eval_num(source), 6.0);
}

#[test]
fn promise_catch_transforms_rejection() {
    assert_eq!(eval_str(r#"const p = new Promise((res, rej) => rej("x")); p.catch(e => e + "!");"#), "x!");
}

#[test]
fn uncaught_top_level_rejection_is_an_error() {
    let mut engine = Engine::new();
    let err = engine.eval("Promise.reject('nope');", "test.js").unwrap_err();
    assert_eq!(err.kind(), ExceptionKind::Eval);
    assert_eq!(err.message(), "nope");
}

#[test]
fn try_catch_spans_await() {
    let source = "
        async function f() {
            try {
                await Promise.reject('bad');
                return 'unreached';
            } catch (e) {
                return 'caught:' + e;
            }
        }
        f();
    ";
    assert_eq!(eval_str(source), "caught:bad");
}

#[test]
fn finally_runs_across_await() {
    let source = "
        let log = [];
        async function f() {
            try {
                log.push('before');
                await Promise.resolve(1);
                log.push('after');
                return 'done';
            } finally {
                log.push('finally');
            }
        }
        f().then(() => log.join(','));
    ";
    assert_eq!(eval_str(source), "before,after,finally");
}

#[test]
fn microtask_fifo_ordering() {
    // p1 settles before p2, so a runs before b; chained thens preserve
    // enqueue order.
    let source = "
        let order = [];
        let p1 = Promise.resolve('a');
        let p2 = Promise.resolve('b');
        p1.then(v => order.push(v));
        p2.then(v => order.push(v));
        p1.then(() => order.push('a2'));
        Promise.resolve().then(() => {}).then(() => order.push('late'));
        p2.then(() => order.join(','));
    ";
    // The final read happens in the fourth reaction; 'late' lands after it.
    assert_eq!(eval_str(source), "a,b,a2");
}

#[test]
fn then_chains_transform_values() {
    assert_eq!(eval_num("Promise.resolve(1).then(v => v + 1).then(v => v * 10);"), 20.0);
    assert_eq!(
        eval_str("Promise.reject('e').then(v => 'fulfilled').catch(e => 'rejected:' + e);"),
        "rejected:e",
    );
}

#[test]
fn settling_is_one_shot() {
    let source = "
        new Promise((res, rej) => { res('first'); res('second'); rej('third'); });
    ";
    assert_eq!(eval_str(source), "first");
}

#[test]
fn thenables_are_adopted() {
    let source = "
        Promise.resolve({ then(res) { res(7); } });
    ";
    assert_eq!(eval_num(source), 7.0);
}

#[test]
fn async_rejection_from_throw() {
    let source = "
        async function f() { throw 'kaboom'; }
        f().catch(e => 'caught:' + e);
    ";
    assert_eq!(eval_str(source), "caught:kaboom");
}

#[test]
fn promise_all_preserves_index_order() {
    let source = "
        Promise.all([Promise.resolve(1), 2, Promise.resolve(3)]).then(vs => JSON.stringify(vs));
    ";
    assert_eq!(eval_str(source), "[1,2,3]");
}

#[test]
fn promise_all_short_circuits_on_rejection() {
    let source = "
        Promise.all([Promise.resolve(1), Promise.reject('bad'), Promise.resolve(3)])
            .then(() => 'fulfilled', e => 'rejected:' + e);
    ";
    assert_eq!(eval_str(source), "rejected:bad");
}

#[test]
fn promise_race_takes_first_settlement() {
    let source = "
        Promise.race([Promise.resolve('fast'), new Promise(() => {})]);
    ";
    assert_eq!(eval_str(source), "fast");
}

#[test]
fn promise_all_settled_reports_both() {
    let source = "
        Promise.allSettled([Promise.resolve(1), Promise.reject('r')]).then(results =>
            results.map(r => r.status).join(','));
    ";
    assert_eq!(eval_str(source), "fulfilled,rejected");
}

#[test]
fn promise_any_takes_first_fulfillment() {
    let source = "
        Promise.any([Promise.reject('a'), Promise.resolve('win'), Promise.reject('b')]);
    ";
    assert_eq!(eval_str(source), "win");
}

#[test]
fn promise_finally_passes_through() {
    let source = "
        let ran = false;
        Promise.resolve('kept').finally(() => { ran = true; }).then(v => v + ':' + ran);
    ";
    assert_eq!(eval_str(source), "kept:true");
}

#[test]
fn await_sequencing_between_frames() {
    let source = "
        let log = [];
        async function worker(tag) {
            log.push(tag + '1');
            await Promise.resolve();
            log.push(tag + '2');
        }
        async function main() {
            let a = worker('a');
            let b = worker('b');
            await a;
            await b;
            return log.join(',');
        }
        main();
    ";
    // Both bodies run to their first await synchronously; the resumes
    // interleave in FIFO order.
    assert_eq!(eval_str(source), "a1,b1,a2,b2");
}

#[test]
fn for_await_early_exit_closes_iterator() {
    let source = "
        let closed = false;
        function makeIterable() {
            let i = 0;
            return {
                [Symbol.iterator]() { return this; },
                next() { i += 1; return { value: i, done: false }; },
                return() { closed = true; return { done: true }; },
            };
        }
        async function h() {
            for await (let v of makeIterable()) {
                if (v >= 2) break;
            }
            return closed;
        }
        h();
    ";
    assert_eq!(eval(source), JsValue::Bool(true));
}

#[test]
fn await_inside_loops_and_conditionals() {
    let source = "
        async function f() {
            let total = 0;
            for (let i = 0; i < 3; i++) {
                if (i % 2 === 0) {
                    total += await Promise.resolve(i * 10);
                } else {
                    total += i;
                }
            }
            while (total < 25) total += await Promise.resolve(2);
            return total;
        }
        f();
    ";
    assert_eq!(eval_num(source), 25.0);
}

#[test]
fn async_arrows_and_concise_bodies() {
    assert_eq!(eval_num("(async x => (await x) * 2)(Promise.resolve(21));"), 42.0);
}

#[test]
fn nested_async_calls_await_each_other() {
    let source = "
        async function leaf() { return await Promise.resolve(20); }
        async function mid() { return (await leaf()) + 1; }
        async function top() { return (await mid()) * 2; }
        top();
    ";
    assert_eq!(eval_num(source), 42.0);
}
