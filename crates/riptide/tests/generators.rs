//! Generator semantics: suspension, finally-chaining, delegation, and the
//! resume protocol.

use riptide::{Engine, JsValue};

fn eval(source: &str) -> JsValue {
    let mut engine = Engine::new();
    engine.eval(source, "test.js").unwrap()
}

fn eval_str(source: &str) -> String {
    eval(source).as_str().map(ToOwned::to_owned).unwrap_or_else(|| panic!("expected a string from {source}"))
}

fn eval_num(source: &str) -> f64 {
    eval(source).as_f64().unwrap_or_else(|| panic!("expected a number from {source}"))
}

#[test]
fn basic_yield_sequence() {
    let source = "
        function* g() { yield 1; yield 2; return 3; }
        let it = g();
        let a = it.next();
        let b = it.next();
        let c = it.next();
        let d = it.next();
        JSON.stringify([a.value, a.done, b.value, b.done, c.value, c.done, d.value, d.done]);
    ";
    assert_eq!(eval_str(source), "[1,false,2,false,3,true,null,true]");
}

#[test]
fn yield_in_finally_defers_return() {
    // return(42) enters the finally, which yields once more; the deferred
    // return completion only fires after the finally finishes.
    let source = "
        function* g() { try { yield 1; } finally { yield 2; } }
        let it = g();
        JSON.stringify([it.next().value, it.return(42).value, it.next().value, it.next().done]);
    ";
    assert_eq!(eval_str(source), "[1,2,42,true]");
}

#[test]
fn delegation_forwards_values_and_return() {
    let source = "
        function* inner() { yield 1; yield 2; return 3; }
        function* outer() { let r = yield* inner(); yield r; }
        let it = outer();
        JSON.stringify([it.next().value, it.next().value, it.next().value, it.next().done]);
    ";
    assert_eq!(eval_str(source), "[1,2,3,true]");
}

#[test]
fn delegation_is_transparent_for_plain_iterators() {
    // An inner iterator with no throw/return: yield* produces exactly its
    // values and completes with its return value.
    let source = "
        function makeIter() {
            let i = 0;
            return {
                next() {
                    i += 1;
                    return i <= 3 ? { value: i * 10, done: false } : { value: 'end', done: true };
                },
            };
        }
        function* outer() { let r = yield* { [Symbol.iterator]() { return makeIter(); } }; yield r; }
        let it = outer();
        JSON.stringify([it.next().value, it.next().value, it.next().value, it.next().value]);
    ";
    assert_eq!(eval_str(source), r#"[10,20,30,"end"]"#);
}

#[test]
fn sent_values_resume_yield_expressions() {
    let source = "
        function* adder() {
            let total = 0;
            while (true) {
                let sent = yield total;
                if (sent === undefined) break;
                total += sent;
            }
            return total;
        }
        let it = adder();
        it.next();
        it.next(5);
        it.next(7);
        it.next().value;
    ";
    assert_eq!(eval_num(source), 12.0);
}

#[test]
fn completed_generators_stay_done() {
    let source = "
        function* g() { yield 1; }
        let it = g();
        it.next();
        it.next();
        let after = it.next();
        let ret = it.return(9);
        JSON.stringify([after.value === undefined, after.done, ret.value, ret.done]);
    ";
    assert_eq!(eval_str(source), "[true,true,9,true]");
}

#[test]
fn throw_into_suspended_generator() {
    let source = "
        function* g() {
            try {
                yield 'start';
                yield 'unreached';
            } catch (e) {
                yield 'caught:' + e;
            }
        }
        let it = g();
        it.next();
        JSON.stringify([it.throw('boom').value, it.next().done]);
    ";
    assert_eq!(eval_str(source), r#"["caught:boom",true]"#);
}

#[test]
fn throw_on_completed_generator_rethrows() {
    let mut engine = Engine::new();
    let err = engine
        .eval("function* g() {} let it = g(); it.next(); it.throw('late');", "test.js")
        .unwrap_err();
    assert_eq!(err.message(), "late");
}

#[test]
fn reentrant_next_is_a_type_error() {
    let source = "
        let it;
        function* g() { it.next(); yield 1; }
        it = g();
        try { it.next(); 'no-throw'; } catch (e) { e.name; }
    ";
    assert_eq!(eval_str(source), "TypeError");
}

#[test]
fn generators_are_iterable() {
    assert_eq!(eval_num("function* g() { yield 1; yield 2; } let s = 0; for (let v of g()) s += v; s;"), 3.0);
    assert_eq!(eval_str("function* g() { yield 'a'; yield 'b'; } [...g()].join('');"), "ab");
    assert_eq!(eval_num("function* g() { yield 1; yield 2; } let [x, y] = g(); x * 10 + y;"), 12.0);
}

#[test]
fn early_break_closes_generator_and_runs_finally() {
    // return() is the structured cancellation primitive: breaking a for…of
    // over a generator closes it, running its pending finally.
    let source = "
        let log = [];
        function* g() {
            try {
                yield 1;
                yield 2;
            } finally {
                log.push('closed');
            }
        }
        for (let v of g()) { if (v === 1) break; }
        log.join(',');
    ";
    assert_eq!(eval_str(source), "closed");
}

#[test]
fn labeled_break_through_finally_inside_generator() {
    let source = "
        function* g() {
            outer: for (let i of [1, 2]) {
                try {
                    yield 't' + i;
                    break outer;
                } finally {
                    yield 'f' + i;
                }
            }
            yield 'after';
        }
        JSON.stringify([...g()]);
    ";
    assert_eq!(eval_str(source), r#"["t1","f1","after"]"#);
}

#[test]
fn nested_finally_runs_innermost_first() {
    let source = "
        let log = [];
        function* g() {
            try {
                try {
                    yield 1;
                } finally {
                    log.push('inner');
                }
            } finally {
                log.push('outer');
            }
        }
        let it = g();
        it.next();
        it.return(0);
        log.join(',');
    ";
    assert_eq!(eval_str(source), "inner,outer");
}

#[test]
fn finally_can_override_pending_completion() {
    // A return inside finally overrides the throw that was unwinding.
    let source = "
        function* g() {
            try {
                yield 1;
            } finally {
                return 'overridden';
            }
        }
        let it = g();
        it.next();
        let r = it.throw('boom');
        JSON.stringify([r.value, r.done]);
    ";
    assert_eq!(eval_str(source), r#"["overridden",true]"#);
}

#[test]
fn loops_and_conditionals_inside_generators() {
    let source = "
        function* fizz(n) {
            for (let i = 1; i <= n; i++) {
                if (i % 3 === 0) { yield 'fizz'; } else { yield i; }
            }
        }
        JSON.stringify([...fizz(4)]);
    ";
    assert_eq!(eval_str(source), r#"[1,2,"fizz",4]"#);
}

#[test]
fn yield_inside_expressions() {
    let source = "
        function* g() {
            let doubled = (yield 'ask') * 2;
            yield doubled + (yield 'more');
        }
        let it = g();
        it.next();
        it.next(21);
        it.next(8).value;
    ";
    assert_eq!(eval_num(source), 50.0);
}

#[test]
fn generator_closures_capture_arguments() {
    let source = "
        function* range(start, end) {
            for (let i = start; i < end; i++) yield i;
        }
        [...range(3, 6)].join(',');
    ";
    assert_eq!(eval_str(source), "3,4,5");
}

#[test]
fn switch_inside_generator() {
    let source = "
        function* g(mode) {
            switch (mode) {
                case 'a': yield 1; break;
                case 'b': yield 2; yield 3; break;
                default: yield 0;
            }
        }
        JSON.stringify([[...g('a')], [...g('b')], [...g('z')]]);
    ";
    assert_eq!(eval_str(source), "[[1],[2,3],[0]]");
}

#[test]
fn delegation_return_passes_through() {
    // return() during delegation forwards to the inner generator first;
    // its finally runs before the outer completes.
    let source = "
        let log = [];
        function* inner() { try { yield 1; yield 2; } finally { log.push('inner-finally'); } }
        function* outer() { yield* inner(); }
        let it = outer();
        it.next();
        let r = it.return('stop');
        JSON.stringify([r.value, r.done, log[0]]);
    ";
    assert_eq!(eval_str(source), r#"["stop",true,"inner-finally"]"#);
}
