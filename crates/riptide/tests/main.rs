//! Core language smoke tests: expressions, statements, closures, and the
//! persistent-engine behavior of the facade.

use riptide::{Engine, JsValue};

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
fn arithmetic_and_precedence() {
    assert_eq!(eval_num("1 + 2 * 3;"), 7.0);
    assert_eq!(eval_num("(1 + 2) * 3;"), 9.0);
    assert_eq!(eval_num("2 ** 10;"), 1024.0);
    assert_eq!(eval_num("7 % 3;"), 1.0);
    assert_eq!(eval_num("-7 % 3;"), -1.0);
}

#[test]
fn arrow_closure_over_lets() {
    // let a=1,b=2;let f=(x,y)=>x*y+a+b;f(3,4) is the canonical closure
    // scenario: 12 + 1 + 2.
    assert_eq!(eval_num("let a=1,b=2;let f=(x,y)=>x*y+a+b;f(3,4);"), 15.0);
}

#[test]
fn string_concat_and_templates() {
    assert_eq!(eval_str(r#""foo" + "bar";"#), "foobar");
    assert_eq!(eval_str("`a${1 + 1}c`;"), "a2c");
    assert_eq!(eval_str("let x = 3; `x is ${x}!`;"), "x is 3!");
    assert_eq!(eval_str(r#"1 + "2";"#), "12");
}

#[test]
fn comparison_and_equality() {
    assert_eq!(eval("1 < 2;"), JsValue::Bool(true));
    assert_eq!(eval(r#""a" < "b";"#), JsValue::Bool(true));
    assert_eq!(eval("1 == \"1\";"), JsValue::Bool(true));
    assert_eq!(eval("1 === \"1\";"), JsValue::Bool(false));
    assert_eq!(eval("null == undefined;"), JsValue::Bool(true));
    assert_eq!(eval("null === undefined;"), JsValue::Bool(false));
    assert_eq!(eval("NaN === NaN;"), JsValue::Bool(false));
}

#[test]
fn logical_short_circuit() {
    assert_eq!(eval_num("let hits = 0; let bump = () => { hits += 1; return true; }; false && bump(); hits;"), 0.0);
    assert_eq!(eval_num("let hits = 0; let bump = () => { hits += 1; return true; }; true || bump(); hits;"), 0.0);
    assert_eq!(eval_str(r#"null ?? "fallback";"#), "fallback");
    assert_eq!(eval_num("0 ?? 42;"), 0.0);
}

#[test]
fn loops_and_labels() {
    assert_eq!(eval_num("let s = 0; for (let i = 1; i <= 4; i++) s += i; s;"), 10.0);
    assert_eq!(eval_num("let s = 0; let i = 0; while (i < 5) { i++; if (i === 3) continue; s += i; } s;"), 12.0);
    assert_eq!(eval_num("let s = 0; do { s += 1; } while (false); s;"), 1.0);
    assert_eq!(
        eval_num(
            "let hits = 0;
             outer: for (let i = 0; i < 3; i++) {
                 for (let j = 0; j < 3; j++) {
                     if (j === 1) continue outer;
                     hits += 1;
                 }
             }
             hits;",
        ),
        3.0,
    );
}

#[test]
fn switch_fallthrough_and_default() {
    let source = "
        function pick(n) {
            let out = [];
            switch (n) {
                case 1:
                    out.push('one');
                case 2:
                    out.push('two');
                    break;
                default:
                    out.push('other');
            }
            return out.join(',');
        }
        [pick(1), pick(2), pick(9)].join('|');
    ";
    assert_eq!(eval_str(source), "one,two|two|other");
}

#[test]
fn try_finally_ordering() {
    let source = "
        let log = [];
        function f() {
            try {
                log.push('try');
                return 'from-try';
            } finally {
                log.push('finally');
            }
        }
        f();
        log.join(',');
    ";
    assert_eq!(eval_str(source), "try,finally");
}

#[test]
fn finally_overrides_completion() {
    assert_eq!(eval_str("function f(){ try { return 'a'; } finally { return 'b'; } } f();"), "b");
    assert_eq!(
        eval_str(
            "function f(){ try { throw 'boom'; } finally { return 'recovered'; } }
             f();",
        ),
        "recovered",
    );
}

#[test]
fn catch_binds_thrown_value() {
    assert_eq!(eval_str("try { throw 'payload'; } catch (e) { e + '!'; }"), "payload!");
    assert_eq!(
        eval_str("let out; try { throw { code: 'E42' }; } catch ({ code }) { out = code; } out;"),
        "E42",
    );
}

#[test]
fn labeled_break_runs_finally() {
    let source = "
        let log = [];
        outer: for (let i of [1, 2]) {
            try {
                log.push('t' + i);
                break outer;
            } finally {
                log.push('f' + i);
            }
        }
        log.join(',');
    ";
    assert_eq!(eval_str(source), "t1,f1");
}

#[test]
fn destructuring_with_defaults_and_rest() {
    assert_eq!(eval_num("let [a, b = 10, ...rest] = [1, undefined, 3, 4]; a + b + rest.length;"), 13.0);
    assert_eq!(eval_num("let { x, y: z = 5, ...others } = { x: 1, w: 2, v: 3 }; x + z + others.w;"), 8.0);
    assert_eq!(eval_num("function f({ a, b } = { a: 1, b: 2 }) { return a + b; } f();"), 3.0);
}

#[test]
fn spread_in_calls_and_literals() {
    assert_eq!(eval_num("function add3(a, b, c) { return a + b + c; } add3(...[1, 2, 3]);"), 6.0);
    assert_eq!(eval_num("let a = [2, 3]; [1, ...a, 4].length;"), 4.0);
    assert_eq!(eval_str("let s = [...'abc']; s.join('-');"), "a-b-c");
}

#[test]
fn state_persists_across_evals() {
    let mut engine = Engine::new();
    engine.eval("let counter = 0; function bump() { counter += 1; }", "setup.js").unwrap();
    engine.eval("bump(); bump();", "tick.js").unwrap();
    let result = engine.eval("counter;", "read.js").unwrap();
    assert_eq!(result.as_f64(), Some(2.0));
}

#[test]
fn completion_value_is_last_expression() {
    assert_eq!(eval_num("1; 2; 3;"), 3.0);
    assert!(eval("let x = 5;").is_undefined());
}

#[test]
fn typeof_and_void() {
    assert_eq!(eval_str("typeof 1;"), "number");
    assert_eq!(eval_str("typeof 'x';"), "string");
    assert_eq!(eval_str("typeof undefined;"), "undefined");
    assert_eq!(eval_str("typeof null;"), "object");
    assert_eq!(eval_str("typeof (() => 1);"), "function");
    assert_eq!(eval_str("typeof neverDeclared;"), "undefined");
    assert!(eval("void 42;").is_undefined());
}

#[test]
fn update_and_compound_assignment() {
    assert_eq!(eval_num("let x = 1; x++; ++x; x;"), 3.0);
    assert_eq!(eval_num("let x = 5; let y = x--; y * 10 + x;"), 54.0);
    assert_eq!(eval_num("let x = 2; x **= 3; x |= 1; x;"), 9.0);
    assert_eq!(eval_num("let o = { n: 1 }; o.n += 41; o.n;"), 42.0);
}

#[test]
fn math_and_number_builtins() {
    assert_eq!(eval_num("Math.max(1, 9, 4);"), 9.0);
    assert_eq!(eval_num("Math.floor(2.9) + Math.ceil(2.1);"), 5.0);
    assert_eq!(eval_num("Math.abs(-4) ** 0.5;"), 2.0);
    assert_eq!(eval_num("parseInt('2f', 16);"), 47.0);
    assert_eq!(eval_num("parseFloat('3.5rem');"), 3.5);
    assert_eq!(eval("Number.isInteger(4);"), JsValue::Bool(true));
    assert_eq!(eval("Number.isInteger(4.5);"), JsValue::Bool(false));
    assert_eq!(eval("isNaN('abc');"), JsValue::Bool(true));
}

#[test]
fn string_builtins() {
    assert_eq!(eval_str("'hello'.toUpperCase();"), "HELLO");
    assert_eq!(eval_str("'  pad  '.trim();"), "pad");
    assert_eq!(eval_str("'abcdef'.slice(1, -1);"), "bcde");
    assert_eq!(eval_num("'abc'.charCodeAt(1);"), 98.0);
    assert_eq!(eval_str("'a-b-c'.split('-').join('+');"), "a+b+c");
    assert_eq!(eval_str("'5'.padStart(3, '0');"), "005");
    assert_eq!(eval("'hello'.includes('ell');"), JsValue::Bool(true));
    assert_eq!(eval("'hello'.startsWith('he');"), JsValue::Bool(true));
    assert_eq!(eval_num("'hello'.length;"), 5.0);
    assert_eq!(eval_str("'ab'.repeat(3);"), "ababab");
}

#[test]
fn array_builtins() {
    assert_eq!(eval_num("[1, 2, 3].map(x => x * 2).reduce((a, b) => a + b, 0);"), 12.0);
    assert_eq!(eval_num("[1, 2, 3, 4].filter(x => x % 2 === 0).length;"), 2.0);
    assert_eq!(eval_num("[5, 1, 4].sort()[0];"), 1.0);
    assert_eq!(eval_num("[5, 1, 10].sort((a, b) => a - b)[2];"), 10.0);
    assert_eq!(eval_num("[1, [2, [3]]].flat(2).length;"), 3.0);
    assert_eq!(eval_num("let a = [1, 2, 3]; a.splice(1, 1); a[1];"), 3.0);
    assert_eq!(eval("[1, 2, NaN].includes(NaN);"), JsValue::Bool(true));
    assert_eq!(eval_num("[1, 2, 3].indexOf(3);"), 2.0);
    assert_eq!(eval_num("[1, 2].concat([3, 4], 5).length;"), 5.0);
    assert_eq!(eval_num("[3, 1].reverse()[0];"), 1.0);
    assert_eq!(eval("[1, 2, 3].some(x => x > 2);"), JsValue::Bool(true));
    assert_eq!(eval("[1, 2, 3].every(x => x > 0);"), JsValue::Bool(true));
    assert_eq!(eval_num("[1, 2, 3].find(x => x > 1);"), 2.0);
    assert_eq!(eval_num("[1, 2, 3].findIndex(x => x > 1);"), 1.0);
    assert_eq!(eval_num("let a = []; a.push(1, 2); a.unshift(0); a.pop(); a.shift(); a[0];"), 1.0);
}

#[test]
fn json_round_trip() {
    assert_eq!(eval_str(r#"JSON.stringify({ a: [1, 2], b: "x" });"#), r#"{"a":[1,2],"b":"x"}"#);
    assert_eq!(eval_num(r#"JSON.parse('{"n": 41}').n + 1;"#), 42.0);
    assert_eq!(eval_str(r#"JSON.stringify([undefined, () => 1]);"#), "[null,null]");
    assert!(eval("JSON.stringify(undefined);").is_undefined());
}

#[test]
fn json_stringify_rejects_cycles() {
    let mut engine = Engine::new();
    let err = engine.eval("let a = {}; a.self = a; JSON.stringify(a);", "test.js").unwrap_err();
    assert_eq!(err.name(), Some("TypeError"));
}

#[test]
fn date_subset() {
    assert_eq!(eval_str("new Date(0).toISOString();"), "1970-01-01T00:00:00.000Z");
    assert_eq!(eval_num("new Date(2024, 2, 1).getMonth();"), 2.0);
    assert_eq!(eval_str("typeof Date.now();"), "number");
    assert_eq!(eval_num("new Date(86400000).getDate();"), 2.0);
}

#[test]
fn regexp_basics() {
    assert_eq!(eval("/a.c/.test('abc');"), JsValue::Bool(true));
    assert_eq!(eval_str("/a(b+)c/.exec('xabbc')[1];"), "bb");
    assert_eq!(eval_num("/b/.exec('abc').index;"), 1.0);
    assert_eq!(eval_str("'aaa'.replace(/a/g, 'b');"), "bbb");
    assert_eq!(eval_str("'a1b22'.match(/\\d+/g).join('-');"), "1-22");
    assert_eq!(eval_num("'xxaby'.search(/ab/);"), 2.0);
    assert_eq!(eval_str("'a-b'.replace(/(\\w)-(\\w)/, '$2-$1');"), "b-a");
    assert_eq!(eval_str("new RegExp('ab', 'i').source;"), "ab");
}

#[test]
fn for_in_over_keys() {
    assert_eq!(eval_str("let out = []; for (let k in { a: 1, b: 2 }) out.push(k); out.join(',');"), "a,b");
}

#[test]
fn for_of_over_values() {
    assert_eq!(eval_num("let s = 0; for (let v of [1, 2, 3]) s += v; s;"), 6.0);
    assert_eq!(eval_str("let out = ''; for (let c of 'abc') out += c.toUpperCase(); out;"), "ABC");
}

#[test]
fn conditional_and_sequence() {
    assert_eq!(eval_str("true ? 'a' : 'b';"), "a");
    assert_eq!(eval_num("let x = (1, 2, 3); x;"), 3.0);
}

#[test]
fn deterministic_across_engines() {
    let source = "
        let out = [];
        for (let i = 0; i < 5; i++) out.push(i * 3 % 7);
        JSON.stringify(out);
    ";
    assert_eq!(eval_str(source), eval_str(source));
}
