//! Parse-time rejection: syntax errors and unsupported constructs.

use riptide::{Engine, ExceptionKind};

fn parse_err(source: &str) -> riptide::Exception {
    let mut engine = Engine::new();
    engine.eval(source, "test.js").unwrap_err()
}

#[test]
fn syntax_errors_are_parse_failures() {
    let err = parse_err("let = 1;");
    assert_eq!(err.kind(), ExceptionKind::Parse);

    let err = parse_err("function ( {");
    assert_eq!(err.kind(), ExceptionKind::Parse);

    let err = parse_err("if (true {}");
    assert_eq!(err.kind(), ExceptionKind::Parse);
}

#[test]
fn parse_errors_carry_locations() {
    let err = parse_err("let x = 1;\nlet y = ;");
    assert_eq!(err.kind(), ExceptionKind::Parse);
    assert_eq!(err.name(), Some("SyntaxError"));
}

#[test]
fn unsupported_constructs_are_rejected() {
    for source in [
        "with (Math) { floor(1.5); }",
        "import x from 'mod';",
        "export const a = 1;",
        "tag`template`;",
        "let big = 1n;",
        "class C { #secret = 1; }",
        "class C { static { } }",
    ] {
        let err = parse_err(source);
        assert_eq!(err.kind(), ExceptionKind::Parse, "expected parse rejection for: {source}");
    }
}

#[test]
fn yield_and_await_need_their_contexts() {
    // The parser itself refuses these placements.
    let err = parse_err("function f() { yield 1; }");
    assert_eq!(err.kind(), ExceptionKind::Parse);

    let err = parse_err("function f() { await 1; }");
    // Sloppy-mode `await` outside async parses as an identifier, so this
    // is either a parse error or an evaluation-time reference error.
    assert!(matches!(err.kind(), ExceptionKind::Parse | ExceptionKind::Eval));
}

#[test]
fn empty_and_comment_only_sources_evaluate() {
    let mut engine = Engine::new();
    assert!(engine.eval("", "test.js").unwrap().is_undefined());
    assert!(engine.eval("// just a comment\n/* and a block */", "test.js").unwrap().is_undefined());
}

#[test]
fn deep_nesting_is_bounded() {
    let mut source = String::new();
    for _ in 0..500 {
        source.push('(');
    }
    source.push('1');
    for _ in 0..500 {
        source.push(')');
    }
    source.push(';');
    let err = parse_err(&source);
    assert_eq!(err.kind(), ExceptionKind::Parse);
}
