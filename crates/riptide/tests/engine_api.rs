//! The host-facing surface: natives, sync evaluation, deadlines, the debug
//! channel, disposal, and console routing.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use riptide::{
    DebugLossPolicy, DebugState, Engine, EngineConfig, Exception, ExceptionKind, JsValue, PrintWriter,
};

#[test]
fn native_callables_receive_arguments() {
    let mut engine = Engine::new();
    engine.register_native("add", |call| {
        let a = call.arg(0).as_f64().unwrap_or(0.0);
        let b = call.arg(1).as_f64().unwrap_or(0.0);
        Ok(JsValue::Number(a + b))
    });
    let result = engine.eval("add(40, 2);", "test.js").unwrap();
    assert_eq!(result.as_f64(), Some(42.0));
}

#[test]
fn native_errors_surface_as_js_throws() {
    let mut engine = Engine::new();
    engine.register_native("explode", |_call| Err(Exception::host_misuse("host says no")));
    let result = engine.eval("try { explode(); 'no-throw'; } catch (e) { e.message; }", "test.js").unwrap();
    assert_eq!(result.as_str(), Some("host says no"));
}

#[test]
fn natives_can_reenter_the_engine() {
    let mut engine = Engine::new();
    engine.eval("let base = 40;", "setup.js").unwrap();
    engine.register_native("reenter", |call| call.eval("base + 2;"));
    let result = engine.eval("reenter();", "test.js").unwrap();
    assert_eq!(result.as_f64(), Some(42.0));
}

#[test]
fn natives_receive_structured_values() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let mut engine = Engine::new();
    engine.register_native("collect", move |call| {
        sink.borrow_mut().push(call.arg(0));
        Ok(JsValue::Undefined)
    });
    engine.eval("collect([1, 'two', { three: 3 }]);", "test.js").unwrap();
    let captured = seen.borrow();
    let JsValue::Array(items) = &captured[0] else { panic!("expected an array") };
    assert_eq!(items[0], JsValue::Number(1.0));
    assert_eq!(items[1], JsValue::String("two".to_owned()));
    assert_eq!(items[2], JsValue::Object(vec![("three".to_owned(), JsValue::Number(3.0))]));
}

#[test]
fn eval_sync_runs_plain_programs() {
    let mut engine = Engine::new();
    let result = engine.eval_sync("[1, 2, 3].map(x => x * 2).join(',');", "test.js").unwrap();
    assert_eq!(result.as_str(), Some("2,4,6"));
}

#[test]
fn eval_sync_rejects_suspending_programs() {
    let mut engine = Engine::new();
    let err = engine.eval_sync("(async () => await 1)();", "test.js").unwrap_err();
    assert_eq!(err.kind(), ExceptionKind::HostMisuse);
    assert!(err.message().contains("sync"));

    let err = engine.eval_sync("Promise.resolve(1);", "test.js").unwrap_err();
    assert_eq!(err.kind(), ExceptionKind::HostMisuse);
}

#[test]
fn deadline_stops_runaway_loops() {
    let mut engine = Engine::new();
    let err = engine
        .eval_with_deadline("while (true) {}", "test.js", Duration::from_millis(50))
        .unwrap_err();
    assert_eq!(err.kind(), ExceptionKind::Deadline);
}

#[test]
fn never_settling_promise_is_host_misuse() {
    let mut engine = Engine::new();
    let err = engine.eval("new Promise(() => {});", "test.js").unwrap_err();
    assert_eq!(err.kind(), ExceptionKind::HostMisuse);
}

#[test]
fn pending_promise_registry_tracks_unsettled_promises() {
    let mut engine = Engine::new();
    engine.eval("let held = new Promise(() => {}); 1;", "test.js").unwrap();
    assert_eq!(engine.pending_promises(), 1);
    engine.eval("let settled = Promise.resolve(1); 1;", "test.js").unwrap();
    assert_eq!(engine.pending_promises(), 1);
}

#[test]
fn disposed_engines_refuse_work() {
    let mut engine = Engine::new();
    engine.eval("1;", "test.js").unwrap();
    engine.dispose();
    let err = engine.eval("2;", "test.js").unwrap_err();
    assert_eq!(err.kind(), ExceptionKind::Shutdown);
}

/// Collects console output into shared storage the test can read back.
struct SharedPrint(Rc<RefCell<String>>);

impl PrintWriter for SharedPrint {
    fn write_str(&mut self, output: &str) {
        self.0.borrow_mut().push_str(output);
    }

    fn push(&mut self, ch: char) {
        self.0.borrow_mut().push(ch);
    }
}

#[test]
fn console_log_routes_through_print_writer() {
    let output = Rc::new(RefCell::new(String::new()));
    let mut engine = Engine::new();
    engine.set_print_writer(Box::new(SharedPrint(Rc::clone(&output))));
    engine.eval("console.log('a', 1, [2, 3], { k: 'v' });", "test.js").unwrap();
    assert_eq!(output.borrow().as_str(), "a 1 [2, 3] { k: \"v\" }\n");
}

#[test]
fn debug_checkpoints_snapshot_variables() {
    let mut engine = Engine::new();
    engine.eval("let x = 1; __debug(); x = 2; __debug();", "test.js").unwrap();
    let messages = engine.drain_debug();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].state, DebugState::TopLevel);
    assert!(messages[0].variables.iter().any(|(name, value)| name == "x" && value == "1"));
    assert!(messages[1].variables.iter().any(|(name, value)| name == "x" && value == "2"));
    assert_eq!(messages[0].script, "test.js");
}

#[test]
fn debug_messages_arrive_in_program_order() {
    let mut engine = Engine::new();
    engine
        .eval(
            "function step(n) { let tag = n; __debug(); }
             for (let i = 0; i < 3; i++) step(i);",
            "test.js",
        )
        .unwrap();
    let messages = engine.drain_debug();
    assert_eq!(messages.len(), 3);
    for (i, message) in messages.iter().enumerate() {
        assert_eq!(message.state, DebugState::Function);
        assert!(message.variables.iter().any(|(name, value)| name == "tag" && value == &i.to_string()));
        assert!(message.stack.iter().any(|frame| frame.contains("step")));
    }
}

#[test]
fn debugger_statement_emits_checkpoints() {
    let mut engine = Engine::new();
    engine.eval("let y = 'seen'; debugger;", "test.js").unwrap();
    let messages = engine.drain_debug();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].variables.iter().any(|(name, value)| name == "y" && value == "\"seen\""));
}

#[test]
fn debug_channel_is_bounded_and_lossy() {
    let mut engine = Engine::with_config(EngineConfig {
        debug_capacity: 2,
        debug_loss_policy: DebugLossPolicy::DropOldest,
        ..EngineConfig::default()
    });
    engine.eval("for (let i = 0; i < 5; i++) { let mark = i; __debug(); }", "test.js").unwrap();
    let messages = engine.drain_debug();
    assert_eq!(messages.len(), 2);
    assert_eq!(engine.debug_messages_dropped(), 3);
    // DropOldest keeps the newest checkpoints.
    assert!(messages[1].variables.iter().any(|(name, value)| name == "mark" && value == "4"));
}

#[test]
fn generator_checkpoints_carry_the_state_tag() {
    let mut engine = Engine::new();
    engine.eval("function* g() { __debug(); yield 1; } g().next();", "test.js").unwrap();
    let messages = engine.drain_debug();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].state, DebugState::Generator);
}

#[test]
fn parse_returns_an_ast_handle() {
    let mut engine = Engine::new();
    let ast = engine.parse("let a = 1; a + 2;", "inspect.js").unwrap();
    assert_eq!(ast.statement_count(), 2);
    assert_eq!(ast.name(), "inspect.js");
    assert!(!ast.is_empty());
}

#[test]
fn ir_diagnostics_count_plans() {
    let mut engine = Engine::new();
    engine.eval("function* g() { yield 1; } async function f() { await 1; }", "test.js").unwrap();
    let diags = engine.ir_diagnostics();
    assert_eq!(diags.plans_built, 2);
    assert_eq!(diags.rejected(), 0);
}

#[test]
fn deterministic_debug_streams() {
    let source = "for (let i = 0; i < 3; i++) { let v = i * 2; __debug(); }";
    let mut first = Engine::new();
    first.eval(source, "test.js").unwrap();
    let mut second = Engine::new();
    second.eval(source, "test.js").unwrap();
    let a: Vec<_> = first.drain_debug().into_iter().map(|m| m.variables).collect();
    let b: Vec<_> = second.drain_debug().into_iter().map(|m| m.variables).collect();
    assert_eq!(a, b);
}

#[test]
fn exceptions_carry_locations_and_frames() {
    let mut engine = Engine::new();
    let err = engine
        .eval(
            "function inner() { throw new TypeError('deep'); }\nfunction outer() { inner(); }\nouter();",
            "test.js",
        )
        .unwrap_err();
    assert_eq!(err.name(), Some("TypeError"));
    assert_eq!(err.message(), "deep");
    assert!(err.location().is_some());
    let functions: Vec<&str> = err.frames().iter().map(|f| f.function.as_str()).collect();
    assert!(functions.contains(&"inner"));
    assert!(functions.contains(&"outer"));
}
