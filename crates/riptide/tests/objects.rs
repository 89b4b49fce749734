//! Property model, prototypes, classes, and binding semantics.

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

fn eval_err(source: &str) -> riptide::Exception {
    let mut engine = Engine::new();
    engine.eval(source, "test.js").unwrap_err()
}

#[test]
fn getter_setter_dispatch() {
    // The setter doubles; the getter reads the backing slot.
    assert_eq!(eval_num("let o={_v:10,get v(){return this._v},set v(x){this._v=x*2}}; o.v=5; o.v;"), 10.0);
}

#[test]
fn accessor_on_prototype_uses_receiver() {
    let source = "
        class Meters {
            constructor(m) { this.m = m; }
            get feet() { return this.m * 3; }
            set feet(f) { this.m = f / 3; }
        }
        let x = new Meters(2);
        x.feet = 9;
        x.m * 100 + x.feet;
    ";
    assert_eq!(eval_num(source), 309.0);
}

#[test]
fn object_literal_features() {
    assert_eq!(eval_num("let key = 'dyn'; let o = { [key + '1']: 7 }; o.dyn1;"), 7.0);
    assert_eq!(eval_num("let x = 4; let o = { x }; o.x;"), 4.0);
    assert_eq!(eval_num("let o = { m() { return 6; } }; o.m();"), 6.0);
    assert_eq!(eval_num("let base = { a: 1 }; let o = { ...base, b: 2 }; o.a + o.b;"), 3.0);
}

#[test]
fn property_operations() {
    assert_eq!(eval("let o = { a: 1 }; 'a' in o;"), JsValue::Bool(true));
    assert_eq!(eval("let o = { a: 1 }; delete o.a; 'a' in o;"), JsValue::Bool(false));
    assert_eq!(eval("let o = { a: 1 }; o.hasOwnProperty('a');"), JsValue::Bool(true));
    assert_eq!(eval_str("Object.keys({ b: 1, a: 2 }).join(',');"), "b,a");
    assert_eq!(eval_num("Object.values({ a: 1, b: 2 }).reduce((x, y) => x + y);"), 3.0);
    assert_eq!(eval_str("Object.entries({ a: 1 })[0].join('=');"), "a=1");
    assert_eq!(eval_num("Object.assign({ a: 1 }, { b: 2 }, { a: 3 }).a;"), 3.0);
}

#[test]
fn enumeration_order_is_integers_then_insertion() {
    assert_eq!(
        eval_str("let o = { b: 0, 2: 0, a: 0, 1: 0 }; Object.keys(o).join(',');"),
        "1,2,b,a",
    );
}

#[test]
fn frozen_objects_reject_writes_silently() {
    let source = "
        let o = Object.freeze({ a: 1 });
        o.a = 99;
        o.b = 2;
        [o.a, 'b' in o].join(',');
    ";
    assert_eq!(eval_str(source), "1,false");
}

#[test]
fn prototype_fallback_through_classes() {
    let source = "
        class A { foo() { return 'A'; } }
        class B extends A {}
        new B().foo();
    ";
    assert_eq!(eval_str(source), "A");
}

#[test]
fn class_with_constructor_and_super() {
    let source = "
        class Animal {
            constructor(name) { this.name = name; }
            speak() { return this.name + ' makes a sound'; }
        }
        class Dog extends Animal {
            constructor(name) { super(name + '!'); }
            speak() { return super.speak() + ' (woof)'; }
        }
        new Dog('Rex').speak();
    ";
    assert_eq!(eval_str(source), "Rex! makes a sound (woof)");
}

#[test]
fn static_members_and_instanceof() {
    let source = "
        class Counter {
            static make() { return new Counter(); }
        }
        Counter.make() instanceof Counter;
    ";
    assert_eq!(eval(source), JsValue::Bool(true));
    assert_eq!(
        eval("class A {} class B extends A {} let b = new B(); (b instanceof A) && (b instanceof B);"),
        JsValue::Bool(true),
    );
}

#[test]
fn derived_this_before_super_fails() {
    let err = eval_err(
        "class A {}
         class B extends A { constructor() { this.x = 1; super(); } }
         new B();",
    );
    assert_eq!(err.name(), Some("ReferenceError"));
}

#[test]
fn default_derived_constructor_forwards_args() {
    let source = "
        class A { constructor(x) { this.x = x; } }
        class B extends A {}
        new B(41).x + 1;
    ";
    assert_eq!(eval_num(source), 42.0);
}

#[test]
fn tdz_read_throws_reference_error() {
    let err = eval_err("x; let x = 1;");
    assert_eq!(err.kind(), ExceptionKind::Eval);
    assert_eq!(err.name(), Some("ReferenceError"));

    let err = eval_err("function f() { y; let y = 2; } f();");
    assert_eq!(err.name(), Some("ReferenceError"));
}

#[test]
fn const_assignment_throws_type_error() {
    let err = eval_err("const c = 1; c = 2;");
    assert_eq!(err.name(), Some("TypeError"));
}

#[test]
fn var_hoisting_reads_undefined() {
    assert_eq!(eval_str("function f() { let seen = typeof v; var v = 1; return seen; } f();"), "undefined");
}

#[test]
fn function_declarations_hoist_with_value() {
    assert_eq!(eval_num("function f() { return g() + 1; } function g() { return 41; } f();"), 42.0);
}

#[test]
fn block_scoping_shadows() {
    assert_eq!(eval_num("let x = 1; { let x = 2; } x;"), 1.0);
    assert_eq!(eval_num("let x = 1; { x = 2; } x;"), 2.0);
}

#[test]
fn arrays_have_length_semantics() {
    assert_eq!(eval_num("let a = [1, 2, 3]; a.length = 1; a.length;"), 1.0);
    assert!(eval("let a = [1, 2, 3]; a.length = 1; a[1];").is_undefined());
    assert_eq!(eval_num("let a = []; a[3] = 1; a.length;"), 4.0);
    assert!(eval("let a = []; a[2] = 1; a[0];").is_undefined());
}

#[test]
fn optional_chaining_short_circuits() {
    assert!(eval("let o = null; o?.x;").is_undefined());
    assert!(eval("let o = null; o?.x.y.z;").is_undefined());
    assert!(eval("let o = { f: null }; o.f?.();").is_undefined());
    assert_eq!(eval_num("let o = { x: { y: 5 } }; o?.x?.y;"), 5.0);
}

#[test]
fn arguments_object_and_rest() {
    assert_eq!(eval_num("function f() { return arguments.length; } f(1, 2, 3);"), 3.0);
    assert_eq!(eval_num("function f(a, ...rest) { return rest[1]; } f(1, 2, 3);"), 3.0);
}

#[test]
fn this_binding_rules() {
    assert_eq!(eval_num("let o = { v: 7, read() { return this.v; } }; o.read();"), 7.0);
    // Arrows inherit `this` from the defining frame.
    assert_eq!(
        eval_num("let o = { v: 9, read() { let f = () => this.v; return f(); } }; o.read();"),
        9.0,
    );
    // Extracted methods lose their receiver.
    let err = eval_err("let o = { v: 7, read() { return this.v; } }; let f = o.read; f();");
    assert_eq!(err.name(), Some("TypeError"));
}

#[test]
fn function_call_and_apply() {
    assert_eq!(eval_num("function f(a, b) { return this.base + a + b; } f.call({ base: 1 }, 2, 3);"), 6.0);
    assert_eq!(eval_num("function f(a, b) { return this.base + a + b; } f.apply({ base: 1 }, [2, 3]);"), 6.0);
}

#[test]
fn thrown_errors_carry_name_and_message() {
    let err = eval_err("throw new TypeError('bad thing');");
    assert_eq!(err.name(), Some("TypeError"));
    assert_eq!(err.message(), "bad thing");

    let err = eval_err("undefinedVariable + 1;");
    assert_eq!(err.name(), Some("ReferenceError"));

    let err = eval_err("null.x;");
    assert_eq!(err.name(), Some("TypeError"));
}

#[test]
fn error_objects_are_catchable_values() {
    assert_eq!(eval_str("try { null.x; } catch (e) { e.name; }"), "TypeError");
    assert_eq!(
        eval_str("try { throw new RangeError('r'); } catch (e) { e instanceof RangeError ? 'yes' : 'no'; }"),
        "yes",
    );
    assert_eq!(eval_str("new Error('m').toString();"), "Error: m");
}

#[test]
fn deep_recursion_overflows_safely() {
    let err = eval_err("function down(n) { return down(n + 1); } down(0);");
    assert_eq!(err.kind(), ExceptionKind::Eval);
    assert_eq!(err.name(), Some("RangeError"));
}
