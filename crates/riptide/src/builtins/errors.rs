//! Error constructors and prototypes.

use crate::{
    call::Vm,
    error::{ExcKind, RunResult},
    heap::{HeapData, HeapId},
    intern::StaticStrings,
    object::{PropKey, PropTable, Property},
    value::{self, Value},
};

use super::{Args, Builtin, RealmBuilder};

pub(crate) fn install(b: &mut RealmBuilder<'_>) {
    let kinds = [
        (ExcKind::Error, b.intrinsics.error_prototype),
        (ExcKind::TypeError, b.intrinsics.type_error_prototype),
        (ExcKind::RangeError, b.intrinsics.range_error_prototype),
        (ExcKind::ReferenceError, b.intrinsics.reference_error_prototype),
        (ExcKind::SyntaxError, b.intrinsics.syntax_error_prototype),
    ];
    for (kind, proto) in kinds {
        let name: &'static str = kind.into();
        let name_value = Value::Str(b.interns.intern(name));
        b.builtin_data(proto, "name", name_value);
        b.builtin_data(proto, "message", Value::Str(StaticStrings::EmptyString.id()));
    }
    b.method(b.intrinsics.error_prototype, "toString", Builtin::ErrorToString);
}

pub(crate) fn install_globals(b: &mut RealmBuilder<'_>, global: HeapId) {
    let kinds = [
        (ExcKind::Error, b.intrinsics.error_prototype),
        (ExcKind::TypeError, b.intrinsics.type_error_prototype),
        (ExcKind::RangeError, b.intrinsics.range_error_prototype),
        (ExcKind::ReferenceError, b.intrinsics.reference_error_prototype),
        (ExcKind::SyntaxError, b.intrinsics.syntax_error_prototype),
    ];
    for (kind, proto) in kinds {
        let name: &'static str = kind.into();
        let ctor = b.constructor(name, Builtin::ErrorCtor(kind), proto);
        b.builtin_data(global, name, ctor);
    }
}

/// Builds a JS error object for an engine-raised error.
pub(crate) fn make_error_value(vm: &mut Vm<'_>, kind: ExcKind, message: &str) -> Value {
    let proto = vm.realm.intrinsics.error_prototype_for(kind);
    vm.heap.inc_ref(proto);
    let mut table = PropTable::new(Some(proto));
    let message_value = Value::str(vm.heap, message);
    table.insert(PropKey::Atom(StaticStrings::Message.id()), Property::builtin(message_value));
    let stack = render_stack(vm, kind, message);
    let stack_value = Value::str(vm.heap, &stack);
    table.insert(PropKey::Atom(StaticStrings::Stack.id()), Property::builtin(stack_value));
    Value::Ref(vm.heap.alloc(HeapData::Object(table)))
}

fn render_stack(vm: &Vm<'_>, kind: ExcKind, message: &str) -> String {
    let mut out = if message.is_empty() { kind.to_string() } else { format!("{kind}: {message}") };
    for frame in vm.stack.iter().rev() {
        out.push_str("\n    at ");
        out.push_str(vm.interns.get(frame.name));
    }
    out
}

/// `Error("m")` and `new Error("m")` behave alike.
pub(crate) fn error_callable(vm: &mut Vm<'_>, kind: ExcKind, this: Value, args: Args) -> RunResult<Value> {
    this.drop_with_heap(vm.heap);
    error_construct(vm, kind, args)
}

pub(crate) fn error_construct(vm: &mut Vm<'_>, kind: ExcKind, mut args: Args) -> RunResult<Value> {
    let message = args.take(0);
    args.finish(vm);
    let text = if message.is_undefined() {
        String::new()
    } else {
        let s = value::to_string(vm, &message);
        message.drop_with_heap(vm.heap);
        s?
    };
    Ok(make_error_value(vm, kind, &text))
}

/// `Error.prototype.toString`: `Name: message` (or just the name).
pub(crate) fn error_to_string(vm: &mut Vm<'_>, this: Value, args: Args) -> RunResult<Value> {
    args.finish(vm);
    let name = crate::object::get(vm, &this, &PropKey::Atom(StaticStrings::Name.id()))?;
    let name_text = match value::to_string(vm, &name) {
        Ok(s) => s,
        Err(e) => {
            name.drop_with_heap(vm.heap);
            this.drop_with_heap(vm.heap);
            return Err(e);
        }
    };
    name.drop_with_heap(vm.heap);
    let message = crate::object::get(vm, &this, &PropKey::Atom(StaticStrings::Message.id()));
    this.drop_with_heap(vm.heap);
    let message = message?;
    let message_text = if message.is_undefined() {
        String::new()
    } else {
        let s = value::to_string(vm, &message);
        message.drop_with_heap(vm.heap);
        s?
    };
    let rendered = if message_text.is_empty() { name_text } else { format!("{name_text}: {message_text}") };
    Ok(Value::str(vm.heap, &rendered))
}
