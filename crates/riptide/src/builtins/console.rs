//! `console.log` and the `__debug` checkpoint callable.

use crate::{
    ast::Span,
    call::Vm,
    error::RunResult,
    heap::HeapId,
    value::{self, Value},
};

use super::{Args, Builtin, RealmBuilder};

pub(crate) fn install(b: &mut RealmBuilder<'_>, global: HeapId) {
    let console = b.namespace();
    b.method(console, "log", Builtin::ConsoleLog);
    b.builtin_data(global, "console", Value::Ref(console));
}

/// `console.log(...)`: renders each argument, space-separated, newline
/// terminated, through the engine's print writer.
pub(crate) fn console_log(vm: &mut Vm<'_>, this: Value, mut args: Args) -> RunResult<Value> {
    this.drop_with_heap(vm.heap);
    let values = args.take_all();
    args.finish(vm);
    let mut first = true;
    for value in &values {
        if first {
            first = false;
        } else {
            vm.print.push(' ');
        }
        let rendered = value::inspect(vm.heap, vm.interns, value);
        vm.print.write_str(&rendered);
    }
    vm.print.push('\n');
    vm.drop_values(values);
    Ok(Value::Undefined)
}

/// `__debug()` reached through an indirect reference (the direct-call path
/// snapshots the caller's scope in the interpreter instead).
pub(crate) fn debug_hook(vm: &mut Vm<'_>, this: Value, args: Args, span: Span) -> RunResult<Value> {
    this.drop_with_heap(vm.heap);
    args.finish(vm);
    let env = vm.realm.global_env;
    crate::debug::emit_checkpoint(vm, env, span);
    Ok(Value::Undefined)
}
