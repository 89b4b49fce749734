//! The `Promise` surface: constructor, `then`/`catch`/`finally`, and the
//! combinators.
//!
//! The state machine itself lives in [`crate::promise`]; this module wires
//! script-visible callables onto it.

use crate::{
    ast::Span,
    call::{self, Vm},
    error::{RunError, RunResult},
    heap::{HeapData, HeapId},
    promise::{self as driver, GroupKind, GroupRecord, Handler, Reaction},
    value::Value,
};

use super::{Args, Builtin, RealmBuilder};

pub(crate) fn install_prototype(b: &mut RealmBuilder<'_>) {
    let proto = b.intrinsics.promise_prototype;
    b.method(proto, "then", Builtin::PromiseThen);
    b.method(proto, "catch", Builtin::PromiseCatch);
    b.method(proto, "finally", Builtin::PromiseFinally);
}

pub(crate) fn install_globals(b: &mut RealmBuilder<'_>, global: HeapId) {
    let ctor = b.constructor("Promise", Builtin::PromiseCtor, b.intrinsics.promise_prototype);
    let Value::Ref(ctor_id) = &ctor else { unreachable!() };
    let ctor_id = *ctor_id;
    b.method(ctor_id, "resolve", Builtin::PromiseResolve);
    b.method(ctor_id, "reject", Builtin::PromiseReject);
    b.method(ctor_id, "all", Builtin::PromiseAll);
    b.method(ctor_id, "race", Builtin::PromiseRace);
    b.method(ctor_id, "allSettled", Builtin::PromiseAllSettled);
    b.method(ctor_id, "any", Builtin::PromiseAny);
    b.builtin_data(global, "Promise", ctor);
}

/// `new Promise(executor)`.
pub(crate) fn promise_construct(vm: &mut Vm<'_>, mut args: Args, span: Span) -> RunResult<Value> {
    let executor = args.take(0);
    args.finish(vm);
    if !executor.is_callable(vm.heap) {
        executor.drop_with_heap(vm.heap);
        return Err(RunError::type_error("Promise resolver is not a function"));
    }
    let promise = driver::new_promise(vm);
    let (resolve_fn, reject_fn) = driver::resolver_pair(vm, promise);
    let result = call::call_value(vm, &executor, Value::Undefined, vec![resolve_fn, reject_fn], span);
    executor.drop_with_heap(vm.heap);
    match result {
        Ok(v) => v.drop_with_heap(vm.heap),
        Err(e) if e.is_catchable() => {
            let reason = driver::error_to_value(vm, e);
            driver::reject(vm, promise, reason);
        }
        Err(fatal) => {
            vm.heap.dec_ref(promise);
            return Err(fatal);
        }
    }
    Ok(Value::Ref(promise))
}

fn this_promise(vm: &Vm<'_>, this: &Value) -> RunResult<HeapId> {
    match this {
        Value::Ref(id) if vm.heap.promise(*id).is_some() => Ok(*id),
        _ => Err(RunError::type_error("Promise method called on a non-Promise")),
    }
}

pub(crate) fn dispatch(
    vm: &mut Vm<'_>,
    builtin: Builtin,
    this: Value,
    mut args: Args,
    span: Span,
) -> RunResult<Value> {
    match builtin {
        Builtin::PromiseResolve => {
            this.drop_with_heap(vm.heap);
            let value = args.take(0);
            args.finish(vm);
            let promise = driver::promise_of(vm, value);
            Ok(Value::Ref(promise))
        }
        Builtin::PromiseReject => {
            this.drop_with_heap(vm.heap);
            let reason = args.take(0);
            args.finish(vm);
            let promise = driver::new_promise(vm);
            driver::reject(vm, promise, reason);
            Ok(Value::Ref(promise))
        }
        Builtin::PromiseThen | Builtin::PromiseCatch | Builtin::PromiseFinally => {
            let promise = match this_promise(vm, &this) {
                Ok(p) => p,
                Err(e) => {
                    this.drop_with_heap(vm.heap);
                    args.finish(vm);
                    return Err(e);
                }
            };
            let (on_fulfill, on_reject) = match builtin {
                Builtin::PromiseThen => (args.take(0), args.take(1)),
                Builtin::PromiseCatch => (Value::Undefined, args.take(0)),
                _ => {
                    let callback = args.take(0);
                    let derived = register_finally(vm, promise, callback);
                    this.drop_with_heap(vm.heap);
                    args.finish(vm);
                    return derived;
                }
            };
            args.finish(vm);
            let derived = driver::new_promise(vm);
            let fulfill_handler = if on_fulfill.is_callable(vm.heap) {
                Handler::Fn(on_fulfill)
            } else {
                on_fulfill.drop_with_heap(vm.heap);
                Handler::Identity
            };
            let reject_handler = if on_reject.is_callable(vm.heap) {
                Handler::Fn(on_reject)
            } else {
                on_reject.drop_with_heap(vm.heap);
                Handler::Identity
            };
            vm.heap.inc_ref(derived);
            driver::add_reaction(
                vm,
                promise,
                Reaction { on_fulfill: fulfill_handler, on_reject: reject_handler, derived: Some(derived) },
            );
            this.drop_with_heap(vm.heap);
            Ok(Value::Ref(derived))
        }
        Builtin::PromiseAll | Builtin::PromiseRace | Builtin::PromiseAllSettled | Builtin::PromiseAny => {
            this.drop_with_heap(vm.heap);
            let iterable = args.take(0);
            args.finish(vm);
            let kind = match builtin {
                Builtin::PromiseAll => GroupKind::All,
                Builtin::PromiseRace => GroupKind::Race,
                Builtin::PromiseAllSettled => GroupKind::AllSettled,
                _ => GroupKind::Any,
            };
            combinator(vm, kind, iterable, span)
        }
        _ => unreachable!("promise dispatch covers every variant"),
    }
}

fn register_finally(vm: &mut Vm<'_>, promise: HeapId, callback: Value) -> RunResult<Value> {
    let derived = driver::new_promise(vm);
    if callback.is_callable(vm.heap) {
        let second = callback.clone_with_heap(vm.heap);
        vm.heap.inc_ref(derived);
        driver::add_reaction(
            vm,
            promise,
            Reaction {
                on_fulfill: Handler::FinallyFn(callback),
                on_reject: Handler::FinallyFn(second),
                derived: Some(derived),
            },
        );
    } else {
        callback.drop_with_heap(vm.heap);
        vm.heap.inc_ref(derived);
        driver::add_reaction(
            vm,
            promise,
            Reaction { on_fulfill: Handler::Identity, on_reject: Handler::Identity, derived: Some(derived) },
        );
    }
    Ok(Value::Ref(derived))
}

/// Shared combinator wiring: wrap each element in a promise, register a
/// group-step reaction per element, settle through the group record.
fn combinator(vm: &mut Vm<'_>, kind: GroupKind, iterable: Value, span: Span) -> RunResult<Value> {
    let elements = crate::interp::iterate_to_vec(vm, iterable, span)?;
    let derived = driver::new_promise(vm);
    let count = elements.len();
    if count == 0 {
        match kind {
            GroupKind::All | GroupKind::AllSettled => {
                let empty = crate::object::new_array(vm, Vec::new());
                driver::fulfill(vm, derived, Value::Ref(empty));
            }
            GroupKind::Any => {
                let error = crate::builtins::errors::make_error_value(
                    vm,
                    crate::error::ExcKind::Error,
                    "All promises were rejected",
                );
                driver::reject(vm, derived, error);
            }
            // An empty race stays pending forever.
            GroupKind::Race => {}
        }
        return Ok(Value::Ref(derived));
    }
    vm.heap.inc_ref(derived);
    let group = vm.heap.alloc(HeapData::Group(GroupRecord {
        kind,
        results: (0..count).map(|_| Value::Undefined).collect(),
        errors: (0..count).map(|_| Value::Undefined).collect(),
        pending: count,
        derived,
        settled: false,
    }));
    for (index, element) in elements.into_iter().enumerate() {
        let wrapped = driver::promise_of(vm, element);
        // Both reaction sides own a group reference.
        vm.heap.inc_ref(group);
        vm.heap.inc_ref(group);
        driver::add_reaction(
            vm,
            wrapped,
            Reaction {
                on_fulfill: Handler::Group { group, index: index as u32 },
                on_reject: Handler::Group { group, index: index as u32 },
                derived: None,
            },
        );
        vm.heap.dec_ref(wrapped);
    }
    vm.heap.dec_ref(group);
    Ok(Value::Ref(derived))
}
