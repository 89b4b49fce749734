//! `Array` statics, the array prototype methods, and array iterator objects.

use crate::{
    ast::Span,
    call::{self, Vm},
    error::{RunError, RunResult},
    heap::{HeapData, HeapId},
    intern::{StaticStrings, SymbolId},
    object::{self as obj, PropKey, PropTable, Property},
    value::{self, Value},
};

use super::{Args, Builtin, RealmBuilder};

pub(crate) fn install(b: &mut RealmBuilder<'_>) {
    let proto = b.intrinsics.array_prototype;
    b.method(proto, "map", Builtin::ArrayMap);
    b.method(proto, "filter", Builtin::ArrayFilter);
    b.method(proto, "reduce", Builtin::ArrayReduce);
    b.method(proto, "forEach", Builtin::ArrayForEach);
    b.method(proto, "find", Builtin::ArrayFind);
    b.method(proto, "findIndex", Builtin::ArrayFindIndex);
    b.method(proto, "some", Builtin::ArraySome);
    b.method(proto, "every", Builtin::ArrayEvery);
    b.method(proto, "join", Builtin::ArrayJoin);
    b.method(proto, "includes", Builtin::ArrayIncludes);
    b.method(proto, "indexOf", Builtin::ArrayIndexOf);
    b.method(proto, "slice", Builtin::ArraySlice);
    b.method(proto, "splice", Builtin::ArraySplice);
    b.method(proto, "push", Builtin::ArrayPush);
    b.method(proto, "pop", Builtin::ArrayPop);
    b.method(proto, "shift", Builtin::ArrayShift);
    b.method(proto, "unshift", Builtin::ArrayUnshift);
    b.method(proto, "concat", Builtin::ArrayConcat);
    b.method(proto, "reverse", Builtin::ArrayReverse);
    b.method(proto, "sort", Builtin::ArraySort);
    b.method(proto, "flat", Builtin::ArrayFlat);
    b.method(proto, "values", Builtin::ArrayValues);
    b.symbol_method(proto, SymbolId::ITERATOR, "[Symbol.iterator]", Builtin::ArrayValues);
}

pub(crate) fn install_globals(b: &mut RealmBuilder<'_>, global: HeapId) {
    let array_ctor = b.constructor("Array", Builtin::ArrayCtor, b.intrinsics.array_prototype);
    let Value::Ref(array_id) = &array_ctor else { unreachable!() };
    b.method(*array_id, "isArray", Builtin::ArrayIsArray);
    b.builtin_data(global, "Array", array_ctor);
}

pub(crate) fn array_callable(vm: &mut Vm<'_>, this: Value, args: Args) -> RunResult<Value> {
    this.drop_with_heap(vm.heap);
    array_construct(vm, args)
}

/// `Array(n)` pre-sizes; `Array(a, b, …)` collects.
pub(crate) fn array_construct(vm: &mut Vm<'_>, mut args: Args) -> RunResult<Value> {
    if args.len() == 1
        && let Some(Value::Number(n)) = args.peek(0)
    {
        let n = *n;
        args.finish(vm);
        if !(n.fract() == 0.0 && n >= 0.0 && n <= f64::from(u32::MAX)) {
            return Err(RunError::range_error("Invalid array length"));
        }
        let elements = (0..n as usize).map(|_| Value::Undefined).collect();
        return Ok(Value::Ref(obj::new_array(vm, elements)));
    }
    let elements = args.take_all();
    args.finish(vm);
    Ok(Value::Ref(obj::new_array(vm, elements)))
}

/// Resolves `this` to an array id or fails with a TypeError naming the
/// method.
fn this_array(vm: &mut Vm<'_>, this: &Value, method: &str) -> RunResult<HeapId> {
    match this {
        Value::Ref(id) if vm.heap.array(*id).is_some() => Ok(*id),
        _ => Err(RunError::type_error(format!("Array.prototype.{method} called on a non-array"))),
    }
}

fn element_at(vm: &mut Vm<'_>, array: HeapId, index: usize) -> Value {
    let Some(a) = vm.heap.array(array) else { return Value::Undefined };
    match a.elements.get(index) {
        Some(v) => {
            let v = v.clone_immediate_unchecked();
            v.clone_with_heap(vm.heap)
        }
        None => Value::Undefined,
    }
}

fn array_len(vm: &Vm<'_>, array: HeapId) -> usize {
    vm.heap.array(array).map_or(0, |a| a.elements.len())
}

/// Normalizes a possibly-negative index argument against `len`.
fn relative_index(n: f64, len: usize) -> usize {
    if n.is_nan() {
        return 0;
    }
    if n < 0.0 {
        let from_end = len as f64 + n;
        if from_end < 0.0 { 0 } else { from_end as usize }
    } else {
        (n as usize).min(len)
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
        Builtin::ArrayIsArray => {
            this.drop_with_heap(vm.heap);
            let v = args.take(0);
            args.finish(vm);
            let result = matches!(&v, Value::Ref(id) if vm.heap.array(*id).is_some());
            v.drop_with_heap(vm.heap);
            return Ok(Value::Bool(result));
        }
        Builtin::ArrayIterNext => return iter_next(vm, this, args),
        Builtin::ArrayValues => {
            args.finish(vm);
            let iter = this_array(vm, &this, "values").and_then(|id| make_array_iterator(vm, id));
            this.drop_with_heap(vm.heap);
            return iter;
        }
        _ => {}
    }

    let method_result = (|| -> RunResult<Value> {
        match builtin {
            Builtin::ArrayMap
            | Builtin::ArrayFilter
            | Builtin::ArrayForEach
            | Builtin::ArrayFind
            | Builtin::ArrayFindIndex
            | Builtin::ArraySome
            | Builtin::ArrayEvery => callback_method(vm, builtin, &this, &mut args, span),
            Builtin::ArrayReduce => reduce(vm, &this, &mut args, span),
            Builtin::ArrayJoin => join(vm, &this, &mut args),
            Builtin::ArrayIncludes | Builtin::ArrayIndexOf => search(vm, builtin, &this, &mut args),
            Builtin::ArraySlice => slice(vm, &this, &mut args),
            Builtin::ArraySplice => splice(vm, &this, &mut args),
            Builtin::ArrayPush => {
                let id = this_array(vm, &this, "push")?;
                let values = args.take_all();
                for v in values {
                    let array = vm.heap.array_mut(id).expect("array checked");
                    array.elements.push(v);
                }
                Ok(Value::Number(array_len(vm, id) as f64))
            }
            Builtin::ArrayPop => {
                let id = this_array(vm, &this, "pop")?;
                let array = vm.heap.array_mut(id).expect("array checked");
                Ok(array.elements.pop().unwrap_or(Value::Undefined))
            }
            Builtin::ArrayShift => {
                let id = this_array(vm, &this, "shift")?;
                let array = vm.heap.array_mut(id).expect("array checked");
                if array.elements.is_empty() {
                    Ok(Value::Undefined)
                } else {
                    Ok(array.elements.remove(0))
                }
            }
            Builtin::ArrayUnshift => {
                let id = this_array(vm, &this, "unshift")?;
                let values = args.take_all();
                let array = vm.heap.array_mut(id).expect("array checked");
                for (i, v) in values.into_iter().enumerate() {
                    array.elements.insert(i, v);
                }
                Ok(Value::Number(array_len(vm, id) as f64))
            }
            Builtin::ArrayConcat => concat(vm, &this, &mut args),
            Builtin::ArrayReverse => {
                let id = this_array(vm, &this, "reverse")?;
                let array = vm.heap.array_mut(id).expect("array checked");
                array.elements.reverse();
                vm.heap.inc_ref(id);
                Ok(Value::Ref(id))
            }
            Builtin::ArraySort => sort(vm, &this, &mut args, span),
            Builtin::ArrayFlat => flat(vm, &this, &mut args),
            _ => unreachable!("array dispatch covers every variant"),
        }
    })();
    this.drop_with_heap(vm.heap);
    args.finish(vm);
    method_result
}

/// The callback-driven family: map/filter/forEach/find/findIndex/some/every.
fn callback_method(
    vm: &mut Vm<'_>,
    builtin: Builtin,
    this: &Value,
    args: &mut Args,
    span: Span,
) -> RunResult<Value> {
    let id = this_array(vm, this, "map")?;
    let callback = args.take(0);
    if !callback.is_callable(vm.heap) {
        callback.drop_with_heap(vm.heap);
        return Err(RunError::type_error("callback is not a function"));
    }
    let mut collected: Vec<Value> = Vec::new();
    let mut index = 0usize;
    let outcome = loop {
        if index >= array_len(vm, id) {
            break None;
        }
        let element = element_at(vm, id, index);
        let element_copy = element.clone_with_heap(vm.heap);
        let this_arg = this.clone_with_heap(vm.heap);
        let result = call::call_value(
            vm,
            &callback,
            Value::Undefined,
            vec![element, Value::Number(index as f64), this_arg],
            span,
        );
        let result = match result {
            Ok(v) => v,
            Err(e) => {
                element_copy.drop_with_heap(vm.heap);
                vm.drop_values(collected);
                callback.drop_with_heap(vm.heap);
                return Err(e);
            }
        };
        match builtin {
            Builtin::ArrayMap => {
                element_copy.drop_with_heap(vm.heap);
                collected.push(result);
            }
            Builtin::ArrayFilter => {
                if result.to_boolean(vm.heap, vm.interns) {
                    collected.push(element_copy);
                } else {
                    element_copy.drop_with_heap(vm.heap);
                }
                result.drop_with_heap(vm.heap);
            }
            Builtin::ArrayForEach => {
                element_copy.drop_with_heap(vm.heap);
                result.drop_with_heap(vm.heap);
            }
            Builtin::ArrayFind | Builtin::ArrayFindIndex => {
                let hit = result.to_boolean(vm.heap, vm.interns);
                result.drop_with_heap(vm.heap);
                if hit {
                    let out = if matches!(builtin, Builtin::ArrayFind) {
                        element_copy
                    } else {
                        element_copy.drop_with_heap(vm.heap);
                        Value::Number(index as f64)
                    };
                    break Some(out);
                }
                element_copy.drop_with_heap(vm.heap);
            }
            Builtin::ArraySome => {
                element_copy.drop_with_heap(vm.heap);
                let hit = result.to_boolean(vm.heap, vm.interns);
                result.drop_with_heap(vm.heap);
                if hit {
                    break Some(Value::Bool(true));
                }
            }
            Builtin::ArrayEvery => {
                element_copy.drop_with_heap(vm.heap);
                let hit = result.to_boolean(vm.heap, vm.interns);
                result.drop_with_heap(vm.heap);
                if !hit {
                    break Some(Value::Bool(false));
                }
            }
            _ => unreachable!(),
        }
        index += 1;
    };
    callback.drop_with_heap(vm.heap);
    Ok(match (builtin, outcome) {
        (_, Some(v)) => {
            vm.drop_values(collected);
            v
        }
        (Builtin::ArrayMap | Builtin::ArrayFilter, None) => Value::Ref(obj::new_array(vm, collected)),
        (Builtin::ArrayFind, None) => Value::Undefined,
        (Builtin::ArrayFindIndex, None) => Value::Number(-1.0),
        (Builtin::ArraySome, None) => Value::Bool(false),
        (Builtin::ArrayEvery, None) => Value::Bool(true),
        (Builtin::ArrayForEach, None) => Value::Undefined,
        _ => unreachable!(),
    })
}

fn reduce(vm: &mut Vm<'_>, this: &Value, args: &mut Args, span: Span) -> RunResult<Value> {
    let id = this_array(vm, this, "reduce")?;
    let callback = args.take(0);
    if !callback.is_callable(vm.heap) {
        callback.drop_with_heap(vm.heap);
        return Err(RunError::type_error("callback is not a function"));
    }
    let has_initial = args.len() > 1;
    let mut index = 0usize;
    let mut acc = if has_initial {
        args.take(1)
    } else {
        if array_len(vm, id) == 0 {
            callback.drop_with_heap(vm.heap);
            return Err(RunError::type_error("Reduce of empty array with no initial value"));
        }
        index = 1;
        element_at(vm, id, 0)
    };
    while index < array_len(vm, id) {
        let element = element_at(vm, id, index);
        let this_arg = this.clone_with_heap(vm.heap);
        let result = call::call_value(
            vm,
            &callback,
            Value::Undefined,
            vec![acc, element, Value::Number(index as f64), this_arg],
            span,
        );
        match result {
            Ok(v) => acc = v,
            Err(e) => {
                callback.drop_with_heap(vm.heap);
                return Err(e);
            }
        }
        index += 1;
    }
    callback.drop_with_heap(vm.heap);
    Ok(acc)
}

fn join(vm: &mut Vm<'_>, this: &Value, args: &mut Args) -> RunResult<Value> {
    let id = this_array(vm, this, "join")?;
    let sep = args.take(0);
    let sep_text = if sep.is_undefined() {
        ",".to_owned()
    } else {
        let s = value::to_string(vm, &sep);
        sep.drop_with_heap(vm.heap);
        s?
    };
    let mut out = String::new();
    for index in 0..array_len(vm, id) {
        if index > 0 {
            out.push_str(&sep_text);
        }
        let element = element_at(vm, id, index);
        if !element.is_nullish() {
            let s = value::to_string(vm, &element);
            element.drop_with_heap(vm.heap);
            out.push_str(&s?);
        } else {
            element.drop_with_heap(vm.heap);
        }
    }
    Ok(Value::str(vm.heap, &out))
}

fn search(vm: &mut Vm<'_>, builtin: Builtin, this: &Value, args: &mut Args) -> RunResult<Value> {
    let id = this_array(vm, this, "indexOf")?;
    let needle = args.take(0);
    let mut found: Option<usize> = None;
    for index in 0..array_len(vm, id) {
        let element = element_at(vm, id, index);
        let hit = if matches!(builtin, Builtin::ArrayIncludes) {
            // SameValueZero: NaN matches NaN.
            element.strict_eq(&needle, vm.heap, vm.interns)
                || matches!(
                    (&element, &needle),
                    (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan()
                )
        } else {
            element.strict_eq(&needle, vm.heap, vm.interns)
        };
        element.drop_with_heap(vm.heap);
        if hit {
            found = Some(index);
            break;
        }
    }
    needle.drop_with_heap(vm.heap);
    Ok(match builtin {
        Builtin::ArrayIncludes => Value::Bool(found.is_some()),
        _ => Value::Number(found.map_or(-1.0, |i| i as f64)),
    })
}

fn slice(vm: &mut Vm<'_>, this: &Value, args: &mut Args) -> RunResult<Value> {
    let id = this_array(vm, this, "slice")?;
    let len = array_len(vm, id);
    let start = args.take(0);
    let end = args.take(1);
    let start_n = if start.is_undefined() { 0.0 } else { value::to_number(vm, &start)? };
    start.drop_with_heap(vm.heap);
    let end_n = if end.is_undefined() { len as f64 } else { value::to_number(vm, &end)? };
    end.drop_with_heap(vm.heap);
    let from = relative_index(start_n, len);
    let to = relative_index(end_n, len);
    let mut out = Vec::new();
    for index in from..to.max(from) {
        out.push(element_at(vm, id, index));
    }
    Ok(Value::Ref(obj::new_array(vm, out)))
}

fn splice(vm: &mut Vm<'_>, this: &Value, args: &mut Args) -> RunResult<Value> {
    let id = this_array(vm, this, "splice")?;
    let len = array_len(vm, id);
    let start = args.take(0);
    let start_n = if start.is_undefined() { 0.0 } else { value::to_number(vm, &start)? };
    start.drop_with_heap(vm.heap);
    let from = relative_index(start_n, len);
    let delete_count = args.take(1);
    let delete_n = if delete_count.is_undefined() {
        len - from
    } else {
        let n = value::to_number(vm, &delete_count)?;
        if n.is_nan() || n < 0.0 { 0 } else { (n as usize).min(len - from) }
    };
    delete_count.drop_with_heap(vm.heap);
    let items = args.take_all();
    let array = vm.heap.array_mut(id).expect("array checked");
    let removed: Vec<Value> = array.elements.splice(from..from + delete_n, items).collect();
    Ok(Value::Ref(obj::new_array(vm, removed)))
}

fn concat(vm: &mut Vm<'_>, this: &Value, args: &mut Args) -> RunResult<Value> {
    let id = this_array(vm, this, "concat")?;
    let mut out = Vec::new();
    for index in 0..array_len(vm, id) {
        out.push(element_at(vm, id, index));
    }
    for arg in args.take_all() {
        match &arg {
            Value::Ref(aid) if vm.heap.array(*aid).is_some() => {
                let aid = *aid;
                for index in 0..array_len(vm, aid) {
                    out.push(element_at(vm, aid, index));
                }
                arg.drop_with_heap(vm.heap);
            }
            _ => out.push(arg),
        }
    }
    Ok(Value::Ref(obj::new_array(vm, out)))
}

/// In-place sort: undefined values go last, default order is string
/// comparison, a comparator reorders by its numeric result. Merge sort keeps
/// the comparator's view stable.
fn sort(vm: &mut Vm<'_>, this: &Value, args: &mut Args, span: Span) -> RunResult<Value> {
    let id = this_array(vm, this, "sort")?;
    let comparator = args.take(0);
    if !(comparator.is_undefined() || comparator.is_callable(vm.heap)) {
        comparator.drop_with_heap(vm.heap);
        return Err(RunError::type_error("The comparison function must be callable or undefined"));
    }
    let array = vm.heap.array_mut(id).expect("array checked");
    let mut values: Vec<Value> = std::mem::take(&mut array.elements);
    // Partition undefined to the end.
    let mut defined: Vec<Value> = Vec::with_capacity(values.len());
    let mut undefined_count = 0usize;
    for v in values.drain(..) {
        if v.is_undefined() {
            undefined_count += 1;
        } else {
            defined.push(v);
        }
    }
    let sorted = merge_sort(vm, defined, &comparator, span);
    comparator.drop_with_heap(vm.heap);
    let mut sorted = sorted?;
    for _ in 0..undefined_count {
        sorted.push(Value::Undefined);
    }
    let array = vm.heap.array_mut(id).expect("array checked");
    array.elements = sorted;
    vm.heap.inc_ref(id);
    Ok(Value::Ref(id))
}

fn merge_sort(vm: &mut Vm<'_>, mut values: Vec<Value>, comparator: &Value, span: Span) -> RunResult<Vec<Value>> {
    if values.len() <= 1 {
        return Ok(values);
    }
    let right = values.split_off(values.len() / 2);
    let left = merge_sort(vm, values, comparator, span)?;
    let right = match merge_sort(vm, right, comparator, span) {
        Ok(r) => r,
        Err(e) => {
            vm.drop_values(left);
            return Err(e);
        }
    };
    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        match (left.peek(), right.peek()) {
            (Some(a), Some(b)) => {
                let ordered = compare_for_sort(vm, a, b, comparator, span);
                match ordered {
                    Ok(le) => {
                        if le {
                            out.push(left.next().expect("peeked"));
                        } else {
                            out.push(right.next().expect("peeked"));
                        }
                    }
                    Err(e) => {
                        vm.drop_values(out);
                        vm.drop_values(left.collect());
                        vm.drop_values(right.collect());
                        return Err(e);
                    }
                }
            }
            (Some(_), None) => out.push(left.next().expect("peeked")),
            (None, Some(_)) => out.push(right.next().expect("peeked")),
            (None, None) => break,
        }
    }
    Ok(out)
}

/// True if `a` sorts at or before `b`.
fn compare_for_sort(vm: &mut Vm<'_>, a: &Value, b: &Value, comparator: &Value, span: Span) -> RunResult<bool> {
    if comparator.is_undefined() {
        let a_text = value::to_string(vm, a)?;
        let b_text = value::to_string(vm, b)?;
        return Ok(a_text <= b_text);
    }
    let a_arg = a.clone_with_heap(vm.heap);
    let b_arg = b.clone_with_heap(vm.heap);
    let result = call::call_value(vm, comparator, Value::Undefined, vec![a_arg, b_arg], span)?;
    let n = value::to_number(vm, &result);
    result.drop_with_heap(vm.heap);
    Ok(n? <= 0.0)
}

fn flat(vm: &mut Vm<'_>, this: &Value, args: &mut Args) -> RunResult<Value> {
    let id = this_array(vm, this, "flat")?;
    let depth = args.take(0);
    let depth_n = if depth.is_undefined() {
        1.0
    } else {
        let n = value::to_number(vm, &depth)?;
        n
    };
    depth.drop_with_heap(vm.heap);
    let mut out = Vec::new();
    flatten_into(vm, id, depth_n as i64, &mut out);
    Ok(Value::Ref(obj::new_array(vm, out)))
}

fn flatten_into(vm: &mut Vm<'_>, id: HeapId, depth: i64, out: &mut Vec<Value>) {
    for index in 0..array_len(vm, id) {
        let element = element_at(vm, id, index);
        match &element {
            Value::Ref(inner) if depth > 0 && vm.heap.array(*inner).is_some() => {
                let inner = *inner;
                flatten_into(vm, inner, depth - 1, out);
                element.drop_with_heap(vm.heap);
            }
            _ => out.push(element),
        }
    }
}

// ---------------------------------------------------------------------------
// Array iterator objects

/// An array iterator is a plain object carrying its target and cursor in
/// non-enumerable slots, with a builtin `next`.
fn make_array_iterator(vm: &mut Vm<'_>, array: HeapId) -> RunResult<Value> {
    let proto = vm.realm.intrinsics.object_prototype;
    vm.heap.inc_ref(proto);
    let mut table = PropTable::new(Some(proto));
    vm.heap.inc_ref(array);
    let target_key = PropKey::Atom(vm.interns.intern("__target"));
    let index_key = PropKey::Atom(vm.interns.intern("__index"));
    table.insert(target_key, Property::builtin(Value::Ref(array)));
    table.insert(index_key, Property::builtin(Value::Number(0.0)));
    let iter = vm.heap.alloc(HeapData::Object(table));
    let next_name = vm.interns.intern("next");
    let next_fn = call::make_builtin_fn(vm, next_name, Builtin::ArrayIterNext);
    obj::define(vm.heap, iter, PropKey::Atom(next_name), Property::builtin(next_fn));
    let identity = call::make_builtin_fn(vm, StaticStrings::Value.id(), Builtin::IdentityThis);
    obj::define(vm.heap, iter, PropKey::Sym(SymbolId::ITERATOR), Property::builtin(identity));
    Ok(Value::Ref(iter))
}

fn iter_next(vm: &mut Vm<'_>, this: Value, args: Args) -> RunResult<Value> {
    args.finish(vm);
    let target_key = PropKey::Atom(vm.interns.intern("__target"));
    let index_key = PropKey::Atom(vm.interns.intern("__index"));
    let target = obj::get(vm, &this, &target_key)?;
    let index_value = obj::get(vm, &this, &index_key)?;
    let index = match &index_value {
        Value::Number(n) => *n as usize,
        _ => 0,
    };
    index_value.drop_with_heap(vm.heap);
    let Value::Ref(array_id) = &target else {
        target.drop_with_heap(vm.heap);
        this.drop_with_heap(vm.heap);
        return Err(RunError::type_error("Array iterator lost its target"));
    };
    let array_id = *array_id;
    let result = if index < array_len(vm, array_id) {
        let element = element_at(vm, array_id, index);
        obj::set(vm, &this, index_key, Value::Number((index + 1) as f64))?;
        obj::make_iter_result(vm, element, false)
    } else {
        obj::make_iter_result(vm, Value::Undefined, true)
    };
    target.drop_with_heap(vm.heap);
    this.drop_with_heap(vm.heap);
    Ok(result)
}
