//! Property model: descriptors, prototype chains, arrays, enumeration.
//!
//! Every object-like heap record embeds a [`PropTable`]: an insertion-ordered
//! map from [`PropKey`] to [`Property`] plus a prototype link. `get` walks
//! the prototype chain until a data or accessor descriptor is found; `set`
//! searches the chain for an accessor or a non-writable blocker before
//! creating an own data property on the receiver. Lookup depth is bounded so
//! prototype cycles terminate with an error instead of spinning.
//!
//! Arrays keep a dense element vector next to their table; `length` is
//! synthesized from it, and assigning `length` truncates or extends.

use indexmap::IndexMap;

use crate::{
    call::{self, Vm},
    error::{RunError, RunResult},
    heap::{Heap, HeapData, HeapId, HeapRefs},
    intern::{StaticStrings, StringId, SymbolId},
    value::{self, Value},
};

/// Hard bound on prototype-chain walks; cycles are permitted in the data
/// model, so every walk counts steps against this.
pub(crate) const PROTO_DEPTH_LIMIT: usize = 1 << 14;

/// A property key: interned string, array index, or symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum PropKey {
    Atom(StringId),
    Index(u32),
    Sym(SymbolId),
}

impl PropKey {
    pub fn render(&self, interns: &crate::intern::Interns) -> String {
        match self {
            Self::Atom(id) => interns.get(*id).to_owned(),
            Self::Index(i) => i.to_string(),
            Self::Sym(sym) => interns.symbol_to_string(*sym),
        }
    }
}

/// The payload of a property: plain data or accessor pair.
#[derive(Debug)]
pub(crate) enum PropValue {
    Data { value: Value, writable: bool },
    Accessor { get: Option<Value>, set: Option<Value> },
}

/// A property descriptor.
#[derive(Debug)]
pub(crate) struct Property {
    pub value: PropValue,
    pub enumerable: bool,
    pub configurable: bool,
}

impl Property {
    /// An ordinary `{writable: true, enumerable: true, configurable: true}`
    /// data property.
    pub fn data(value: Value) -> Self {
        Self { value: PropValue::Data { value, writable: true }, enumerable: true, configurable: true }
    }

    /// A builtin-style data property: writable and configurable, but not
    /// enumerable (the shape of `Array.prototype.map` and friends).
    pub fn builtin(value: Value) -> Self {
        Self { value: PropValue::Data { value, writable: true }, enumerable: false, configurable: true }
    }

    pub fn accessor(get: Option<Value>, set: Option<Value>) -> Self {
        Self { value: PropValue::Accessor { get, set }, enumerable: true, configurable: true }
    }

    pub fn data_value(&self) -> Option<&Value> {
        match &self.value {
            PropValue::Data { value, .. } => Some(value),
            PropValue::Accessor { .. } => None,
        }
    }

    fn freeze(&mut self) {
        self.configurable = false;
        if let PropValue::Data { writable, .. } = &mut self.value {
            *writable = false;
        }
    }
}

impl HeapRefs for Property {
    fn collect_refs(self, out: &mut Vec<HeapId>) {
        match self.value {
            PropValue::Data { value, .. } => value.collect_refs(out),
            PropValue::Accessor { get, set } => {
                get.collect_refs(out);
                set.collect_refs(out);
            }
        }
    }
}

/// Property storage embedded in every object-like heap record.
#[derive(Debug)]
pub(crate) struct PropTable {
    props: IndexMap<PropKey, Property, ahash::RandomState>,
    /// Owned prototype link (reference-counted; cycles tolerated by the
    /// depth-bounded walks).
    pub proto: Option<HeapId>,
    pub extensible: bool,
}

impl PropTable {
    /// An empty table. The caller transfers ownership of `proto`'s count.
    pub fn new(proto: Option<HeapId>) -> Self {
        Self { props: IndexMap::default(), proto, extensible: true }
    }

    pub fn get_own(&self, key: &PropKey) -> Option<&Property> {
        self.props.get(key)
    }

    pub fn get_own_mut(&mut self, key: &PropKey) -> Option<&mut Property> {
        self.props.get_mut(key)
    }

    pub fn contains(&self, key: &PropKey) -> bool {
        self.props.contains_key(key)
    }

    /// Inserts or replaces a property, returning the old one (whose values
    /// the caller must release).
    pub fn insert(&mut self, key: PropKey, property: Property) -> Option<Property> {
        self.props.insert(key, property)
    }

    /// Convenience for builders that know no property exists yet.
    pub fn insert_data_value(&mut self, key: PropKey, value: Value) {
        self.props.insert(key, Property::data(value));
    }

    pub fn remove(&mut self, key: &PropKey) -> Option<Property> {
        self.props.shift_remove(key)
    }

    /// Own enumerable entries in insertion order (used for rendering and
    /// `keys`/`values`/`entries`).
    pub fn enumerable_own_entries(&self) -> impl Iterator<Item = (&PropKey, &Property)> {
        self.props.iter().filter(|(_, p)| p.enumerable)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&PropKey, &Property)> {
        self.props.iter()
    }

    /// Own keys in enumeration order: integer indices ascending, then
    /// string keys in insertion order, then symbols in insertion order.
    pub fn own_keys(&self) -> Vec<PropKey> {
        let mut indices: Vec<u32> = Vec::new();
        let mut strings: Vec<PropKey> = Vec::new();
        let mut symbols: Vec<PropKey> = Vec::new();
        for key in self.props.keys() {
            match key {
                PropKey::Index(i) => indices.push(*i),
                PropKey::Atom(_) => strings.push(*key),
                PropKey::Sym(_) => symbols.push(*key),
            }
        }
        indices.sort_unstable();
        let mut keys: Vec<PropKey> = indices.into_iter().map(PropKey::Index).collect();
        keys.extend(strings);
        keys.extend(symbols);
        keys
    }

    fn freeze(&mut self) {
        self.extensible = false;
        for prop in self.props.values_mut() {
            prop.freeze();
        }
    }
}

impl HeapRefs for PropTable {
    fn collect_refs(self, out: &mut Vec<HeapId>) {
        for (_, prop) in self.props {
            prop.collect_refs(out);
        }
        if let Some(proto) = self.proto {
            out.push(proto);
        }
    }
}

/// An array: dense elements plus ordinary properties.
#[derive(Debug)]
pub(crate) struct JsArray {
    pub elements: Vec<Value>,
    pub table: PropTable,
    /// Set by `Object.freeze`: element writes and length changes no-op.
    pub frozen: bool,
}

impl JsArray {
    pub fn new(elements: Vec<Value>, proto: Option<HeapId>) -> Self {
        Self { elements, table: PropTable::new(proto), frozen: false }
    }
}

impl HeapRefs for JsArray {
    fn collect_refs(self, out: &mut Vec<HeapId>) {
        self.elements.collect_refs(out);
        self.table.collect_refs(out);
    }
}

/// Allocates a plain object. Takes ownership of `proto`'s count.
pub(crate) fn new_object(heap: &mut Heap, proto: Option<HeapId>) -> HeapId {
    heap.alloc(HeapData::Object(PropTable::new(proto)))
}

/// Allocates an array from owned elements, linking the realm's array
/// prototype.
pub(crate) fn new_array(vm: &mut Vm<'_>, elements: Vec<Value>) -> HeapId {
    let proto = vm.realm.intrinsics.array_prototype;
    vm.heap.inc_ref(proto);
    vm.heap.alloc(HeapData::Array(JsArray::new(elements, Some(proto))))
}

/// Builds a `{value, done}` iterator-result object.
pub(crate) fn make_iter_result(vm: &mut Vm<'_>, value: Value, done: bool) -> Value {
    let proto = vm.realm.intrinsics.object_prototype;
    vm.heap.inc_ref(proto);
    let mut table = PropTable::new(Some(proto));
    table.insert_data_value(PropKey::Atom(StaticStrings::Value.id()), value);
    table.insert_data_value(PropKey::Atom(StaticStrings::Done.id()), Value::Bool(done));
    Value::Ref(vm.heap.alloc(HeapData::Object(table)))
}

/// `get(obj, key)` with full receiver semantics: primitive receivers
/// dispatch into the realm's wrapper prototypes, accessors run with
/// `this = receiver`.
pub(crate) fn get(vm: &mut Vm<'_>, receiver: &Value, key: &PropKey) -> RunResult<Value> {
    // String primitives: length and indexed characters come first, then the
    // string prototype.
    if let Some(s) = receiver.as_js_str(vm.heap, vm.interns) {
        match key {
            PropKey::Atom(atom) if *atom == StaticStrings::Length.id() => {
                return Ok(Value::Number(s.chars().count() as f64));
            }
            PropKey::Index(i) => {
                let ch = s.chars().nth(*i as usize).map(|c| c.to_string());
                return Ok(match ch {
                    Some(c) => Value::str(vm.heap, &c),
                    None => Value::Undefined,
                });
            }
            _ => {
                let proto = vm.realm.intrinsics.string_prototype;
                return get_from_chain(vm, receiver, proto, key);
            }
        }
    }
    let start = match receiver {
        Value::Number(_) => Some(vm.realm.intrinsics.number_prototype),
        Value::Bool(_) => Some(vm.realm.intrinsics.boolean_prototype),
        Value::Sym(_) => None,
        Value::Undefined | Value::Null => {
            return Err(RunError::type_error(format!(
                "Cannot read properties of {} (reading '{}')",
                if receiver.is_undefined() { "undefined" } else { "null" },
                key.render(vm.interns),
            )));
        }
        Value::Ref(id) => {
            // Array fast paths: dense elements and length.
            if let Some(array) = vm.heap.array(*id) {
                match key {
                    PropKey::Index(i) => {
                        if let Some(element) = array.elements.get(*i as usize) {
                            let element = element.clone_immediate_unchecked();
                            return Ok(element.clone_with_heap(vm.heap));
                        }
                    }
                    PropKey::Atom(atom) if *atom == StaticStrings::Length.id() => {
                        return Ok(Value::Number(array.elements.len() as f64));
                    }
                    _ => {}
                }
            }
            Some(*id)
        }
        Value::Str(_) => unreachable!("string receivers handled above"),
    };
    let Some(start) = start else { return Ok(Value::Undefined) };
    get_from_chain(vm, receiver, start, key)
}

/// `get` starting the walk at an explicit object (used by `super.x`, which
/// begins at the home object's prototype while keeping `this = receiver`).
pub(crate) fn get_with_start(vm: &mut Vm<'_>, receiver: &Value, start: HeapId, key: &PropKey) -> RunResult<Value> {
    get_from_chain(vm, receiver, start, key)
}

/// Walks the prototype chain starting at `start` looking for `key`.
fn get_from_chain(vm: &mut Vm<'_>, receiver: &Value, start: HeapId, key: &PropKey) -> RunResult<Value> {
    let mut current = Some(start);
    let mut depth = 0usize;
    while let Some(id) = current {
        if depth > PROTO_DEPTH_LIMIT {
            return Err(RunError::range_error("prototype chain depth exceeded"));
        }
        depth += 1;
        let Some(table) = vm.heap.table(id) else { break };
        if let Some(prop) = table.get_own(key) {
            match &prop.value {
                PropValue::Data { value, .. } => {
                    let value = value.clone_immediate_unchecked();
                    return Ok(value.clone_with_heap(vm.heap));
                }
                PropValue::Accessor { get, .. } => {
                    let Some(getter) = get else { return Ok(Value::Undefined) };
                    let getter = getter.clone_immediate_unchecked();
                    let getter = getter.clone_with_heap(vm.heap);
                    let this = receiver.clone_with_heap(vm.heap);
                    let result = call::call_value(vm, &getter, this, Vec::new(), crate::ast::Span::default());
                    getter.drop_with_heap(vm.heap);
                    return result;
                }
            }
        }
        current = table.proto;
    }
    Ok(Value::Undefined)
}

/// `set(obj, key, v)`: accessor-aware prototype walk, silent no-op on
/// non-writable data properties (sloppy mode), own data property creation on
/// the receiver otherwise. Consumes `value`.
pub(crate) fn set(vm: &mut Vm<'_>, receiver: &Value, key: PropKey, value: Value) -> RunResult<()> {
    let Value::Ref(receiver_id) = receiver else {
        // Setting on primitives is a silent no-op in sloppy mode.
        if receiver.is_nullish() {
            value.drop_with_heap(vm.heap);
            return Err(RunError::type_error(format!(
                "Cannot set properties of {}",
                if receiver.is_undefined() { "undefined" } else { "null" },
            )));
        }
        value.drop_with_heap(vm.heap);
        return Ok(());
    };
    let receiver_id = *receiver_id;

    // Array element and length writes bypass the descriptor walk.
    if let Some(array) = vm.heap.array(receiver_id) {
        let frozen = array.frozen;
        match &key {
            PropKey::Index(i) => {
                if frozen {
                    value.drop_with_heap(vm.heap);
                    return Ok(());
                }
                let index = *i as usize;
                let array = vm.heap.array_mut(receiver_id).expect("array checked above");
                if index < array.elements.len() {
                    let old = std::mem::replace(&mut array.elements[index], value);
                    old.drop_with_heap(vm.heap);
                } else {
                    // Writing beyond the current length extends it; holes
                    // fill with undefined.
                    let array = vm.heap.array_mut(receiver_id).expect("array checked above");
                    while array.elements.len() < index {
                        array.elements.push(Value::Undefined);
                    }
                    let array = vm.heap.array_mut(receiver_id).expect("array checked above");
                    array.elements.push(value);
                }
                return Ok(());
            }
            PropKey::Atom(atom) if *atom == StaticStrings::Length.id() => {
                if frozen {
                    value.drop_with_heap(vm.heap);
                    return Ok(());
                }
                let n = value::to_number(vm, &value)?;
                value.drop_with_heap(vm.heap);
                if !(n.fract() == 0.0 && n >= 0.0 && n <= f64::from(u32::MAX)) {
                    return Err(RunError::range_error("Invalid array length"));
                }
                set_array_length(vm.heap, receiver_id, n as usize);
                return Ok(());
            }
            _ => {}
        }
    }

    // Walk the chain: an accessor anywhere wins; a non-writable data
    // property anywhere blocks; otherwise create on the receiver.
    let mut current = Some(receiver_id);
    let mut depth = 0usize;
    while let Some(id) = current {
        if depth > PROTO_DEPTH_LIMIT {
            value.drop_with_heap(vm.heap);
            return Err(RunError::range_error("prototype chain depth exceeded"));
        }
        depth += 1;
        let Some(table) = vm.heap.table(id) else { break };
        if let Some(prop) = table.get_own(&key) {
            match &prop.value {
                PropValue::Data { writable, .. } => {
                    if id == receiver_id && *writable {
                        let table = vm.heap.table_mut(receiver_id).expect("table checked above");
                        let Some(PropValue::Data { value: slot, .. }) =
                            table.get_own_mut(&key).map(|p| &mut p.value)
                        else {
                            unreachable!("data property checked above")
                        };
                        let old = std::mem::replace(slot, value);
                        old.drop_with_heap(vm.heap);
                    } else if *writable {
                        // Writable data property on an ancestor: shadow it.
                        break;
                    } else {
                        // Non-writable anywhere upchain: silent no-op.
                        value.drop_with_heap(vm.heap);
                    }
                    return Ok(());
                }
                PropValue::Accessor { set, .. } => {
                    let Some(setter) = set else {
                        // Accessor without a setter: silent no-op.
                        value.drop_with_heap(vm.heap);
                        return Ok(());
                    };
                    let setter = setter.clone_immediate_unchecked();
                    let setter = setter.clone_with_heap(vm.heap);
                    let this = receiver.clone_with_heap(vm.heap);
                    let result = call::call_value(vm, &setter, this, vec![value], crate::ast::Span::default());
                    setter.drop_with_heap(vm.heap);
                    result?.drop_with_heap(vm.heap);
                    return Ok(());
                }
            }
        }
        current = table.proto;
    }

    // Create a fresh own data property on the receiver.
    let Some(table) = vm.heap.table_mut(receiver_id) else {
        value.drop_with_heap(vm.heap);
        return Ok(());
    };
    if !table.extensible {
        value.drop_with_heap(vm.heap);
        return Ok(());
    }
    if let Some(old) = table.insert(key, Property::data(value)) {
        old.collect_refs_into_heap(vm.heap);
    }
    Ok(())
}

/// Truncates or extends an array's dense storage.
pub(crate) fn set_array_length(heap: &mut Heap, id: HeapId, new_len: usize) {
    let array = heap.array_mut(id).expect("set_array_length on non-array");
    if new_len < array.elements.len() {
        let removed: Vec<Value> = array.elements.drain(new_len..).collect();
        for value in removed {
            value.drop_with_heap(heap);
        }
    } else {
        let array = heap.array_mut(id).expect("array checked above");
        while array.elements.len() < new_len {
            array.elements.push(Value::Undefined);
        }
    }
}

/// `define(obj, key, desc)`: raw descriptor write, no prototype walk, no
/// setter dispatch. Used by class construction and builtins.
pub(crate) fn define(heap: &mut Heap, id: HeapId, key: PropKey, property: Property) {
    let Some(table) = heap.table_mut(id) else {
        property.collect_refs_into_heap(heap);
        return;
    };
    if let Some(old) = table.insert(key, property) {
        old.collect_refs_into_heap(heap);
    }
}

/// `has(obj, key)`: prototype-chain membership (`in` operator).
pub(crate) fn has(vm: &mut Vm<'_>, value: &Value, key: &PropKey) -> RunResult<bool> {
    let Value::Ref(id) = value else {
        if let Some(s) = value.as_js_str(vm.heap, vm.interns) {
            if let PropKey::Index(i) = key {
                return Ok((*i as usize) < s.chars().count());
            }
            if matches!(key, PropKey::Atom(a) if *a == StaticStrings::Length.id()) {
                return Ok(true);
            }
        }
        return Err(RunError::type_error("Cannot use 'in' operator on a non-object"));
    };
    if let Some(array) = vm.heap.array(*id) {
        if let PropKey::Index(i) = key
            && (*i as usize) < array.elements.len()
        {
            return Ok(true);
        }
        if matches!(key, PropKey::Atom(a) if *a == StaticStrings::Length.id()) {
            return Ok(true);
        }
    }
    let mut current = Some(*id);
    let mut depth = 0usize;
    while let Some(id) = current {
        if depth > PROTO_DEPTH_LIMIT {
            return Err(RunError::range_error("prototype chain depth exceeded"));
        }
        depth += 1;
        let Some(table) = vm.heap.table(id) else { break };
        if table.contains(key) {
            return Ok(true);
        }
        current = table.proto;
    }
    Ok(false)
}

/// `delete obj[key]`: own properties only; non-configurable properties
/// refuse deletion (returns false).
pub(crate) fn delete(heap: &mut Heap, value: &Value, key: &PropKey) -> RunResult<bool> {
    let Value::Ref(id) = value else { return Ok(true) };
    if let Some(array) = heap.array(*id)
        && let PropKey::Index(i) = key
    {
        if array.frozen {
            return Ok(false);
        }
        let index = *i as usize;
        let array = heap.array_mut(*id).expect("array checked above");
        if index < array.elements.len() {
            let old = std::mem::replace(&mut array.elements[index], Value::Undefined);
            old.drop_with_heap(heap);
        }
        return Ok(true);
    }
    let Some(table) = heap.table_mut(*id) else { return Ok(true) };
    match table.get_own(key) {
        None => Ok(true),
        Some(prop) if !prop.configurable => Ok(false),
        Some(_) => {
            let removed = table.remove(key).expect("property checked above");
            removed.collect_refs_into_heap(heap);
            Ok(true)
        }
    }
}

/// Own keys in enumeration order. Arrays contribute their dense indices
/// first, then `length`, then table keys.
pub(crate) fn own_keys(heap: &Heap, id: HeapId) -> Vec<PropKey> {
    if let Some(array) = heap.array(id) {
        let mut keys: Vec<PropKey> =
            (0..u32::try_from(array.elements.len()).unwrap_or(u32::MAX)).map(PropKey::Index).collect();
        keys.push(PropKey::Atom(StaticStrings::Length.id()));
        keys.extend(array.table.own_keys());
        return keys;
    }
    heap.table(id).map(PropTable::own_keys).unwrap_or_default()
}

/// Own enumerable string-keyed entries, as `(key, value)` pairs with
/// accessors invoked. Used by `Object.keys/values/entries` and spread.
pub(crate) fn enumerable_own_string_keys(heap: &Heap, id: HeapId) -> Vec<PropKey> {
    if let Some(array) = heap.array(id) {
        let mut keys: Vec<PropKey> =
            (0..u32::try_from(array.elements.len()).unwrap_or(u32::MAX)).map(PropKey::Index).collect();
        keys.extend(
            array.table.entries().filter(|(k, p)| p.enumerable && !matches!(k, PropKey::Sym(_))).map(|(k, _)| *k),
        );
        return keys;
    }
    let Some(table) = heap.table(id) else { return Vec::new() };
    let mut indices: Vec<u32> = Vec::new();
    let mut strings: Vec<PropKey> = Vec::new();
    for (key, prop) in table.entries() {
        if !prop.enumerable {
            continue;
        }
        match key {
            PropKey::Index(i) => indices.push(*i),
            PropKey::Atom(_) => strings.push(*key),
            PropKey::Sym(_) => {}
        }
    }
    indices.sort_unstable();
    let mut keys: Vec<PropKey> = indices.into_iter().map(PropKey::Index).collect();
    keys.extend(strings);
    keys
}

/// `for…in` key collection: own enumerable string keys, then the prototype
/// chain's, deduplicated, shadowed keys skipped.
pub(crate) fn for_in_keys(heap: &Heap, value: &Value) -> Vec<PropKey> {
    let Value::Ref(start) = value else { return Vec::new() };
    let mut seen: Vec<PropKey> = Vec::new();
    let mut keys = Vec::new();
    let mut current = Some(*start);
    let mut depth = 0usize;
    while let Some(id) = current {
        if depth > PROTO_DEPTH_LIMIT {
            break;
        }
        depth += 1;
        for key in enumerable_own_string_keys(heap, id) {
            if !seen.contains(&key) {
                seen.push(key);
                keys.push(key);
            }
        }
        current = heap.table(id).and_then(|t| t.proto);
    }
    keys
}

/// `Object.freeze`: flips every descriptor to non-writable/non-configurable
/// and rejects further additions.
pub(crate) fn freeze(heap: &mut Heap, id: HeapId) {
    if let Some(array) = heap.array_mut(id) {
        array.frozen = true;
    }
    if let Some(table) = heap.table_mut(id) {
        table.freeze();
    }
}

impl Property {
    /// Releases an evicted property's owned values straight into the heap.
    fn collect_refs_into_heap(self, heap: &mut Heap) {
        let mut refs = Vec::new();
        self.collect_refs(&mut refs);
        for id in refs {
            heap.dec_ref(id);
        }
    }
}

impl Value {
    /// Copies the tag without touching refcounts. Only for immediately
    /// re-cloning via `clone_with_heap` when the borrow checker forbids
    /// holding the heap borrow across the clone.
    pub(crate) fn clone_immediate_unchecked(&self) -> Self {
        match self {
            Self::Undefined => Self::Undefined,
            Self::Null => Self::Null,
            Self::Bool(b) => Self::Bool(*b),
            Self::Number(n) => Self::Number(*n),
            Self::Str(id) => Self::Str(*id),
            Self::Sym(id) => Self::Sym(*id),
            Self::Ref(id) => Self::Ref(*id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interns;

    #[test]
    fn own_keys_orders_integers_strings_symbols() {
        let mut interns = Interns::new();
        let mut table = PropTable::new(None);
        table.insert_data_value(PropKey::Atom(interns.intern("beta")), Value::Number(0.0));
        table.insert_data_value(PropKey::Index(7), Value::Number(0.0));
        let sym = interns.new_symbol(Some("tag"));
        table.insert_data_value(PropKey::Sym(sym), Value::Number(0.0));
        table.insert_data_value(PropKey::Atom(interns.intern("alpha")), Value::Number(0.0));
        table.insert_data_value(PropKey::Index(2), Value::Number(0.0));

        let keys = table.own_keys();
        assert_eq!(keys[0], PropKey::Index(2));
        assert_eq!(keys[1], PropKey::Index(7));
        assert_eq!(keys[2], PropKey::Atom(interns.intern("beta")));
        assert_eq!(keys[3], PropKey::Atom(interns.intern("alpha")));
        assert_eq!(keys[4], PropKey::Sym(sym));
    }

    #[test]
    fn freeze_locks_descriptors() {
        let mut heap = Heap::new();
        let id = new_object(&mut heap, None);
        define(&mut heap, id, PropKey::Index(0), Property::data(Value::Number(1.0)));
        freeze(&mut heap, id);
        let table = heap.table(id).expect("object has a table");
        assert!(!table.extensible);
        let prop = table.get_own(&PropKey::Index(0)).expect("property kept");
        assert!(!prop.configurable);
        assert!(matches!(prop.value, PropValue::Data { writable: false, .. }));
    }
}
