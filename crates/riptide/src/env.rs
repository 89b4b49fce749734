//! Lexical environment records.
//!
//! Environments are heap records linked through parent pointers: function
//! calls create one, blocks with `let`/`const`/`class` create one, and
//! closures, generator frames, and async frames share the chain by id.
//! Bindings carry their declaration kind and a TDZ flag cleared on
//! initialization.
//!
//! The global scope is backed by the global object: top-level `var` and
//! function declarations (and sloppy-mode implicit globals) become
//! properties, while top-level `let`/`const` stay in the record itself.

use indexmap::IndexMap;

use crate::{
    call::Vm,
    error::{RunError, RunResult},
    heap::{Heap, HeapData, HeapId, HeapRefs},
    intern::{StaticStrings, StringId},
    object::{PropKey, Property, PropValue},
    value::Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BindingKind {
    Var,
    Let,
    Const,
    Param,
    Function,
}

#[derive(Debug)]
pub(crate) struct Binding {
    pub value: Value,
    pub kind: BindingKind,
    /// Cleared while a `let`/`const` binding is in its temporal dead zone.
    pub initialized: bool,
}

/// Extra state carried by function-call scopes (arrow functions get plain
/// block scopes and inherit all of this from the enclosing frame).
#[derive(Debug)]
pub(crate) struct FunctionScope {
    pub this: Value,
    /// False in a derived constructor until `super(...)` runs.
    pub this_initialized: bool,
    /// Home object for `super.x` resolution (owned).
    pub home: Option<HeapId>,
    /// Parent constructor for `super(...)` in derived constructors (owned).
    pub super_ctor: Option<HeapId>,
    /// True when the frame was entered via `new`.
    pub new_target: bool,
}

#[derive(Debug)]
pub(crate) enum ScopeKind {
    /// The engine's persistent global scope, backed by the global object.
    Global,
    Function(FunctionScope),
    Block,
}

#[derive(Debug)]
pub(crate) struct ScopeRecord {
    bindings: IndexMap<StringId, Binding, ahash::RandomState>,
    /// Owned parent link; `None` only for the global scope.
    pub parent: Option<HeapId>,
    pub kind: ScopeKind,
}

impl ScopeRecord {
    pub fn empty(kind: ScopeKind) -> Self {
        Self { bindings: IndexMap::default(), parent: None, kind }
    }

    pub fn binding(&self, name: StringId) -> Option<&Binding> {
        self.bindings.get(&name)
    }

    /// Iterates bindings for debug snapshots.
    pub fn bindings(&self) -> impl Iterator<Item = (&StringId, &Binding)> {
        self.bindings.iter()
    }
}

impl HeapRefs for ScopeRecord {
    fn collect_refs(self, out: &mut Vec<HeapId>) {
        for (_, binding) in self.bindings {
            binding.value.collect_refs(out);
        }
        if let Some(parent) = self.parent {
            out.push(parent);
        }
        if let ScopeKind::Function(f) = self.kind {
            f.this.collect_refs(out);
            if let Some(home) = f.home {
                out.push(home);
            }
            if let Some(ctor) = f.super_ctor {
                out.push(ctor);
            }
        }
    }
}

/// Allocates a scope whose parent link is `parent`. Increments the parent's
/// count; the returned id is owned by the caller.
pub(crate) fn new_scope(heap: &mut Heap, parent: Option<HeapId>, kind: ScopeKind) -> HeapId {
    if let Some(parent) = parent {
        heap.inc_ref(parent);
    }
    heap.alloc(HeapData::Env(ScopeRecord { bindings: IndexMap::default(), parent, kind }))
}

/// Declares a binding in `env`. `value: None` leaves `let`/`const` in their
/// TDZ and initializes `var`/`param` bindings to undefined. Re-declaring a
/// `var` keeps the existing value.
pub(crate) fn declare(heap: &mut Heap, env: HeapId, name: StringId, kind: BindingKind, value: Option<Value>) {
    let record = heap.env_mut(env);
    if let Some(existing) = record.bindings.get_mut(&name) {
        match kind {
            BindingKind::Var | BindingKind::Param if value.is_none() => return,
            _ => {
                let value = value.unwrap_or(Value::Undefined);
                existing.kind = kind;
                existing.initialized = true;
                let old = std::mem::replace(&mut existing.value, value);
                old.drop_with_heap(heap);
                return;
            }
        }
    }
    let initialized = match kind {
        BindingKind::Let | BindingKind::Const => value.is_some(),
        _ => true,
    };
    let record = heap.env_mut(env);
    record.bindings.insert(name, Binding { value: value.unwrap_or(Value::Undefined), kind, initialized });
}

/// Initializes a declared binding, clearing its TDZ flag. Used by the
/// declaration statements themselves.
pub(crate) fn init_binding(heap: &mut Heap, env: HeapId, name: StringId, value: Value) {
    let record = heap.env_mut(env);
    match record.bindings.get_mut(&name) {
        Some(binding) => {
            binding.initialized = true;
            let old = std::mem::replace(&mut binding.value, value);
            old.drop_with_heap(heap);
        }
        None => {
            // Declaration ran without a hoisting pass (IR bodies declare
            // lazily); treat as a fresh initialized binding.
            record.bindings.insert(name, Binding { value, kind: BindingKind::Let, initialized: true });
        }
    }
}

/// Reads a name, walking the scope chain. TDZ reads and unknown names fail
/// with `ReferenceError`.
pub(crate) fn lookup(vm: &mut Vm<'_>, env: HeapId, name: StringId) -> RunResult<Value> {
    let mut current = Some(env);
    while let Some(id) = current {
        let record = vm.heap.env(id);
        if let Some(binding) = record.binding(name) {
            if !binding.initialized {
                return Err(RunError::reference_error(format!(
                    "Cannot access '{}' before initialization",
                    vm.interns.get(name),
                )));
            }
            let value = binding.value.clone_immediate_unchecked();
            return Ok(value.clone_with_heap(vm.heap));
        }
        if matches!(record.kind, ScopeKind::Global) {
            return lookup_global(vm, name);
        }
        current = record.parent;
    }
    Err(RunError::reference_error(format!("{} is not defined", vm.interns.get(name))))
}

fn lookup_global(vm: &mut Vm<'_>, name: StringId) -> RunResult<Value> {
    if name == StaticStrings::GlobalThis.id() {
        let global = vm.realm.global_object;
        vm.heap.inc_ref(global);
        return Ok(Value::Ref(global));
    }
    if name == StaticStrings::Undefined.id() {
        return Ok(Value::Undefined);
    }
    let global = vm.realm.global_object;
    let table = vm.heap.table(global).expect("global object has a table");
    if let Some(prop) = table.get_own(&PropKey::Atom(name)) {
        if let PropValue::Data { value, .. } = &prop.value {
            let value = value.clone_immediate_unchecked();
            return Ok(value.clone_with_heap(vm.heap));
        }
        return crate::object::get(vm, &Value::Ref(global), &PropKey::Atom(name));
    }
    Err(RunError::reference_error(format!("{} is not defined", vm.interns.get(name))))
}

/// True if a name resolves somewhere in the chain (used by `typeof`, which
/// must not throw on unresolved names).
pub(crate) fn is_bound(vm: &Vm<'_>, env: HeapId, name: StringId) -> bool {
    let mut current = Some(env);
    while let Some(id) = current {
        let record = vm.heap.env(id);
        if record.binding(name).is_some_and(|b| b.initialized) {
            return true;
        }
        if matches!(record.kind, ScopeKind::Global) {
            if name == StaticStrings::GlobalThis.id() || name == StaticStrings::Undefined.id() {
                return true;
            }
            let global = vm.realm.global_object;
            return vm.heap.table(global).is_some_and(|t| t.contains(&PropKey::Atom(name)));
        }
        current = record.parent;
    }
    false
}

/// Assigns to a name, walking the scope chain. `const` assignment fails with
/// `TypeError`; an unresolved name creates a global (sloppy mode). Consumes
/// `value`.
pub(crate) fn assign(vm: &mut Vm<'_>, env: HeapId, name: StringId, value: Value) -> RunResult<()> {
    let mut current = Some(env);
    while let Some(id) = current {
        let record = vm.heap.env(id);
        if let Some(binding) = record.binding(name) {
            if binding.kind == BindingKind::Const {
                value.drop_with_heap(vm.heap);
                return Err(RunError::type_error("Assignment to constant variable."));
            }
            if !binding.initialized {
                value.drop_with_heap(vm.heap);
                return Err(RunError::reference_error(format!(
                    "Cannot access '{}' before initialization",
                    vm.interns.get(name),
                )));
            }
            let record = vm.heap.env_mut(id);
            let binding = record.bindings.get_mut(&name).expect("binding checked above");
            let old = std::mem::replace(&mut binding.value, value);
            old.drop_with_heap(vm.heap);
            return Ok(());
        }
        if matches!(record.kind, ScopeKind::Global) {
            // Sloppy mode: unresolved assignment creates/overwrites a global
            // object property.
            return define_global(vm, name, value);
        }
        current = record.parent;
    }
    define_global(vm, name, value)
}

/// Defines a `var`-style global: a writable, enumerable property of the
/// global object. Consumes `value`.
pub(crate) fn define_global(vm: &mut Vm<'_>, name: StringId, value: Value) -> RunResult<()> {
    let global = vm.realm.global_object;
    crate::object::set(vm, &Value::Ref(global), PropKey::Atom(name), value)
}

/// Declares a top-level `var` (undefined unless already present).
pub(crate) fn declare_global_var(vm: &mut Vm<'_>, name: StringId) -> RunResult<()> {
    let global = vm.realm.global_object;
    let table = vm.heap.table(global).expect("global object has a table");
    if table.contains(&PropKey::Atom(name)) {
        return Ok(());
    }
    crate::object::define(vm.heap, global, PropKey::Atom(name), Property::data(Value::Undefined));
    Ok(())
}

/// Resolves `this`: walks to the nearest function scope (arrows skip
/// through), falling back to the global object at the top level.
pub(crate) fn get_this(vm: &mut Vm<'_>, env: HeapId) -> RunResult<Value> {
    let mut current = Some(env);
    while let Some(id) = current {
        let record = vm.heap.env(id);
        match &record.kind {
            ScopeKind::Function(f) => {
                if !f.this_initialized {
                    return Err(RunError::reference_error(
                        "Must call super constructor in derived class before accessing 'this'",
                    ));
                }
                let this = f.this.clone_immediate_unchecked();
                return Ok(this.clone_with_heap(vm.heap));
            }
            ScopeKind::Global => {
                let global = vm.realm.global_object;
                vm.heap.inc_ref(global);
                return Ok(Value::Ref(global));
            }
            ScopeKind::Block => current = record.parent,
        }
    }
    Ok(Value::Undefined)
}

/// Finds the nearest function scope id (for `super` resolution and derived
/// constructor bookkeeping).
pub(crate) fn nearest_function_scope(heap: &Heap, env: HeapId) -> Option<HeapId> {
    let mut current = Some(env);
    while let Some(id) = current {
        let record = heap.env(id);
        match &record.kind {
            ScopeKind::Function(_) => return Some(id),
            ScopeKind::Global => return None,
            ScopeKind::Block => current = record.parent,
        }
    }
    None
}

/// Marks the nearest function scope's `this` as initialized with `value`
/// (after `super(...)`). Consumes `value`.
pub(crate) fn init_this(heap: &mut Heap, env: HeapId, value: Value) -> RunResult<()> {
    let Some(scope) = nearest_function_scope(heap, env) else {
        value.drop_with_heap(heap);
        return Err(RunError::syntax_error("'super' keyword unexpected here"));
    };
    let record = heap.env_mut(scope);
    let ScopeKind::Function(f) = &mut record.kind else { unreachable!() };
    if f.this_initialized {
        value.drop_with_heap(heap);
        return Err(RunError::reference_error("Super constructor may only be called once"));
    }
    let old = std::mem::replace(&mut f.this, value);
    f.this_initialized = true;
    old.drop_with_heap(heap);
    Ok(())
}
