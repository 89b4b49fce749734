//! The shared execution context and the function-call protocol.
//!
//! Every interpreter layer (tree, IR, builtins, promise jobs) runs against a
//! [`Vm`]: mutable views over the engine-owned heap, interner, realm, job
//! queue, native registry, and debug channel, plus the recursion guard and
//! the call-stack descriptors errors and debug checkpoints snapshot.
//!
//! Calls dispatch on the callee's [`FnKind`]: script closures bind an
//! environment and tree-interpret their body, generator functions allocate a
//! suspended frame, async functions start an IR frame and return its
//! promise, builtins dispatch on an enum, host natives cross the engine
//! boundary, and promise resolvers settle their promise.

use std::rc::Rc;

use crate::{
    ast::{FuncBody, FuncLit, Span},
    builtins::{self, Builtin},
    debug::DebugState,
    env::{self, BindingKind, FunctionScope, ScopeKind},
    error::{FatalKind, FrameDesc, RunError, RunResult},
    heap::{Heap, HeapData, HeapId},
    intern::{Interns, StaticStrings, StringId},
    io::PrintWriter,
    object::{self, PropKey, Property, PropTable},
    promise::{self, JobQueue},
    resource::Deadline,
    types::function::{CtorKind, FnKind, JsFunction},
    value::Value,
};

/// One registered host native.
pub(crate) struct NativeEntry {
    pub name: String,
    pub f: Rc<crate::engine::NativeFn>,
}

impl std::fmt::Debug for NativeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeEntry").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Mutable execution context threaded through every interpreter layer.
pub(crate) struct Vm<'a> {
    pub heap: &'a mut Heap,
    pub interns: &'a mut Interns,
    pub realm: &'a builtins::Realm,
    pub jobs: &'a mut JobQueue,
    pub natives: &'a [NativeEntry],
    pub print: &'a mut dyn PrintWriter,
    pub debug: &'a mut crate::debug::DebugChannel,
    pub rng: &'a mut rand::rngs::StdRng,
    pub deadline: Deadline,
    /// Recursion depth bound (from the engine config).
    pub max_depth: usize,
    pub depth: usize,
    /// Script name for frames and debug messages.
    pub script: &'a str,
    /// Source text of the evaluation in flight (for line/column rendering).
    pub source: &'a str,
    /// Temp slots of the IR frame currently executing `Eval` steps; swapped
    /// in and out by the IR interpreter.
    pub frame_temps: Vec<Value>,
    /// Call-stack descriptors, outermost first.
    pub stack: Vec<FrameDesc>,
    /// Control-flow state tag for debug checkpoints.
    pub debug_state: DebugState,
}

impl Vm<'_> {
    /// Guards one level of interpreter recursion.
    pub fn enter_call(&mut self) -> RunResult<()> {
        if self.depth + 1 > self.max_depth {
            return Err(RunError::Fatal(FatalKind::StackOverflow));
        }
        self.depth += 1;
        Ok(())
    }

    pub fn exit_call(&mut self) {
        self.depth -= 1;
    }

    /// Drops a list of owned values.
    pub fn drop_values(&mut self, values: Vec<Value>) {
        for value in values {
            value.drop_with_heap(self.heap);
        }
    }
}

/// Calls `callee` with `this` and `args` (both consumed). The callee is
/// borrowed; the caller keeps its reference.
pub(crate) fn call_value(
    vm: &mut Vm<'_>,
    callee: &Value,
    this: Value,
    args: Vec<Value>,
    span: Span,
) -> RunResult<Value> {
    let Value::Ref(fid) = callee else {
        let rendered = crate::value::short_render(vm.heap, vm.interns, callee).into_owned();
        this.drop_with_heap(vm.heap);
        vm.drop_values(args);
        return Err(RunError::type_error(format!("{rendered} is not a function")).with_origin(span));
    };
    let fid = *fid;
    let Some(func) = vm.heap.function(fid) else {
        let rendered = crate::value::short_render(vm.heap, vm.interns, callee).into_owned();
        this.drop_with_heap(vm.heap);
        vm.drop_values(args);
        return Err(RunError::type_error(format!("{rendered} is not a function")).with_origin(span));
    };

    match &func.kind {
        FnKind::Builtin(builtin) => {
            let builtin = *builtin;
            builtins::dispatch(vm, builtin, this, args, span)
        }
        FnKind::Host(index) => {
            let index = *index;
            crate::engine::invoke_native(vm, index, this, args, span)
        }
        FnKind::Resolver { promise, reject } => {
            let promise = *promise;
            let reject = *reject;
            this.drop_with_heap(vm.heap);
            let mut args = args.into_iter();
            let value = args.next().unwrap_or(Value::Undefined);
            for extra in args {
                extra.drop_with_heap(vm.heap);
            }
            if reject {
                promise::reject(vm, promise, value);
            } else {
                promise::resolve(vm, promise, value);
            }
            Ok(Value::Undefined)
        }
        FnKind::Script(lit) => {
            let lit = Rc::clone(lit);
            let captured = func.env;
            let home = func.home;
            let name = func.name;
            if lit.is_generator {
                this.drop_with_heap(vm.heap);
                vm.enter_call()?;
                let result = make_generator(vm, &lit, captured, home, args);
                vm.exit_call();
                return result.map_err(|mut e| {
                    e.push_frame(name, span);
                    e
                });
            }
            if lit.is_async {
                vm.enter_call()?;
                let env = match bind_call_env(vm, &lit, captured, home, CallThis::Plain(this), None, args) {
                    Ok(env) => env,
                    Err(e) => {
                        vm.exit_call();
                        return Err(e);
                    }
                };
                let result = crate::irvm::start_async(vm, &lit, env, name);
                vm.heap.dec_ref(env);
                vm.exit_call();
                return result.map_err(|mut e| {
                    e.push_frame(name, span);
                    e
                });
            }
            let (value, env) = call_script(vm, &lit, captured, home, name, CallThis::Plain(this), None, args, span)?;
            vm.heap.dec_ref(env);
            Ok(value)
        }
    }
}

/// How `this` enters a script call.
pub(crate) enum CallThis {
    /// Ordinary call: `this` is the receiver (or undefined).
    Plain(Value),
    /// `new` on a base constructor: `this` is the fresh object.
    Construct(Value),
    /// `new` on a derived constructor: `this` stays uninitialized until
    /// `super(...)`, which resolves against `super_ctor`.
    ConstructDerived { super_ctor: Option<HeapId> },
}

/// Runs a plain (non-suspendable) script function body. Returns the
/// completion value and the call environment (owned by the caller;
/// constructors read the final `this` out of it).
#[expect(clippy::too_many_arguments)]
pub(crate) fn call_script(
    vm: &mut Vm<'_>,
    lit: &Rc<FuncLit>,
    captured: Option<HeapId>,
    home: Option<HeapId>,
    name: StringId,
    this: CallThis,
    pending_this: Option<Value>,
    args: Vec<Value>,
    span: Span,
) -> RunResult<(Value, HeapId)> {
    vm.enter_call()?;
    let env = match bind_call_env(vm, lit, captured, home, this, pending_this, args) {
        Ok(env) => env,
        Err(e) => {
            vm.exit_call();
            return Err(e);
        }
    };
    vm.stack.push(FrameDesc { name, span });
    let saved_state = vm.debug_state;
    if !lit.is_arrow {
        vm.debug_state = DebugState::Function;
    }
    let result = crate::interp::run_function_body(vm, env, lit);
    vm.debug_state = saved_state;
    vm.stack.pop();
    vm.exit_call();
    match result {
        Ok(value) => Ok((value, env)),
        Err(mut e) => {
            vm.heap.dec_ref(env);
            e.push_frame(name, span);
            Err(e)
        }
    }
}

/// `new callee(...)`.
pub(crate) fn construct(vm: &mut Vm<'_>, callee: &Value, args: Vec<Value>, span: Span) -> RunResult<Value> {
    let Value::Ref(fid) = callee else {
        vm.drop_values(args);
        return Err(RunError::type_error("not a constructor").with_origin(span));
    };
    let fid = *fid;
    let Some(func) = vm.heap.function(fid) else {
        vm.drop_values(args);
        return Err(RunError::type_error("not a constructor").with_origin(span));
    };
    match &func.kind {
        FnKind::Builtin(builtin) => {
            let builtin = *builtin;
            builtins::construct_builtin(vm, builtin, args, span)
        }
        FnKind::Script(lit) => {
            let lit = Rc::clone(lit);
            let ctor = func.ctor;
            let captured = func.env;
            let home = func.home;
            let name = func.name;
            if ctor == CtorKind::NotCtor {
                vm.drop_values(args);
                let rendered = vm.interns.get(name).to_owned();
                return Err(RunError::type_error(format!("{rendered} is not a constructor")).with_origin(span));
            }
            // The fresh object's prototype comes from the constructor's
            // `prototype` property.
            let proto_value = object::get(vm, callee, &PropKey::Atom(StaticStrings::Prototype.id()))?;
            let proto = match &proto_value {
                Value::Ref(id) if vm.heap.is_object_like(*id) => {
                    let id = *id;
                    // Ownership of the reference transfers to the table.
                    Some(id)
                }
                _ => {
                    proto_value.drop_with_heap(vm.heap);
                    let p = vm.realm.intrinsics.object_prototype;
                    vm.heap.inc_ref(p);
                    Some(p)
                }
            };
            let this_obj = Value::Ref(vm.heap.alloc(HeapData::Object(PropTable::new(proto))));
            let call_this = match ctor {
                CtorKind::Derived => {
                    // `this` is created eagerly but stays unreadable until
                    // `super(...)`; the parent constructor is the function's
                    // own prototype link.
                    let super_ctor = vm.heap.table(fid).and_then(|t| t.proto);
                    if let Some(s) = super_ctor {
                        vm.heap.inc_ref(s);
                    }
                    CallThis::ConstructDerived { super_ctor }
                }
                _ => CallThis::Construct(this_obj.clone_with_heap(vm.heap)),
            };
            // Derived constructors receive the fresh object through the
            // pending-this slot instead of an initialized binding.
            let pending_this = match &call_this {
                CallThis::ConstructDerived { .. } => Some(this_obj.clone_with_heap(vm.heap)),
                _ => None,
            };
            let (result, env) = match call_script(vm, &lit, captured, home, name, call_this, pending_this, args, span)
            {
                Ok(out) => out,
                Err(e) => {
                    this_obj.drop_with_heap(vm.heap);
                    return Err(e);
                }
            };
            // An explicit object return wins; otherwise the (possibly
            // super-initialized) `this`.
            if result.is_object(vm.heap) {
                this_obj.drop_with_heap(vm.heap);
                vm.heap.dec_ref(env);
                return Ok(result);
            }
            result.drop_with_heap(vm.heap);
            let final_this = match ctor {
                CtorKind::Derived => {
                    let this = crate::env::get_this(vm, env)?;
                    this_obj.drop_with_heap(vm.heap);
                    this
                }
                _ => this_obj,
            };
            vm.heap.dec_ref(env);
            Ok(final_this)
        }
        _ => {
            vm.drop_values(args);
            Err(RunError::type_error("not a constructor").with_origin(span))
        }
    }
}

/// Creates the call environment: scope record, `this`, parameters (with
/// defaults and rest), `arguments`, and hoisted declarations.
pub(crate) fn bind_call_env(
    vm: &mut Vm<'_>,
    lit: &FuncLit,
    captured: Option<HeapId>,
    home: Option<HeapId>,
    this: CallThis,
    pending_this: Option<Value>,
    args: Vec<Value>,
) -> RunResult<HeapId> {
    let kind = if lit.is_arrow {
        if let CallThis::Plain(t) | CallThis::Construct(t) = this {
            t.drop_with_heap(vm.heap);
        }
        ScopeKind::Block
    } else {
        if let Some(h) = home {
            vm.heap.inc_ref(h);
        }
        match this {
            CallThis::Plain(t) => ScopeKind::Function(FunctionScope {
                this: t,
                this_initialized: true,
                home,
                super_ctor: None,
                new_target: false,
            }),
            CallThis::Construct(t) => ScopeKind::Function(FunctionScope {
                this: t,
                this_initialized: true,
                home,
                super_ctor: None,
                new_target: true,
            }),
            CallThis::ConstructDerived { super_ctor } => ScopeKind::Function(FunctionScope {
                this: pending_this.unwrap_or(Value::Undefined),
                this_initialized: false,
                home,
                super_ctor,
                new_target: true,
            }),
        }
    };
    let env = env::new_scope(vm.heap, captured, kind);

    // `arguments` (non-arrow only): a plain array of the call arguments.
    if !lit.is_arrow {
        let clones: Vec<Value> = args.iter().map(|a| a.clone_immediate_unchecked()).collect();
        let clones: Vec<Value> = clones.into_iter().map(|a| a.clone_with_heap(vm.heap)).collect();
        let arguments = object::new_array(vm, clones);
        env::declare(
            vm.heap,
            env,
            StaticStrings::Arguments.id(),
            BindingKind::Var,
            Some(Value::Ref(arguments)),
        );
    }

    // Parameters bind in order; missing arguments are undefined, extras go
    // to the rest pattern or are dropped.
    let mut iter = args.into_iter();
    for param in &lit.params {
        let value = iter.next().unwrap_or(Value::Undefined);
        if let Err(e) = crate::interp::bind_pattern(vm, env, &param.pattern, value, Some(BindingKind::Param)) {
            for extra in iter {
                extra.drop_with_heap(vm.heap);
            }
            vm.heap.dec_ref(env);
            return Err(e);
        }
    }
    let leftovers: Vec<Value> = iter.collect();
    if let Some(rest) = &lit.rest {
        let rest_array = object::new_array(vm, leftovers);
        if let Err(e) = crate::interp::bind_pattern(vm, env, rest, Value::Ref(rest_array), Some(BindingKind::Param)) {
            vm.heap.dec_ref(env);
            return Err(e);
        }
    } else {
        vm.drop_values(leftovers);
    }

    // Hoisting: `var` bindings and top-level function declarations.
    if let FuncBody::Block(body) = &lit.body {
        let (vars, funcs) = crate::ast::hoisted_decls(body);
        for name in vars {
            env::declare(vm.heap, env, name, BindingKind::Var, None);
        }
        for func in funcs {
            let closure = make_closure(vm, &func, env, None);
            let fname = func.name.unwrap_or(StaticStrings::EmptyString.id());
            env::declare(vm.heap, env, fname, BindingKind::Function, Some(closure));
        }
        for (name, decl_kind) in crate::ast::lexical_decls(body) {
            let kind = match decl_kind {
                crate::ast::DeclKind::Const => BindingKind::Const,
                _ => BindingKind::Let,
            };
            env::declare(vm.heap, env, name, kind, None);
        }
    }
    Ok(env)
}

/// Creates a closure value for a function literal captured in `env`.
pub(crate) fn make_closure(vm: &mut Vm<'_>, lit: &Rc<FuncLit>, env: HeapId, home: Option<HeapId>) -> Value {
    let ctor = if lit.is_arrow || lit.is_async || lit.is_generator { CtorKind::NotCtor } else { CtorKind::Base };
    let name = lit.name.unwrap_or(StaticStrings::EmptyString.id());
    let fn_proto = vm.realm.intrinsics.function_prototype;
    vm.heap.inc_ref(fn_proto);
    let mut table = PropTable::new(Some(fn_proto));
    let name_value = Value::Str(name);
    table.insert(PropKey::Atom(StaticStrings::Name.id()), Property::builtin(name_value));
    table.insert(
        PropKey::Atom(StaticStrings::Length.id()),
        Property::builtin(Value::Number(lit.params.len() as f64)),
    );
    vm.heap.inc_ref(env);
    if let Some(h) = home {
        vm.heap.inc_ref(h);
    }
    let fid = vm.heap.alloc(HeapData::Function(JsFunction {
        name,
        kind: FnKind::Script(Rc::clone(lit)),
        env: Some(env),
        home,
        ctor,
        table,
    }));
    if ctor == CtorKind::Base {
        // fn.prototype = { constructor: fn } — the mutual references form a
        // cycle reclaimed at engine teardown.
        let obj_proto = vm.realm.intrinsics.object_prototype;
        vm.heap.inc_ref(obj_proto);
        let mut proto_table = PropTable::new(Some(obj_proto));
        vm.heap.inc_ref(fid);
        proto_table.insert(PropKey::Atom(StaticStrings::Constructor.id()), Property::builtin(Value::Ref(fid)));
        let proto_obj = vm.heap.alloc(HeapData::Object(proto_table));
        object::define(
            vm.heap,
            fid,
            PropKey::Atom(StaticStrings::Prototype.id()),
            Property::builtin(Value::Ref(proto_obj)),
        );
    }
    Value::Ref(fid)
}

/// Creates one half of a promise's resolving pair.
pub(crate) fn make_resolver(vm: &mut Vm<'_>, promise_id: HeapId, reject: bool) -> Value {
    let fn_proto = vm.realm.intrinsics.function_prototype;
    vm.heap.inc_ref(fn_proto);
    vm.heap.inc_ref(promise_id);
    let fid = vm.heap.alloc(HeapData::Function(JsFunction {
        name: if reject { StaticStrings::Reject.id() } else { StaticStrings::Resolve.id() },
        kind: FnKind::Resolver { promise: promise_id, reject },
        env: None,
        home: None,
        ctor: CtorKind::NotCtor,
        table: PropTable::new(Some(fn_proto)),
    }));
    Value::Ref(fid)
}

/// Creates a builtin function value.
pub(crate) fn make_builtin_fn(vm: &mut Vm<'_>, name: StringId, builtin: Builtin) -> Value {
    let fn_proto = vm.realm.intrinsics.function_prototype;
    vm.heap.inc_ref(fn_proto);
    let mut table = PropTable::new(Some(fn_proto));
    table.insert(PropKey::Atom(StaticStrings::Name.id()), Property::builtin(Value::Str(name)));
    let fid = vm.heap.alloc(HeapData::Function(JsFunction {
        name,
        kind: FnKind::Builtin(builtin),
        env: None,
        home: None,
        ctor: CtorKind::NotCtor,
        table,
    }));
    Value::Ref(fid)
}

/// Allocates a generator object for a `function*` call: binds the call
/// environment, builds the initial frame, and parks it suspended.
fn make_generator(
    vm: &mut Vm<'_>,
    lit: &Rc<FuncLit>,
    captured: Option<HeapId>,
    home: Option<HeapId>,
    args: Vec<Value>,
) -> RunResult<Value> {
    let env = bind_call_env(vm, lit, captured, home, CallThis::Plain(Value::Undefined), None, args)?;
    crate::irvm::make_generator_object(vm, lit, env)
}

/// Spread helper shared by calls, `new`, and array literals: evaluates an
/// argument list with `...spread` entries flattened via the iterator
/// protocol.
pub(crate) fn collect_args(
    vm: &mut Vm<'_>,
    env: HeapId,
    args: &[crate::ast::Arg],
) -> RunResult<Vec<Value>> {
    let mut out: Vec<Value> = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            crate::ast::Arg::Expr(e) => {
                let value = match crate::interp::eval_expr(vm, env, e) {
                    Ok(v) => v,
                    Err(err) => {
                        vm.drop_values(out);
                        return Err(err);
                    }
                };
                out.push(value);
            }
            crate::ast::Arg::Spread(e) => {
                let iterable = match crate::interp::eval_expr(vm, env, e) {
                    Ok(v) => v,
                    Err(err) => {
                        vm.drop_values(out);
                        return Err(err);
                    }
                };
                let spread = crate::interp::iterate_to_vec(vm, iterable, e.span);
                match spread {
                    Ok(values) => out.extend(values),
                    Err(err) => {
                        vm.drop_values(out);
                        return Err(err);
                    }
                }
            }
        }
    }
    Ok(out)
}
