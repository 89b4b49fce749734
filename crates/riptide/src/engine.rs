//! The engine facade: the host-facing API and the cooperative scheduler.
//!
//! An [`Engine`] owns all evaluation state — heap, interner, realm, the
//! microtask queue, the native registry, the debug channel, IR diagnostics —
//! and persists it across `eval` calls. Evaluation parses, folds, lowers,
//! tree-interprets the top level, then drains microtasks before returning.
//! A top-level promise is adopted: the engine keeps draining until it
//! settles or the queue runs dry.

use std::rc::Rc;
use std::time::{Duration, Instant};

use rand::SeedableRng;

use crate::{
    ast::Span,
    builtins::{self, Realm},
    call::{NativeEntry, Vm},
    debug::{DebugChannel, DebugMessage, DebugState},
    error::{ExcKind, FatalKind, RunError, RunResult, ThrowPayload},
    exception::{CodeLoc, Exception, ExceptionKind, StackFrame},
    heap::Heap,
    intern::{Interns, StaticStrings},
    io::{PrintWriter, StdPrint},
    ir::IrDiagnostics,
    jsvalue::{self, JsValue},
    object::PropKey,
    promise::{JobQueue, PromiseState},
    resource::{Deadline, EngineConfig},
    value::Value,
};

/// Signature of a host-registered native callable.
pub type NativeFn = dyn Fn(&mut NativeCall<'_, '_>) -> Result<JsValue, Exception>;

/// The context a native callable receives: `this`, the arguments, and a
/// handle for synchronous re-entry into the same engine.
pub struct NativeCall<'v, 'a> {
    vm: &'v mut Vm<'a>,
    this: JsValue,
    args: Vec<JsValue>,
}

impl NativeCall<'_, '_> {
    /// The `this` binding of the call.
    #[must_use]
    pub fn this(&self) -> &JsValue {
        &self.this
    }

    /// The argument list.
    #[must_use]
    pub fn args(&self) -> &[JsValue] {
        &self.args
    }

    /// One argument, `undefined` when absent.
    #[must_use]
    pub fn arg(&self, i: usize) -> JsValue {
        self.args.get(i).cloned().unwrap_or(JsValue::Undefined)
    }

    /// Synchronously evaluates source against the calling engine (nested
    /// evaluation). Microtasks enqueued here drain when the outer
    /// evaluation's turn completes.
    pub fn eval(&mut self, source: &str) -> Result<JsValue, Exception> {
        let program = crate::parse::parse(source, "<native>", self.vm.interns)
            .map_err(|e| Exception::parse_error(e.message).with_location(Some(CodeLoc::from_offset(source, e.span.start))))?;
        let program = crate::fold::fold_program(program, self.vm.interns);
        let mut scratch_diags = IrDiagnostics::default();
        let program = crate::lower::lower_program(program, &mut scratch_diags)
            .map_err(|e| Exception::parse_error(e.reason))?;
        match crate::interp::run_program(self.vm, &program) {
            Ok(value) => {
                let out = jsvalue::value_to_js(self.vm, &value);
                value.drop_with_heap(self.vm.heap);
                Ok(out)
            }
            Err(err) => Err(run_error_to_exception_with(self.vm, err, source)),
        }
    }
}

/// Calls a registered native from the interpreter.
pub(crate) fn invoke_native(
    vm: &mut Vm<'_>,
    index: u32,
    this: Value,
    args: Vec<Value>,
    span: Span,
) -> RunResult<Value> {
    let entry = &vm.natives[index as usize];
    let f = Rc::clone(&entry.f);
    let this_js = jsvalue::value_to_js(vm, &this);
    let args_js: Vec<JsValue> = args.iter().map(|a| jsvalue::value_to_js(vm, a)).collect();
    this.drop_with_heap(vm.heap);
    vm.drop_values(args);
    let mut call = NativeCall { vm, this: this_js, args: args_js };
    match f(&mut call) {
        Ok(result) => Ok(jsvalue::js_to_value(vm, &result)),
        // Host errors wrap into JS throws carrying the host message.
        Err(exception) => {
            Err(RunError::simple(ExcKind::Error, exception.message().to_owned()).with_origin(span))
        }
    }
}

/// A parsed-source handle for host introspection.
#[derive(Debug)]
pub struct ScriptAst {
    program: crate::ast::Program,
}

impl ScriptAst {
    /// Number of top-level statements.
    #[must_use]
    pub fn statement_count(&self) -> usize {
        self.program.body.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.program.body.is_empty()
    }

    /// The script name the source was parsed under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.program.name
    }
}

/// An embeddable, suspendable ECMAScript engine instance.
///
/// # Example
/// ```
/// use riptide::Engine;
///
/// let mut engine = Engine::new();
/// let result = engine.eval("let a = 1, b = 2; a + b;", "demo.js").unwrap();
/// assert_eq!(result.as_f64(), Some(3.0));
/// ```
pub struct Engine {
    heap: Heap,
    interns: Interns,
    realm: Realm,
    jobs: JobQueue,
    natives: Vec<NativeEntry>,
    debug: DebugChannel,
    diags: IrDiagnostics,
    config: EngineConfig,
    rng: rand::rngs::StdRng,
    print: Box<dyn PrintWriter>,
    disposed: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("live_objects", &self.heap.live_count())
            .field("pending_jobs", &self.jobs.len())
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

impl Engine {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        let mut heap = Heap::new();
        let mut interns = Interns::new();
        let realm = builtins::create_realm(&mut heap, &mut interns);
        Self {
            heap,
            interns,
            realm,
            jobs: JobQueue::new(),
            natives: Vec::new(),
            debug: DebugChannel::new(config.debug_capacity, config.debug_loss_policy),
            diags: IrDiagnostics::default(),
            config,
            rng: rand::rngs::StdRng::from_entropy(),
            print: Box::new(StdPrint),
            disposed: false,
        }
    }

    /// Routes `console.log` output.
    pub fn set_print_writer(&mut self, writer: Box<dyn PrintWriter>) {
        self.print = writer;
    }

    /// Registers a global native callable under `name`.
    pub fn register_native(
        &mut self,
        name: &str,
        f: impl Fn(&mut NativeCall<'_, '_>) -> Result<JsValue, Exception> + 'static,
    ) {
        let index = u32::try_from(self.natives.len()).expect("native registry overflow");
        self.natives.push(NativeEntry { name: name.to_owned(), f: Rc::new(f) });
        // Bind a function value on the global object.
        let name_id = self.interns.intern(name);
        let fn_proto = self.realm.intrinsics.function_prototype;
        self.heap.inc_ref(fn_proto);
        let mut table = crate::object::PropTable::new(Some(fn_proto));
        table.insert(
            PropKey::Atom(StaticStrings::Name.id()),
            crate::object::Property::builtin(Value::Str(name_id)),
        );
        let fid = self.heap.alloc(crate::heap::HeapData::Function(crate::types::function::JsFunction {
            name: name_id,
            kind: crate::types::function::FnKind::Host(index),
            env: None,
            home: None,
            ctor: crate::types::function::CtorKind::NotCtor,
            table,
        }));
        crate::object::define(
            &mut self.heap,
            self.realm.global_object,
            PropKey::Atom(name_id),
            crate::object::Property::builtin(Value::Ref(fid)),
        );
    }

    /// Parses a source string into an AST handle without evaluating it.
    pub fn parse(&mut self, source: &str, script_name: &str) -> Result<ScriptAst, Exception> {
        let program = crate::parse::parse(source, script_name, &mut self.interns).map_err(|e| {
            Exception::parse_error(e.message).with_location(Some(CodeLoc::from_offset(source, e.span.start)))
        })?;
        Ok(ScriptAst { program })
    }

    /// Evaluates a source string, draining microtasks and adopting a
    /// top-level promise until it settles (or the queue runs dry).
    pub fn eval(&mut self, source: &str, script_name: &str) -> Result<JsValue, Exception> {
        self.eval_inner(source, script_name, Deadline::none(), false)
    }

    /// [`Engine::eval`] with a wall-clock budget; the microtask loop refuses
    /// to run past the deadline and the evaluation fails with a deadline
    /// error.
    pub fn eval_with_deadline(
        &mut self,
        source: &str,
        script_name: &str,
        budget: Duration,
    ) -> Result<JsValue, Exception> {
        self.eval_inner(source, script_name, Deadline::at(Instant::now() + budget), false)
    }

    /// Synchronous evaluation: fails with a host-misuse error if the
    /// program suspends (enqueues microtasks or completes with a promise).
    pub fn eval_sync(&mut self, source: &str, script_name: &str) -> Result<JsValue, Exception> {
        self.eval_inner(source, script_name, Deadline::none(), true)
    }

    fn eval_inner(
        &mut self,
        source: &str,
        script_name: &str,
        deadline: Deadline,
        sync: bool,
    ) -> Result<JsValue, Exception> {
        if self.disposed {
            return Err(Exception::shutdown());
        }
        let program = crate::parse::parse(source, script_name, &mut self.interns).map_err(|e| {
            Exception::parse_error(e.message).with_location(Some(CodeLoc::from_offset(source, e.span.start)))
        })?;
        let program = crate::fold::fold_program(program, &mut self.interns);
        let program = crate::lower::lower_program(program, &mut self.diags).map_err(|e| {
            Exception::parse_error(e.reason).with_location(Some(CodeLoc::from_offset(source, e.span.start)))
        })?;

        let run = {
            let mut vm = self.vm(source, script_name, deadline);
            crate::interp::run_program(&mut vm, &program)
        };
        let mut value = match run {
            Ok(v) => v,
            Err(e) => return Err(self.to_exception(e, source)),
        };

        if sync {
            let suspended = !self.jobs.is_empty()
                || matches!(&value, Value::Ref(id) if self.heap.promise(*id).is_some());
            if suspended {
                value.drop_with_heap(&mut self.heap);
                self.clear_jobs();
                return Err(Exception::host_misuse("cannot await in sync evaluation"));
            }
            let out = {
                let vm = self.vm(source, script_name, deadline);
                jsvalue::value_to_js(&vm, &value)
            };
            value.drop_with_heap(&mut self.heap);
            return Ok(out);
        }

        // Microtasks run to completion before control returns to the host.
        if let Err(e) = self.drain_jobs(source, script_name, deadline) {
            value.drop_with_heap(&mut self.heap);
            return Err(self.to_exception(e, source));
        }

        // Adopt a top-level promise: drain until settled or idle.
        if let Value::Ref(id) = &value
            && self.heap.promise(*id).is_some()
        {
            let id = *id;
            loop {
                match &self.heap.promise(id).expect("promise stays live").state {
                    PromiseState::Fulfilled(inner) => {
                        let inner = inner.clone_immediate_unchecked();
                        let inner = inner.clone_with_heap(&mut self.heap);
                        value.drop_with_heap(&mut self.heap);
                        value = inner;
                        break;
                    }
                    PromiseState::Rejected(reason) => {
                        let reason = reason.clone_immediate_unchecked();
                        let reason = reason.clone_with_heap(&mut self.heap);
                        value.drop_with_heap(&mut self.heap);
                        let exception = self.throw_value_to_exception(reason, source);
                        return Err(exception);
                    }
                    PromiseState::Pending => {
                        if self.jobs.is_empty() {
                            value.drop_with_heap(&mut self.heap);
                            return Err(Exception::host_misuse(
                                "top-level promise did not settle (evaluation is idle)",
                            ));
                        }
                        if let Err(e) = self.drain_jobs(source, script_name, deadline) {
                            value.drop_with_heap(&mut self.heap);
                            return Err(self.to_exception(e, source));
                        }
                    }
                }
            }
        }

        let out = {
            let vm = self.vm(source, script_name, deadline);
            jsvalue::value_to_js(&vm, &value)
        };
        value.drop_with_heap(&mut self.heap);
        Ok(out)
    }

    fn drain_jobs(&mut self, source: &str, script_name: &str, deadline: Deadline) -> RunResult<()> {
        loop {
            deadline.check()?;
            let Some(job) = self.jobs.dequeue() else { return Ok(()) };
            let mut vm = self.vm(source, script_name, deadline);
            crate::promise::run_job(&mut vm, job)?;
        }
    }

    fn clear_jobs(&mut self) {
        while let Some(job) = self.jobs.dequeue() {
            let mut refs = Vec::new();
            crate::promise::collect_job_refs(job, &mut refs);
            for id in refs {
                self.heap.dec_ref(id);
            }
        }
    }

    fn vm<'a>(&'a mut self, source: &'a str, script_name: &'a str, deadline: Deadline) -> Vm<'a> {
        Vm {
            heap: &mut self.heap,
            interns: &mut self.interns,
            realm: &self.realm,
            jobs: &mut self.jobs,
            natives: &self.natives,
            print: &mut *self.print,
            debug: &mut self.debug,
            rng: &mut self.rng,
            deadline,
            max_depth: self.config.max_recursion_depth,
            depth: 0,
            script: script_name,
            source,
            frame_temps: Vec::new(),
            stack: Vec::new(),
            debug_state: DebugState::TopLevel,
        }
    }

    /// Reads one queued debug message.
    pub fn read_debug(&mut self) -> Option<DebugMessage> {
        self.debug.pop()
    }

    /// Drains every queued debug message.
    pub fn drain_debug(&mut self) -> Vec<DebugMessage> {
        self.debug.drain()
    }

    /// Messages lost to the debug channel's capacity bound.
    #[must_use]
    pub fn debug_messages_dropped(&self) -> u64 {
        self.debug.dropped()
    }

    /// Lowering diagnostics: plans built and constructs rejected.
    #[must_use]
    pub fn ir_diagnostics(&self) -> IrDiagnostics {
        self.diags.clone()
    }

    /// Live heap objects (engine statistics).
    #[must_use]
    pub fn live_objects(&self) -> usize {
        self.heap.live_count()
    }

    /// Promises created but not yet settled (the pending-promise registry).
    #[must_use]
    pub fn pending_promises(&self) -> usize {
        self.heap.pending_promise_count()
    }

    /// Releases all evaluation state. Further calls fail with a shutdown
    /// error; pending microtasks are discarded.
    pub fn dispose(&mut self) {
        self.clear_jobs();
        self.disposed = true;
    }

    fn to_exception(&mut self, err: RunError, source: &str) -> Exception {
        let mut vm = self.vm(source, "<exception>", Deadline::none());
        run_error_to_exception_with(&mut vm, err, source)
    }

    fn throw_value_to_exception(&mut self, value: Value, source: &str) -> Exception {
        let mut vm = self.vm(source, "<exception>", Deadline::none());
        let (name, message) = render_throw_value(&mut vm, &value);
        value.drop_with_heap(vm.heap);
        Exception::new(ExceptionKind::Eval, name, message)
    }
}

/// Converts an internal error into the host-facing exception, resolving
/// source locations.
pub(crate) fn run_error_to_exception_with(vm: &mut Vm<'_>, err: RunError, source: &str) -> Exception {
    match err {
        RunError::Fatal(FatalKind::Deadline) => Exception::deadline(),
        RunError::Fatal(FatalKind::Shutdown) => Exception::shutdown(),
        RunError::Fatal(FatalKind::StackOverflow) => Exception::new(
            ExceptionKind::Eval,
            Some("RangeError".to_owned()),
            "Maximum call stack size exceeded".to_owned(),
        ),
        RunError::Throw { payload, origin, frames } => {
            let (name, message) = match payload {
                ThrowPayload::Simple(kind, message) => (Some(kind.to_string()), message.into_owned()),
                ThrowPayload::Value(value) => {
                    let rendered = render_throw_value(vm, &value);
                    value.drop_with_heap(vm.heap);
                    rendered
                }
            };
            let location = origin.map(|span| CodeLoc::from_offset(source, span.start));
            let frames = frames
                .iter()
                .map(|f| StackFrame {
                    function: vm.interns.get(f.name).to_owned(),
                    location: CodeLoc::from_offset(source, f.span.start),
                })
                .collect();
            Exception::new(ExceptionKind::Eval, name, message).with_location(location).with_frames(frames)
        }
    }
}

/// Renders a thrown JS value for the host: error-like objects contribute
/// their `name`/`message`, everything else its console rendering.
fn render_throw_value(vm: &mut Vm<'_>, value: &Value) -> (Option<String>, String) {
    if value.is_object(vm.heap) {
        let name = data_prop_string(vm, value, StaticStrings::Name.id());
        let message = data_prop_string(vm, value, StaticStrings::Message.id());
        if name.is_some() || message.is_some() {
            return (name, message.unwrap_or_default());
        }
    }
    (None, crate::value::inspect(vm.heap, vm.interns, value))
}

/// Reads a string-valued property without invoking accessors (prototype
/// chain included).
fn data_prop_string(vm: &Vm<'_>, value: &Value, name: crate::intern::StringId) -> Option<String> {
    let Value::Ref(id) = value else { return None };
    let mut current = Some(*id);
    let mut depth = 0;
    while let Some(cid) = current {
        if depth > 64 {
            return None;
        }
        depth += 1;
        let table = vm.heap.table(cid)?;
        if let Some(prop) = table.get_own(&PropKey::Atom(name)) {
            let v = prop.data_value()?;
            return v.as_js_str(vm.heap, vm.interns).map(ToOwned::to_owned);
        }
        current = table.proto;
    }
    None
}
