//! The IR interpreter: drives lowered plans with resumable frames.
//!
//! A [`Frame`] is the runtime state of one suspended body: program counter
//! as `(block, step)`, operand stack, temp slots, current environment, the
//! guard stack (try records, open iterators, entered scopes), and the
//! `yield*` delegation target. `next`/`throw`/`return` on a generator (and
//! promise settlements for async frames) enter here with a resume payload;
//! the interpreter runs steps until the frame suspends again, completes, or
//! throws out.
//!
//! Every non-normal transition consults the guard stack: covering `finally`
//! blocks run innermost-first with the pending completion deferred in the
//! guard, open iterators close via `return()`, and entered scopes pop. A
//! new completion arising inside a `finally` overrides the deferred one.

use std::rc::Rc;

use crate::{
    ast::FuncLit,
    call::Vm,
    debug::DebugState,
    env::{self, ScopeKind},
    error::{RunError, RunResult, ThrowPayload},
    heap::{HeapData, HeapId, HeapRefs},
    intern::StringId,
    interp,
    ir::{BlockId, IterKind, Plan, Step},
    object::{self, PropKey},
    promise::{self, Handler, Reaction},
    types::generator::{GenState, JsGenerator},
    value::Value,
};

/// How a suspended frame is being resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResumeKind {
    Next,
    Throw,
    Return,
}

/// Why the interpreter handed control back.
#[derive(Debug)]
pub(crate) enum FrameExit {
    /// Generator yielded a value (`{value, done: false}` to the caller).
    Yielded(Value),
    /// Async frame awaits this value's settlement.
    Awaited(Value),
    /// The body completed with a return value.
    Return(Value),
}

/// A deferred completion parked while a `finally` block runs.
#[derive(Debug)]
pub(crate) enum Pending {
    /// Resume normal control at a block.
    Resume(BlockId),
    /// Continue a `break`/`continue` unwind.
    Unwind { target: BlockId, depth: u32 },
    Return(Value),
    Throw(RunError),
}

#[derive(Debug)]
pub(crate) enum TryState {
    /// Protected region executing.
    Active,
    /// Catch block executing (catch handler consumed).
    InCatch,
    /// Finally block executing with a deferred completion.
    InFinally(Pending),
}

#[derive(Debug)]
pub(crate) struct TryGuard {
    pub catch: Option<BlockId>,
    pub finally: Option<BlockId>,
    pub catch_param: Option<Rc<crate::ast::Pattern>>,
    pub state: TryState,
}

/// An open iterator inside the frame (`for…of` / `for await` / `for…in`).
#[derive(Debug)]
pub(crate) enum IterState {
    Proto { iter: Value, kind: IterKind },
    Keys { keys: Vec<PropKey>, index: usize },
}

#[derive(Debug)]
pub(crate) enum Guard {
    /// An entered block scope; holds the environment to restore.
    Scope { prev_env: HeapId },
    Iter(IterState),
    Try(TryGuard),
}

/// The resumable state of one suspendable function activation.
#[derive(Debug)]
pub(crate) struct Frame {
    pub plan: Rc<Plan>,
    pub block: u32,
    pub step: u32,
    /// False until the first resume; the first `next()` payload is ignored.
    pub started: bool,
    pub stack: Vec<Value>,
    pub temps: Vec<Value>,
    /// Current (innermost) environment, owned.
    pub env: HeapId,
    pub guards: Vec<Guard>,
    /// Active `yield*` target, owned.
    pub delegate: Option<Value>,
}

impl Frame {
    /// Builds the initial frame for a plan. Takes ownership of `env`.
    pub fn new(plan: Rc<Plan>, env: HeapId) -> Self {
        let temps = (0..plan.temp_count).map(|_| Value::Undefined).collect();
        Self { plan, block: 0, step: 0, started: false, stack: Vec::new(), temps, env, guards: Vec::new(), delegate: None }
    }
}

impl HeapRefs for Frame {
    fn collect_refs(self, out: &mut Vec<HeapId>) {
        self.stack.collect_refs(out);
        self.temps.collect_refs(out);
        out.push(self.env);
        for guard in self.guards {
            match guard {
                Guard::Scope { prev_env } => out.push(prev_env),
                Guard::Iter(IterState::Proto { iter, .. }) => iter.collect_refs(out),
                Guard::Iter(IterState::Keys { .. }) => {}
                Guard::Try(tg) => {
                    if let TryState::InFinally(pending) = tg.state {
                        pending.collect_refs(out);
                    }
                }
            }
        }
        self.delegate.collect_refs(out);
    }
}

impl HeapRefs for Pending {
    fn collect_refs(self, out: &mut Vec<HeapId>) {
        match self {
            Self::Resume(_) | Self::Unwind { .. } => {}
            Self::Return(v) => v.collect_refs(out),
            Self::Throw(e) => {
                if let RunError::Throw { payload: ThrowPayload::Value(v), .. } = e {
                    v.collect_refs(out);
                }
            }
        }
    }
}

/// A parked async-function frame and the promise its completion settles.
#[derive(Debug)]
pub(crate) struct FrameCell {
    /// `None` while the frame is being driven.
    pub frame: Option<Box<Frame>>,
    /// The async call's result promise (owned).
    pub promise: HeapId,
    /// Function name for stack frames.
    pub name: StringId,
}

impl HeapRefs for FrameCell {
    fn collect_refs(self, out: &mut Vec<HeapId>) {
        if let Some(frame) = self.frame {
            frame.collect_refs(out);
        }
        out.push(self.promise);
    }
}

/// Releases every reference a dead frame owned.
fn release_frame(vm: &mut Vm<'_>, frame: Frame) {
    let mut refs = Vec::new();
    frame.collect_refs(&mut refs);
    for id in refs {
        vm.heap.dec_ref(id);
    }
}

// ---------------------------------------------------------------------------
// Generator objects

/// Allocates the generator object for a `function*` call. Takes ownership of
/// `env` (the bound call environment).
pub(crate) fn make_generator_object(vm: &mut Vm<'_>, lit: &Rc<FuncLit>, env: HeapId) -> RunResult<Value> {
    let Some(plan) = lit.plan.clone() else {
        vm.heap.dec_ref(env);
        return Err(RunError::syntax_error("generator body was not lowered"));
    };
    let frame = Frame::new(plan, env);
    let proto = vm.realm.intrinsics.generator_prototype;
    vm.heap.inc_ref(proto);
    let table = crate::object::PropTable::new(Some(proto));
    let r#gen = vm.heap.alloc(HeapData::Generator(JsGenerator::new(frame, table)));
    Ok(Value::Ref(r#gen))
}

/// `next`/`throw`/`return` on a generator object. Returns the iterator
/// result object; uncaught generator throws surface as `Err`.
pub(crate) fn generator_resume(
    vm: &mut Vm<'_>,
    r#gen: HeapId,
    kind: ResumeKind,
    payload: Value,
) -> RunResult<Value> {
    let Some(generator) = vm.heap.generator_mut(r#gen) else {
        payload.drop_with_heap(vm.heap);
        return Err(RunError::type_error("Method called on an object that is not a generator"));
    };
    match generator.state {
        GenState::Executing => {
            payload.drop_with_heap(vm.heap);
            Err(RunError::type_error("Generator is already running"))
        }
        GenState::Completed => match kind {
            ResumeKind::Next => {
                payload.drop_with_heap(vm.heap);
                Ok(object::make_iter_result(vm, Value::Undefined, true))
            }
            ResumeKind::Return => Ok(object::make_iter_result(vm, payload, true)),
            ResumeKind::Throw => Err(RunError::throw(payload)),
        },
        GenState::Suspended => {
            let mut frame = generator.frame.take().expect("suspended generator has a frame");
            generator.state = GenState::Executing;
            let saved_state = vm.debug_state;
            vm.debug_state = DebugState::Generator;
            let exit = run_frame(vm, &mut frame, Some((kind, payload)));
            vm.debug_state = saved_state;
            match exit {
                Ok(FrameExit::Yielded(value)) => {
                    let generator = vm.heap.generator_mut(r#gen).expect("generator still live");
                    generator.frame = Some(frame);
                    generator.state = GenState::Suspended;
                    Ok(object::make_iter_result(vm, value, false))
                }
                Ok(FrameExit::Return(value)) => {
                    release_frame(vm, *frame);
                    if let Some(generator) = vm.heap.generator_mut(r#gen) {
                        generator.state = GenState::Completed;
                    }
                    Ok(object::make_iter_result(vm, value, true))
                }
                Ok(FrameExit::Awaited(value)) => {
                    value.drop_with_heap(vm.heap);
                    release_frame(vm, *frame);
                    if let Some(generator) = vm.heap.generator_mut(r#gen) {
                        generator.state = GenState::Completed;
                    }
                    Err(RunError::syntax_error("await is only valid in async functions"))
                }
                Err(e) => {
                    release_frame(vm, *frame);
                    if let Some(generator) = vm.heap.generator_mut(r#gen) {
                        generator.state = GenState::Completed;
                    }
                    Err(e)
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Async frames

/// Starts an async function call: builds the frame, drives it to its first
/// suspension (or completion) synchronously, and returns the result promise.
/// Borrows `env` (increments internally).
pub(crate) fn start_async(vm: &mut Vm<'_>, lit: &Rc<FuncLit>, env: HeapId, name: StringId) -> RunResult<Value> {
    let Some(plan) = lit.plan.clone() else {
        return Err(RunError::syntax_error("async body was not lowered"));
    };
    vm.heap.inc_ref(env);
    let frame = Box::new(Frame::new(plan, env));
    let result_promise = promise::new_promise(vm);
    vm.heap.inc_ref(result_promise);
    let cell = vm.heap.alloc(HeapData::Frame(FrameCell { frame: None, promise: result_promise, name }));
    let drive = drive_async(vm, cell, frame, None);
    match drive {
        Ok(()) => {
            let out = Value::Ref(result_promise);
            vm.heap.dec_ref(cell);
            Ok(out)
        }
        Err(fatal) => {
            vm.heap.dec_ref(result_promise);
            vm.heap.dec_ref(cell);
            Err(fatal)
        }
    }
}

/// Resumes a parked async frame with a settlement. Called from the job
/// queue.
pub(crate) fn resume_async_frame(vm: &mut Vm<'_>, cell: HeapId, kind: ResumeKind, value: Value) -> RunResult<()> {
    let frame = match vm.heap.get_mut(cell) {
        HeapData::Frame(c) => c.frame.take(),
        _ => None,
    };
    let Some(frame) = frame else {
        // A stale settlement after the frame completed; nothing to drive.
        value.drop_with_heap(vm.heap);
        return Ok(());
    };
    vm.heap.inc_ref(cell);
    let result = drive_async(vm, cell, frame, Some((kind, value)));
    vm.heap.dec_ref(cell);
    result
}

/// Runs an async frame until it suspends, completes, or throws; parks it or
/// settles its promise accordingly. Only fatal conditions return `Err`.
fn drive_async(
    vm: &mut Vm<'_>,
    cell: HeapId,
    mut frame: Box<Frame>,
    resume: Option<(ResumeKind, Value)>,
) -> RunResult<()> {
    let saved_state = vm.debug_state;
    vm.debug_state = DebugState::Async;
    let exit = run_frame(vm, &mut frame, resume);
    vm.debug_state = saved_state;
    let promise_id = match vm.heap.get(cell) {
        HeapData::Frame(c) => c.promise,
        _ => unreachable!("async cell is a frame"),
    };
    match exit {
        Ok(FrameExit::Awaited(value)) => {
            // Park the frame; the awaited value's settlement resumes it.
            match vm.heap.get_mut(cell) {
                HeapData::Frame(c) => c.frame = Some(frame),
                _ => unreachable!(),
            }
            let awaited = promise::promise_of(vm, value);
            vm.heap.inc_ref(cell);
            vm.heap.inc_ref(cell);
            promise::add_reaction(
                vm,
                awaited,
                Reaction { on_fulfill: Handler::Resume(cell), on_reject: Handler::Resume(cell), derived: None },
            );
            vm.heap.dec_ref(awaited);
            Ok(())
        }
        Ok(FrameExit::Return(value)) => {
            release_frame(vm, *frame);
            promise::resolve(vm, promise_id, value);
            Ok(())
        }
        Ok(FrameExit::Yielded(value)) => {
            value.drop_with_heap(vm.heap);
            release_frame(vm, *frame);
            Err(RunError::syntax_error("yield is only valid inside a generator"))
        }
        Err(e) if e.is_catchable() => {
            release_frame(vm, *frame);
            let reason = promise::error_to_value(vm, e);
            promise::reject(vm, promise_id, reason);
            Ok(())
        }
        Err(fatal) => {
            release_frame(vm, *frame);
            Err(fatal)
        }
    }
}

// ---------------------------------------------------------------------------
// The step loop

enum Control {
    Continue,
    Exit(FrameExit),
}

/// Why the frame is unwinding.
enum Unwinding {
    Throw(RunError),
    Return(Value),
    Goto { target: BlockId, depth: u32 },
}

fn run_frame(vm: &mut Vm<'_>, frame: &mut Frame, resume: Option<(ResumeKind, Value)>) -> RunResult<FrameExit> {
    // The frame's temps become visible to `Eval` steps through the vm;
    // nested frames save and restore around their own runs.
    let saved_temps = std::mem::take(&mut vm.frame_temps);
    vm.frame_temps = std::mem::take(&mut frame.temps);
    let result = run_frame_inner(vm, frame, resume);
    frame.temps = std::mem::take(&mut vm.frame_temps);
    vm.frame_temps = saved_temps;
    result
}

fn run_frame_inner(
    vm: &mut Vm<'_>,
    frame: &mut Frame,
    resume: Option<(ResumeKind, Value)>,
) -> RunResult<FrameExit> {
    // Deliver the resume payload.
    if let Some((kind, payload)) = resume {
        if frame.delegate.is_some() {
            match delegate_forward(vm, frame, kind, payload)? {
                Control::Continue => {}
                Control::Exit(exit) => return Ok(exit),
            }
        } else if !frame.started {
            frame.started = true;
            match kind {
                ResumeKind::Next => payload.drop_with_heap(vm.heap),
                ResumeKind::Throw => {
                    return match unwind(vm, frame, Unwinding::Throw(RunError::throw(payload)))? {
                        Control::Continue => step_loop(vm, frame),
                        Control::Exit(exit) => Ok(exit),
                    };
                }
                ResumeKind::Return => {
                    return match unwind(vm, frame, Unwinding::Return(payload))? {
                        Control::Continue => step_loop(vm, frame),
                        Control::Exit(exit) => Ok(exit),
                    };
                }
            }
        } else {
            match kind {
                ResumeKind::Next => frame.stack.push(payload),
                ResumeKind::Throw => {
                    match unwind(vm, frame, Unwinding::Throw(RunError::throw(payload)))? {
                        Control::Continue => {}
                        Control::Exit(exit) => return Ok(exit),
                    }
                }
                ResumeKind::Return => match unwind(vm, frame, Unwinding::Return(payload))? {
                    Control::Continue => {}
                    Control::Exit(exit) => return Ok(exit),
                },
            }
        }
    }
    frame.started = true;
    step_loop(vm, frame)
}

fn step_loop(vm: &mut Vm<'_>, frame: &mut Frame) -> RunResult<FrameExit> {
    let mut ticks = 0u32;
    loop {
        ticks += 1;
        if ticks % 256 == 0 {
            vm.deadline.check()?;
        }
        let plan = Rc::clone(&frame.plan);
        let block = &plan.blocks[frame.block as usize];
        debug_assert!((frame.step as usize) < block.len(), "fell off the end of a block");
        let step = &block[frame.step as usize];
        frame.step += 1;
        match exec_step(vm, frame, step) {
            Ok(Control::Continue) => {}
            Ok(Control::Exit(exit)) => return Ok(exit),
            Err(e) if e.is_catchable() => match unwind(vm, frame, Unwinding::Throw(e))? {
                Control::Continue => {}
                Control::Exit(exit) => return Ok(exit),
            },
            Err(fatal) => return Err(fatal),
        }
    }
}

fn jump(frame: &mut Frame, target: BlockId) {
    frame.block = target.0;
    frame.step = 0;
}

fn exec_step(vm: &mut Vm<'_>, frame: &mut Frame, step: &Step) -> RunResult<Control> {
    match step {
        Step::Eval(expr) => {
            let value = interp::eval_expr(vm, frame.env, expr)?;
            frame.stack.push(value);
            Ok(Control::Continue)
        }
        Step::Pop => {
            let value = frame.stack.pop().expect("operand stack underflow");
            value.drop_with_heap(vm.heap);
            Ok(Control::Continue)
        }
        Step::StoreTemp(index) => {
            let value = frame.stack.pop().expect("operand stack underflow");
            let old = std::mem::replace(&mut vm.frame_temps[*index as usize], value);
            old.drop_with_heap(vm.heap);
            Ok(Control::Continue)
        }
        Step::Declare { name, kind } => {
            env::declare(vm.heap, frame.env, *name, *kind, None);
            Ok(Control::Continue)
        }
        Step::InitVar { name } => {
            let value = frame.stack.pop().expect("operand stack underflow");
            env::init_binding(vm.heap, frame.env, *name, value);
            Ok(Control::Continue)
        }
        Step::BindPattern { pattern, kind } => {
            let value = frame.stack.pop().expect("operand stack underflow");
            interp::bind_pattern(vm, frame.env, pattern, value, *kind)?;
            Ok(Control::Continue)
        }
        Step::EnterScope => {
            let prev_env = frame.env;
            frame.env = env::new_scope(vm.heap, Some(prev_env), ScopeKind::Block);
            frame.guards.push(Guard::Scope { prev_env });
            Ok(Control::Continue)
        }
        Step::ExitScope => {
            let Some(Guard::Scope { prev_env }) = frame.guards.pop() else {
                unreachable!("ExitScope without a scope guard");
            };
            let current = frame.env;
            frame.env = prev_env;
            vm.heap.dec_ref(current);
            Ok(Control::Continue)
        }
        Step::Yield => {
            let value = frame.stack.pop().expect("operand stack underflow");
            Ok(Control::Exit(FrameExit::Yielded(value)))
        }
        Step::Await => {
            let value = frame.stack.pop().expect("operand stack underflow");
            Ok(Control::Exit(FrameExit::Awaited(value)))
        }
        Step::YieldStar => {
            let iterable = frame.stack.pop().expect("operand stack underflow");
            let iter = interp::get_iterator(vm, &iterable, frame.plan.origin);
            iterable.drop_with_heap(vm.heap);
            frame.delegate = Some(iter?);
            delegate_forward(vm, frame, ResumeKind::Next, Value::Undefined)
        }
        Step::Jump(target) => {
            jump(frame, *target);
            Ok(Control::Continue)
        }
        Step::JumpIf { if_true, if_false } => {
            let cond = frame.stack.pop().expect("operand stack underflow");
            let truthy = cond.to_boolean(vm.heap, vm.interns);
            cond.drop_with_heap(vm.heap);
            jump(frame, if truthy { *if_true } else { *if_false });
            Ok(Control::Continue)
        }
        Step::EnterTry { catch, finally, catch_param } => {
            frame.guards.push(Guard::Try(TryGuard {
                catch: *catch,
                finally: *finally,
                catch_param: catch_param.clone(),
                state: TryState::Active,
            }));
            Ok(Control::Continue)
        }
        Step::LeaveTry { exit } => {
            let Some(Guard::Try(mut tg)) = frame.guards.pop() else {
                unreachable!("LeaveTry without a try guard");
            };
            if let Some(fin) = tg.finally.take() {
                tg.state = TryState::InFinally(Pending::Resume(*exit));
                frame.guards.push(Guard::Try(tg));
                jump(frame, fin);
            } else {
                jump(frame, *exit);
            }
            Ok(Control::Continue)
        }
        Step::EndFinally => {
            let Some(Guard::Try(tg)) = frame.guards.pop() else {
                unreachable!("EndFinally without a try guard");
            };
            let TryState::InFinally(pending) = tg.state else {
                unreachable!("EndFinally outside a finally block");
            };
            match pending {
                Pending::Resume(target) => {
                    jump(frame, target);
                    Ok(Control::Continue)
                }
                Pending::Unwind { target, depth } => unwind(vm, frame, Unwinding::Goto { target, depth }),
                Pending::Return(v) => unwind(vm, frame, Unwinding::Return(v)),
                Pending::Throw(e) => unwind(vm, frame, Unwinding::Throw(e)),
            }
        }
        Step::Throw => {
            let value = frame.stack.pop().expect("operand stack underflow");
            unwind(vm, frame, Unwinding::Throw(RunError::throw(value).with_origin(frame.plan.origin)))
        }
        Step::Return { has_value } => {
            let value = if *has_value {
                frame.stack.pop().expect("operand stack underflow")
            } else {
                Value::Undefined
            };
            unwind(vm, frame, Unwinding::Return(value))
        }
        Step::Unwind { target, depth } => unwind(vm, frame, Unwinding::Goto { target: *target, depth: *depth }),
        Step::IterInit { kind } => {
            let iterable = frame.stack.pop().expect("operand stack underflow");
            let state = match kind {
                IterKind::Sync => {
                    let iter = interp::get_iterator(vm, &iterable, frame.plan.origin);
                    iterable.drop_with_heap(vm.heap);
                    IterState::Proto { iter: iter?, kind: *kind }
                }
                IterKind::Async => {
                    let iter = interp::get_async_iterator(vm, &iterable, frame.plan.origin);
                    iterable.drop_with_heap(vm.heap);
                    IterState::Proto { iter: iter?, kind: *kind }
                }
                IterKind::Keys => {
                    let keys = object::for_in_keys(vm.heap, &iterable);
                    iterable.drop_with_heap(vm.heap);
                    IterState::Keys { keys, index: 0 }
                }
            };
            frame.guards.push(Guard::Iter(state));
            Ok(Control::Continue)
        }
        Step::IterNext { body, exit } => {
            let Some(Guard::Iter(state)) = frame.guards.last_mut() else {
                unreachable!("IterNext without an iterator guard");
            };
            match state {
                IterState::Keys { keys, index } => {
                    if *index < keys.len() {
                        let key = keys[*index];
                        *index += 1;
                        let value = match key {
                            PropKey::Atom(id) => Value::Str(id),
                            PropKey::Index(i) => Value::str(vm.heap, &i.to_string()),
                            PropKey::Sym(_) => Value::Undefined,
                        };
                        frame.stack.push(value);
                        jump(frame, *body);
                    } else {
                        frame.guards.pop();
                        jump(frame, *exit);
                    }
                    Ok(Control::Continue)
                }
                IterState::Proto { iter, .. } => {
                    let iter = iter.clone_immediate_unchecked();
                    let iter = iter.clone_with_heap(vm.heap);
                    let next = interp::iterator_next(vm, &iter, None);
                    iter.drop_with_heap(vm.heap);
                    let (value, done) = next?;
                    if done {
                        value.drop_with_heap(vm.heap);
                        close_guard(vm, frame.guards.pop().expect("iterator guard"), false);
                        jump(frame, *exit);
                    } else {
                        frame.stack.push(value);
                        jump(frame, *body);
                    }
                    Ok(Control::Continue)
                }
            }
        }
        Step::IterCallNext => {
            let Some(Guard::Iter(IterState::Proto { iter, .. })) = frame.guards.last() else {
                unreachable!("IterCallNext without an iterator guard");
            };
            let iter = iter.clone_immediate_unchecked();
            let iter = iter.clone_with_heap(vm.heap);
            let result = interp::iterator_next_raw(vm, &iter, None);
            iter.drop_with_heap(vm.heap);
            frame.stack.push(result?);
            Ok(Control::Continue)
        }
        Step::IterCheck { body, exit } => {
            let result = frame.stack.pop().expect("operand stack underflow");
            let parts = interp::iterator_result_parts(vm, &result);
            result.drop_with_heap(vm.heap);
            let (value, done) = parts?;
            if done {
                value.drop_with_heap(vm.heap);
                close_guard(vm, frame.guards.pop().expect("iterator guard"), false);
                jump(frame, *exit);
            } else {
                frame.stack.push(value);
                jump(frame, *body);
            }
            Ok(Control::Continue)
        }
        Step::DebugPoint => {
            crate::debug::emit_checkpoint(vm, frame.env, frame.plan.origin);
            Ok(Control::Continue)
        }
    }
}

/// Releases a popped guard's state during unwinding. `abrupt` iterator exits
/// close the iterator via `return()`.
fn close_guard(vm: &mut Vm<'_>, guard: Guard, abrupt: bool) {
    match guard {
        Guard::Scope { prev_env } => {
            // Caller restores `frame.env` itself for scope guards popped
            // during unwinding; a guard reaching here is already detached.
            vm.heap.dec_ref(prev_env);
        }
        Guard::Iter(IterState::Proto { iter, .. }) => {
            if abrupt {
                interp::close_iterator(vm, &iter);
            }
            iter.drop_with_heap(vm.heap);
        }
        Guard::Iter(IterState::Keys { .. }) => {}
        Guard::Try(tg) => {
            if let TryState::InFinally(pending) = tg.state {
                drop_pending(vm, pending);
            }
        }
    }
}

fn drop_pending(vm: &mut Vm<'_>, pending: Pending) {
    let mut refs = Vec::new();
    pending.collect_refs(&mut refs);
    for id in refs {
        vm.heap.dec_ref(id);
    }
}

/// The unwinder: pops guards innermost-first, entering covering catch or
/// finally blocks, closing open iterators, and restoring scopes, until the
/// completion delivers.
fn unwind(vm: &mut Vm<'_>, frame: &mut Frame, mut reason: Unwinding) -> RunResult<Control> {
    // An unwind entering the frame aborts any active delegation.
    if let Some(delegate) = frame.delegate.take() {
        if matches!(reason, Unwinding::Throw(_) | Unwinding::Return(_)) {
            interp::close_iterator(vm, &delegate);
        }
        delegate.drop_with_heap(vm.heap);
    }
    loop {
        match &reason {
            Unwinding::Goto { target, depth } => {
                if frame.guards.len() as u32 == *depth {
                    let target = *target;
                    jump(frame, target);
                    return Ok(Control::Continue);
                }
            }
            Unwinding::Throw(_) | Unwinding::Return(_) => {
                if frame.guards.is_empty() {
                    return match reason {
                        Unwinding::Throw(e) => Err(e),
                        Unwinding::Return(v) => Ok(Control::Exit(FrameExit::Return(v))),
                        Unwinding::Goto { .. } => unreachable!(),
                    };
                }
            }
        }
        let guard = frame.guards.pop().expect("guard stack checked above");
        match guard {
            Guard::Scope { prev_env } => {
                let current = frame.env;
                frame.env = prev_env;
                vm.heap.dec_ref(current);
            }
            Guard::Iter(state) => close_guard(vm, Guard::Iter(state), true),
            Guard::Try(mut tg) => {
                let is_throw = matches!(reason, Unwinding::Throw(_));
                if is_throw && matches!(tg.state, TryState::Active) && tg.catch.is_some() {
                    let catch_block = tg.catch.take().expect("catch checked above");
                    let Unwinding::Throw(err) = std::mem::replace(&mut reason, Unwinding::Return(Value::Undefined))
                    else {
                        unreachable!()
                    };
                    if !err.is_catchable() {
                        return Err(err);
                    }
                    let thrown = promise::error_to_value(vm, err);
                    tg.state = TryState::InCatch;
                    frame.guards.push(Guard::Try(tg));
                    frame.stack.push(thrown);
                    jump(frame, catch_block);
                    return Ok(Control::Continue);
                }
                if matches!(tg.state, TryState::Active | TryState::InCatch)
                    && let Some(fin) = tg.finally.take()
                {
                    tg.state = TryState::InFinally(pending_from(reason));
                    frame.guards.push(Guard::Try(tg));
                    jump(frame, fin);
                    return Ok(Control::Continue);
                }
                if let TryState::InFinally(old) = tg.state {
                    // A new completion inside a finally overrides the
                    // deferred one.
                    drop_pending(vm, old);
                }
            }
        }
    }
}

fn pending_from(reason: Unwinding) -> Pending {
    match reason {
        Unwinding::Throw(e) => Pending::Throw(e),
        Unwinding::Return(v) => Pending::Return(v),
        Unwinding::Goto { target, depth } => Pending::Unwind { target, depth },
    }
}

// ---------------------------------------------------------------------------
// yield* delegation

/// Forwards a resume to the delegated iterator, applying the absent-method
/// fallback rules.
fn delegate_forward(vm: &mut Vm<'_>, frame: &mut Frame, kind: ResumeKind, payload: Value) -> RunResult<Control> {
    let iter = frame.delegate.take().expect("delegation target");
    match kind {
        ResumeKind::Next => {
            let result = interp::iterator_next_raw(vm, &iter, Some(payload));
            let result = match result {
                Ok(r) => r,
                Err(e) => {
                    iter.drop_with_heap(vm.heap);
                    return unwind(vm, frame, Unwinding::Throw(e));
                }
            };
            let parts = interp::iterator_result_parts(vm, &result);
            result.drop_with_heap(vm.heap);
            match parts {
                Ok((value, true)) => {
                    // Inner completed: its return value is the yield*
                    // expression result.
                    iter.drop_with_heap(vm.heap);
                    frame.stack.push(value);
                    Ok(Control::Continue)
                }
                Ok((value, false)) => {
                    frame.delegate = Some(iter);
                    Ok(Control::Exit(FrameExit::Yielded(value)))
                }
                Err(e) => {
                    iter.drop_with_heap(vm.heap);
                    unwind(vm, frame, Unwinding::Throw(e))
                }
            }
        }
        ResumeKind::Throw => {
            let throw_method = match object::get(vm, &iter, &PropKey::Atom(crate::intern::StaticStrings::Throw.id())) {
                Ok(m) => m,
                Err(e) => {
                    payload.drop_with_heap(vm.heap);
                    iter.drop_with_heap(vm.heap);
                    return unwind(vm, frame, Unwinding::Throw(e));
                }
            };
            if throw_method.is_callable(vm.heap) {
                let this = iter.clone_with_heap(vm.heap);
                let result = crate::call::call_value(vm, &throw_method, this, vec![payload], frame.plan.origin);
                throw_method.drop_with_heap(vm.heap);
                let result = match result {
                    Ok(r) => r,
                    Err(e) => {
                        iter.drop_with_heap(vm.heap);
                        return unwind(vm, frame, Unwinding::Throw(e));
                    }
                };
                let parts = interp::iterator_result_parts(vm, &result);
                result.drop_with_heap(vm.heap);
                match parts {
                    Ok((value, true)) => {
                        iter.drop_with_heap(vm.heap);
                        frame.stack.push(value);
                        Ok(Control::Continue)
                    }
                    Ok((value, false)) => {
                        frame.delegate = Some(iter);
                        Ok(Control::Exit(FrameExit::Yielded(value)))
                    }
                    Err(e) => {
                        iter.drop_with_heap(vm.heap);
                        unwind(vm, frame, Unwinding::Throw(e))
                    }
                }
            } else {
                // No `throw`: close the delegate, then re-raise in the
                // outer generator.
                throw_method.drop_with_heap(vm.heap);
                interp::close_iterator(vm, &iter);
                iter.drop_with_heap(vm.heap);
                unwind(vm, frame, Unwinding::Throw(RunError::throw(payload)))
            }
        }
        ResumeKind::Return => {
            let return_method =
                match object::get(vm, &iter, &PropKey::Atom(crate::intern::StaticStrings::Return.id())) {
                    Ok(m) => m,
                    Err(e) => {
                        payload.drop_with_heap(vm.heap);
                        iter.drop_with_heap(vm.heap);
                        return unwind(vm, frame, Unwinding::Throw(e));
                    }
                };
            if return_method.is_callable(vm.heap) {
                let this = iter.clone_with_heap(vm.heap);
                let result = crate::call::call_value(vm, &return_method, this, vec![payload], frame.plan.origin);
                return_method.drop_with_heap(vm.heap);
                let result = match result {
                    Ok(r) => r,
                    Err(e) => {
                        iter.drop_with_heap(vm.heap);
                        return unwind(vm, frame, Unwinding::Throw(e));
                    }
                };
                let parts = interp::iterator_result_parts(vm, &result);
                result.drop_with_heap(vm.heap);
                match parts {
                    Ok((value, true)) => {
                        // Inner finished: continue the return completion
                        // with the inner's value.
                        iter.drop_with_heap(vm.heap);
                        unwind(vm, frame, Unwinding::Return(value))
                    }
                    Ok((value, false)) => {
                        // Inner declined to finish; stay delegating.
                        frame.delegate = Some(iter);
                        Ok(Control::Exit(FrameExit::Yielded(value)))
                    }
                    Err(e) => {
                        iter.drop_with_heap(vm.heap);
                        unwind(vm, frame, Unwinding::Throw(e))
                    }
                }
            } else {
                // No `return`: synthesize `{value, done: true}` locally.
                return_method.drop_with_heap(vm.heap);
                iter.drop_with_heap(vm.heap);
                unwind(vm, frame, Unwinding::Return(payload))
            }
        }
    }
}
