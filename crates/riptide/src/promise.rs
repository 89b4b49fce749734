//! The async driver: promise state machine, reactions, and the microtask
//! queue.
//!
//! Settling is one-shot and idempotent. Registering a reaction on a pending
//! promise parks it in the reaction list; settling moves every reaction onto
//! the FIFO job queue, so resolutions created earlier fire earlier. A
//! resolution value that is itself a promise (or a thenable) is adopted:
//! the outer promise settles with the inner's eventual state.
//!
//! Reaction handlers come in four shapes: JS callbacks (`then`), async-frame
//! resumptions (`await`), combinator bookkeeping (`Promise.all` family), and
//! `finally` callbacks with passthrough semantics.

use std::collections::VecDeque;

use crate::{
    call::{self, Vm},
    error::{RunError, RunResult, ThrowPayload},
    heap::{HeapData, HeapId, HeapRefs},
    intern::StaticStrings,
    object::{self, PropKey, PropTable},
    value::Value,
};

#[derive(Debug)]
pub(crate) enum PromiseState {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

#[derive(Debug)]
pub(crate) struct JsPromise {
    pub state: PromiseState,
    /// Reactions parked until settlement; freed (moved to the job queue) on
    /// settle.
    pub reactions: Vec<Reaction>,
    /// Set once `resolve` has been called with a not-yet-settled source
    /// (thenable adoption in flight); later resolve/reject calls are
    /// ignored.
    pub resolving: bool,
    pub table: PropTable,
}

impl JsPromise {
    pub fn state_tag(&self) -> &'static str {
        match self.state {
            PromiseState::Pending => "pending",
            PromiseState::Fulfilled(_) => "fulfilled",
            PromiseState::Rejected(_) => "rejected",
        }
    }
}

impl HeapRefs for JsPromise {
    fn collect_refs(self, out: &mut Vec<HeapId>) {
        match self.state {
            PromiseState::Pending => {}
            PromiseState::Fulfilled(v) | PromiseState::Rejected(v) => v.collect_refs(out),
        }
        for reaction in self.reactions {
            reaction.collect_refs(out);
        }
        self.table.collect_refs(out);
    }
}

/// Which settlement a queued handler responds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Fulfill,
    Reject,
}

/// What runs when a settlement reaches a reaction.
#[derive(Debug)]
pub(crate) enum Handler {
    /// Pass the value through to the derived promise (fulfillments
    /// fulfill, rejections reject).
    Identity,
    /// Call a JS function with the settled value; its result resolves the
    /// derived promise, its throw rejects it.
    Fn(Value),
    /// `finally` callback: called with no arguments, original settlement
    /// passes through unless the callback throws.
    FinallyFn(Value),
    /// Resume the async frame parked in this cell.
    Resume(HeapId),
    /// Step a combinator group record.
    Group { group: HeapId, index: u32 },
}

impl HeapRefs for Handler {
    fn collect_refs(self, out: &mut Vec<HeapId>) {
        match self {
            Self::Identity => {}
            Self::Fn(f) | Self::FinallyFn(f) => f.collect_refs(out),
            Self::Resume(cell) => out.push(cell),
            Self::Group { group, .. } => out.push(group),
        }
    }
}

/// A `(handler, handler, nextPromise)` triple registered by `then` (or the
/// engine's await/combinator plumbing).
#[derive(Debug)]
pub(crate) struct Reaction {
    pub on_fulfill: Handler,
    pub on_reject: Handler,
    /// The promise settled by the handler outcome (owned); `None` for
    /// engine-internal reactions that settle elsewhere.
    pub derived: Option<HeapId>,
}

impl HeapRefs for Reaction {
    fn collect_refs(self, out: &mut Vec<HeapId>) {
        self.on_fulfill.collect_refs(out);
        self.on_reject.collect_refs(out);
        if let Some(derived) = self.derived {
            out.push(derived);
        }
    }
}

/// `Promise.all`-family bookkeeping.
#[derive(Debug)]
pub(crate) struct GroupRecord {
    pub kind: GroupKind,
    /// Results slot per element, index order preserved.
    pub results: Vec<Value>,
    /// For `Promise.any`: collected rejection reasons.
    pub errors: Vec<Value>,
    pub pending: usize,
    /// The combinator's result promise (owned).
    pub derived: HeapId,
    pub settled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GroupKind {
    All,
    AllSettled,
    Any,
    Race,
}

impl HeapRefs for GroupRecord {
    fn collect_refs(self, out: &mut Vec<HeapId>) {
        self.results.collect_refs(out);
        self.errors.collect_refs(out);
        out.push(self.derived);
    }
}

/// A queued microtask.
#[derive(Debug)]
pub(crate) enum Job {
    /// Deliver one settlement to one handler.
    RunReaction { handler: Handler, side: Side, value: Value, derived: Option<HeapId> },
    /// Adopt a thenable: call its `then` with the promise's resolving pair.
    AdoptThenable { promise: HeapId, thenable: Value },
}

/// FIFO microtask queue, owned by the engine.
#[derive(Debug, Default)]
pub(crate) struct JobQueue {
    queue: VecDeque<Job>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self { queue: VecDeque::new() }
    }

    pub fn enqueue(&mut self, job: Job) {
        self.queue.push_back(job);
    }

    pub fn dequeue(&mut self) -> Option<Job> {
        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

/// Enumerates the heap references a discarded job owns (engine disposal).
pub(crate) fn collect_job_refs(job: Job, out: &mut Vec<HeapId>) {
    match job {
        Job::RunReaction { handler, value, derived, .. } => {
            handler.collect_refs(out);
            value.collect_refs(out);
            if let Some(derived) = derived {
                out.push(derived);
            }
        }
        Job::AdoptThenable { promise, thenable } => {
            out.push(promise);
            thenable.collect_refs(out);
        }
    }
}

/// Allocates a fresh pending promise linked to the realm's prototype.
pub(crate) fn new_promise(vm: &mut Vm<'_>) -> HeapId {
    let proto = vm.realm.intrinsics.promise_prototype;
    vm.heap.inc_ref(proto);
    vm.heap.alloc(HeapData::Promise(JsPromise {
        state: PromiseState::Pending,
        reactions: Vec::new(),
        resolving: false,
        table: PropTable::new(Some(proto)),
    }))
}

/// Registers a reaction, firing immediately (through the job queue) if the
/// promise has already settled. Takes ownership of the reaction's values.
pub(crate) fn add_reaction(vm: &mut Vm<'_>, promise: HeapId, reaction: Reaction) {
    let Some(p) = vm.heap.promise_mut(promise) else {
        let mut refs = Vec::new();
        reaction.collect_refs(&mut refs);
        for id in refs {
            vm.heap.dec_ref(id);
        }
        return;
    };
    match &p.state {
        PromiseState::Pending => p.reactions.push(reaction),
        PromiseState::Fulfilled(value) => {
            let value = value.clone_immediate_unchecked();
            let value = value.clone_with_heap(vm.heap);
            release_handler(vm, reaction.on_reject);
            vm.jobs.enqueue(Job::RunReaction {
                handler: reaction.on_fulfill,
                side: Side::Fulfill,
                value,
                derived: reaction.derived,
            });
        }
        PromiseState::Rejected(value) => {
            let value = value.clone_immediate_unchecked();
            let value = value.clone_with_heap(vm.heap);
            release_handler(vm, reaction.on_fulfill);
            vm.jobs.enqueue(Job::RunReaction {
                handler: reaction.on_reject,
                side: Side::Reject,
                value,
                derived: reaction.derived,
            });
        }
    }
}

fn release_handler(vm: &mut Vm<'_>, handler: Handler) {
    let mut refs = Vec::new();
    handler.collect_refs(&mut refs);
    for id in refs {
        vm.heap.dec_ref(id);
    }
}

/// Fulfills a promise (one-shot; settled and resolving promises ignore the
/// call unless `locked` is passed by the adoption path itself). Consumes
/// `value`.
pub(crate) fn fulfill(vm: &mut Vm<'_>, promise: HeapId, value: Value) {
    settle(vm, promise, Side::Fulfill, value);
}

/// Rejects a promise (one-shot). Consumes `reason`.
pub(crate) fn reject(vm: &mut Vm<'_>, promise: HeapId, reason: Value) {
    settle(vm, promise, Side::Reject, reason);
}

fn settle(vm: &mut Vm<'_>, promise: HeapId, side: Side, value: Value) {
    let Some(p) = vm.heap.promise_mut(promise) else {
        value.drop_with_heap(vm.heap);
        return;
    };
    if !matches!(p.state, PromiseState::Pending) {
        value.drop_with_heap(vm.heap);
        return;
    }
    let reactions = std::mem::take(&mut p.reactions);
    let stored = value.clone_immediate_unchecked();
    p.state = match side {
        Side::Fulfill => PromiseState::Fulfilled(stored),
        Side::Reject => PromiseState::Rejected(stored),
    };
    p.resolving = false;
    // Reaction lists are freed on settlement: each moves to the job queue
    // with its own copy of the settled value.
    for reaction in reactions {
        let value = value.clone_with_heap(vm.heap);
        let (handler, unused) = match side {
            Side::Fulfill => (reaction.on_fulfill, reaction.on_reject),
            Side::Reject => (reaction.on_reject, reaction.on_fulfill),
        };
        release_handler(vm, unused);
        vm.jobs.enqueue(Job::RunReaction { handler, side, value, derived: reaction.derived });
    }
    // The promise's stored copy owns the original reference.
}

/// `resolve(promise, value)`: adopts promises and thenables, fulfills with
/// anything else. Consumes `value`.
pub(crate) fn resolve(vm: &mut Vm<'_>, promise: HeapId, value: Value) {
    {
        let Some(p) = vm.heap.promise(promise) else {
            value.drop_with_heap(vm.heap);
            return;
        };
        if !matches!(p.state, PromiseState::Pending) || p.resolving {
            value.drop_with_heap(vm.heap);
            return;
        }
    }
    if let Value::Ref(id) = &value {
        if *id == promise {
            value.drop_with_heap(vm.heap);
            let error = materialize_error(vm, crate::error::ExcKind::TypeError, "Chaining cycle detected for promise");
            reject(vm, promise, error);
            return;
        }
        if vm.heap.promise(*id).is_some() {
            // Adopt our own promise type directly: an identity reaction
            // settles the outer with the inner's state.
            let inner = *id;
            if let Some(p) = vm.heap.promise_mut(promise) {
                p.resolving = true;
            }
            vm.heap.inc_ref(promise);
            add_reaction(
                vm,
                inner,
                Reaction { on_fulfill: Handler::Identity, on_reject: Handler::Identity, derived: Some(promise) },
            );
            value.drop_with_heap(vm.heap);
            return;
        }
        // Thenable adoption goes through the job queue, per the standard
        // one-tick delay.
        let then = object::get(vm, &value, &PropKey::Atom(StaticStrings::Then.id()));
        match then {
            Ok(then) if then.is_callable(vm.heap) => {
                then.drop_with_heap(vm.heap);
                if let Some(p) = vm.heap.promise_mut(promise) {
                    p.resolving = true;
                }
                vm.heap.inc_ref(promise);
                vm.jobs.enqueue(Job::AdoptThenable { promise, thenable: value });
                return;
            }
            Ok(then) => then.drop_with_heap(vm.heap),
            Err(err) => {
                value.drop_with_heap(vm.heap);
                let reason = error_to_value(vm, err);
                reject(vm, promise, reason);
                return;
            }
        }
    }
    settle_through(vm, promise, Side::Fulfill, value);
}

/// Settles through the `resolving` latch (used by identity adoption, which
/// set the latch itself).
fn settle_through(vm: &mut Vm<'_>, promise: HeapId, side: Side, value: Value) {
    if let Some(p) = vm.heap.promise_mut(promise) {
        p.resolving = false;
    }
    settle(vm, promise, side, value);
}

/// `Promise.resolve` semantics: an existing promise passes through, any
/// other value wraps in a new resolved promise. Consumes `value`, returns an
/// owned promise id.
pub(crate) fn promise_of(vm: &mut Vm<'_>, value: Value) -> HeapId {
    if let Value::Ref(id) = &value
        && vm.heap.promise(*id).is_some()
    {
        let id = *id;
        // The value's reference transfers to the caller.
        return id;
    }
    let promise = new_promise(vm);
    resolve(vm, promise, value);
    promise
}

/// Builds the resolving-functions pair for a promise.
pub(crate) fn resolver_pair(vm: &mut Vm<'_>, promise: HeapId) -> (Value, Value) {
    let resolve_fn = call::make_resolver(vm, promise, false);
    let reject_fn = call::make_resolver(vm, promise, true);
    (resolve_fn, reject_fn)
}

/// Converts a catchable error into the JS value that rejects a promise.
pub(crate) fn error_to_value(vm: &mut Vm<'_>, err: RunError) -> Value {
    match err {
        RunError::Throw { payload: ThrowPayload::Value(v), .. } => v,
        RunError::Throw { payload: ThrowPayload::Simple(kind, message), .. } => {
            materialize_error(vm, kind, &message)
        }
        RunError::Fatal(_) => {
            // Fatal conditions never become JS values; callers check
            // is_catchable first. Render something sane anyway.
            materialize_error(vm, crate::error::ExcKind::Error, "internal: fatal error escaped")
        }
    }
}

/// Materializes an engine error into a JS error object.
pub(crate) fn materialize_error(vm: &mut Vm<'_>, kind: crate::error::ExcKind, message: &str) -> Value {
    crate::builtins::errors::make_error_value(vm, kind, message)
}

/// Runs one microtask.
pub(crate) fn run_job(vm: &mut Vm<'_>, job: Job) -> RunResult<()> {
    match job {
        Job::RunReaction { handler, side, value, derived } => run_reaction(vm, handler, side, value, derived),
        Job::AdoptThenable { promise, thenable } => {
            let (resolve_fn, reject_fn) = resolver_pair(vm, promise);
            let then = object::get(vm, &thenable, &PropKey::Atom(StaticStrings::Then.id()))?;
            let this = thenable.clone_with_heap(vm.heap);
            let result =
                call::call_value(vm, &then, this, vec![resolve_fn, reject_fn], crate::ast::Span::default());
            then.drop_with_heap(vm.heap);
            thenable.drop_with_heap(vm.heap);
            match result {
                Ok(v) => v.drop_with_heap(vm.heap),
                Err(err) if err.is_catchable() => {
                    let reason = error_to_value(vm, err);
                    // The latch is ours to clear: adoption failed.
                    if let Some(p) = vm.heap.promise_mut(promise) {
                        p.resolving = false;
                    }
                    reject(vm, promise, reason);
                }
                Err(fatal) => {
                    vm.heap.dec_ref(promise);
                    return Err(fatal);
                }
            }
            vm.heap.dec_ref(promise);
            Ok(())
        }
    }
}

fn run_reaction(
    vm: &mut Vm<'_>,
    handler: Handler,
    side: Side,
    value: Value,
    derived: Option<HeapId>,
) -> RunResult<()> {
    match handler {
        Handler::Identity => {
            if let Some(derived) = derived {
                match side {
                    Side::Fulfill => settle_through(vm, derived, Side::Fulfill, value),
                    Side::Reject => settle_through(vm, derived, Side::Reject, value),
                }
                vm.heap.dec_ref(derived);
            } else {
                value.drop_with_heap(vm.heap);
            }
            Ok(())
        }
        Handler::Fn(f) => {
            let result = call::call_value(vm, &f, Value::Undefined, vec![value], crate::ast::Span::default());
            f.drop_with_heap(vm.heap);
            match result {
                Ok(v) => {
                    if let Some(derived) = derived {
                        resolve(vm, derived, v);
                        vm.heap.dec_ref(derived);
                    } else {
                        v.drop_with_heap(vm.heap);
                    }
                    Ok(())
                }
                Err(err) if err.is_catchable() => {
                    let reason = error_to_value(vm, err);
                    if let Some(derived) = derived {
                        reject(vm, derived, reason);
                        vm.heap.dec_ref(derived);
                    } else {
                        reason.drop_with_heap(vm.heap);
                    }
                    Ok(())
                }
                Err(fatal) => {
                    if let Some(derived) = derived {
                        vm.heap.dec_ref(derived);
                    }
                    Err(fatal)
                }
            }
        }
        Handler::FinallyFn(f) => {
            let result = call::call_value(vm, &f, Value::Undefined, Vec::new(), crate::ast::Span::default());
            f.drop_with_heap(vm.heap);
            match result {
                Ok(v) => {
                    v.drop_with_heap(vm.heap);
                    if let Some(derived) = derived {
                        settle_through(vm, derived, side, value);
                        vm.heap.dec_ref(derived);
                    } else {
                        value.drop_with_heap(vm.heap);
                    }
                    Ok(())
                }
                Err(err) if err.is_catchable() => {
                    value.drop_with_heap(vm.heap);
                    let reason = error_to_value(vm, err);
                    if let Some(derived) = derived {
                        reject(vm, derived, reason);
                        vm.heap.dec_ref(derived);
                    } else {
                        reason.drop_with_heap(vm.heap);
                    }
                    Ok(())
                }
                Err(fatal) => {
                    value.drop_with_heap(vm.heap);
                    if let Some(derived) = derived {
                        vm.heap.dec_ref(derived);
                    }
                    Err(fatal)
                }
            }
        }
        Handler::Resume(cell) => {
            let resume = match side {
                Side::Fulfill => crate::irvm::ResumeKind::Next,
                Side::Reject => crate::irvm::ResumeKind::Throw,
            };
            let result = crate::irvm::resume_async_frame(vm, cell, resume, value);
            vm.heap.dec_ref(cell);
            result
        }
        Handler::Group { group, index } => {
            let result = group_step(vm, group, index, side, value);
            vm.heap.dec_ref(group);
            result
        }
    }
}

/// Delivers one element settlement to a combinator group.
fn group_step(vm: &mut Vm<'_>, group: HeapId, index: u32, side: Side, value: Value) -> RunResult<()> {
    let Some(record) = vm.heap.group_mut(group) else {
        value.drop_with_heap(vm.heap);
        return Ok(());
    };
    if record.settled {
        value.drop_with_heap(vm.heap);
        return Ok(());
    }
    let kind = record.kind;
    let derived = record.derived;
    match (kind, side) {
        (GroupKind::Race, _) => {
            record.settled = true;
            settle_through(vm, derived, side, value);
        }
        (GroupKind::All, Side::Fulfill) => {
            store_group_result(vm, group, index, value);
            finish_group_if_done(vm, group)?;
        }
        (GroupKind::All, Side::Reject) => {
            let record = vm.heap.group_mut(group).expect("group checked above");
            record.settled = true;
            reject(vm, derived, value);
        }
        (GroupKind::AllSettled, _) => {
            let entry = make_settled_entry(vm, side, value);
            store_group_result(vm, group, index, entry);
            finish_group_if_done(vm, group)?;
        }
        (GroupKind::Any, Side::Fulfill) => {
            let record = vm.heap.group_mut(group).expect("group checked above");
            record.settled = true;
            settle_through(vm, derived, Side::Fulfill, value);
        }
        (GroupKind::Any, Side::Reject) => {
            let record = vm.heap.group_mut(group).expect("group checked above");
            record.errors[index as usize] = value;
            record.pending -= 1;
            if record.pending == 0 {
                record.settled = true;
                let errors = std::mem::take(&mut record.errors);
                let error = crate::builtins::errors::make_error_value(
                    vm,
                    crate::error::ExcKind::Error,
                    "All promises were rejected",
                );
                let errors_key = PropKey::Atom(vm.interns.intern("errors"));
                let errors_array = object::new_array(vm, errors);
                object::set(vm, &error, errors_key, Value::Ref(errors_array))?;
                reject(vm, derived, error);
            }
        }
    }
    Ok(())
}

fn store_group_result(vm: &mut Vm<'_>, group: HeapId, index: u32, value: Value) {
    let record = vm.heap.group_mut(group).expect("group record");
    let old = std::mem::replace(&mut record.results[index as usize], value);
    record.pending -= 1;
    old.drop_with_heap(vm.heap);
}

fn finish_group_if_done(vm: &mut Vm<'_>, group: HeapId) -> RunResult<()> {
    let record = vm.heap.group_mut(group).expect("group record");
    if record.pending > 0 || record.settled {
        return Ok(());
    }
    record.settled = true;
    let derived = record.derived;
    let results = std::mem::take(&mut record.results);
    let array = object::new_array(vm, results);
    settle_through(vm, derived, Side::Fulfill, Value::Ref(array));
    Ok(())
}

fn make_settled_entry(vm: &mut Vm<'_>, side: Side, value: Value) -> Value {
    let proto = vm.realm.intrinsics.object_prototype;
    vm.heap.inc_ref(proto);
    let mut table = PropTable::new(Some(proto));
    match side {
        Side::Fulfill => {
            let status = Value::str(vm.heap, "fulfilled");
            table.insert_data_value(PropKey::Atom(StaticStrings::Status.id()), status);
            table.insert_data_value(PropKey::Atom(StaticStrings::Value.id()), value);
        }
        Side::Reject => {
            let status = Value::str(vm.heap, "rejected");
            table.insert_data_value(PropKey::Atom(StaticStrings::Status.id()), status);
            table.insert_data_value(PropKey::Atom(StaticStrings::Reason.id()), value);
        }
    }
    Value::Ref(vm.heap.alloc(HeapData::Object(table)))
}
