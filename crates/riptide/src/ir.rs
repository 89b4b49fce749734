//! The step IR that suspendable function bodies lower into.
//!
//! A [`Plan`] is a directed graph of numbered blocks, each a linear list of
//! [`Step`]s. Non-suspendable subexpressions stay as AST inside `Eval` steps
//! (the tree interpreter runs them); everything that can observe a
//! suspension point is decomposed across steps with frame temps carrying
//! intermediate results.
//!
//! Generator bodies and async bodies share this vocabulary: `Yield` and
//! `YieldStar` appear only in generator plans, `Await` only in async plans.
//! For an async plan, the blocks that begin at each resume point are the CPS
//! segments, the frame's program counter is the segment dispatch, and the
//! `EnterTry` guard stack is the per-segment reject-handler table.

use std::rc::Rc;

use crate::{
    ast::{Expr, Pattern, Span},
    env::BindingKind,
    intern::StringId,
};

/// Index of a block within its plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockId(pub u32);

impl BlockId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PlanFlavor {
    Generator,
    Async,
}

/// A lowered suspendable body.
#[derive(Debug)]
pub(crate) struct Plan {
    pub blocks: Vec<Vec<Step>>,
    /// Number of frame temp slots the steps reference.
    pub temp_count: u32,
    pub flavor: PlanFlavor,
    /// Function name for stack frames and debug messages.
    pub name: StringId,
    /// Origin of the function this plan was lowered from.
    pub origin: Span,
}

/// Which iteration protocol an `IterInit` sets up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IterKind {
    /// `for…of`: the `@@iterator` protocol.
    Sync,
    /// `for await…of`: `@@asyncIterator` with `@@iterator` fallback; each
    /// step's result and value pass through an implicit `await`.
    Async,
    /// `for…in`: a snapshot of enumerable string keys.
    Keys,
}

/// One instruction of a lowered body.
///
/// Steps that "pop" consume the top of the frame's operand stack; steps that
/// "push" leave a value there.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    /// Evaluate a non-suspendable expression (it may read temp slots) and
    /// push the result.
    Eval(Expr),
    /// Pop and discard.
    Pop,
    /// Pop into temp slot `0`-based.
    StoreTemp(u32),
    /// Declare a binding in the current scope; `let`/`const` start in their
    /// TDZ.
    Declare { name: StringId, kind: BindingKind },
    /// Pop and initialize a declared binding (the declaration statement
    /// itself executing).
    InitVar { name: StringId },
    /// Pop and destructure. `kind: Some` declares-and-initializes,
    /// `None` assigns to existing targets.
    BindPattern { pattern: Rc<Pattern>, kind: Option<BindingKind> },
    /// Enter a fresh block scope.
    EnterScope,
    /// Leave the innermost block scope.
    ExitScope,
    /// Pop the operand, suspend, emit `{value, done: false}`. Resuming with
    /// `next(v)` pushes `v`; `throw`/`return` unwind.
    Yield,
    /// Pop the iterable and delegate until the inner iterator completes;
    /// push its return value.
    YieldStar,
    /// Pop the operand, suspend until its promise settles. Resuming pushes
    /// the fulfilled value or unwinds with the rejection.
    Await,
    Jump(BlockId),
    /// Pop the condition and branch on its truthiness.
    JumpIf { if_true: BlockId, if_false: BlockId },
    /// Push a try guard covering the following region.
    EnterTry {
        catch: Option<BlockId>,
        finally: Option<BlockId>,
        /// Catch binding; the unwinder pushes the thrown value for it. A
        /// `None` still receives the push (the catch block pops it).
        catch_param: Option<Rc<Pattern>>,
    },
    /// Normal completion of the protected region or catch block: run the
    /// finally (if any), then continue at `exit`.
    LeaveTry { exit: BlockId },
    /// Normal completion of a finally block: deliver the deferred
    /// completion.
    EndFinally,
    /// Pop and throw.
    Throw,
    /// Pop (if `has_value`) and return, running intervening finallies.
    Return { has_value: bool },
    /// `break`/`continue`: unwind guards down to `depth` (running finallies,
    /// closing iterators, popping scopes), then continue at `target`.
    Unwind { target: BlockId, depth: u32 },
    /// Pop the iterable and push an iterator guard.
    IterInit { kind: IterKind },
    /// Advance the innermost iterator (sync/keys): on done pop the guard and
    /// jump `exit`; otherwise push the value and jump `body`.
    IterNext { body: BlockId, exit: BlockId },
    /// Async protocol, first half: call `iter.next()` and push the raw
    /// result for the following `Await`.
    IterCallNext,
    /// Async protocol, second half: pop the awaited step result; on done pop
    /// the guard and jump `exit`, else push `result.value` and jump `body`.
    IterCheck { body: BlockId, exit: BlockId },
    /// Emit a debug checkpoint.
    DebugPoint,
}

/// Counters for lowering rejections, readable by the host.
///
/// The enumerated language surface must lower with zero rejections; anything
/// counted here was refused at parse time with a SyntaxError.
#[derive(Debug, Default, Clone)]
pub struct IrDiagnostics {
    /// Plans successfully built.
    pub plans_built: u64,
    /// Constructs rejected, keyed by reason.
    pub rejections: std::collections::BTreeMap<&'static str, u64>,
}

impl IrDiagnostics {
    pub(crate) fn reject(&mut self, reason: &'static str) {
        *self.rejections.entry(reason).or_insert(0) += 1;
    }

    /// Total rejected lowerings.
    #[must_use]
    pub fn rejected(&self) -> u64 {
        self.rejections.values().sum()
    }
}
