//! The CPS transform for `async function` bodies.
//!
//! An async body is partitioned at every `await` into segments. In this
//! engine the segments are concrete: each resume point starts a fresh block
//! in the step IR, so the lowered plan's blocks *are* the continuation
//! table, the frame's `(block, step)` program counter is the top-level
//! dispatch on the resume payload, and the `EnterTry` guard stack doubles as
//! the per-segment reject-handler table (a rejection resumes the frame on
//! the throw path and the unwinder routes it to the covering handler).
//!
//! The transform itself is the shared [`PlanBuilder`](crate::lower); this
//! module owns the async-only pieces: the entry point and the
//! `for await … of` desugaring into a loop that awaits `iterator.next()`,
//! inspects `done`, and hands the (awaited) value to a plain loop body.

use crate::{
    ast::{Expr, ForHead, FuncLit, Stmt},
    intern::StringId,
    ir::{IterKind, Plan, PlanFlavor, Step},
    lower::{self, LowerError, PlanBuilder},
};

/// Lowers an `async function` body into its segmented plan.
pub(crate) fn lower_async_body(lit: &FuncLit) -> Result<Plan, LowerError> {
    lower::build_plan(lit, PlanFlavor::Async)
}

/// Desugars `for await (head of iterable) body`.
///
/// The loop head issues `iter.next()`, awaits the raw step result (sync
/// iterators hand back a plain result object, async iterators a promise —
/// the implicit await absorbs both), checks `done`, then awaits the element
/// value itself before binding it. That last await is what makes
/// `for await (let v of [Promise.resolve(1)])` see `1`.
pub(crate) fn lower_for_await(
    b: &mut PlanBuilder,
    left: &ForHead,
    iterable: &Expr,
    body: &Stmt,
    label: Option<StringId>,
) -> Result<(), LowerError> {
    let depth_outside = b.guard_depth();
    b.lower_expr_value(iterable)?;
    b.emit_step(Step::IterInit { kind: IterKind::Async });
    b.adjust_guard_depth(1);

    let b_head = b.open_block();
    let b_value = b.open_block();
    let b_exit = b.open_block();
    b.emit_step(Step::Jump(b_head));

    b.continue_in(b_head);
    b.emit_step(Step::IterCallNext);
    b.emit_step(Step::Await);
    b.emit_step(Step::IterCheck { body: b_value, exit: b_exit });

    b.push_iter_loop_ctx(label, b_exit, depth_outside, b_head);
    b.continue_in(b_value);
    b.emit_step(Step::Await);
    b.lower_iter_binding(left)?;
    b.lower_stmt_pub(body)?;
    b.lower_iter_binding_end(left);
    b.emit_step(Step::Jump(b_head));
    b.pop_ctx();
    b.adjust_guard_depth(-1);

    b.continue_in(b_exit);
    Ok(())
}
