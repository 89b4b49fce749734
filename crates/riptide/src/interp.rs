//! The tree interpreter for non-suspendable code.
//!
//! Expressions evaluate to owned [`Value`]s; statements evaluate to a
//! [`Flow`] completion, with throws traveling on the `Err` side of
//! [`RunResult`]. `try`/`catch`/`finally` is the only construct that
//! transforms one completion into another: catch turns a throw into normal,
//! finally runs on every exit path and may override the pending completion
//! with its own.
//!
//! Suspendable bodies never reach this interpreter whole; the lowering
//! passes hand it the non-suspendable fragments as `Eval` steps (which may
//! read frame temps through [`ExprKind::Temp`]).

use std::rc::Rc;

use crate::{
    ast::{
        Arg, ArrayItem, AssignOp, AssignTarget, BinaryOp, CatchClause, ClassLit, ClassMember, ClassMemberKind,
        DeclKind, Declarator, Expr, ExprKind, ForHead, ForInit, FuncBody, FuncLit, Literal, LogicalOp, MemberProp,
        ObjectItem, Pattern, PropName, Span, Stmt, StmtKind, SwitchCase, UnaryOp, UpdateOp,
    },
    call::{self, CallThis, Vm},
    env::{self, BindingKind, ScopeKind},
    error::{RunError, RunResult},
    heap::{HeapData, HeapId},
    intern::{StaticStrings, StringId, SymbolId},
    object::{self, PropKey, Property, PropTable, PropValue},
    value::{self, Hint, Value},
};

/// Statement completion (throw travels as `Err`).
#[derive(Debug)]
pub(crate) enum Flow {
    Normal,
    Return(Value),
    Break(Option<StringId>),
    Continue(Option<StringId>),
}

impl Flow {
    pub fn discard(self, vm: &mut Vm<'_>) {
        if let Self::Return(v) = self {
            v.drop_with_heap(vm.heap);
        }
    }
}

/// Runs a whole program against the global scope, returning the completion
/// value (the value of the last top-level expression statement).
pub(crate) fn run_program(vm: &mut Vm<'_>, program: &crate::ast::Program) -> RunResult<Value> {
    let env = vm.realm.global_env;
    let (vars, funcs) = crate::ast::hoisted_decls(&program.body);
    for name in vars {
        env::declare_global_var(vm, name)?;
    }
    for func in funcs {
        let closure = call::make_closure(vm, &func, env, None);
        let name = func.name.unwrap_or(StaticStrings::EmptyString.id());
        env::define_global(vm, name, closure)?;
    }
    for (name, kind) in crate::ast::lexical_decls(&program.body) {
        let kind = match kind {
            DeclKind::Const => BindingKind::Const,
            _ => BindingKind::Let,
        };
        env::declare(vm.heap, env, name, kind, None);
    }

    let mut completion = Value::Undefined;
    for stmt in &program.body {
        if let StmtKind::Expr(e) = &stmt.kind {
            let v = eval_expr(vm, env, e).map_err(|err| err.with_origin(stmt.span))?;
            completion.drop_with_heap(vm.heap);
            completion = v;
        } else {
            match exec_stmt(vm, env, stmt) {
                Ok(Flow::Normal) => {}
                Ok(flow) => {
                    flow.discard(vm);
                    completion.drop_with_heap(vm.heap);
                    return Err(RunError::syntax_error("Illegal return/break/continue at top level")
                        .with_origin(stmt.span));
                }
                Err(e) => {
                    completion.drop_with_heap(vm.heap);
                    return Err(e);
                }
            }
        }
    }
    Ok(completion)
}

/// Runs a function body to its completion value.
pub(crate) fn run_function_body(vm: &mut Vm<'_>, env: HeapId, lit: &FuncLit) -> RunResult<Value> {
    match &lit.body {
        FuncBody::Expr(e) => eval_expr(vm, env, e),
        FuncBody::Block(body) => match exec_stmts(vm, env, body)? {
            Flow::Return(v) => Ok(v),
            Flow::Normal => Ok(Value::Undefined),
            Flow::Break(_) | Flow::Continue(_) => {
                Err(RunError::syntax_error("Illegal break/continue").with_origin(lit.span))
            }
        },
    }
}

/// Runs a statement list without introducing a scope.
pub(crate) fn exec_stmts(vm: &mut Vm<'_>, env: HeapId, stmts: &[Stmt]) -> RunResult<Flow> {
    for stmt in stmts {
        match exec_stmt(vm, env, stmt)? {
            Flow::Normal => {}
            other => return Ok(other),
        }
    }
    Ok(Flow::Normal)
}

/// Enters a block: fresh scope when the block declares lexicals, with TDZ
/// bindings and block-level function declarations set up.
fn exec_block(vm: &mut Vm<'_>, env: HeapId, stmts: &[Stmt]) -> RunResult<Flow> {
    if !crate::ast::needs_block_scope(stmts) {
        return exec_stmts(vm, env, stmts);
    }
    let scope = enter_block_scope(vm, env, stmts)?;
    let flow = exec_stmts(vm, scope, stmts);
    vm.heap.dec_ref(scope);
    flow
}

/// Creates a block scope with its lexical declarations (TDZ) and block-level
/// function declarations (initialized immediately).
pub(crate) fn enter_block_scope(vm: &mut Vm<'_>, env: HeapId, stmts: &[Stmt]) -> RunResult<HeapId> {
    let scope = env::new_scope(vm.heap, Some(env), ScopeKind::Block);
    for (name, kind) in crate::ast::lexical_decls(stmts) {
        let kind = match kind {
            DeclKind::Const => BindingKind::Const,
            _ => BindingKind::Let,
        };
        env::declare(vm.heap, scope, name, kind, None);
    }
    for stmt in stmts {
        if let StmtKind::FuncDecl(func) = &stmt.kind {
            let closure = call::make_closure(vm, func, scope, None);
            let name = func.name.unwrap_or(StaticStrings::EmptyString.id());
            env::declare(vm.heap, scope, name, BindingKind::Function, Some(closure));
        }
    }
    Ok(scope)
}

pub(crate) fn exec_stmt(vm: &mut Vm<'_>, env: HeapId, stmt: &Stmt) -> RunResult<Flow> {
    let result = exec_stmt_inner(vm, env, stmt);
    result.map_err(|e| e.with_origin(stmt.span))
}

fn exec_stmt_inner(vm: &mut Vm<'_>, env: HeapId, stmt: &Stmt) -> RunResult<Flow> {
    match &stmt.kind {
        StmtKind::Empty | StmtKind::FuncDecl(_) => Ok(Flow::Normal),
        StmtKind::Expr(e) => {
            let v = eval_expr(vm, env, e)?;
            v.drop_with_heap(vm.heap);
            Ok(Flow::Normal)
        }
        StmtKind::VarDecl { kind, declarators } => {
            exec_var_decl(vm, env, *kind, declarators)?;
            Ok(Flow::Normal)
        }
        StmtKind::ClassDecl(class) => {
            let value = eval_class(vm, env, class)?;
            let name = class.name.expect("class declarations are named");
            env::init_binding(vm.heap, env, name, value);
            Ok(Flow::Normal)
        }
        StmtKind::Return(arg) => {
            let value = match arg {
                Some(e) => eval_expr(vm, env, e)?,
                None => Value::Undefined,
            };
            Ok(Flow::Return(value))
        }
        StmtKind::If { test, then_branch, else_branch } => {
            let t = eval_expr(vm, env, test)?;
            let truthy = t.to_boolean(vm.heap, vm.interns);
            t.drop_with_heap(vm.heap);
            if truthy {
                exec_stmt(vm, env, then_branch)
            } else if let Some(else_branch) = else_branch {
                exec_stmt(vm, env, else_branch)
            } else {
                Ok(Flow::Normal)
            }
        }
        StmtKind::Block(stmts) => exec_block(vm, env, stmts),
        StmtKind::While { test, body } => exec_while(vm, env, test, body, None),
        StmtKind::DoWhile { body, test } => exec_do_while(vm, env, body, test, None),
        StmtKind::For { init, test, update, body } => exec_for(vm, env, init, test, update, body, None),
        StmtKind::ForIn { left, object, body } => exec_for_in(vm, env, left, object, body, None),
        StmtKind::ForOf { left, iterable, body, is_await } => {
            if *is_await {
                return Err(RunError::syntax_error("for await is only valid in async functions"));
            }
            exec_for_of(vm, env, left, iterable, body, None)
        }
        StmtKind::Switch { discriminant, cases } => exec_switch(vm, env, discriminant, cases),
        StmtKind::Break(label) => Ok(Flow::Break(*label)),
        StmtKind::Continue(label) => Ok(Flow::Continue(*label)),
        StmtKind::Labeled { label, body } => {
            let flow = match &body.kind {
                StmtKind::While { test, body } => exec_while(vm, env, test, body, Some(*label))?,
                StmtKind::DoWhile { body, test } => exec_do_while(vm, env, body, test, Some(*label))?,
                StmtKind::For { init, test, update, body } => {
                    exec_for(vm, env, init, test, update, body, Some(*label))?
                }
                StmtKind::ForIn { left, object, body } => exec_for_in(vm, env, left, object, body, Some(*label))?,
                StmtKind::ForOf { left, iterable, body, is_await: false } => {
                    exec_for_of(vm, env, left, iterable, body, Some(*label))?
                }
                _ => exec_stmt(vm, env, body)?,
            };
            match flow {
                Flow::Break(Some(l)) if l == *label => Ok(Flow::Normal),
                other => Ok(other),
            }
        }
        StmtKind::Try { block, catch, finally } => exec_try(vm, env, block, catch.as_ref(), finally.as_deref()),
        StmtKind::Throw(e) => {
            let value = eval_expr(vm, env, e)?;
            Err(RunError::throw(value).with_origin(stmt.span))
        }
        StmtKind::Debugger => {
            crate::debug::emit_checkpoint(vm, env, stmt.span);
            Ok(Flow::Normal)
        }
    }
}

fn exec_var_decl(vm: &mut Vm<'_>, env: HeapId, kind: DeclKind, declarators: &[Declarator]) -> RunResult<()> {
    let bind_kind = match kind {
        DeclKind::Var => BindingKind::Var,
        DeclKind::Let => BindingKind::Let,
        DeclKind::Const => BindingKind::Const,
    };
    for decl in declarators {
        let value = match &decl.init {
            Some(e) => eval_expr(vm, env, e)?,
            None => Value::Undefined,
        };
        bind_pattern(vm, env, &decl.pattern, value, Some(bind_kind))?;
    }
    Ok(())
}

/// Loop-flow helper: decides whether a body completion continues the loop.
enum LoopFlow {
    Continue,
    Break,
    Propagate(Flow),
}

fn loop_body_flow(flow: Flow, label: Option<StringId>) -> LoopFlow {
    match flow {
        Flow::Normal | Flow::Continue(None) => LoopFlow::Continue,
        Flow::Continue(Some(l)) if Some(l) == label => LoopFlow::Continue,
        Flow::Break(None) => LoopFlow::Break,
        Flow::Break(Some(l)) if Some(l) == label => LoopFlow::Break,
        other => LoopFlow::Propagate(other),
    }
}

fn exec_while(
    vm: &mut Vm<'_>,
    env: HeapId,
    test: &Expr,
    body: &Stmt,
    label: Option<StringId>,
) -> RunResult<Flow> {
    loop {
        vm.deadline.check()?;
        let t = eval_expr(vm, env, test)?;
        let truthy = t.to_boolean(vm.heap, vm.interns);
        t.drop_with_heap(vm.heap);
        if !truthy {
            return Ok(Flow::Normal);
        }
        match loop_body_flow(exec_stmt(vm, env, body)?, label) {
            LoopFlow::Continue => {}
            LoopFlow::Break => return Ok(Flow::Normal),
            LoopFlow::Propagate(flow) => return Ok(flow),
        }
    }
}

fn exec_do_while(
    vm: &mut Vm<'_>,
    env: HeapId,
    body: &Stmt,
    test: &Expr,
    label: Option<StringId>,
) -> RunResult<Flow> {
    loop {
        vm.deadline.check()?;
        match loop_body_flow(exec_stmt(vm, env, body)?, label) {
            LoopFlow::Continue => {}
            LoopFlow::Break => return Ok(Flow::Normal),
            LoopFlow::Propagate(flow) => return Ok(flow),
        }
        let t = eval_expr(vm, env, test)?;
        let truthy = t.to_boolean(vm.heap, vm.interns);
        t.drop_with_heap(vm.heap);
        if !truthy {
            return Ok(Flow::Normal);
        }
    }
}

#[expect(clippy::too_many_arguments)]
fn exec_for(
    vm: &mut Vm<'_>,
    env: HeapId,
    init: &Option<ForInit>,
    test: &Option<Expr>,
    update: &Option<Expr>,
    body: &Stmt,
    label: Option<StringId>,
) -> RunResult<Flow> {
    // `let`/`const` in the init clause get one loop-wide scope.
    let (scope, owned) = match init {
        Some(ForInit::Decl { kind: DeclKind::Let | DeclKind::Const, .. }) => {
            (env::new_scope(vm.heap, Some(env), ScopeKind::Block), true)
        }
        _ => (env, false),
    };
    let result = exec_for_inner(vm, scope, init, test, update, body, label);
    if owned {
        vm.heap.dec_ref(scope);
    }
    result
}

#[expect(clippy::too_many_arguments)]
fn exec_for_inner(
    vm: &mut Vm<'_>,
    env: HeapId,
    init: &Option<ForInit>,
    test: &Option<Expr>,
    update: &Option<Expr>,
    body: &Stmt,
    label: Option<StringId>,
) -> RunResult<Flow> {
    match init {
        Some(ForInit::Decl { kind, declarators }) => {
            for decl in declarators {
                let name_kind = match kind {
                    DeclKind::Var => BindingKind::Var,
                    DeclKind::Let => BindingKind::Let,
                    DeclKind::Const => BindingKind::Const,
                };
                if !matches!(kind, DeclKind::Var) {
                    let mut names = Vec::new();
                    crate::ast::pattern_names(&decl.pattern, &mut names);
                    for name in names {
                        env::declare(vm.heap, env, name, name_kind, None);
                    }
                }
                let value = match &decl.init {
                    Some(e) => eval_expr(vm, env, e)?,
                    None => Value::Undefined,
                };
                bind_pattern(vm, env, &decl.pattern, value, Some(name_kind))?;
            }
        }
        Some(ForInit::Expr(e)) => {
            let v = eval_expr(vm, env, e)?;
            v.drop_with_heap(vm.heap);
        }
        None => {}
    }
    loop {
        vm.deadline.check()?;
        if let Some(test) = test {
            let t = eval_expr(vm, env, test)?;
            let truthy = t.to_boolean(vm.heap, vm.interns);
            t.drop_with_heap(vm.heap);
            if !truthy {
                return Ok(Flow::Normal);
            }
        }
        match loop_body_flow(exec_stmt(vm, env, body)?, label) {
            LoopFlow::Continue => {}
            LoopFlow::Break => return Ok(Flow::Normal),
            LoopFlow::Propagate(flow) => return Ok(flow),
        }
        if let Some(update) = update {
            let v = eval_expr(vm, env, update)?;
            v.drop_with_heap(vm.heap);
        }
    }
}

/// Binds a `for…in`/`for…of` head to the current iteration value.
fn bind_for_head(vm: &mut Vm<'_>, env: HeapId, left: &ForHead, value: Value) -> RunResult<HeapId> {
    match left {
        ForHead::Decl { kind, pattern } => {
            let scope = match kind {
                DeclKind::Var => {
                    vm.heap.inc_ref(env);
                    env
                }
                // Fresh scope per iteration for `let`/`const`.
                _ => env::new_scope(vm.heap, Some(env), ScopeKind::Block),
            };
            let bind_kind = match kind {
                DeclKind::Var => BindingKind::Var,
                DeclKind::Let => BindingKind::Let,
                DeclKind::Const => BindingKind::Const,
            };
            if !matches!(kind, DeclKind::Var) {
                let mut names = Vec::new();
                crate::ast::pattern_names(pattern, &mut names);
                for name in names {
                    env::declare(vm.heap, scope, name, bind_kind, None);
                }
            }
            if let Err(e) = bind_pattern(vm, scope, pattern, value, Some(bind_kind)) {
                vm.heap.dec_ref(scope);
                return Err(e);
            }
            Ok(scope)
        }
        ForHead::Target(target) => {
            assign_to_target(vm, env, target, value)?;
            vm.heap.inc_ref(env);
            Ok(env)
        }
    }
}

fn exec_for_in(
    vm: &mut Vm<'_>,
    env: HeapId,
    left: &ForHead,
    object: &Expr,
    body: &Stmt,
    label: Option<StringId>,
) -> RunResult<Flow> {
    let target = eval_expr(vm, env, object)?;
    if target.is_nullish() {
        target.drop_with_heap(vm.heap);
        return Ok(Flow::Normal);
    }
    let keys = object::for_in_keys(vm.heap, &target);
    target.drop_with_heap(vm.heap);
    for key in keys {
        vm.deadline.check()?;
        let key_value = match key {
            PropKey::Atom(id) => Value::Str(id),
            PropKey::Index(i) => Value::str(vm.heap, &i.to_string()),
            PropKey::Sym(_) => continue,
        };
        let scope = bind_for_head(vm, env, left, key_value)?;
        let flow = exec_stmt(vm, scope, body);
        vm.heap.dec_ref(scope);
        match loop_body_flow(flow?, label) {
            LoopFlow::Continue => {}
            LoopFlow::Break => return Ok(Flow::Normal),
            LoopFlow::Propagate(flow) => return Ok(flow),
        }
    }
    Ok(Flow::Normal)
}

fn exec_for_of(
    vm: &mut Vm<'_>,
    env: HeapId,
    left: &ForHead,
    iterable: &Expr,
    body: &Stmt,
    label: Option<StringId>,
) -> RunResult<Flow> {
    let target = eval_expr(vm, env, iterable)?;
    let iter = get_iterator(vm, &target, iterable.span);
    target.drop_with_heap(vm.heap);
    let iter = iter?;
    let result = exec_for_of_loop(vm, env, left, &iter, body, label);
    // Abrupt exits close the iterator (return() runs pending finallies in
    // generator iterators).
    match &result {
        Ok(Flow::Normal) => {}
        _ => close_iterator(vm, &iter),
    }
    iter.drop_with_heap(vm.heap);
    // The break sentinel from the loop body means "exit this loop normally".
    match result {
        Ok(Flow::Break(None)) => Ok(Flow::Normal),
        other => other,
    }
}

fn exec_for_of_loop(
    vm: &mut Vm<'_>,
    env: HeapId,
    left: &ForHead,
    iter: &Value,
    body: &Stmt,
    label: Option<StringId>,
) -> RunResult<Flow> {
    loop {
        vm.deadline.check()?;
        let (value, done) = iterator_next(vm, iter, None)?;
        if done {
            value.drop_with_heap(vm.heap);
            return Ok(Flow::Normal);
        }
        let scope = bind_for_head(vm, env, left, value)?;
        let flow = exec_stmt(vm, scope, body);
        vm.heap.dec_ref(scope);
        match loop_body_flow(flow?, label) {
            LoopFlow::Continue => {}
            LoopFlow::Break => return Ok(Flow::Break(None)),
            LoopFlow::Propagate(flow) => return Ok(flow),
        }
    }
}

fn exec_switch(vm: &mut Vm<'_>, env: HeapId, discriminant: &Expr, cases: &[SwitchCase]) -> RunResult<Flow> {
    let disc = eval_expr(vm, env, discriminant)?;
    // One scope covers every case body (they share lexical declarations).
    let mut scope = env;
    let mut owned = false;
    let needs_scope = cases.iter().any(|c| crate::ast::needs_block_scope(&c.body));
    if needs_scope {
        scope = env::new_scope(vm.heap, Some(env), ScopeKind::Block);
        owned = true;
        for case in cases {
            for (name, kind) in crate::ast::lexical_decls(&case.body) {
                let kind = match kind {
                    DeclKind::Const => BindingKind::Const,
                    _ => BindingKind::Let,
                };
                env::declare(vm.heap, scope, name, kind, None);
            }
        }
    }
    let result = exec_switch_inner(vm, scope, &disc, cases);
    disc.drop_with_heap(vm.heap);
    if owned {
        vm.heap.dec_ref(scope);
    }
    result
}

fn exec_switch_inner(vm: &mut Vm<'_>, env: HeapId, disc: &Value, cases: &[SwitchCase]) -> RunResult<Flow> {
    let mut start = None;
    for (i, case) in cases.iter().enumerate() {
        if let Some(test) = &case.test {
            let t = eval_expr(vm, env, test)?;
            let matched = disc.strict_eq(&t, vm.heap, vm.interns);
            t.drop_with_heap(vm.heap);
            if matched {
                start = Some(i);
                break;
            }
        }
    }
    if start.is_none() {
        start = cases.iter().position(|c| c.test.is_none());
    }
    let Some(start) = start else { return Ok(Flow::Normal) };
    for case in &cases[start..] {
        match exec_stmts(vm, env, &case.body)? {
            Flow::Normal => {}
            Flow::Break(None) => return Ok(Flow::Normal),
            other => return Ok(other),
        }
    }
    Ok(Flow::Normal)
}

fn exec_try(
    vm: &mut Vm<'_>,
    env: HeapId,
    block: &[Stmt],
    catch: Option<&CatchClause>,
    finally: Option<&[Stmt]>,
) -> RunResult<Flow> {
    let mut outcome = exec_block(vm, env, block);
    if let Err(err) = &outcome
        && err.is_catchable()
        && let Some(clause) = catch
    {
        let Err(err) = outcome else { unreachable!() };
        let thrown = crate::promise::error_to_value(vm, err);
        outcome = run_catch(vm, env, clause, thrown);
    }
    if let Some(finally) = finally {
        // Finally runs regardless and may override the pending completion
        // with its own non-normal completion.
        match exec_block(vm, env, finally) {
            Ok(Flow::Normal) => {}
            Ok(override_flow) => {
                discard_outcome(vm, outcome);
                outcome = Ok(override_flow);
            }
            Err(e) => {
                discard_outcome(vm, outcome);
                outcome = Err(e);
            }
        }
    }
    outcome
}

fn run_catch(vm: &mut Vm<'_>, env: HeapId, clause: &CatchClause, thrown: Value) -> RunResult<Flow> {
    let scope = enter_block_scope(vm, env, &clause.body)?;
    let bound = match &clause.param {
        Some(pattern) => {
            let mut names = Vec::new();
            crate::ast::pattern_names(pattern, &mut names);
            for name in names {
                env::declare(vm.heap, scope, name, BindingKind::Let, None);
            }
            bind_pattern(vm, scope, pattern, thrown, Some(BindingKind::Let))
        }
        None => {
            thrown.drop_with_heap(vm.heap);
            Ok(())
        }
    };
    let flow = match bound {
        Ok(()) => exec_stmts(vm, scope, &clause.body),
        Err(e) => Err(e),
    };
    vm.heap.dec_ref(scope);
    flow
}

fn discard_outcome(vm: &mut Vm<'_>, outcome: RunResult<Flow>) {
    match outcome {
        Ok(flow) => flow.discard(vm),
        Err(err) => {
            if let RunError::Throw { payload: crate::error::ThrowPayload::Value(v), .. } = err {
                v.drop_with_heap(vm.heap);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Expressions

pub(crate) fn eval_expr(vm: &mut Vm<'_>, env: HeapId, expr: &Expr) -> RunResult<Value> {
    Ok(eval_expr_opt(vm, env, expr)?.unwrap_or(Value::Undefined))
}

/// Expression evaluation with optional-chain short-circuiting: `None` means
/// a `?.` hit a nullish base, which silences the rest of the member/call
/// chain.
fn eval_expr_opt(vm: &mut Vm<'_>, env: HeapId, expr: &Expr) -> RunResult<Option<Value>> {
    match &expr.kind {
        ExprKind::Literal(lit) => Ok(Some(eval_literal(lit))),
        ExprKind::Ident(name) => env::lookup(vm, env, *name).map(Some).map_err(|e| e.with_origin(expr.span)),
        ExprKind::This => env::get_this(vm, env).map(Some).map_err(|e| e.with_origin(expr.span)),
        ExprKind::Temp(index) => {
            let value = vm.frame_temps[*index as usize].clone_immediate_unchecked();
            Ok(Some(value.clone_with_heap(vm.heap)))
        }
        ExprKind::Template { quasis, exprs } => {
            let mut out = String::new();
            out.push_str(vm.interns.get(quasis[0]));
            for (i, e) in exprs.iter().enumerate() {
                let v = eval_expr(vm, env, e)?;
                let s = value::to_string(vm, &v);
                v.drop_with_heap(vm.heap);
                out.push_str(&s?);
                out.push_str(vm.interns.get(quasis[i + 1]));
            }
            Ok(Some(Value::str(vm.heap, &out)))
        }
        ExprKind::Array(items) => eval_array_literal(vm, env, items).map(Some),
        ExprKind::Object(items) => eval_object_literal(vm, env, items).map(Some),
        ExprKind::Function(lit) => Ok(Some(call::make_closure(vm, lit, env, None))),
        ExprKind::Class(class) => eval_class(vm, env, class).map(Some),
        ExprKind::Regex { source, flags } => {
            let source = vm.interns.get(*source).to_owned();
            let flags = vm.interns.get(*flags).to_owned();
            crate::builtins::regexp_mod::make_regex(vm, &source, &flags)
                .map(Some)
                .map_err(|e| e.with_origin(expr.span))
        }
        ExprKind::Unary { op, operand } => eval_unary(vm, env, *op, operand).map(Some),
        ExprKind::Update { op, prefix, target } => eval_update(vm, env, *op, *prefix, target).map(Some),
        ExprKind::Binary { op, left, right } => eval_binary_expr(vm, env, *op, left, right, expr.span).map(Some),
        ExprKind::Logical { op, left, right } => {
            let l = eval_expr(vm, env, left)?;
            let take_right = match op {
                LogicalOp::And => l.to_boolean(vm.heap, vm.interns),
                LogicalOp::Or => !l.to_boolean(vm.heap, vm.interns),
                LogicalOp::Nullish => l.is_nullish(),
            };
            if take_right {
                l.drop_with_heap(vm.heap);
                eval_expr(vm, env, right).map(Some)
            } else {
                Ok(Some(l))
            }
        }
        ExprKind::Assign { op, target, value } => eval_assign(vm, env, *op, target, value).map(Some),
        ExprKind::Cond { test, consequent, alternate } => {
            let t = eval_expr(vm, env, test)?;
            let truthy = t.to_boolean(vm.heap, vm.interns);
            t.drop_with_heap(vm.heap);
            if truthy { eval_expr(vm, env, consequent).map(Some) } else { eval_expr(vm, env, alternate).map(Some) }
        }
        ExprKind::Sequence(exprs) => {
            let mut last = Value::Undefined;
            for e in exprs {
                last.drop_with_heap(vm.heap);
                last = eval_expr(vm, env, e)?;
            }
            Ok(Some(last))
        }
        ExprKind::Member { object, property, optional } => {
            let Some(base) = eval_expr_opt(vm, env, object)? else { return Ok(None) };
            if *optional && base.is_nullish() {
                base.drop_with_heap(vm.heap);
                return Ok(None);
            }
            let key = eval_member_key(vm, env, property)?;
            let result = object::get(vm, &base, &key).map_err(|e| e.with_origin(expr.span));
            base.drop_with_heap(vm.heap);
            result.map(Some)
        }
        ExprKind::SuperMember { property } => {
            let key = eval_member_key(vm, env, property)?;
            super_get(vm, env, &key, expr.span).map(Some)
        }
        ExprKind::Call { callee, args, optional } => eval_call(vm, env, callee, args, *optional, expr.span),
        ExprKind::New { callee, args } => {
            let f = eval_expr(vm, env, callee)?;
            let arg_values = call::collect_args(vm, env, args);
            let arg_values = match arg_values {
                Ok(v) => v,
                Err(e) => {
                    f.drop_with_heap(vm.heap);
                    return Err(e);
                }
            };
            let result = call::construct(vm, &f, arg_values, expr.span);
            f.drop_with_heap(vm.heap);
            result.map(Some)
        }
        ExprKind::SuperCall { args } => eval_super_call(vm, env, args, expr.span).map(Some),
        ExprKind::Yield { .. } => Err(RunError::syntax_error("yield is only valid inside a generator")),
        ExprKind::Await(_) => Err(RunError::syntax_error("await is only valid in async functions")),
    }
}

fn eval_literal(lit: &Literal) -> Value {
    match lit {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Number(n) => Value::Number(*n),
        Literal::Str(id) => Value::Str(*id),
    }
}

fn eval_array_literal(vm: &mut Vm<'_>, env: HeapId, items: &[ArrayItem]) -> RunResult<Value> {
    let mut elements: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        match item {
            ArrayItem::Hole => elements.push(Value::Undefined),
            ArrayItem::Expr(e) => match eval_expr(vm, env, e) {
                Ok(v) => elements.push(v),
                Err(err) => {
                    vm.drop_values(elements);
                    return Err(err);
                }
            },
            ArrayItem::Spread(e) => {
                let iterable = match eval_expr(vm, env, e) {
                    Ok(v) => v,
                    Err(err) => {
                        vm.drop_values(elements);
                        return Err(err);
                    }
                };
                match iterate_to_vec(vm, iterable, e.span) {
                    Ok(values) => elements.extend(values),
                    Err(err) => {
                        vm.drop_values(elements);
                        return Err(err);
                    }
                }
            }
        }
    }
    Ok(Value::Ref(object::new_array(vm, elements)))
}

fn eval_object_literal(vm: &mut Vm<'_>, env: HeapId, items: &[ObjectItem]) -> RunResult<Value> {
    let proto = vm.realm.intrinsics.object_prototype;
    vm.heap.inc_ref(proto);
    let obj = vm.heap.alloc(HeapData::Object(PropTable::new(Some(proto))));
    let obj_value = Value::Ref(obj);
    for item in items {
        let result = eval_object_item(vm, env, obj, item);
        if let Err(e) = result {
            obj_value.drop_with_heap(vm.heap);
            return Err(e);
        }
    }
    Ok(obj_value)
}

fn eval_object_item(vm: &mut Vm<'_>, env: HeapId, obj: HeapId, item: &ObjectItem) -> RunResult<()> {
    match item {
        ObjectItem::Property { key, value } => {
            let key = eval_prop_name(vm, env, key)?;
            let v = eval_expr(vm, env, value)?;
            object::define(vm.heap, obj, key, Property::data(v));
            Ok(())
        }
        ObjectItem::Method { key, func } => {
            let key = eval_prop_name(vm, env, key)?;
            let method = call::make_closure(vm, func, env, Some(obj));
            object::define(vm.heap, obj, key, Property::data(method));
            Ok(())
        }
        ObjectItem::Getter { key, func } => {
            let key = eval_prop_name(vm, env, key)?;
            let getter = call::make_closure(vm, func, env, Some(obj));
            define_accessor(vm, obj, key, Some(getter), None);
            Ok(())
        }
        ObjectItem::Setter { key, func } => {
            let key = eval_prop_name(vm, env, key)?;
            let setter = call::make_closure(vm, func, env, Some(obj));
            define_accessor(vm, obj, key, None, Some(setter));
            Ok(())
        }
        ObjectItem::Spread(e) => {
            let source = eval_expr(vm, env, e)?;
            if let Value::Ref(source_id) = &source {
                let keys = object::enumerable_own_string_keys(vm.heap, *source_id);
                for key in keys {
                    let v = object::get(vm, &source, &key)?;
                    object::define(vm.heap, obj, key, Property::data(v));
                }
            }
            source.drop_with_heap(vm.heap);
            Ok(())
        }
    }
}

/// Merges one half of an accessor pair into an existing property.
pub(crate) fn define_accessor(
    vm: &mut Vm<'_>,
    obj: HeapId,
    key: PropKey,
    get: Option<Value>,
    set: Option<Value>,
) {
    let table = vm.heap.table_mut(obj).expect("accessor target is object-like");
    if let Some(prop) = table.get_own_mut(&key)
        && let PropValue::Accessor { get: old_get, set: old_set } = &mut prop.value
    {
        let mut to_drop: Vec<Value> = Vec::new();
        if let Some(g) = get {
            if let Some(old) = std::mem::replace(old_get, Some(g)) {
                to_drop.push(old);
            }
        }
        if let Some(s) = set {
            if let Some(old) = std::mem::replace(old_set, Some(s)) {
                to_drop.push(old);
            }
        }
        for old in to_drop {
            old.drop_with_heap(vm.heap);
        }
        return;
    }
    object::define(vm.heap, obj, key, Property::accessor(get, set));
}

pub(crate) fn eval_prop_name(vm: &mut Vm<'_>, env: HeapId, name: &PropName) -> RunResult<PropKey> {
    match name {
        PropName::Ident(id) | PropName::Str(id) => {
            let s = vm.interns.get(*id);
            match value::canonical_index(s) {
                Some(i) => Ok(PropKey::Index(i)),
                None => Ok(PropKey::Atom(*id)),
            }
        }
        PropName::Num(n) => {
            if n.fract() == 0.0 && *n >= 0.0 && *n < f64::from(u32::MAX) {
                Ok(PropKey::Index(*n as u32))
            } else {
                let s = value::number_to_string(*n);
                Ok(PropKey::Atom(vm.interns.intern(&s)))
            }
        }
        PropName::Computed(e) => {
            let v = eval_expr(vm, env, e)?;
            let key = value::to_property_key(vm, &v);
            v.drop_with_heap(vm.heap);
            key
        }
    }
}

fn eval_member_key(vm: &mut Vm<'_>, env: HeapId, property: &MemberProp) -> RunResult<PropKey> {
    match property {
        MemberProp::Ident(id) => {
            let s = vm.interns.get(*id);
            match value::canonical_index(s) {
                Some(i) => Ok(PropKey::Index(i)),
                None => Ok(PropKey::Atom(*id)),
            }
        }
        MemberProp::Computed(e) => {
            let v = eval_expr(vm, env, e)?;
            let key = value::to_property_key(vm, &v);
            v.drop_with_heap(vm.heap);
            key
        }
    }
}

fn eval_unary(vm: &mut Vm<'_>, env: HeapId, op: UnaryOp, operand: &Expr) -> RunResult<Value> {
    match op {
        UnaryOp::TypeOf => {
            // `typeof unresolved` answers "undefined" instead of throwing.
            if let ExprKind::Ident(name) = &operand.kind
                && !env::is_bound(vm, env, *name)
            {
                return Ok(Value::str(vm.heap, "undefined"));
            }
            let v = eval_expr(vm, env, operand)?;
            let s = v.type_of(vm.heap);
            v.drop_with_heap(vm.heap);
            Ok(Value::str(vm.heap, s))
        }
        UnaryOp::Void => {
            let v = eval_expr(vm, env, operand)?;
            v.drop_with_heap(vm.heap);
            Ok(Value::Undefined)
        }
        UnaryOp::Delete => match &operand.kind {
            ExprKind::Member { object, property, .. } => {
                let base = eval_expr(vm, env, object)?;
                let key = eval_member_key(vm, env, property)?;
                let result = object::delete(vm.heap, &base, &key);
                base.drop_with_heap(vm.heap);
                Ok(Value::Bool(result?))
            }
            _ => {
                let v = eval_expr(vm, env, operand)?;
                v.drop_with_heap(vm.heap);
                Ok(Value::Bool(true))
            }
        },
        UnaryOp::Not => {
            let v = eval_expr(vm, env, operand)?;
            let b = v.to_boolean(vm.heap, vm.interns);
            v.drop_with_heap(vm.heap);
            Ok(Value::Bool(!b))
        }
        UnaryOp::Minus => {
            let v = eval_expr(vm, env, operand)?;
            let n = value::to_number(vm, &v);
            v.drop_with_heap(vm.heap);
            Ok(Value::Number(-n?))
        }
        UnaryOp::Plus => {
            let v = eval_expr(vm, env, operand)?;
            let n = value::to_number(vm, &v);
            v.drop_with_heap(vm.heap);
            Ok(Value::Number(n?))
        }
        UnaryOp::BitNot => {
            let v = eval_expr(vm, env, operand)?;
            let n = value::to_int32(vm, &v);
            v.drop_with_heap(vm.heap);
            Ok(Value::Number(f64::from(!n?)))
        }
    }
}

fn eval_update(
    vm: &mut Vm<'_>,
    env: HeapId,
    op: UpdateOp,
    prefix: bool,
    target: &AssignTarget,
) -> RunResult<Value> {
    let old = read_target(vm, env, target)?;
    let n = value::to_number(vm, &old);
    old.drop_with_heap(vm.heap);
    let n = n?;
    let new = match op {
        UpdateOp::Increment => n + 1.0,
        UpdateOp::Decrement => n - 1.0,
    };
    assign_to_target(vm, env, target, Value::Number(new))?;
    Ok(Value::Number(if prefix { new } else { n }))
}

fn read_target(vm: &mut Vm<'_>, env: HeapId, target: &AssignTarget) -> RunResult<Value> {
    match target {
        AssignTarget::Ident { name, span } => env::lookup(vm, env, *name).map_err(|e| e.with_origin(*span)),
        AssignTarget::Member { object, property, span } => {
            let base = eval_expr(vm, env, object)?;
            let key = eval_member_key(vm, env, property)?;
            let result = object::get(vm, &base, &key).map_err(|e| e.with_origin(*span));
            base.drop_with_heap(vm.heap);
            result
        }
        AssignTarget::Pattern(p) => {
            Err(RunError::syntax_error("Invalid destructuring assignment target").with_origin(p.span()))
        }
    }
}

/// Writes a value to an assignment target. Consumes `value`.
pub(crate) fn assign_to_target(
    vm: &mut Vm<'_>,
    env: HeapId,
    target: &AssignTarget,
    value: Value,
) -> RunResult<()> {
    match target {
        AssignTarget::Ident { name, span } => {
            env::assign(vm, env, *name, value).map_err(|e| e.with_origin(*span))
        }
        AssignTarget::Member { object, property, span } => {
            let base = match eval_expr(vm, env, object) {
                Ok(v) => v,
                Err(e) => {
                    value.drop_with_heap(vm.heap);
                    return Err(e);
                }
            };
            let key = match eval_member_key(vm, env, property) {
                Ok(k) => k,
                Err(e) => {
                    base.drop_with_heap(vm.heap);
                    value.drop_with_heap(vm.heap);
                    return Err(e);
                }
            };
            let result = object::set(vm, &base, key, value).map_err(|e| e.with_origin(*span));
            base.drop_with_heap(vm.heap);
            result
        }
        AssignTarget::Pattern(pattern) => bind_pattern(vm, env, pattern, value, None),
    }
}

fn eval_assign(
    vm: &mut Vm<'_>,
    env: HeapId,
    op: AssignOp,
    target: &AssignTarget,
    value: &Expr,
) -> RunResult<Value> {
    match op {
        AssignOp::Assign => {
            let v = eval_expr(vm, env, value)?;
            let result = v.clone_with_heap(vm.heap);
            assign_to_target(vm, env, target, v)?;
            Ok(result)
        }
        AssignOp::AndAssign | AssignOp::OrAssign | AssignOp::NullishAssign => {
            let current = read_target(vm, env, target)?;
            let should_assign = match op {
                AssignOp::AndAssign => current.to_boolean(vm.heap, vm.interns),
                AssignOp::OrAssign => !current.to_boolean(vm.heap, vm.interns),
                _ => current.is_nullish(),
            };
            if !should_assign {
                return Ok(current);
            }
            current.drop_with_heap(vm.heap);
            let v = eval_expr(vm, env, value)?;
            let result = v.clone_with_heap(vm.heap);
            assign_to_target(vm, env, target, v)?;
            Ok(result)
        }
        _ => {
            let current = read_target(vm, env, target)?;
            let rhs = match eval_expr(vm, env, value) {
                Ok(v) => v,
                Err(e) => {
                    current.drop_with_heap(vm.heap);
                    return Err(e);
                }
            };
            let binop = match op {
                AssignOp::Add => BinaryOp::Add,
                AssignOp::Sub => BinaryOp::Sub,
                AssignOp::Mul => BinaryOp::Mul,
                AssignOp::Div => BinaryOp::Div,
                AssignOp::Rem => BinaryOp::Rem,
                AssignOp::Exp => BinaryOp::Exp,
                AssignOp::BitAnd => BinaryOp::BitAnd,
                AssignOp::BitOr => BinaryOp::BitOr,
                AssignOp::BitXor => BinaryOp::BitXor,
                AssignOp::Shl => BinaryOp::Shl,
                AssignOp::Shr => BinaryOp::Shr,
                AssignOp::UShr => BinaryOp::UShr,
                _ => unreachable!("logical assignments handled above"),
            };
            let combined = eval_binary_values(vm, binop, &current, &rhs);
            current.drop_with_heap(vm.heap);
            rhs.drop_with_heap(vm.heap);
            let combined = combined?;
            let result = combined.clone_with_heap(vm.heap);
            assign_to_target(vm, env, target, combined)?;
            Ok(result)
        }
    }
}

fn eval_binary_expr(
    vm: &mut Vm<'_>,
    env: HeapId,
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    span: Span,
) -> RunResult<Value> {
    let l = eval_expr(vm, env, left)?;
    let r = match eval_expr(vm, env, right) {
        Ok(v) => v,
        Err(e) => {
            l.drop_with_heap(vm.heap);
            return Err(e);
        }
    };
    let result = eval_binary_values(vm, op, &l, &r).map_err(|e| e.with_origin(span));
    l.drop_with_heap(vm.heap);
    r.drop_with_heap(vm.heap);
    result
}

/// Applies a binary operator to already-evaluated operands (borrowed).
pub(crate) fn eval_binary_values(vm: &mut Vm<'_>, op: BinaryOp, l: &Value, r: &Value) -> RunResult<Value> {
    match op {
        BinaryOp::Add => {
            let lp = value::to_primitive(vm, l, Hint::Default)?;
            let rp = match value::to_primitive(vm, r, Hint::Default) {
                Ok(v) => v,
                Err(e) => {
                    lp.drop_with_heap(vm.heap);
                    return Err(e);
                }
            };
            let result = if lp.is_string(vm.heap) || rp.is_string(vm.heap) {
                let ls = value::to_string(vm, &lp);
                let rs = value::to_string(vm, &rp);
                match (ls, rs) {
                    (Ok(ls), Ok(rs)) => Ok(Value::str(vm.heap, &format!("{ls}{rs}"))),
                    (Err(e), _) | (_, Err(e)) => Err(e),
                }
            } else {
                let ln = value::to_number(vm, &lp);
                let rn = value::to_number(vm, &rp);
                match (ln, rn) {
                    (Ok(ln), Ok(rn)) => Ok(Value::Number(ln + rn)),
                    (Err(e), _) | (_, Err(e)) => Err(e),
                }
            };
            lp.drop_with_heap(vm.heap);
            rp.drop_with_heap(vm.heap);
            result
        }
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem | BinaryOp::Exp => {
            let ln = value::to_number(vm, l)?;
            let rn = value::to_number(vm, r)?;
            Ok(Value::Number(match op {
                BinaryOp::Sub => ln - rn,
                BinaryOp::Mul => ln * rn,
                BinaryOp::Div => ln / rn,
                BinaryOp::Rem => {
                    // JS % keeps the dividend's sign (unlike rem_euclid).
                    if rn == 0.0 { f64::NAN } else { ln % rn }
                }
                BinaryOp::Exp => ln.powf(rn),
                _ => unreachable!(),
            }))
        }
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let lp = value::to_primitive(vm, l, Hint::Number)?;
            let rp = match value::to_primitive(vm, r, Hint::Number) {
                Ok(v) => v,
                Err(e) => {
                    lp.drop_with_heap(vm.heap);
                    return Err(e);
                }
            };
            let result = match (lp.as_js_str(vm.heap, vm.interns), rp.as_js_str(vm.heap, vm.interns)) {
                (Some(ls), Some(rs)) => {
                    let ord = ls.cmp(rs);
                    Ok(Value::Bool(match op {
                        BinaryOp::Lt => ord.is_lt(),
                        BinaryOp::LtEq => ord.is_le(),
                        BinaryOp::Gt => ord.is_gt(),
                        BinaryOp::GtEq => ord.is_ge(),
                        _ => unreachable!(),
                    }))
                }
                _ => {
                    let ln = value::to_number(vm, &lp);
                    let rn = value::to_number(vm, &rp);
                    match (ln, rn) {
                        (Ok(ln), Ok(rn)) => Ok(Value::Bool(match op {
                            BinaryOp::Lt => ln < rn,
                            BinaryOp::LtEq => ln <= rn,
                            BinaryOp::Gt => ln > rn,
                            BinaryOp::GtEq => ln >= rn,
                            _ => unreachable!(),
                        })),
                        (Err(e), _) | (_, Err(e)) => Err(e),
                    }
                }
            };
            lp.drop_with_heap(vm.heap);
            rp.drop_with_heap(vm.heap);
            result
        }
        BinaryOp::Eq => value::loose_eq(vm, l, r).map(Value::Bool),
        BinaryOp::NotEq => value::loose_eq(vm, l, r).map(|b| Value::Bool(!b)),
        BinaryOp::StrictEq => Ok(Value::Bool(l.strict_eq(r, vm.heap, vm.interns))),
        BinaryOp::StrictNotEq => Ok(Value::Bool(!l.strict_eq(r, vm.heap, vm.interns))),
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr => {
            let ln = value::to_int32(vm, l)?;
            let rn = value::to_int32(vm, r)?;
            Ok(Value::Number(f64::from(match op {
                BinaryOp::BitAnd => ln & rn,
                BinaryOp::BitOr => ln | rn,
                BinaryOp::BitXor => ln ^ rn,
                BinaryOp::Shl => ln << (rn & 31),
                BinaryOp::Shr => ln >> (rn & 31),
                _ => unreachable!(),
            })))
        }
        BinaryOp::UShr => {
            let ln = value::to_uint32(vm, l)?;
            let rn = value::to_int32(vm, r)?;
            Ok(Value::Number(f64::from(ln >> (rn as u32 & 31))))
        }
        BinaryOp::In => {
            let key = value::to_property_key(vm, l)?;
            object::has(vm, r, &key).map(Value::Bool)
        }
        BinaryOp::InstanceOf => {
            if !r.is_callable(vm.heap) {
                return Err(RunError::type_error("Right-hand side of 'instanceof' is not callable"));
            }
            let proto = object::get(vm, r, &PropKey::Atom(StaticStrings::Prototype.id()))?;
            let Value::Ref(proto_id) = &proto else {
                proto.drop_with_heap(vm.heap);
                return Err(RunError::type_error("Function has non-object prototype in instanceof"));
            };
            let proto_id = *proto_id;
            let mut result = false;
            if let Value::Ref(mut current) = l.clone_immediate_unchecked() {
                let mut depth = 0usize;
                loop {
                    if depth > object::PROTO_DEPTH_LIMIT {
                        break;
                    }
                    depth += 1;
                    let Some(table) = vm.heap.table(current) else { break };
                    match table.proto {
                        Some(p) if p == proto_id => {
                            result = true;
                            break;
                        }
                        Some(p) => current = p,
                        None => break,
                    }
                }
            }
            proto.drop_with_heap(vm.heap);
            Ok(Value::Bool(result))
        }
    }
}

fn eval_call(
    vm: &mut Vm<'_>,
    env: HeapId,
    callee: &Expr,
    args: &[Arg],
    optional: bool,
    span: Span,
) -> RunResult<Option<Value>> {
    // Method calls bind `this` to the receiver of the member expression.
    let (f, this) = match &callee.kind {
        ExprKind::Member { object, property, optional: member_optional } => {
            let Some(base) = eval_expr_opt(vm, env, object)? else { return Ok(None) };
            if *member_optional && base.is_nullish() {
                base.drop_with_heap(vm.heap);
                return Ok(None);
            }
            let key = match eval_member_key(vm, env, property) {
                Ok(k) => k,
                Err(e) => {
                    base.drop_with_heap(vm.heap);
                    return Err(e);
                }
            };
            let f = match object::get(vm, &base, &key) {
                Ok(f) => f,
                Err(e) => {
                    base.drop_with_heap(vm.heap);
                    return Err(e.with_origin(span));
                }
            };
            (f, base)
        }
        ExprKind::SuperMember { property } => {
            let key = eval_member_key(vm, env, property)?;
            let f = super_get(vm, env, &key, span)?;
            let this = env::get_this(vm, env)?;
            (f, this)
        }
        _ => {
            let Some(f) = eval_expr_opt(vm, env, callee)? else { return Ok(None) };
            (f, Value::Undefined)
        }
    };
    if optional && f.is_nullish() {
        f.drop_with_heap(vm.heap);
        this.drop_with_heap(vm.heap);
        return Ok(None);
    }
    // Direct `__debug()` calls snapshot the caller's scope; a generic
    // builtin call would have no environment handle.
    if let Value::Ref(fid) = &f
        && let Some(func) = vm.heap.function(*fid)
        && matches!(func.kind, crate::types::function::FnKind::Builtin(crate::builtins::Builtin::DebugHook))
    {
        f.drop_with_heap(vm.heap);
        this.drop_with_heap(vm.heap);
        let arg_values = call::collect_args(vm, env, args)?;
        vm.drop_values(arg_values);
        crate::debug::emit_checkpoint(vm, env, span);
        return Ok(Some(Value::Undefined));
    }
    let arg_values = match call::collect_args(vm, env, args) {
        Ok(v) => v,
        Err(e) => {
            f.drop_with_heap(vm.heap);
            this.drop_with_heap(vm.heap);
            return Err(e);
        }
    };
    let result = call::call_value(vm, &f, this, arg_values, span);
    f.drop_with_heap(vm.heap);
    result.map(Some)
}

fn super_get(vm: &mut Vm<'_>, env: HeapId, key: &PropKey, span: Span) -> RunResult<Value> {
    let Some(scope) = env::nearest_function_scope(vm.heap, env) else {
        return Err(RunError::syntax_error("'super' keyword unexpected here").with_origin(span));
    };
    let ScopeKind::Function(f) = &vm.heap.env(scope).kind else { unreachable!() };
    let Some(home) = f.home else {
        return Err(RunError::syntax_error("'super' keyword unexpected here").with_origin(span));
    };
    let start = vm.heap.table(home).and_then(|t| t.proto);
    let this = env::get_this(vm, env)?;
    let result = match start {
        Some(start) => object::get_with_start(vm, &this, start, key),
        None => Ok(Value::Undefined),
    };
    this.drop_with_heap(vm.heap);
    result
}

fn eval_super_call(vm: &mut Vm<'_>, env: HeapId, args: &[Arg], span: Span) -> RunResult<Value> {
    let Some(scope) = env::nearest_function_scope(vm.heap, env) else {
        return Err(RunError::syntax_error("'super' keyword unexpected here").with_origin(span));
    };
    let ScopeKind::Function(f) = &vm.heap.env(scope).kind else { unreachable!() };
    let Some(parent) = f.super_ctor else {
        return Err(RunError::syntax_error("'super' keyword unexpected here").with_origin(span));
    };
    let pending_this = f.this.clone_immediate_unchecked();
    let pending_this = pending_this.clone_with_heap(vm.heap);
    let arg_values = match call::collect_args(vm, env, args) {
        Ok(v) => v,
        Err(e) => {
            pending_this.drop_with_heap(vm.heap);
            return Err(e);
        }
    };
    // Run the parent constructor body against the same fresh object.
    let Some(parent_fn) = vm.heap.function(parent) else {
        pending_this.drop_with_heap(vm.heap);
        vm.drop_values(arg_values);
        return Err(RunError::type_error("Super constructor is not a constructor").with_origin(span));
    };
    let result = match &parent_fn.kind {
        crate::types::function::FnKind::Script(lit) => {
            let lit = Rc::clone(lit);
            let captured = parent_fn.env;
            let home = parent_fn.home;
            let name = parent_fn.name;
            let grand_super = vm.heap.table(parent).and_then(|t| t.proto);
            let call_this = match parent_fn.ctor {
                crate::types::function::CtorKind::Derived => {
                    if let Some(g) = grand_super {
                        vm.heap.inc_ref(g);
                    }
                    CallThis::ConstructDerived { super_ctor: grand_super }
                }
                _ => CallThis::Construct(pending_this.clone_with_heap(vm.heap)),
            };
            let pending = match &call_this {
                CallThis::ConstructDerived { .. } => Some(pending_this.clone_with_heap(vm.heap)),
                _ => None,
            };
            call::call_script(vm, &lit, captured, home, name, call_this, pending, arg_values, span).map(
                |(v, call_env)| {
                    v.drop_with_heap(vm.heap);
                    vm.heap.dec_ref(call_env);
                },
            )
        }
        _ => {
            vm.drop_values(arg_values);
            Err(RunError::type_error("Class extends a non-class value").with_origin(span))
        }
    };
    match result {
        Ok(()) => {
            env::init_this(vm.heap, env, pending_this)?;
            Ok(Value::Undefined)
        }
        Err(e) => {
            pending_this.drop_with_heap(vm.heap);
            Err(e)
        }
    }
}

// ---------------------------------------------------------------------------
// Classes

pub(crate) fn eval_class(vm: &mut Vm<'_>, env: HeapId, class: &ClassLit) -> RunResult<Value> {
    use crate::types::function::{CtorKind, FnKind, JsFunction};

    // Parent class (if any) supplies both prototype links.
    let parent = match &class.parent {
        Some(e) => {
            let p = eval_expr(vm, env, e)?;
            if !p.is_callable(vm.heap) {
                p.drop_with_heap(vm.heap);
                return Err(RunError::type_error("Class extends value is not a constructor").with_origin(class.span));
            }
            Some(p)
        }
        None => None,
    };
    let (proto_parent, ctor_parent, ctor_kind) = match &parent {
        Some(Value::Ref(pid)) => {
            let proto_prop = object::get(vm, parent.as_ref().expect("parent checked"), &PropKey::Atom(StaticStrings::Prototype.id()))?;
            let proto_parent = match &proto_prop {
                Value::Ref(id) if vm.heap.is_object_like(*id) => {
                    let id = *id;
                    Some(id)
                }
                _ => None,
            };
            if proto_parent.is_none() {
                proto_prop.drop_with_heap(vm.heap);
            }
            (proto_parent, Some(*pid), CtorKind::Derived)
        }
        _ => (None, None, CtorKind::Base),
    };

    // The prototype object methods land on.
    let proto_link = match proto_parent {
        Some(id) => Some(id),
        None => {
            let p = vm.realm.intrinsics.object_prototype;
            vm.heap.inc_ref(p);
            Some(p)
        }
    };
    let proto_obj = vm.heap.alloc(HeapData::Object(PropTable::new(proto_link)));

    // Constructor function: explicit, or a synthesized default.
    let ctor_lit = match &class.constructor {
        Some(lit) => Rc::clone(lit),
        None => Rc::new(synthesize_default_ctor(class, ctor_kind == CtorKind::Derived)),
    };
    let name = class.name.unwrap_or(StaticStrings::EmptyString.id());
    let fn_table_proto = match ctor_parent {
        Some(pid) => {
            vm.heap.inc_ref(pid);
            Some(pid)
        }
        None => {
            let p = vm.realm.intrinsics.function_prototype;
            vm.heap.inc_ref(p);
            Some(p)
        }
    };
    let mut table = PropTable::new(fn_table_proto);
    table.insert(PropKey::Atom(StaticStrings::Name.id()), Property::builtin(Value::Str(name)));
    vm.heap.inc_ref(env);
    vm.heap.inc_ref(proto_obj);
    let ctor_fn = vm.heap.alloc(HeapData::Function(JsFunction {
        name,
        kind: FnKind::Script(ctor_lit),
        env: Some(env),
        home: Some(proto_obj),
        ctor: ctor_kind,
        table,
    }));
    vm.heap.inc_ref(proto_obj);
    object::define(
        vm.heap,
        ctor_fn,
        PropKey::Atom(StaticStrings::Prototype.id()),
        Property::builtin(Value::Ref(proto_obj)),
    );
    vm.heap.inc_ref(ctor_fn);
    object::define(
        vm.heap,
        proto_obj,
        PropKey::Atom(StaticStrings::Constructor.id()),
        Property::builtin(Value::Ref(ctor_fn)),
    );

    // Methods and accessors, instance and static.
    for member in &class.members {
        let result = eval_class_member(vm, env, proto_obj, ctor_fn, member);
        if let Err(e) = result {
            if let Some(p) = parent {
                p.drop_with_heap(vm.heap);
            }
            vm.heap.dec_ref(proto_obj);
            vm.heap.dec_ref(ctor_fn);
            return Err(e);
        }
    }

    if let Some(p) = parent {
        p.drop_with_heap(vm.heap);
    }
    vm.heap.dec_ref(proto_obj);
    Ok(Value::Ref(ctor_fn))
}

fn eval_class_member(
    vm: &mut Vm<'_>,
    env: HeapId,
    proto_obj: HeapId,
    ctor_fn: HeapId,
    member: &ClassMember,
) -> RunResult<()> {
    let target = if member.is_static { ctor_fn } else { proto_obj };
    let key = eval_prop_name(vm, env, &member.key)?;
    let method = call::make_closure(vm, &member.func, env, Some(target));
    match member.kind {
        ClassMemberKind::Method => {
            // Class methods are non-enumerable, like builtin prototype
            // methods.
            object::define(vm.heap, target, key, Property::builtin(method));
        }
        ClassMemberKind::Getter => define_accessor(vm, target, key, Some(method), None),
        ClassMemberKind::Setter => define_accessor(vm, target, key, None, Some(method)),
    }
    Ok(())
}

/// Builds the implicit constructor: empty for base classes,
/// `constructor(...args) { super(...args) }` for derived ones.
fn synthesize_default_ctor(class: &ClassLit, derived: bool) -> FuncLit {
    let span = class.span;
    let args_name = StaticStrings::Arguments.id();
    let body = if derived {
        vec![Stmt {
            kind: StmtKind::Expr(Expr {
                kind: ExprKind::SuperCall {
                    args: vec![Arg::Spread(Expr { kind: ExprKind::Ident(args_name), span })],
                },
                span,
            }),
            span,
        }]
    } else {
        Vec::new()
    };
    FuncLit {
        name: class.name,
        params: Vec::new(),
        rest: None,
        body: FuncBody::Block(body),
        is_arrow: false,
        is_async: false,
        is_generator: false,
        span,
        plan: None,
    }
}

// ---------------------------------------------------------------------------
// Destructuring

/// Binds a pattern to a value. `kind: Some` declares/initializes bindings,
/// `None` performs assignment (targets may be member expressions). Consumes
/// `value`.
pub(crate) fn bind_pattern(
    vm: &mut Vm<'_>,
    env: HeapId,
    pattern: &Pattern,
    value: Value,
    kind: Option<BindingKind>,
) -> RunResult<()> {
    match pattern {
        Pattern::Ident { name, span } => match kind {
            Some(BindingKind::Var) => env::assign(vm, env, *name, value).map_err(|e| e.with_origin(*span)),
            Some(BindingKind::Let | BindingKind::Const) => {
                env::init_binding(vm.heap, env, *name, value);
                Ok(())
            }
            Some(k) => {
                env::declare(vm.heap, env, *name, k, Some(value));
                Ok(())
            }
            None => env::assign(vm, env, *name, value).map_err(|e| e.with_origin(*span)),
        },
        Pattern::Default { pattern, default } => {
            if value.is_undefined() {
                let v = eval_expr(vm, env, default)?;
                bind_pattern(vm, env, pattern, v, kind)
            } else {
                bind_pattern(vm, env, pattern, value, kind)
            }
        }
        Pattern::Member { object, property, span } => {
            let target = AssignTarget::Member { object: object.clone(), property: property.clone(), span: *span };
            assign_to_target(vm, env, &target, value)
        }
        Pattern::Array { elements, rest, span } => {
            let values = iterate_to_vec(vm, value, *span)?;
            let mut iter = values.into_iter();
            for element in elements {
                let v = iter.next().unwrap_or(Value::Undefined);
                match element {
                    Some(p) => bind_pattern(vm, env, p, v, kind)?,
                    None => v.drop_with_heap(vm.heap),
                }
            }
            let remainder: Vec<Value> = iter.collect();
            if let Some(rest) = rest {
                let rest_array = object::new_array(vm, remainder);
                bind_pattern(vm, env, rest, Value::Ref(rest_array), kind)?;
            } else {
                vm.drop_values(remainder);
            }
            Ok(())
        }
        Pattern::Object { properties, rest, span } => {
            if value.is_nullish() {
                value.drop_with_heap(vm.heap);
                return Err(RunError::type_error("Cannot destructure null or undefined").with_origin(*span));
            }
            let mut consumed: Vec<PropKey> = Vec::with_capacity(properties.len());
            for prop in properties {
                let key = eval_prop_name(vm, env, &prop.key)?;
                consumed.push(key);
                let v = match object::get(vm, &value, &key) {
                    Ok(v) => v,
                    Err(e) => {
                        value.drop_with_heap(vm.heap);
                        return Err(e);
                    }
                };
                if let Err(e) = bind_pattern(vm, env, &prop.value, v, kind) {
                    value.drop_with_heap(vm.heap);
                    return Err(e);
                }
            }
            if let Some(rest) = rest {
                let proto = vm.realm.intrinsics.object_prototype;
                vm.heap.inc_ref(proto);
                let rest_obj = vm.heap.alloc(HeapData::Object(PropTable::new(Some(proto))));
                if let Value::Ref(source_id) = &value {
                    let keys = object::enumerable_own_string_keys(vm.heap, *source_id);
                    for key in keys {
                        if consumed.contains(&key) {
                            continue;
                        }
                        let v = match object::get(vm, &value, &key) {
                            Ok(v) => v,
                            Err(e) => {
                                value.drop_with_heap(vm.heap);
                                vm.heap.dec_ref(rest_obj);
                                return Err(e);
                            }
                        };
                        object::define(vm.heap, rest_obj, key, Property::data(v));
                    }
                }
                if let Err(e) = bind_pattern(vm, env, rest, Value::Ref(rest_obj), kind) {
                    value.drop_with_heap(vm.heap);
                    return Err(e);
                }
            }
            value.drop_with_heap(vm.heap);
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Iteration protocol

/// Gets the sync iterator of a value via `@@iterator`.
pub(crate) fn get_iterator(vm: &mut Vm<'_>, value: &Value, span: Span) -> RunResult<Value> {
    let method = object::get(vm, value, &PropKey::Sym(SymbolId::ITERATOR))?;
    if !method.is_callable(vm.heap) {
        method.drop_with_heap(vm.heap);
        let rendered = value::short_render(vm.heap, vm.interns, value).into_owned();
        return Err(RunError::type_error(format!("{rendered} is not iterable")).with_origin(span));
    }
    let this = value.clone_with_heap(vm.heap);
    let iter = call::call_value(vm, &method, this, Vec::new(), span);
    method.drop_with_heap(vm.heap);
    let iter = iter?;
    if !iter.is_object(vm.heap) {
        iter.drop_with_heap(vm.heap);
        return Err(RunError::type_error("Iterator result is not an object.").with_origin(span));
    }
    Ok(iter)
}

/// Gets the async iterator: `@@asyncIterator` if present, else the sync
/// iterator (whose values the caller awaits).
pub(crate) fn get_async_iterator(vm: &mut Vm<'_>, value: &Value, span: Span) -> RunResult<Value> {
    let method = object::get(vm, value, &PropKey::Sym(SymbolId::ASYNC_ITERATOR))?;
    if method.is_callable(vm.heap) {
        let this = value.clone_with_heap(vm.heap);
        let iter = call::call_value(vm, &method, this, Vec::new(), span);
        method.drop_with_heap(vm.heap);
        return iter;
    }
    method.drop_with_heap(vm.heap);
    get_iterator(vm, value, span)
}

/// Calls `iter.next(sent?)`, returning the raw result object.
pub(crate) fn iterator_next_raw(vm: &mut Vm<'_>, iter: &Value, sent: Option<Value>) -> RunResult<Value> {
    let next = object::get(vm, iter, &PropKey::Atom(StaticStrings::Next.id()))?;
    let this = iter.clone_with_heap(vm.heap);
    let args = match sent {
        Some(v) => vec![v],
        None => Vec::new(),
    };
    let result = call::call_value(vm, &next, this, args, Span::default());
    next.drop_with_heap(vm.heap);
    result
}

/// Splits an iterator result object into `(value, done)`.
pub(crate) fn iterator_result_parts(vm: &mut Vm<'_>, result: &Value) -> RunResult<(Value, bool)> {
    if !result.is_object(vm.heap) {
        return Err(RunError::type_error("Iterator result is not an object."));
    }
    let done = object::get(vm, result, &PropKey::Atom(StaticStrings::Done.id()))?;
    let done_bool = done.to_boolean(vm.heap, vm.interns);
    done.drop_with_heap(vm.heap);
    let value = object::get(vm, result, &PropKey::Atom(StaticStrings::Value.id()))?;
    Ok((value, done_bool))
}

/// One step of the sync iteration protocol.
pub(crate) fn iterator_next(vm: &mut Vm<'_>, iter: &Value, sent: Option<Value>) -> RunResult<(Value, bool)> {
    let result = iterator_next_raw(vm, iter, sent)?;
    let parts = iterator_result_parts(vm, &result);
    result.drop_with_heap(vm.heap);
    parts
}

/// Closes an iterator on abrupt loop exit: calls `return()` if present,
/// swallowing secondary failures.
pub(crate) fn close_iterator(vm: &mut Vm<'_>, iter: &Value) {
    let Ok(ret) = object::get(vm, iter, &PropKey::Atom(StaticStrings::Return.id())) else { return };
    if ret.is_callable(vm.heap) {
        let this = iter.clone_with_heap(vm.heap);
        match call::call_value(vm, &ret, this, Vec::new(), Span::default()) {
            Ok(v) => v.drop_with_heap(vm.heap),
            // Secondary failures from return() are swallowed; the original
            // completion wins.
            Err(err) => discard_outcome(vm, Err(err)),
        }
    }
    ret.drop_with_heap(vm.heap);
}

/// Drains an iterable into a vector via the iterator protocol. Consumes
/// `iterable`.
pub(crate) fn iterate_to_vec(vm: &mut Vm<'_>, iterable: Value, span: Span) -> RunResult<Vec<Value>> {
    // Fast path: dense arrays clone their elements directly.
    if let Value::Ref(id) = &iterable
        && vm.heap.array(*id).is_some()
    {
        let id = *id;
        let len = vm.heap.array(id).expect("array checked").elements.len();
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            let element = vm.heap.array(id).expect("array checked").elements[i].clone_immediate_unchecked();
            out.push(element.clone_with_heap(vm.heap));
        }
        iterable.drop_with_heap(vm.heap);
        return Ok(out);
    }
    let iter = get_iterator(vm, &iterable, span);
    iterable.drop_with_heap(vm.heap);
    let iter = iter?;
    let mut out = Vec::new();
    loop {
        match iterator_next(vm, &iter, None) {
            Ok((value, true)) => {
                value.drop_with_heap(vm.heap);
                break;
            }
            Ok((value, false)) => out.push(value),
            Err(e) => {
                iter.drop_with_heap(vm.heap);
                vm.drop_values(out);
                return Err(e);
            }
        }
    }
    iter.drop_with_heap(vm.heap);
    Ok(out)
}
