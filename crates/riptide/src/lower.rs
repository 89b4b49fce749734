//! Generator lowering: compiles suspendable bodies into step-IR plans.
//!
//! The builder walks statements in source order, opening blocks for control
//! flow and patching forward jumps as targets materialize. Expressions stay
//! whole (`Eval` steps) until a suspension point forces decomposition: then
//! every operand up to and including the last suspending one is evaluated
//! into a frame temp, and the surrounding expression is rebuilt over
//! [`ExprKind::Temp`] reads. That keeps left-to-right evaluation order
//! across suspensions without inventing step forms for every operator.
//!
//! `break`/`continue` lower to `Unwind` steps carrying the statically known
//! guard depth of their target, so the runtime unwinder knows exactly which
//! finallies to run and which iterators to close on the way out.
//!
//! The async flavor of this machinery lives in [`crate::cps`]; both share
//! this builder.

use std::rc::Rc;

use crate::{
    ast::{
        Arg, ArrayItem, AssignOp, AssignTarget, ClassLit, ClassMember, DeclKind, Declarator, Expr, ExprKind,
        ForHead, ForInit, FuncBody, FuncLit, Literal, LogicalOp, MemberProp, ObjectItem, Pattern, Program, PropName,
        Span, Stmt, StmtKind, SwitchCase, UnaryOp,
    },
    env::BindingKind,
    intern::{StaticStrings, StringId},
    ir::{BlockId, IrDiagnostics, IterKind, Plan, PlanFlavor, Step},
};

/// A construct the IR cannot express; surfaces as a parse-time SyntaxError.
#[derive(Debug)]
pub(crate) struct LowerError {
    pub reason: &'static str,
    pub span: Span,
}

impl LowerError {
    fn new(reason: &'static str, span: Span) -> Self {
        Self { reason, span }
    }
}

/// Runs the lowering pass over a parsed (and folded) program: every
/// generator and async function body gains a plan. Rebuilds the tree.
pub(crate) fn lower_program(program: Program, diags: &mut IrDiagnostics) -> Result<Program, LowerError> {
    let mut body = Vec::with_capacity(program.body.len());
    for stmt in program.body {
        body.push(transform_stmt(stmt, diags)?);
    }
    Ok(Program { body, name: program.name })
}

/// Compiles one suspendable body into a plan.
pub(crate) fn build_plan(lit: &FuncLit, flavor: PlanFlavor) -> Result<Plan, LowerError> {
    let mut b = PlanBuilder::new(flavor);
    match &lit.body {
        FuncBody::Block(stmts) => {
            b.lower_stmts(stmts)?;
            b.emit(Step::Return { has_value: false });
        }
        FuncBody::Expr(e) => {
            b.lower_expr_value(e)?;
            b.emit(Step::Return { has_value: true });
        }
    }
    Ok(Plan {
        blocks: b.blocks,
        temp_count: b.temp_count,
        flavor,
        name: lit.name.unwrap_or(StaticStrings::EmptyString.id()),
        origin: lit.span,
    })
}

// ---------------------------------------------------------------------------
// Tree transform (post-order: nested functions lower first)

fn transform_stmt(stmt: Stmt, diags: &mut IrDiagnostics) -> Result<Stmt, LowerError> {
    let kind = match stmt.kind {
        StmtKind::Expr(e) => StmtKind::Expr(transform_expr(e, diags)?),
        StmtKind::VarDecl { kind, declarators } => StmtKind::VarDecl {
            kind,
            declarators: declarators
                .into_iter()
                .map(|d| {
                    Ok(Declarator {
                        pattern: transform_pattern(d.pattern, diags)?,
                        init: d.init.map(|e| transform_expr(e, diags)).transpose()?,
                        span: d.span,
                    })
                })
                .collect::<Result<_, LowerError>>()?,
        },
        StmtKind::FuncDecl(lit) => StmtKind::FuncDecl(transform_func(&lit, diags)?),
        StmtKind::ClassDecl(class) => StmtKind::ClassDecl(transform_class(&class, diags)?),
        StmtKind::Return(e) => StmtKind::Return(e.map(|e| transform_expr(e, diags)).transpose()?),
        StmtKind::If { test, then_branch, else_branch } => StmtKind::If {
            test: transform_expr(test, diags)?,
            then_branch: Box::new(transform_stmt(*then_branch, diags)?),
            else_branch: else_branch.map(|s| transform_stmt(*s, diags).map(Box::new)).transpose()?,
        },
        StmtKind::Block(stmts) => StmtKind::Block(transform_stmts(stmts, diags)?),
        StmtKind::While { test, body } => StmtKind::While {
            test: transform_expr(test, diags)?,
            body: Box::new(transform_stmt(*body, diags)?),
        },
        StmtKind::DoWhile { body, test } => StmtKind::DoWhile {
            body: Box::new(transform_stmt(*body, diags)?),
            test: transform_expr(test, diags)?,
        },
        StmtKind::For { init, test, update, body } => StmtKind::For {
            init: init
                .map(|i| {
                    Ok(match i {
                        ForInit::Decl { kind, declarators } => ForInit::Decl {
                            kind,
                            declarators: declarators
                                .into_iter()
                                .map(|d| {
                                    Ok(Declarator {
                                        pattern: transform_pattern(d.pattern, diags)?,
                                        init: d.init.map(|e| transform_expr(e, diags)).transpose()?,
                                        span: d.span,
                                    })
                                })
                                .collect::<Result<_, LowerError>>()?,
                        },
                        ForInit::Expr(e) => ForInit::Expr(transform_expr(e, diags)?),
                    })
                })
                .transpose()?,
            test: test.map(|e| transform_expr(e, diags)).transpose()?,
            update: update.map(|e| transform_expr(e, diags)).transpose()?,
            body: Box::new(transform_stmt(*body, diags)?),
        },
        StmtKind::ForIn { left, object, body } => StmtKind::ForIn {
            left: transform_for_head(left, diags)?,
            object: transform_expr(object, diags)?,
            body: Box::new(transform_stmt(*body, diags)?),
        },
        StmtKind::ForOf { left, iterable, body, is_await } => StmtKind::ForOf {
            left: transform_for_head(left, diags)?,
            iterable: transform_expr(iterable, diags)?,
            body: Box::new(transform_stmt(*body, diags)?),
            is_await,
        },
        StmtKind::Switch { discriminant, cases } => StmtKind::Switch {
            discriminant: transform_expr(discriminant, diags)?,
            cases: cases
                .into_iter()
                .map(|c| {
                    Ok(SwitchCase {
                        test: c.test.map(|e| transform_expr(e, diags)).transpose()?,
                        body: transform_stmts(c.body, diags)?,
                        span: c.span,
                    })
                })
                .collect::<Result<_, LowerError>>()?,
        },
        StmtKind::Labeled { label, body } => {
            StmtKind::Labeled { label, body: Box::new(transform_stmt(*body, diags)?) }
        }
        StmtKind::Try { block, catch, finally } => StmtKind::Try {
            block: transform_stmts(block, diags)?,
            catch: catch
                .map(|c| {
                    Ok(crate::ast::CatchClause {
                        param: c.param.map(|p| transform_pattern(p, diags)).transpose()?,
                        body: transform_stmts(c.body, diags)?,
                    })
                })
                .transpose()?,
            finally: finally.map(|f| transform_stmts(f, diags)).transpose()?,
        },
        StmtKind::Throw(e) => StmtKind::Throw(transform_expr(e, diags)?),
        other @ (StmtKind::Break(_) | StmtKind::Continue(_) | StmtKind::Debugger | StmtKind::Empty) => other,
    };
    Ok(Stmt { kind, span: stmt.span })
}

fn transform_stmts(stmts: Vec<Stmt>, diags: &mut IrDiagnostics) -> Result<Vec<Stmt>, LowerError> {
    stmts.into_iter().map(|s| transform_stmt(s, diags)).collect()
}

fn transform_for_head(head: ForHead, diags: &mut IrDiagnostics) -> Result<ForHead, LowerError> {
    Ok(match head {
        ForHead::Decl { kind, pattern } => ForHead::Decl { kind, pattern: transform_pattern(pattern, diags)? },
        ForHead::Target(t) => ForHead::Target(transform_target(t, diags)?),
    })
}

fn transform_target(target: AssignTarget, diags: &mut IrDiagnostics) -> Result<AssignTarget, LowerError> {
    Ok(match target {
        AssignTarget::Ident { name, span } => AssignTarget::Ident { name, span },
        AssignTarget::Member { object, property, span } => AssignTarget::Member {
            object: transform_expr(object, diags)?,
            property: transform_member_prop(property, diags)?,
            span,
        },
        AssignTarget::Pattern(p) => AssignTarget::Pattern(transform_pattern(p, diags)?),
    })
}

fn transform_member_prop(prop: MemberProp, diags: &mut IrDiagnostics) -> Result<MemberProp, LowerError> {
    Ok(match prop {
        MemberProp::Ident(id) => MemberProp::Ident(id),
        MemberProp::Computed(e) => MemberProp::Computed(Box::new(transform_expr(*e, diags)?)),
    })
}

fn transform_pattern(pattern: Pattern, diags: &mut IrDiagnostics) -> Result<Pattern, LowerError> {
    Ok(match pattern {
        Pattern::Ident { name, span } => Pattern::Ident { name, span },
        Pattern::Array { elements, rest, span } => Pattern::Array {
            elements: elements
                .into_iter()
                .map(|e| e.map(|p| transform_pattern(p, diags)).transpose())
                .collect::<Result<_, LowerError>>()?,
            rest: rest.map(|r| transform_pattern(*r, diags).map(Box::new)).transpose()?,
            span,
        },
        Pattern::Object { properties, rest, span } => Pattern::Object {
            properties: properties
                .into_iter()
                .map(|p| {
                    Ok(crate::ast::ObjectPatternProp {
                        key: transform_prop_name(p.key, diags)?,
                        value: transform_pattern(p.value, diags)?,
                    })
                })
                .collect::<Result<_, LowerError>>()?,
            rest: rest.map(|r| transform_pattern(*r, diags).map(Box::new)).transpose()?,
            span,
        },
        Pattern::Default { pattern, default } => Pattern::Default {
            pattern: Box::new(transform_pattern(*pattern, diags)?),
            default: Box::new(transform_expr(*default, diags)?),
        },
        Pattern::Member { object, property, span } => Pattern::Member {
            object: transform_expr(object, diags)?,
            property: transform_member_prop(property, diags)?,
            span,
        },
    })
}

fn transform_prop_name(name: PropName, diags: &mut IrDiagnostics) -> Result<PropName, LowerError> {
    Ok(match name {
        PropName::Computed(e) => PropName::Computed(Box::new(transform_expr(*e, diags)?)),
        other => other,
    })
}

/// Transforms a function literal: body first (post-order), then the plan for
/// suspendable flavors.
pub(crate) fn transform_func(lit: &Rc<FuncLit>, diags: &mut IrDiagnostics) -> Result<Rc<FuncLit>, LowerError> {
    let body = match &lit.body {
        FuncBody::Block(stmts) => FuncBody::Block(transform_stmts(stmts.clone(), diags)?),
        FuncBody::Expr(e) => FuncBody::Expr(Box::new(transform_expr((**e).clone(), diags)?)),
    };
    let mut new_lit = FuncLit {
        name: lit.name,
        params: lit.params.clone(),
        rest: lit.rest.clone(),
        body,
        is_arrow: lit.is_arrow,
        is_async: lit.is_async,
        is_generator: lit.is_generator,
        span: lit.span,
        plan: None,
    };
    // Suspension points in parameter defaults have no frame to run in;
    // these exotic shapes are rejected outright.
    for param in &new_lit.params {
        if pattern_suspends(&param.pattern) {
            diags.reject("suspension in default parameter initializer");
            return Err(LowerError::new("suspension in default parameter initializer", param.span));
        }
    }
    if new_lit.is_generator {
        let plan = build_plan(&new_lit, PlanFlavor::Generator).inspect_err(|e| diags.reject(e.reason))?;
        diags.plans_built += 1;
        new_lit.plan = Some(Rc::new(plan));
    } else if new_lit.is_async {
        let plan = crate::cps::lower_async_body(&new_lit).inspect_err(|e| diags.reject(e.reason))?;
        diags.plans_built += 1;
        new_lit.plan = Some(Rc::new(plan));
    }
    Ok(Rc::new(new_lit))
}

fn transform_class(class: &Rc<ClassLit>, diags: &mut IrDiagnostics) -> Result<Rc<ClassLit>, LowerError> {
    Ok(Rc::new(ClassLit {
        name: class.name,
        parent: class.parent.clone().map(|e| transform_expr(e, diags)).transpose()?,
        constructor: class.constructor.as_ref().map(|c| transform_func(c, diags)).transpose()?,
        members: class
            .members
            .iter()
            .map(|m| {
                Ok(ClassMember {
                    kind: m.kind,
                    is_static: m.is_static,
                    key: transform_prop_name(m.key.clone(), diags)?,
                    func: transform_func(&m.func, diags)?,
                    span: m.span,
                })
            })
            .collect::<Result<_, LowerError>>()?,
        span: class.span,
    }))
}

fn transform_expr(expr: Expr, diags: &mut IrDiagnostics) -> Result<Expr, LowerError> {
    let span = expr.span;
    let kind = match expr.kind {
        ExprKind::Function(lit) => ExprKind::Function(transform_func(&lit, diags)?),
        ExprKind::Class(class) => ExprKind::Class(transform_class(&class, diags)?),
        ExprKind::Template { quasis, exprs } => ExprKind::Template {
            quasis,
            exprs: exprs.into_iter().map(|e| transform_expr(e, diags)).collect::<Result<_, LowerError>>()?,
        },
        ExprKind::Array(items) => ExprKind::Array(
            items
                .into_iter()
                .map(|i| {
                    Ok(match i {
                        ArrayItem::Expr(e) => ArrayItem::Expr(transform_expr(e, diags)?),
                        ArrayItem::Spread(e) => ArrayItem::Spread(transform_expr(e, diags)?),
                        ArrayItem::Hole => ArrayItem::Hole,
                    })
                })
                .collect::<Result<_, LowerError>>()?,
        ),
        ExprKind::Object(items) => ExprKind::Object(
            items
                .into_iter()
                .map(|i| {
                    Ok(match i {
                        ObjectItem::Property { key, value } => ObjectItem::Property {
                            key: transform_prop_name(key, diags)?,
                            value: transform_expr(value, diags)?,
                        },
                        ObjectItem::Method { key, func } => ObjectItem::Method {
                            key: transform_prop_name(key, diags)?,
                            func: transform_func(&func, diags)?,
                        },
                        ObjectItem::Getter { key, func } => ObjectItem::Getter {
                            key: transform_prop_name(key, diags)?,
                            func: transform_func(&func, diags)?,
                        },
                        ObjectItem::Setter { key, func } => ObjectItem::Setter {
                            key: transform_prop_name(key, diags)?,
                            func: transform_func(&func, diags)?,
                        },
                        ObjectItem::Spread(e) => ObjectItem::Spread(transform_expr(e, diags)?),
                    })
                })
                .collect::<Result<_, LowerError>>()?,
        ),
        ExprKind::Unary { op, operand } => {
            ExprKind::Unary { op, operand: Box::new(transform_expr(*operand, diags)?) }
        }
        ExprKind::Update { op, prefix, target } => {
            ExprKind::Update { op, prefix, target: Box::new(transform_target(*target, diags)?) }
        }
        ExprKind::Binary { op, left, right } => ExprKind::Binary {
            op,
            left: Box::new(transform_expr(*left, diags)?),
            right: Box::new(transform_expr(*right, diags)?),
        },
        ExprKind::Logical { op, left, right } => ExprKind::Logical {
            op,
            left: Box::new(transform_expr(*left, diags)?),
            right: Box::new(transform_expr(*right, diags)?),
        },
        ExprKind::Assign { op, target, value } => ExprKind::Assign {
            op,
            target: Box::new(transform_target(*target, diags)?),
            value: Box::new(transform_expr(*value, diags)?),
        },
        ExprKind::Cond { test, consequent, alternate } => ExprKind::Cond {
            test: Box::new(transform_expr(*test, diags)?),
            consequent: Box::new(transform_expr(*consequent, diags)?),
            alternate: Box::new(transform_expr(*alternate, diags)?),
        },
        ExprKind::Call { callee, args, optional } => ExprKind::Call {
            callee: Box::new(transform_expr(*callee, diags)?),
            args: transform_args(args, diags)?,
            optional,
        },
        ExprKind::New { callee, args } => ExprKind::New {
            callee: Box::new(transform_expr(*callee, diags)?),
            args: transform_args(args, diags)?,
        },
        ExprKind::Member { object, property, optional } => ExprKind::Member {
            object: Box::new(transform_expr(*object, diags)?),
            property: transform_member_prop(property, diags)?,
            optional,
        },
        ExprKind::SuperMember { property } => {
            ExprKind::SuperMember { property: transform_member_prop(property, diags)? }
        }
        ExprKind::SuperCall { args } => ExprKind::SuperCall { args: transform_args(args, diags)? },
        ExprKind::Sequence(exprs) => ExprKind::Sequence(
            exprs.into_iter().map(|e| transform_expr(e, diags)).collect::<Result<_, LowerError>>()?,
        ),
        ExprKind::Yield { argument, delegate } => ExprKind::Yield {
            argument: argument.map(|e| transform_expr(*e, diags).map(Box::new)).transpose()?,
            delegate,
        },
        ExprKind::Await(e) => ExprKind::Await(Box::new(transform_expr(*e, diags)?)),
        other @ (ExprKind::Literal(_)
        | ExprKind::Ident(_)
        | ExprKind::This
        | ExprKind::Regex { .. }
        | ExprKind::Temp(_)) => other,
    };
    Ok(Expr { kind, span })
}

fn transform_args(args: Vec<Arg>, diags: &mut IrDiagnostics) -> Result<Vec<Arg>, LowerError> {
    args.into_iter()
        .map(|a| {
            Ok(match a {
                Arg::Expr(e) => Arg::Expr(transform_expr(e, diags)?),
                Arg::Spread(e) => Arg::Spread(transform_expr(e, diags)?),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Suspension analysis

/// True if evaluating the expression can hit a suspension point. Function
/// bodies are their own frames and do not count.
pub(crate) fn contains_suspend(e: &Expr) -> bool {
    match &e.kind {
        ExprKind::Yield { .. } | ExprKind::Await(_) => true,
        ExprKind::Literal(_)
        | ExprKind::Ident(_)
        | ExprKind::This
        | ExprKind::Regex { .. }
        | ExprKind::Temp(_)
        | ExprKind::Function(_) => false,
        ExprKind::Class(class) => {
            class.parent.as_ref().is_some_and(contains_suspend)
                || class.members.iter().any(|m| prop_name_suspends(&m.key))
        }
        ExprKind::Template { exprs, .. } => exprs.iter().any(contains_suspend),
        ExprKind::Array(items) => items.iter().any(|i| match i {
            ArrayItem::Expr(e) | ArrayItem::Spread(e) => contains_suspend(e),
            ArrayItem::Hole => false,
        }),
        ExprKind::Object(items) => items.iter().any(|i| match i {
            ObjectItem::Property { key, value } => prop_name_suspends(key) || contains_suspend(value),
            ObjectItem::Method { key, .. } | ObjectItem::Getter { key, .. } | ObjectItem::Setter { key, .. } => {
                prop_name_suspends(key)
            }
            ObjectItem::Spread(e) => contains_suspend(e),
        }),
        ExprKind::Unary { operand, .. } => contains_suspend(operand),
        ExprKind::Update { target, .. } => target_suspends(target),
        ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
            contains_suspend(left) || contains_suspend(right)
        }
        ExprKind::Assign { target, value, .. } => target_suspends(target) || contains_suspend(value),
        ExprKind::Cond { test, consequent, alternate } => {
            contains_suspend(test) || contains_suspend(consequent) || contains_suspend(alternate)
        }
        ExprKind::Call { callee, args, .. } => contains_suspend(callee) || args_suspend(args),
        ExprKind::New { callee, args } => contains_suspend(callee) || args_suspend(args),
        ExprKind::Member { object, property, .. } => contains_suspend(object) || member_prop_suspends(property),
        ExprKind::SuperMember { property } => member_prop_suspends(property),
        ExprKind::SuperCall { args } => args_suspend(args),
        ExprKind::Sequence(exprs) => exprs.iter().any(contains_suspend),
    }
}

fn args_suspend(args: &[Arg]) -> bool {
    args.iter().any(|a| match a {
        Arg::Expr(e) | Arg::Spread(e) => contains_suspend(e),
    })
}

fn member_prop_suspends(prop: &MemberProp) -> bool {
    match prop {
        MemberProp::Ident(_) => false,
        MemberProp::Computed(e) => contains_suspend(e),
    }
}

fn prop_name_suspends(name: &PropName) -> bool {
    match name {
        PropName::Computed(e) => contains_suspend(e),
        _ => false,
    }
}

fn target_suspends(target: &AssignTarget) -> bool {
    match target {
        AssignTarget::Ident { .. } => false,
        AssignTarget::Member { object, property, .. } => contains_suspend(object) || member_prop_suspends(property),
        AssignTarget::Pattern(p) => pattern_suspends(p),
    }
}

pub(crate) fn pattern_suspends(pattern: &Pattern) -> bool {
    match pattern {
        Pattern::Ident { .. } => false,
        Pattern::Array { elements, rest, .. } => {
            elements.iter().flatten().any(pattern_suspends)
                || rest.as_ref().is_some_and(|r| pattern_suspends(r))
        }
        Pattern::Object { properties, rest, .. } => {
            properties.iter().any(|p| prop_name_suspends(&p.key) || pattern_suspends(&p.value))
                || rest.as_ref().is_some_and(|r| pattern_suspends(r))
        }
        Pattern::Default { pattern, default } => pattern_suspends(pattern) || contains_suspend(default),
        Pattern::Member { object, property, .. } => contains_suspend(object) || member_prop_suspends(property),
    }
}

// ---------------------------------------------------------------------------
// The builder

/// `break`/`continue` resolution context.
struct Ctx {
    label: Option<StringId>,
    break_target: BlockId,
    break_depth: u32,
    continue_target: Option<BlockId>,
    continue_depth: u32,
    is_loop: bool,
}

pub(crate) struct PlanBuilder {
    pub blocks: Vec<Vec<Step>>,
    current: usize,
    pub temp_count: u32,
    flavor: PlanFlavor,
    /// Static guard-stack depth at the current emission point.
    guard_depth: u32,
    ctxs: Vec<Ctx>,
}

impl PlanBuilder {
    pub fn new(flavor: PlanFlavor) -> Self {
        Self { blocks: vec![Vec::new()], current: 0, temp_count: 0, flavor, guard_depth: 0, ctxs: Vec::new() }
    }

    fn emit(&mut self, step: Step) {
        self.blocks[self.current].push(step);
    }

    fn new_block(&mut self) -> BlockId {
        let id = BlockId(u32::try_from(self.blocks.len()).expect("block count overflow"));
        self.blocks.push(Vec::new());
        id
    }

    fn switch_to(&mut self, block: BlockId) {
        self.current = block.index();
    }

    fn alloc_temp(&mut self) -> u32 {
        let t = self.temp_count;
        self.temp_count += 1;
        t
    }

    fn undefined_expr(span: Span) -> Expr {
        // `void 0`: the IR has no undefined literal, mirroring the language.
        Expr {
            kind: ExprKind::Unary {
                op: UnaryOp::Void,
                operand: Box::new(Expr { kind: ExprKind::Literal(Literal::Number(0.0)), span }),
            },
            span,
        }
    }

    // -- statements --------------------------------------------------------

    pub fn lower_stmts(&mut self, stmts: &[Stmt]) -> Result<(), LowerError> {
        for stmt in stmts {
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), LowerError> {
        match &stmt.kind {
            StmtKind::Empty | StmtKind::FuncDecl(_) => Ok(()),
            StmtKind::Expr(e) => {
                self.lower_expr_value(e)?;
                self.emit(Step::Pop);
                Ok(())
            }
            StmtKind::VarDecl { kind, declarators } => self.lower_var_decl(*kind, declarators),
            StmtKind::ClassDecl(class) => {
                let class_expr = Expr { kind: ExprKind::Class(Rc::clone(class)), span: stmt.span };
                if contains_suspend(&class_expr) {
                    return Err(LowerError::new("suspension in class declaration", stmt.span));
                }
                self.emit(Step::Eval(class_expr));
                let name = class.name.expect("class declarations are named");
                self.emit(Step::InitVar { name });
                Ok(())
            }
            StmtKind::Return(arg) => {
                match arg {
                    Some(e) => {
                        self.lower_expr_value(e)?;
                        self.emit(Step::Return { has_value: true });
                    }
                    None => self.emit(Step::Return { has_value: false }),
                }
                Ok(())
            }
            StmtKind::Throw(e) => {
                self.lower_expr_value(e)?;
                self.emit(Step::Throw);
                Ok(())
            }
            StmtKind::If { test, then_branch, else_branch } => {
                self.lower_expr_value(test)?;
                let b_then = self.new_block();
                let b_else = self.new_block();
                let b_end = self.new_block();
                self.emit(Step::JumpIf { if_true: b_then, if_false: b_else });
                self.switch_to(b_then);
                self.lower_stmt(then_branch)?;
                self.emit(Step::Jump(b_end));
                self.switch_to(b_else);
                if let Some(else_branch) = else_branch {
                    self.lower_stmt(else_branch)?;
                }
                self.emit(Step::Jump(b_end));
                self.switch_to(b_end);
                Ok(())
            }
            StmtKind::Block(stmts) => self.lower_block(stmts),
            StmtKind::While { test, body } => self.lower_while(test, body, None),
            StmtKind::DoWhile { body, test } => self.lower_do_while(body, test, None),
            StmtKind::For { init, test, update, body } => self.lower_for(init, test, update, body, None),
            StmtKind::ForIn { left, object, body } => {
                self.lower_for_iter(left, object, body, IterKind::Keys, None)
            }
            StmtKind::ForOf { left, iterable, body, is_await } => {
                if *is_await {
                    if self.flavor != PlanFlavor::Async {
                        return Err(LowerError::new("for await outside an async function", stmt.span));
                    }
                    crate::cps::lower_for_await(self, left, iterable, body, None)
                } else {
                    self.lower_for_iter(left, iterable, body, IterKind::Sync, None)
                }
            }
            StmtKind::Switch { discriminant, cases } => self.lower_switch(discriminant, cases),
            StmtKind::Break(label) => {
                let (target, depth) = self.resolve_break(*label, stmt.span)?;
                self.emit(Step::Unwind { target, depth });
                Ok(())
            }
            StmtKind::Continue(label) => {
                let (target, depth) = self.resolve_continue(*label, stmt.span)?;
                self.emit(Step::Unwind { target, depth });
                Ok(())
            }
            StmtKind::Labeled { label, body } => self.lower_labeled(*label, body),
            StmtKind::Try { block, catch, finally } => self.lower_try(block, catch.as_ref(), finally.as_deref()),
            StmtKind::Debugger => {
                self.emit(Step::DebugPoint);
                Ok(())
            }
        }
    }

    fn lower_var_decl(&mut self, kind: DeclKind, declarators: &[Declarator]) -> Result<(), LowerError> {
        let bind_kind = match kind {
            DeclKind::Var => BindingKind::Var,
            DeclKind::Let => BindingKind::Let,
            DeclKind::Const => BindingKind::Const,
        };
        for decl in declarators {
            if pattern_suspends(&decl.pattern) {
                return Err(LowerError::new("suspension in destructuring default", decl.span));
            }
            match &decl.init {
                Some(e) => self.lower_expr_value(e)?,
                None => self.emit(Step::Eval(Self::undefined_expr(decl.span))),
            }
            self.emit(Step::BindPattern { pattern: Rc::new(decl.pattern.clone()), kind: Some(bind_kind) });
        }
        Ok(())
    }

    /// Lowers a block with its scope and declaration prologue.
    fn lower_block(&mut self, stmts: &[Stmt]) -> Result<(), LowerError> {
        let scoped = crate::ast::needs_block_scope(stmts);
        if scoped {
            self.emit(Step::EnterScope);
            self.guard_depth += 1;
            self.emit_block_prologue(stmts);
        }
        self.lower_stmts(stmts)?;
        if scoped {
            self.emit(Step::ExitScope);
            self.guard_depth -= 1;
        }
        Ok(())
    }

    /// Declares a block's lexicals (TDZ) and initializes its function
    /// declarations.
    fn emit_block_prologue(&mut self, stmts: &[Stmt]) {
        for (name, kind) in crate::ast::lexical_decls(stmts) {
            let kind = match kind {
                DeclKind::Const => BindingKind::Const,
                _ => BindingKind::Let,
            };
            self.emit(Step::Declare { name, kind });
        }
        for stmt in stmts {
            if let StmtKind::FuncDecl(func) = &stmt.kind {
                let name = func.name.expect("function declarations are named");
                self.emit(Step::Declare { name, kind: BindingKind::Function });
                self.emit(Step::Eval(Expr { kind: ExprKind::Function(Rc::clone(func)), span: func.span }));
                self.emit(Step::InitVar { name });
            }
        }
    }

    fn push_loop_ctx(&mut self, label: Option<StringId>, break_target: BlockId, continue_target: BlockId) {
        self.ctxs.push(Ctx {
            label,
            break_target,
            break_depth: self.guard_depth,
            continue_target: Some(continue_target),
            continue_depth: self.guard_depth,
            is_loop: true,
        });
    }

    fn resolve_break(&self, label: Option<StringId>, span: Span) -> Result<(BlockId, u32), LowerError> {
        for ctx in self.ctxs.iter().rev() {
            let matches = match label {
                Some(l) => ctx.label == Some(l),
                None => ctx.is_loop || ctx.continue_target.is_none(),
            };
            if matches {
                return Ok((ctx.break_target, ctx.break_depth));
            }
        }
        Err(LowerError::new("break target not found", span))
    }

    fn resolve_continue(&self, label: Option<StringId>, span: Span) -> Result<(BlockId, u32), LowerError> {
        for ctx in self.ctxs.iter().rev() {
            if !ctx.is_loop {
                continue;
            }
            let matches = match label {
                Some(l) => ctx.label == Some(l),
                None => true,
            };
            if matches && let Some(target) = ctx.continue_target {
                return Ok((target, ctx.continue_depth));
            }
        }
        Err(LowerError::new("continue target not found", span))
    }

    fn lower_while(&mut self, test: &Expr, body: &Stmt, label: Option<StringId>) -> Result<(), LowerError> {
        let b_head = self.new_block();
        let b_body = self.new_block();
        let b_exit = self.new_block();
        self.emit(Step::Jump(b_head));
        self.switch_to(b_head);
        self.lower_expr_value(test)?;
        self.emit(Step::JumpIf { if_true: b_body, if_false: b_exit });
        self.push_loop_ctx(label, b_exit, b_head);
        self.switch_to(b_body);
        self.lower_stmt(body)?;
        self.emit(Step::Jump(b_head));
        self.ctxs.pop();
        self.switch_to(b_exit);
        Ok(())
    }

    fn lower_do_while(&mut self, body: &Stmt, test: &Expr, label: Option<StringId>) -> Result<(), LowerError> {
        let b_body = self.new_block();
        let b_test = self.new_block();
        let b_exit = self.new_block();
        self.emit(Step::Jump(b_body));
        self.push_loop_ctx(label, b_exit, b_test);
        self.switch_to(b_body);
        self.lower_stmt(body)?;
        self.emit(Step::Jump(b_test));
        self.ctxs.pop();
        self.switch_to(b_test);
        self.lower_expr_value(test)?;
        self.emit(Step::JumpIf { if_true: b_body, if_false: b_exit });
        self.switch_to(b_exit);
        Ok(())
    }

    fn lower_for(
        &mut self,
        init: &Option<ForInit>,
        test: &Option<Expr>,
        update: &Option<Expr>,
        body: &Stmt,
        label: Option<StringId>,
    ) -> Result<(), LowerError> {
        let scoped = matches!(init, Some(ForInit::Decl { kind: DeclKind::Let | DeclKind::Const, .. }));
        let depth_outside = self.guard_depth;
        if scoped {
            self.emit(Step::EnterScope);
            self.guard_depth += 1;
        }
        match init {
            Some(ForInit::Decl { kind, declarators }) => {
                if !matches!(kind, DeclKind::Var) {
                    for decl in declarators {
                        let mut names = Vec::new();
                        crate::ast::pattern_names(&decl.pattern, &mut names);
                        let bind = if matches!(kind, DeclKind::Const) { BindingKind::Const } else { BindingKind::Let };
                        for name in names {
                            self.emit(Step::Declare { name, kind: bind });
                        }
                    }
                }
                self.lower_var_decl(*kind, declarators)?;
            }
            Some(ForInit::Expr(e)) => {
                self.lower_expr_value(e)?;
                self.emit(Step::Pop);
            }
            None => {}
        }
        let b_head = self.new_block();
        let b_body = self.new_block();
        let b_update = self.new_block();
        let b_done = self.new_block();
        let b_after = self.new_block();
        self.emit(Step::Jump(b_head));
        self.switch_to(b_head);
        match test {
            Some(test) => {
                self.lower_expr_value(test)?;
                self.emit(Step::JumpIf { if_true: b_body, if_false: b_done });
            }
            None => self.emit(Step::Jump(b_body)),
        }
        self.ctxs.push(Ctx {
            label,
            break_target: b_after,
            break_depth: depth_outside,
            continue_target: Some(b_update),
            continue_depth: self.guard_depth,
            is_loop: true,
        });
        self.switch_to(b_body);
        self.lower_stmt(body)?;
        self.emit(Step::Jump(b_update));
        self.ctxs.pop();
        self.switch_to(b_update);
        if let Some(update) = update {
            self.lower_expr_value(update)?;
            self.emit(Step::Pop);
        }
        self.emit(Step::Jump(b_head));
        self.switch_to(b_done);
        if scoped {
            self.emit(Step::ExitScope);
            self.guard_depth -= 1;
        }
        self.emit(Step::Jump(b_after));
        self.switch_to(b_after);
        Ok(())
    }

    /// Shared `for…of` / `for…in` lowering over the iterator steps.
    pub(crate) fn lower_for_iter(
        &mut self,
        left: &ForHead,
        iterable: &Expr,
        body: &Stmt,
        kind: IterKind,
        label: Option<StringId>,
    ) -> Result<(), LowerError> {
        let depth_outside = self.guard_depth;
        self.lower_expr_value(iterable)?;
        self.emit(Step::IterInit { kind });
        self.guard_depth += 1;
        let b_head = self.new_block();
        let b_bind = self.new_block();
        let b_exit = self.new_block();
        self.emit(Step::Jump(b_head));
        self.switch_to(b_head);
        self.emit(Step::IterNext { body: b_bind, exit: b_exit });
        self.ctxs.push(Ctx {
            label,
            break_target: b_exit,
            break_depth: depth_outside,
            continue_target: Some(b_head),
            continue_depth: self.guard_depth,
            is_loop: true,
        });
        self.switch_to(b_bind);
        self.lower_iter_binding(left)?;
        self.lower_stmt(body)?;
        self.lower_iter_binding_end(left);
        self.emit(Step::Jump(b_head));
        self.ctxs.pop();
        self.guard_depth -= 1;
        self.switch_to(b_exit);
        Ok(())
    }

    /// Binds the loop head to the value on the stack (fresh scope for
    /// `let`/`const` heads).
    pub(crate) fn lower_iter_binding(&mut self, left: &ForHead) -> Result<(), LowerError> {
        match left {
            ForHead::Decl { kind, pattern } => {
                if pattern_suspends(pattern) {
                    return Err(LowerError::new("suspension in destructuring default", pattern.span()));
                }
                let bind = match kind {
                    DeclKind::Var => BindingKind::Var,
                    DeclKind::Let => BindingKind::Let,
                    DeclKind::Const => BindingKind::Const,
                };
                if !matches!(kind, DeclKind::Var) {
                    self.emit(Step::EnterScope);
                    self.guard_depth += 1;
                    let mut names = Vec::new();
                    crate::ast::pattern_names(pattern, &mut names);
                    for name in names {
                        self.emit(Step::Declare { name, kind: bind });
                    }
                }
                self.emit(Step::BindPattern { pattern: Rc::new(pattern.clone()), kind: Some(bind) });
                Ok(())
            }
            ForHead::Target(target) => {
                if target_suspends(target) {
                    return Err(LowerError::new("suspension in loop assignment target", Span::default()));
                }
                let pattern = target_to_pattern(target);
                self.emit(Step::BindPattern { pattern: Rc::new(pattern), kind: None });
                Ok(())
            }
        }
    }

    pub(crate) fn lower_iter_binding_end(&mut self, left: &ForHead) {
        if matches!(left, ForHead::Decl { kind: DeclKind::Let | DeclKind::Const, .. }) {
            self.emit(Step::ExitScope);
            self.guard_depth -= 1;
        }
    }

    fn lower_labeled(&mut self, label: StringId, body: &Stmt) -> Result<(), LowerError> {
        match &body.kind {
            StmtKind::While { test, body } => self.lower_while(test, body, Some(label)),
            StmtKind::DoWhile { body, test } => self.lower_do_while(body, test, Some(label)),
            StmtKind::For { init, test, update, body } => self.lower_for(init, test, update, body, Some(label)),
            StmtKind::ForIn { left, object, body } => {
                self.lower_for_iter(left, object, body, IterKind::Keys, Some(label))
            }
            StmtKind::ForOf { left, iterable, body, is_await } => {
                if *is_await {
                    crate::cps::lower_for_await(self, left, iterable, body, Some(label))
                } else {
                    self.lower_for_iter(left, iterable, body, IterKind::Sync, Some(label))
                }
            }
            _ => {
                let b_after = self.new_block();
                self.ctxs.push(Ctx {
                    label: Some(label),
                    break_target: b_after,
                    break_depth: self.guard_depth,
                    continue_target: None,
                    continue_depth: self.guard_depth,
                    is_loop: false,
                });
                self.lower_stmt(body)?;
                self.emit(Step::Jump(b_after));
                self.ctxs.pop();
                self.switch_to(b_after);
                Ok(())
            }
        }
    }

    fn lower_switch(&mut self, discriminant: &Expr, cases: &[SwitchCase]) -> Result<(), LowerError> {
        let depth_outside = self.guard_depth;
        self.lower_expr_value(discriminant)?;
        let disc_temp = self.alloc_temp();
        self.emit(Step::StoreTemp(disc_temp));
        let scoped = cases.iter().any(|c| crate::ast::needs_block_scope(&c.body));
        if scoped {
            self.emit(Step::EnterScope);
            self.guard_depth += 1;
            for case in cases {
                self.emit_block_prologue(&case.body);
            }
        }
        let b_after = self.new_block();
        let b_done = self.new_block();
        let body_blocks: Vec<BlockId> = cases.iter().map(|_| self.new_block()).collect();
        self.ctxs.push(Ctx {
            label: None,
            break_target: b_after,
            break_depth: depth_outside,
            continue_target: None,
            continue_depth: depth_outside,
            is_loop: false,
        });

        // Dispatch: strict-compare each case test in order, default last.
        let disc_expr = |span: Span| Expr { kind: ExprKind::Temp(disc_temp), span };
        for (i, case) in cases.iter().enumerate() {
            let Some(test) = &case.test else { continue };
            let next_test = self.new_block();
            let test_operand = self.lower_operand(test)?;
            self.emit(Step::Eval(Expr {
                kind: ExprKind::Binary {
                    op: crate::ast::BinaryOp::StrictEq,
                    left: Box::new(disc_expr(case.span)),
                    right: Box::new(test_operand),
                },
                span: case.span,
            }));
            self.emit(Step::JumpIf { if_true: body_blocks[i], if_false: next_test });
            self.switch_to(next_test);
        }
        match cases.iter().position(|c| c.test.is_none()) {
            Some(default) => self.emit(Step::Jump(body_blocks[default])),
            None => self.emit(Step::Jump(b_done)),
        }

        // Case bodies fall through in order.
        for (i, case) in cases.iter().enumerate() {
            self.switch_to(body_blocks[i]);
            self.lower_stmts(&case.body)?;
            let next = body_blocks.get(i + 1).copied().unwrap_or(b_done);
            self.emit(Step::Jump(next));
        }
        self.ctxs.pop();
        self.switch_to(b_done);
        if scoped {
            self.emit(Step::ExitScope);
            self.guard_depth -= 1;
        }
        self.emit(Step::Jump(b_after));
        self.switch_to(b_after);
        Ok(())
    }

    fn lower_try(
        &mut self,
        block: &[Stmt],
        catch: Option<&crate::ast::CatchClause>,
        finally: Option<&[Stmt]>,
    ) -> Result<(), LowerError> {
        let b_exit = self.new_block();
        let b_catch = catch.map(|_| self.new_block());
        let b_finally = finally.map(|_| self.new_block());

        if let Some(clause) = catch
            && clause.param.as_ref().is_some_and(pattern_suspends)
        {
            return Err(LowerError::new("suspension in catch binding default", Span::default()));
        }

        self.emit(Step::EnterTry {
            catch: b_catch,
            finally: b_finally,
            catch_param: catch.and_then(|c| c.param.clone()).map(Rc::new),
        });
        self.guard_depth += 1;
        self.lower_block(block)?;
        self.emit(Step::LeaveTry { exit: b_exit });
        // The guard stays on the runtime stack through catch and finally;
        // static depth follows suit until each block's terminator pops it.

        if let (Some(clause), Some(b_catch)) = (catch, b_catch) {
            self.switch_to(b_catch);
            match &clause.param {
                Some(pattern) => {
                    self.emit(Step::EnterScope);
                    self.guard_depth += 1;
                    let mut names = Vec::new();
                    crate::ast::pattern_names(pattern, &mut names);
                    for name in names {
                        self.emit(Step::Declare { name, kind: BindingKind::Let });
                    }
                    self.emit(Step::BindPattern { pattern: Rc::new(pattern.clone()), kind: Some(BindingKind::Let) });
                    self.lower_block(&clause.body)?;
                    self.emit(Step::ExitScope);
                    self.guard_depth -= 1;
                }
                None => {
                    self.emit(Step::Pop);
                    self.lower_block(&clause.body)?;
                }
            }
            self.emit(Step::LeaveTry { exit: b_exit });
        }

        if let (Some(stmts), Some(b_finally)) = (finally, b_finally) {
            self.switch_to(b_finally);
            self.lower_block(stmts)?;
            self.emit(Step::EndFinally);
        }
        self.guard_depth -= 1;
        self.switch_to(b_exit);
        Ok(())
    }

    // -- expressions -------------------------------------------------------

    /// Lowers an expression so its value ends up on the operand stack.
    pub(crate) fn lower_expr_value(&mut self, e: &Expr) -> Result<(), LowerError> {
        if !contains_suspend(e) {
            self.emit(Step::Eval(e.clone()));
            return Ok(());
        }
        match &e.kind {
            ExprKind::Yield { argument, delegate } => {
                if self.flavor != PlanFlavor::Generator {
                    return Err(LowerError::new("yield outside a generator", e.span));
                }
                match argument {
                    Some(a) => self.lower_expr_value(a)?,
                    None => self.emit(Step::Eval(Self::undefined_expr(e.span))),
                }
                self.emit(if *delegate { Step::YieldStar } else { Step::Yield });
                Ok(())
            }
            ExprKind::Await(inner) => {
                if self.flavor != PlanFlavor::Async {
                    return Err(LowerError::new("await outside an async function", e.span));
                }
                self.lower_expr_value(inner)?;
                self.emit(Step::Await);
                Ok(())
            }
            ExprKind::Binary { op, left, right } => {
                let ops = self.lower_operand_list(&[left, right])?;
                let mut ops = ops.into_iter();
                self.emit(Step::Eval(Expr {
                    kind: ExprKind::Binary {
                        op: *op,
                        left: Box::new(ops.next().expect("two operands")),
                        right: Box::new(ops.next().expect("two operands")),
                    },
                    span: e.span,
                }));
                Ok(())
            }
            ExprKind::Logical { op, left, right } => self.lower_logical(*op, left, right, e.span),
            ExprKind::Cond { test, consequent, alternate } => {
                self.lower_expr_value(test)?;
                let result = self.alloc_temp();
                let b_then = self.new_block();
                let b_else = self.new_block();
                let b_end = self.new_block();
                self.emit(Step::JumpIf { if_true: b_then, if_false: b_else });
                self.switch_to(b_then);
                self.lower_expr_value(consequent)?;
                self.emit(Step::StoreTemp(result));
                self.emit(Step::Jump(b_end));
                self.switch_to(b_else);
                self.lower_expr_value(alternate)?;
                self.emit(Step::StoreTemp(result));
                self.emit(Step::Jump(b_end));
                self.switch_to(b_end);
                self.emit(Step::Eval(Expr { kind: ExprKind::Temp(result), span: e.span }));
                Ok(())
            }
            ExprKind::Unary { op, operand } => {
                let inner = self.lower_operand(operand)?;
                self.emit(Step::Eval(Expr {
                    kind: ExprKind::Unary { op: *op, operand: Box::new(inner) },
                    span: e.span,
                }));
                Ok(())
            }
            ExprKind::Update { op, prefix, target } => {
                let target = self.lower_target_operands(target)?;
                self.emit(Step::Eval(Expr {
                    kind: ExprKind::Update { op: *op, prefix: *prefix, target: Box::new(target) },
                    span: e.span,
                }));
                Ok(())
            }
            ExprKind::Assign { op, target, value } => self.lower_assign(*op, target, value, e.span),
            ExprKind::Member { object, property, optional } => {
                let (object, property) = self.lower_member_operands(object, property)?;
                self.emit(Step::Eval(Expr {
                    kind: ExprKind::Member { object: Box::new(object), property, optional: *optional },
                    span: e.span,
                }));
                Ok(())
            }
            ExprKind::SuperMember { property } => {
                let property = self.lower_member_prop_operand(property)?;
                self.emit(Step::Eval(Expr { kind: ExprKind::SuperMember { property }, span: e.span }));
                Ok(())
            }
            ExprKind::Call { callee, args, optional } => {
                // The callee's receiver (if any) lowers before the
                // arguments, preserving `this` for the rebuilt call.
                let (callee, args) = match &callee.kind {
                    ExprKind::Member { object, property, optional: m_opt } => {
                        let has_susp_after = member_prop_suspends(property) || args_suspend(args);
                        let object = if contains_suspend(object) || has_susp_after {
                            self.lower_to_temp(object)?
                        } else {
                            (**object).clone()
                        };
                        let property = if args_suspend(args) || member_prop_suspends(property) {
                            self.lower_member_prop_to_temp(property)?
                        } else {
                            property.clone()
                        };
                        let args = self.lower_arg_list(args)?;
                        (
                            Expr {
                                kind: ExprKind::Member {
                                    object: Box::new(object),
                                    property,
                                    optional: *m_opt,
                                },
                                span: callee.span,
                            },
                            args,
                        )
                    }
                    _ => {
                        let callee_expr = if contains_suspend(callee) || args_suspend(args) {
                            self.lower_to_temp(callee)?
                        } else {
                            (**callee).clone()
                        };
                        let args = self.lower_arg_list(args)?;
                        (callee_expr, args)
                    }
                };
                self.emit(Step::Eval(Expr {
                    kind: ExprKind::Call { callee: Box::new(callee), args, optional: *optional },
                    span: e.span,
                }));
                Ok(())
            }
            ExprKind::New { callee, args } => {
                let callee_expr = if contains_suspend(callee) || args_suspend(args) {
                    self.lower_to_temp(callee)?
                } else {
                    (**callee).clone()
                };
                let args = self.lower_arg_list(args)?;
                self.emit(Step::Eval(Expr {
                    kind: ExprKind::New { callee: Box::new(callee_expr), args },
                    span: e.span,
                }));
                Ok(())
            }
            ExprKind::SuperCall { args } => {
                let args = self.lower_arg_list(args)?;
                self.emit(Step::Eval(Expr { kind: ExprKind::SuperCall { args }, span: e.span }));
                Ok(())
            }
            ExprKind::Template { quasis, exprs } => {
                let refs: Vec<&Expr> = exprs.iter().collect();
                let lowered = self.lower_operand_list(&refs)?;
                self.emit(Step::Eval(Expr {
                    kind: ExprKind::Template { quasis: quasis.clone(), exprs: lowered },
                    span: e.span,
                }));
                Ok(())
            }
            ExprKind::Array(items) => {
                let mut lowered = Vec::with_capacity(items.len());
                let last_susp = items.iter().rposition(|i| match i {
                    ArrayItem::Expr(e) | ArrayItem::Spread(e) => contains_suspend(e),
                    ArrayItem::Hole => false,
                });
                for (i, item) in items.iter().enumerate() {
                    let force = last_susp.is_some_and(|k| i <= k);
                    lowered.push(match item {
                        ArrayItem::Hole => ArrayItem::Hole,
                        ArrayItem::Expr(e) => {
                            ArrayItem::Expr(if force { self.lower_to_temp(e)? } else { e.clone() })
                        }
                        ArrayItem::Spread(e) => {
                            ArrayItem::Spread(if force { self.lower_to_temp(e)? } else { e.clone() })
                        }
                    });
                }
                self.emit(Step::Eval(Expr { kind: ExprKind::Array(lowered), span: e.span }));
                Ok(())
            }
            ExprKind::Object(items) => {
                let mut lowered = Vec::with_capacity(items.len());
                let last_susp = items.iter().rposition(|i| match i {
                    ObjectItem::Property { key, value } => prop_name_suspends(key) || contains_suspend(value),
                    ObjectItem::Spread(e) => contains_suspend(e),
                    _ => false,
                });
                for (i, item) in items.iter().enumerate() {
                    let force = last_susp.is_some_and(|k| i <= k);
                    lowered.push(match item {
                        ObjectItem::Property { key, value } => ObjectItem::Property {
                            key: if force { self.lower_prop_name_operand(key)? } else { key.clone() },
                            value: if force { self.lower_to_temp(value)? } else { value.clone() },
                        },
                        ObjectItem::Spread(spread) => ObjectItem::Spread(if force {
                            self.lower_to_temp(spread)?
                        } else {
                            spread.clone()
                        }),
                        other => other.clone(),
                    });
                }
                self.emit(Step::Eval(Expr { kind: ExprKind::Object(lowered), span: e.span }));
                Ok(())
            }
            ExprKind::Sequence(exprs) => {
                let (last, init) = exprs.split_last().expect("sequence is non-empty");
                for e in init {
                    self.lower_expr_value(e)?;
                    self.emit(Step::Pop);
                }
                self.lower_expr_value(last)
            }
            ExprKind::Class(_) => Err(LowerError::new("suspension in class declaration", e.span)),
            ExprKind::Literal(_)
            | ExprKind::Ident(_)
            | ExprKind::This
            | ExprKind::Regex { .. }
            | ExprKind::Temp(_)
            | ExprKind::Function(_) => unreachable!("suspend-free expressions handled above"),
        }
    }

    fn lower_logical(&mut self, op: LogicalOp, left: &Expr, right: &Expr, span: Span) -> Result<(), LowerError> {
        let t = self.alloc_temp();
        self.lower_expr_value(left)?;
        self.emit(Step::StoreTemp(t));
        let b_rhs = self.new_block();
        let b_end = self.new_block();
        let temp_expr = Expr { kind: ExprKind::Temp(t), span };
        let cond = match op {
            LogicalOp::And => temp_expr.clone(),
            LogicalOp::Or => Expr {
                kind: ExprKind::Unary { op: UnaryOp::Not, operand: Box::new(temp_expr.clone()) },
                span,
            },
            LogicalOp::Nullish => Expr {
                kind: ExprKind::Binary {
                    op: crate::ast::BinaryOp::Eq,
                    left: Box::new(temp_expr.clone()),
                    right: Box::new(Expr { kind: ExprKind::Literal(Literal::Null), span }),
                },
                span,
            },
        };
        self.emit(Step::Eval(cond));
        self.emit(Step::JumpIf { if_true: b_rhs, if_false: b_end });
        self.switch_to(b_rhs);
        self.lower_expr_value(right)?;
        self.emit(Step::StoreTemp(t));
        self.emit(Step::Jump(b_end));
        self.switch_to(b_end);
        self.emit(Step::Eval(temp_expr));
        Ok(())
    }

    fn lower_assign(
        &mut self,
        op: AssignOp,
        target: &AssignTarget,
        value: &Expr,
        span: Span,
    ) -> Result<(), LowerError> {
        match op {
            AssignOp::AndAssign | AssignOp::OrAssign | AssignOp::NullishAssign => {
                // Logical assignment: evaluate the target, branch, assign.
                let target = self.lower_target_operands(target)?;
                let read = target_read_expr(&target, span);
                let t = self.alloc_temp();
                self.emit(Step::Eval(read));
                self.emit(Step::StoreTemp(t));
                let temp_expr = Expr { kind: ExprKind::Temp(t), span };
                let cond = match op {
                    AssignOp::AndAssign => temp_expr.clone(),
                    AssignOp::OrAssign => Expr {
                        kind: ExprKind::Unary { op: UnaryOp::Not, operand: Box::new(temp_expr.clone()) },
                        span,
                    },
                    _ => Expr {
                        kind: ExprKind::Binary {
                            op: crate::ast::BinaryOp::Eq,
                            left: Box::new(temp_expr.clone()),
                            right: Box::new(Expr { kind: ExprKind::Literal(Literal::Null), span }),
                        },
                        span,
                    },
                };
                let b_rhs = self.new_block();
                let b_end = self.new_block();
                self.emit(Step::Eval(cond));
                self.emit(Step::JumpIf { if_true: b_rhs, if_false: b_end });
                self.switch_to(b_rhs);
                self.lower_expr_value(value)?;
                self.emit(Step::StoreTemp(t));
                self.emit(Step::Eval(Expr {
                    kind: ExprKind::Assign {
                        op: AssignOp::Assign,
                        target: Box::new(target),
                        value: Box::new(temp_expr.clone()),
                    },
                    span,
                }));
                self.emit(Step::Pop);
                self.emit(Step::Jump(b_end));
                self.switch_to(b_end);
                self.emit(Step::Eval(temp_expr));
                Ok(())
            }
            _ => {
                let target = self.lower_target_operands(target)?;
                let value_expr = if contains_suspend(value) { self.lower_to_temp(value)? } else { value.clone() };
                self.emit(Step::Eval(Expr {
                    kind: ExprKind::Assign { op, target: Box::new(target), value: Box::new(value_expr) },
                    span,
                }));
                Ok(())
            }
        }
    }

    // -- operand helpers ---------------------------------------------------

    /// Evaluates an expression into a fresh temp and returns the temp read.
    fn lower_to_temp(&mut self, e: &Expr) -> Result<Expr, LowerError> {
        self.lower_expr_value(e)?;
        let t = self.alloc_temp();
        self.emit(Step::StoreTemp(t));
        Ok(Expr { kind: ExprKind::Temp(t), span: e.span })
    }

    /// Rewrites an operand: suspension-free operands stay inline.
    fn lower_operand(&mut self, e: &Expr) -> Result<Expr, LowerError> {
        if contains_suspend(e) { self.lower_to_temp(e) } else { Ok(e.clone()) }
    }

    /// Rewrites an ordered operand list, forcing every operand up to and
    /// including the last suspending one into temps so evaluation order is
    /// preserved.
    fn lower_operand_list(&mut self, operands: &[&Expr]) -> Result<Vec<Expr>, LowerError> {
        let last_susp = operands.iter().rposition(|e| contains_suspend(e));
        let mut out = Vec::with_capacity(operands.len());
        for (i, e) in operands.iter().enumerate() {
            match last_susp {
                Some(k) if i <= k => out.push(self.lower_to_temp(e)?),
                _ => out.push((*e).clone()),
            }
        }
        Ok(out)
    }

    fn lower_arg_list(&mut self, args: &[Arg]) -> Result<Vec<Arg>, LowerError> {
        let last_susp = args.iter().rposition(|a| match a {
            Arg::Expr(e) | Arg::Spread(e) => contains_suspend(e),
        });
        let mut out = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let force = last_susp.is_some_and(|k| i <= k);
            out.push(match arg {
                Arg::Expr(e) => Arg::Expr(if force { self.lower_to_temp(e)? } else { e.clone() }),
                Arg::Spread(e) => Arg::Spread(if force { self.lower_to_temp(e)? } else { e.clone() }),
            });
        }
        Ok(out)
    }

    fn lower_member_operands(
        &mut self,
        object: &Expr,
        property: &MemberProp,
    ) -> Result<(Expr, MemberProp), LowerError> {
        let prop_susp = member_prop_suspends(property);
        let object = if contains_suspend(object) || prop_susp {
            self.lower_to_temp(object)?
        } else {
            object.clone()
        };
        let property = if prop_susp { self.lower_member_prop_to_temp(property)? } else { property.clone() };
        Ok((object, property))
    }

    fn lower_member_prop_operand(&mut self, property: &MemberProp) -> Result<MemberProp, LowerError> {
        if member_prop_suspends(property) {
            self.lower_member_prop_to_temp(property)
        } else {
            Ok(property.clone())
        }
    }

    fn lower_member_prop_to_temp(&mut self, property: &MemberProp) -> Result<MemberProp, LowerError> {
        match property {
            MemberProp::Ident(id) => Ok(MemberProp::Ident(*id)),
            MemberProp::Computed(e) => Ok(MemberProp::Computed(Box::new(self.lower_operand(e)?))),
        }
    }

    fn lower_prop_name_operand(&mut self, name: &PropName) -> Result<PropName, LowerError> {
        match name {
            PropName::Computed(e) => Ok(PropName::Computed(Box::new(self.lower_operand(e)?))),
            other => Ok(other.clone()),
        }
    }

    /// Rewrites an assignment target so any suspending member parts land in
    /// temps (the receiver evaluates before the value, as in source order).
    fn lower_target_operands(&mut self, target: &AssignTarget) -> Result<AssignTarget, LowerError> {
        match target {
            AssignTarget::Ident { name, span } => Ok(AssignTarget::Ident { name: *name, span: *span }),
            AssignTarget::Member { object, property, span } => {
                let (object, property) = self.lower_member_operands(object, property)?;
                Ok(AssignTarget::Member { object, property, span: *span })
            }
            AssignTarget::Pattern(p) => {
                if pattern_suspends(p) {
                    return Err(LowerError::new("suspension in destructuring default", p.span()));
                }
                Ok(AssignTarget::Pattern(p.clone()))
            }
        }
    }

    /// Ends the current block with an explicit `Await` step (used by the
    /// async lowering in `cps`).
    pub(crate) fn emit_step(&mut self, step: Step) {
        self.emit(step);
    }

    pub(crate) fn open_block(&mut self) -> BlockId {
        self.new_block()
    }

    pub(crate) fn continue_in(&mut self, block: BlockId) {
        self.switch_to(block);
    }

    pub(crate) fn push_iter_loop_ctx(&mut self, label: Option<StringId>, break_target: BlockId, break_depth: u32, continue_target: BlockId) {
        self.ctxs.push(Ctx {
            label,
            break_target,
            break_depth,
            continue_target: Some(continue_target),
            continue_depth: self.guard_depth,
            is_loop: true,
        });
    }

    pub(crate) fn pop_ctx(&mut self) {
        self.ctxs.pop();
    }

    pub(crate) fn guard_depth(&self) -> u32 {
        self.guard_depth
    }

    pub(crate) fn adjust_guard_depth(&mut self, delta: i32) {
        self.guard_depth = self.guard_depth.checked_add_signed(delta).expect("guard depth underflow");
    }

    pub(crate) fn lower_stmt_pub(&mut self, stmt: &Stmt) -> Result<(), LowerError> {
        self.lower_stmt(stmt)
    }
}

/// Converts an assignment target into the pattern form `BindPattern`
/// consumes.
pub(crate) fn target_to_pattern(target: &AssignTarget) -> Pattern {
    match target {
        AssignTarget::Ident { name, span } => Pattern::Ident { name: *name, span: *span },
        AssignTarget::Member { object, property, span } => {
            Pattern::Member { object: object.clone(), property: property.clone(), span: *span }
        }
        AssignTarget::Pattern(p) => p.clone(),
    }
}

/// Builds the read expression for an already-rewritten assignment target.
fn target_read_expr(target: &AssignTarget, span: Span) -> Expr {
    match target {
        AssignTarget::Ident { name, .. } => Expr { kind: ExprKind::Ident(*name), span },
        AssignTarget::Member { object, property, .. } => Expr {
            kind: ExprKind::Member {
                object: Box::new(object.clone()),
                property: property.clone(),
                optional: false,
            },
            span,
        },
        AssignTarget::Pattern(_) => Expr { kind: ExprKind::Literal(Literal::Null), span },
    }
}
