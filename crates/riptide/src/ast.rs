//! Owned AST for the supported ECMAScript subset.
//!
//! The parser converts the borrowed oxc tree into these owned nodes so that
//! the rest of the engine never carries the parser arena's lifetime. Every
//! node records a [`Span`] origin into the evaluated source; lowering passes
//! rebuild trees but keep the origins, so diagnostics always point at the
//! original text.
//!
//! The only node the parser never produces is [`ExprKind::Temp`]: lowering
//! introduces temp reads when it decomposes an expression around a
//! suspension point.

use std::rc::Rc;

use crate::{intern::StringId, ir::Plan};

/// A half-open byte range into the evaluated source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }
}

/// A parsed program: the statements of one source evaluation.
#[derive(Debug, Clone)]
pub(crate) struct Program {
    pub body: Vec<Stmt>,
    /// Script name used in stack frames and debug messages.
    pub name: String,
}

#[derive(Debug, Clone)]
pub(crate) struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub(crate) enum StmtKind {
    Expr(Expr),
    /// `var`/`let`/`const` with one or more declarators.
    VarDecl {
        kind: DeclKind,
        declarators: Vec<Declarator>,
    },
    FuncDecl(Rc<FuncLit>),
    ClassDecl(Rc<ClassLit>),
    Return(Option<Expr>),
    If {
        test: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    Block(Vec<Stmt>),
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        test: Expr,
    },
    For {
        init: Option<ForInit>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForIn {
        left: ForHead,
        object: Expr,
        body: Box<Stmt>,
    },
    ForOf {
        left: ForHead,
        iterable: Expr,
        body: Box<Stmt>,
        /// `for await (… of …)`.
        is_await: bool,
    },
    Switch {
        discriminant: Expr,
        cases: Vec<SwitchCase>,
    },
    Break(Option<StringId>),
    Continue(Option<StringId>),
    Labeled {
        label: StringId,
        body: Box<Stmt>,
    },
    Try {
        block: Vec<Stmt>,
        catch: Option<CatchClause>,
        finally: Option<Vec<Stmt>>,
    },
    Throw(Expr),
    /// `debugger;` — emits a debug checkpoint.
    Debugger,
    Empty,
}

/// `var`/`let`/`const`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeclKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone)]
pub(crate) struct Declarator {
    pub pattern: Pattern,
    pub init: Option<Expr>,
    pub span: Span,
}

/// The init clause of a C-style `for`.
#[derive(Debug, Clone)]
pub(crate) enum ForInit {
    Decl { kind: DeclKind, declarators: Vec<Declarator> },
    Expr(Expr),
}

/// The binding clause of `for…in`/`for…of`: a fresh declaration or an
/// assignment to an existing target.
#[derive(Debug, Clone)]
pub(crate) enum ForHead {
    Decl { kind: DeclKind, pattern: Pattern },
    Target(AssignTarget),
}

#[derive(Debug, Clone)]
pub(crate) struct SwitchCase {
    /// `None` for `default:`.
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub(crate) struct CatchClause {
    /// `None` for `catch { … }` without a binding.
    pub param: Option<Pattern>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub(crate) struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub(crate) enum ExprKind {
    Literal(Literal),
    Ident(StringId),
    This,
    /// Template literal: `quasis.len() == exprs.len() + 1`.
    Template {
        quasis: Vec<StringId>,
        exprs: Vec<Expr>,
    },
    Array(Vec<ArrayItem>),
    Object(Vec<ObjectItem>),
    Function(Rc<FuncLit>),
    Class(Rc<ClassLit>),
    /// `/source/flags`
    Regex {
        source: StringId,
        flags: StringId,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// `++`/`--`, prefix or postfix.
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<AssignTarget>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `&&`, `||`, `??` — short-circuiting.
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<AssignTarget>,
        value: Box<Expr>,
    },
    Cond {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Arg>,
        /// `?.()` — short-circuits on nullish callee.
        optional: bool,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Arg>,
    },
    Member {
        object: Box<Expr>,
        property: MemberProp,
        /// `?.` — short-circuits on nullish object.
        optional: bool,
    },
    /// `super.x` / `super[x]` member access.
    SuperMember {
        property: MemberProp,
    },
    /// `super(...)` in a derived constructor.
    SuperCall {
        args: Vec<Arg>,
    },
    Sequence(Vec<Expr>),
    Yield {
        argument: Option<Box<Expr>>,
        delegate: bool,
    },
    Await(Box<Expr>),
    /// Lowering-introduced read of a frame temp slot. Never produced by the
    /// parser.
    Temp(u32),
}

#[derive(Debug, Clone)]
pub(crate) enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    Str(StringId),
}

#[derive(Debug, Clone)]
pub(crate) enum ArrayItem {
    Expr(Expr),
    Spread(Expr),
    /// Elision: `[1, , 3]`.
    Hole,
}

#[derive(Debug, Clone)]
pub(crate) enum ObjectItem {
    /// `key: value`, shorthand `{ x }`, and computed `{ [k]: v }`.
    Property { key: PropName, value: Expr },
    Getter { key: PropName, func: Rc<FuncLit> },
    Setter { key: PropName, func: Rc<FuncLit> },
    Method { key: PropName, func: Rc<FuncLit> },
    Spread(Expr),
}

/// A property name in literals, classes, and member accesses.
#[derive(Debug, Clone)]
pub(crate) enum PropName {
    Ident(StringId),
    Str(StringId),
    Num(f64),
    Computed(Box<Expr>),
}

#[derive(Debug, Clone)]
pub(crate) enum MemberProp {
    Ident(StringId),
    Computed(Box<Expr>),
}

#[derive(Debug, Clone)]
pub(crate) enum Arg {
    Expr(Expr),
    Spread(Expr),
}

/// Assignable positions: plain names, member expressions, and destructuring
/// patterns (the latter only for `=`).
#[derive(Debug, Clone)]
pub(crate) enum AssignTarget {
    Ident { name: StringId, span: Span },
    Member { object: Expr, property: MemberProp, span: Span },
    Pattern(Pattern),
}

#[derive(Debug, Clone)]
pub(crate) enum Pattern {
    Ident { name: StringId, span: Span },
    /// `[a, , b = 1, ...rest]`
    Array {
        elements: Vec<Option<Pattern>>,
        rest: Option<Box<Pattern>>,
        span: Span,
    },
    /// `{ a, b: c, [k]: d = 1, ...rest }`
    Object {
        properties: Vec<ObjectPatternProp>,
        rest: Option<Box<Pattern>>,
        span: Span,
    },
    /// Pattern with a default, applied when the incoming value is undefined.
    Default {
        pattern: Box<Pattern>,
        default: Box<Expr>,
    },
    /// Assignment to a member expression inside a destructuring assignment.
    Member {
        object: Expr,
        property: MemberProp,
        span: Span,
    },
}

impl Pattern {
    pub fn span(&self) -> Span {
        match self {
            Self::Ident { span, .. }
            | Self::Array { span, .. }
            | Self::Object { span, .. }
            | Self::Member { span, .. } => *span,
            Self::Default { pattern, .. } => pattern.span(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ObjectPatternProp {
    pub key: PropName,
    pub value: Pattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Minus,
    Plus,
    Not,
    BitNot,
    TypeOf,
    Void,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpdateOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Exp,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    In,
    InstanceOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogicalOp {
    And,
    Or,
    Nullish,
}

/// Assignment operators. Compound forms evaluate the target once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Exp,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    AndAssign,
    OrAssign,
    NullishAssign,
}

/// A function literal: declarations, expressions, arrows, and methods.
#[derive(Debug, Clone)]
pub(crate) struct FuncLit {
    pub name: Option<StringId>,
    pub params: Vec<Param>,
    /// `...rest` parameter, bound after the listed params.
    pub rest: Option<Pattern>,
    pub body: FuncBody,
    pub is_arrow: bool,
    pub is_async: bool,
    pub is_generator: bool,
    pub span: Span,
    /// Lowered plan for generator/async bodies, filled by the lowering
    /// passes. `None` for plain functions (tree-interpreted).
    pub plan: Option<Rc<Plan>>,
}

#[derive(Debug, Clone)]
pub(crate) struct Param {
    pub pattern: Pattern,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub(crate) enum FuncBody {
    Block(Vec<Stmt>),
    /// Arrow concise body: `x => x + 1`.
    Expr(Box<Expr>),
}

#[derive(Debug, Clone)]
pub(crate) struct ClassLit {
    pub name: Option<StringId>,
    pub parent: Option<Expr>,
    pub constructor: Option<Rc<FuncLit>>,
    pub members: Vec<ClassMember>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub(crate) struct ClassMember {
    pub kind: ClassMemberKind,
    pub is_static: bool,
    pub key: PropName,
    pub func: Rc<FuncLit>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClassMemberKind {
    Method,
    Getter,
    Setter,
}

/// Collects the names bound by a pattern (used for hoisting and TDZ setup).
pub(crate) fn pattern_names(pattern: &Pattern, out: &mut Vec<StringId>) {
    match pattern {
        Pattern::Ident { name, .. } => out.push(*name),
        Pattern::Array { elements, rest, .. } => {
            for element in elements.iter().flatten() {
                pattern_names(element, out);
            }
            if let Some(rest) = rest {
                pattern_names(rest, out);
            }
        }
        Pattern::Object { properties, rest, .. } => {
            for prop in properties {
                pattern_names(&prop.value, out);
            }
            if let Some(rest) = rest {
                pattern_names(rest, out);
            }
        }
        Pattern::Default { pattern, .. } => pattern_names(pattern, out),
        Pattern::Member { .. } => {}
    }
}

/// Collects `var` names and function declarations hoisted to a function (or
/// script) scope. Does not descend into nested functions; does descend into
/// blocks and control-flow bodies, where `var` still binds at function level.
pub(crate) fn hoisted_decls(body: &[Stmt]) -> (Vec<StringId>, Vec<Rc<FuncLit>>) {
    let mut vars = Vec::new();
    let mut funcs = Vec::new();
    for stmt in body {
        hoist_stmt(stmt, &mut vars, &mut funcs, true);
    }
    (vars, funcs)
}

fn hoist_stmt(stmt: &Stmt, vars: &mut Vec<StringId>, funcs: &mut Vec<Rc<FuncLit>>, top_level: bool) {
    match &stmt.kind {
        StmtKind::VarDecl { kind: DeclKind::Var, declarators } => {
            for decl in declarators {
                pattern_names(&decl.pattern, vars);
            }
        }
        StmtKind::FuncDecl(func) => {
            // Function declarations nested in blocks initialize where they
            // appear; only top-level declarations hoist with their value.
            if top_level {
                funcs.push(Rc::clone(func));
            } else if let Some(name) = func.name {
                vars.push(name);
            }
        }
        StmtKind::Block(body) => {
            for inner in body {
                hoist_stmt(inner, vars, funcs, false);
            }
        }
        StmtKind::If { then_branch, else_branch, .. } => {
            hoist_stmt(then_branch, vars, funcs, false);
            if let Some(else_branch) = else_branch {
                hoist_stmt(else_branch, vars, funcs, false);
            }
        }
        StmtKind::While { body, .. } | StmtKind::DoWhile { body, .. } | StmtKind::Labeled { body, .. } => {
            hoist_stmt(body, vars, funcs, false);
        }
        StmtKind::For { init, body, .. } => {
            if let Some(ForInit::Decl { kind: DeclKind::Var, declarators }) = init {
                for decl in declarators {
                    pattern_names(&decl.pattern, vars);
                }
            }
            hoist_stmt(body, vars, funcs, false);
        }
        StmtKind::ForIn { left, body, .. } | StmtKind::ForOf { left, body, .. } => {
            if let ForHead::Decl { kind: DeclKind::Var, pattern } = left {
                pattern_names(pattern, vars);
            }
            hoist_stmt(body, vars, funcs, false);
        }
        StmtKind::Switch { cases, .. } => {
            for case in cases {
                for inner in &case.body {
                    hoist_stmt(inner, vars, funcs, false);
                }
            }
        }
        StmtKind::Try { block, catch, finally } => {
            for inner in block {
                hoist_stmt(inner, vars, funcs, false);
            }
            if let Some(catch) = catch {
                for inner in &catch.body {
                    hoist_stmt(inner, vars, funcs, false);
                }
            }
            if let Some(finally) = finally {
                for inner in finally {
                    hoist_stmt(inner, vars, funcs, false);
                }
            }
        }
        _ => {}
    }
}

/// Collects the `let`/`const`/`class` names declared directly in a block, for
/// TDZ setup at block entry.
pub(crate) fn lexical_decls(body: &[Stmt]) -> Vec<(StringId, DeclKind)> {
    let mut out = Vec::new();
    for stmt in body {
        match &stmt.kind {
            StmtKind::VarDecl { kind: kind @ (DeclKind::Let | DeclKind::Const), declarators } => {
                let mut names = Vec::new();
                for decl in declarators {
                    pattern_names(&decl.pattern, &mut names);
                }
                out.extend(names.into_iter().map(|n| (n, *kind)));
            }
            StmtKind::ClassDecl(class) => {
                if let Some(name) = class.name {
                    out.push((name, DeclKind::Let));
                }
            }
            _ => {}
        }
    }
    out
}

/// True if a block needs its own environment: it declares `let`/`const`/
/// `class` or a block-level function.
pub(crate) fn needs_block_scope(body: &[Stmt]) -> bool {
    body.iter().any(|stmt| {
        matches!(
            &stmt.kind,
            StmtKind::VarDecl { kind: DeclKind::Let | DeclKind::Const, .. }
                | StmtKind::ClassDecl(_)
                | StmtKind::FuncDecl(_)
        )
    })
}
