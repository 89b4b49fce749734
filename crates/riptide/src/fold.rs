//! Constant folding: a pure rewrite evaluating side-effect-free constant
//! expressions.
//!
//! Only expressions whose operands are all literal primitives fold; anything
//! referencing a binding stays intact, so observable effect order is
//! preserved by construction. The pass rebuilds the tree (the parsed AST is
//! immutable) and keeps every span.

use std::rc::Rc;

use crate::{
    ast::{
        Arg, ArrayItem, AssignTarget, BinaryOp, CatchClause, ClassLit, ClassMember, Declarator, Expr, ExprKind,
        ForHead, ForInit, FuncBody, FuncLit, Literal, LogicalOp, MemberProp, ObjectItem, ObjectPatternProp, Pattern,
        Program, PropName, Stmt, StmtKind, SwitchCase, UnaryOp,
    },
    intern::Interns,
    value::{number_to_string, string_to_number},
};

pub(crate) fn fold_program(program: Program, interns: &mut Interns) -> Program {
    let body = program.body.into_iter().map(|s| fold_stmt(s, interns)).collect();
    Program { body, name: program.name }
}

fn fold_stmt(stmt: Stmt, interns: &mut Interns) -> Stmt {
    let kind = match stmt.kind {
        StmtKind::Expr(e) => StmtKind::Expr(fold_expr(e, interns)),
        StmtKind::VarDecl { kind, declarators } => StmtKind::VarDecl {
            kind,
            declarators: declarators
                .into_iter()
                .map(|d| Declarator {
                    pattern: fold_pattern(d.pattern, interns),
                    init: d.init.map(|e| fold_expr(e, interns)),
                    span: d.span,
                })
                .collect(),
        },
        StmtKind::FuncDecl(lit) => StmtKind::FuncDecl(fold_func(&lit, interns)),
        StmtKind::ClassDecl(class) => StmtKind::ClassDecl(fold_class(&class, interns)),
        StmtKind::Return(e) => StmtKind::Return(e.map(|e| fold_expr(e, interns))),
        StmtKind::If { test, then_branch, else_branch } => StmtKind::If {
            test: fold_expr(test, interns),
            then_branch: Box::new(fold_stmt(*then_branch, interns)),
            else_branch: else_branch.map(|s| Box::new(fold_stmt(*s, interns))),
        },
        StmtKind::Block(stmts) => StmtKind::Block(stmts.into_iter().map(|s| fold_stmt(s, interns)).collect()),
        StmtKind::While { test, body } => {
            StmtKind::While { test: fold_expr(test, interns), body: Box::new(fold_stmt(*body, interns)) }
        }
        StmtKind::DoWhile { body, test } => {
            StmtKind::DoWhile { body: Box::new(fold_stmt(*body, interns)), test: fold_expr(test, interns) }
        }
        StmtKind::For { init, test, update, body } => StmtKind::For {
            init: init.map(|i| match i {
                ForInit::Decl { kind, declarators } => ForInit::Decl {
                    kind,
                    declarators: declarators
                        .into_iter()
                        .map(|d| Declarator {
                            pattern: fold_pattern(d.pattern, interns),
                            init: d.init.map(|e| fold_expr(e, interns)),
                            span: d.span,
                        })
                        .collect(),
                },
                ForInit::Expr(e) => ForInit::Expr(fold_expr(e, interns)),
            }),
            test: test.map(|e| fold_expr(e, interns)),
            update: update.map(|e| fold_expr(e, interns)),
            body: Box::new(fold_stmt(*body, interns)),
        },
        StmtKind::ForIn { left, object, body } => StmtKind::ForIn {
            left: fold_for_head(left, interns),
            object: fold_expr(object, interns),
            body: Box::new(fold_stmt(*body, interns)),
        },
        StmtKind::ForOf { left, iterable, body, is_await } => StmtKind::ForOf {
            left: fold_for_head(left, interns),
            iterable: fold_expr(iterable, interns),
            body: Box::new(fold_stmt(*body, interns)),
            is_await,
        },
        StmtKind::Switch { discriminant, cases } => StmtKind::Switch {
            discriminant: fold_expr(discriminant, interns),
            cases: cases
                .into_iter()
                .map(|c| SwitchCase {
                    test: c.test.map(|e| fold_expr(e, interns)),
                    body: c.body.into_iter().map(|s| fold_stmt(s, interns)).collect(),
                    span: c.span,
                })
                .collect(),
        },
        StmtKind::Labeled { label, body } => {
            StmtKind::Labeled { label, body: Box::new(fold_stmt(*body, interns)) }
        }
        StmtKind::Try { block, catch, finally } => StmtKind::Try {
            block: block.into_iter().map(|s| fold_stmt(s, interns)).collect(),
            catch: catch.map(|c| CatchClause {
                param: c.param.map(|p| fold_pattern(p, interns)),
                body: c.body.into_iter().map(|s| fold_stmt(s, interns)).collect(),
            }),
            finally: finally.map(|f| f.into_iter().map(|s| fold_stmt(s, interns)).collect()),
        },
        StmtKind::Throw(e) => StmtKind::Throw(fold_expr(e, interns)),
        other @ (StmtKind::Break(_) | StmtKind::Continue(_) | StmtKind::Debugger | StmtKind::Empty) => other,
    };
    Stmt { kind, span: stmt.span }
}

fn fold_for_head(head: ForHead, interns: &mut Interns) -> ForHead {
    match head {
        ForHead::Decl { kind, pattern } => ForHead::Decl { kind, pattern: fold_pattern(pattern, interns) },
        ForHead::Target(t) => ForHead::Target(fold_target(t, interns)),
    }
}

fn fold_target(target: AssignTarget, interns: &mut Interns) -> AssignTarget {
    match target {
        AssignTarget::Ident { name, span } => AssignTarget::Ident { name, span },
        AssignTarget::Member { object, property, span } => AssignTarget::Member {
            object: fold_expr(object, interns),
            property: fold_member_prop(property, interns),
            span,
        },
        AssignTarget::Pattern(p) => AssignTarget::Pattern(fold_pattern(p, interns)),
    }
}

fn fold_member_prop(prop: MemberProp, interns: &mut Interns) -> MemberProp {
    match prop {
        MemberProp::Ident(id) => MemberProp::Ident(id),
        MemberProp::Computed(e) => MemberProp::Computed(Box::new(fold_expr(*e, interns))),
    }
}

fn fold_pattern(pattern: Pattern, interns: &mut Interns) -> Pattern {
    match pattern {
        Pattern::Ident { name, span } => Pattern::Ident { name, span },
        Pattern::Array { elements, rest, span } => Pattern::Array {
            elements: elements.into_iter().map(|e| e.map(|p| fold_pattern(p, interns))).collect(),
            rest: rest.map(|r| Box::new(fold_pattern(*r, interns))),
            span,
        },
        Pattern::Object { properties, rest, span } => Pattern::Object {
            properties: properties
                .into_iter()
                .map(|p| ObjectPatternProp {
                    key: fold_prop_name(p.key, interns),
                    value: fold_pattern(p.value, interns),
                })
                .collect(),
            rest: rest.map(|r| Box::new(fold_pattern(*r, interns))),
            span,
        },
        Pattern::Default { pattern, default } => Pattern::Default {
            pattern: Box::new(fold_pattern(*pattern, interns)),
            default: Box::new(fold_expr(*default, interns)),
        },
        Pattern::Member { object, property, span } => Pattern::Member {
            object: fold_expr(object, interns),
            property: fold_member_prop(property, interns),
            span,
        },
    }
}

fn fold_prop_name(name: PropName, interns: &mut Interns) -> PropName {
    match name {
        PropName::Computed(e) => PropName::Computed(Box::new(fold_expr(*e, interns))),
        other => other,
    }
}

fn fold_func(lit: &Rc<FuncLit>, interns: &mut Interns) -> Rc<FuncLit> {
    let body = match &lit.body {
        FuncBody::Block(stmts) => {
            FuncBody::Block(stmts.iter().cloned().map(|s| fold_stmt(s, interns)).collect())
        }
        FuncBody::Expr(e) => FuncBody::Expr(Box::new(fold_expr((**e).clone(), interns))),
    };
    Rc::new(FuncLit {
        name: lit.name,
        params: lit.params.clone(),
        rest: lit.rest.clone(),
        body,
        is_arrow: lit.is_arrow,
        is_async: lit.is_async,
        is_generator: lit.is_generator,
        span: lit.span,
        plan: lit.plan.clone(),
    })
}

fn fold_class(class: &Rc<ClassLit>, interns: &mut Interns) -> Rc<ClassLit> {
    Rc::new(ClassLit {
        name: class.name,
        parent: class.parent.clone().map(|e| fold_expr(e, interns)),
        constructor: class.constructor.as_ref().map(|c| fold_func(c, interns)),
        members: class
            .members
            .iter()
            .map(|m| ClassMember {
                kind: m.kind,
                is_static: m.is_static,
                key: fold_prop_name(m.key.clone(), interns),
                func: fold_func(&m.func, interns),
                span: m.span,
            })
            .collect(),
        span: class.span,
    })
}

pub(crate) fn fold_expr(expr: Expr, interns: &mut Interns) -> Expr {
    let span = expr.span;
    let kind = match expr.kind {
        ExprKind::Unary { op, operand } => {
            let operand = fold_expr(*operand, interns);
            if let ExprKind::Literal(lit) = &operand.kind
                && let Some(folded) = fold_unary(op, lit, interns)
            {
                folded
            } else {
                ExprKind::Unary { op, operand: Box::new(operand) }
            }
        }
        ExprKind::Binary { op, left, right } => {
            let left = fold_expr(*left, interns);
            let right = fold_expr(*right, interns);
            if let (ExprKind::Literal(l), ExprKind::Literal(r)) = (&left.kind, &right.kind)
                && let Some(folded) = fold_binary(op, l, r, interns)
            {
                folded
            } else {
                ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }
            }
        }
        ExprKind::Logical { op, left, right } => {
            let left = fold_expr(*left, interns);
            let right = fold_expr(*right, interns);
            if let ExprKind::Literal(l) = &left.kind {
                let take_right = match op {
                    LogicalOp::And => literal_truthy(l, interns),
                    LogicalOp::Or => !literal_truthy(l, interns),
                    LogicalOp::Nullish => matches!(l, Literal::Null),
                };
                if take_right { right.kind } else { left.kind }
            } else {
                ExprKind::Logical { op, left: Box::new(left), right: Box::new(right) }
            }
        }
        ExprKind::Cond { test, consequent, alternate } => {
            let test = fold_expr(*test, interns);
            let consequent = fold_expr(*consequent, interns);
            let alternate = fold_expr(*alternate, interns);
            if let ExprKind::Literal(l) = &test.kind {
                if literal_truthy(l, interns) { consequent.kind } else { alternate.kind }
            } else {
                ExprKind::Cond {
                    test: Box::new(test),
                    consequent: Box::new(consequent),
                    alternate: Box::new(alternate),
                }
            }
        }
        ExprKind::Template { quasis, exprs } => {
            let exprs: Vec<Expr> = exprs.into_iter().map(|e| fold_expr(e, interns)).collect();
            if exprs.is_empty() && quasis.len() == 1 {
                ExprKind::Literal(Literal::Str(quasis[0]))
            } else {
                ExprKind::Template { quasis, exprs }
            }
        }
        ExprKind::Sequence(exprs) => {
            ExprKind::Sequence(exprs.into_iter().map(|e| fold_expr(e, interns)).collect())
        }
        ExprKind::Array(items) => ExprKind::Array(
            items
                .into_iter()
                .map(|item| match item {
                    ArrayItem::Expr(e) => ArrayItem::Expr(fold_expr(e, interns)),
                    ArrayItem::Spread(e) => ArrayItem::Spread(fold_expr(e, interns)),
                    ArrayItem::Hole => ArrayItem::Hole,
                })
                .collect(),
        ),
        ExprKind::Object(items) => ExprKind::Object(
            items
                .into_iter()
                .map(|item| match item {
                    ObjectItem::Property { key, value } => ObjectItem::Property {
                        key: fold_prop_name(key, interns),
                        value: fold_expr(value, interns),
                    },
                    ObjectItem::Method { key, func } => {
                        ObjectItem::Method { key: fold_prop_name(key, interns), func: fold_func(&func, interns) }
                    }
                    ObjectItem::Getter { key, func } => {
                        ObjectItem::Getter { key: fold_prop_name(key, interns), func: fold_func(&func, interns) }
                    }
                    ObjectItem::Setter { key, func } => {
                        ObjectItem::Setter { key: fold_prop_name(key, interns), func: fold_func(&func, interns) }
                    }
                    ObjectItem::Spread(e) => ObjectItem::Spread(fold_expr(e, interns)),
                })
                .collect(),
        ),
        ExprKind::Function(lit) => ExprKind::Function(fold_func(&lit, interns)),
        ExprKind::Class(class) => ExprKind::Class(fold_class(&class, interns)),
        ExprKind::Update { op, prefix, target } => {
            ExprKind::Update { op, prefix, target: Box::new(fold_target(*target, interns)) }
        }
        ExprKind::Assign { op, target, value } => ExprKind::Assign {
            op,
            target: Box::new(fold_target(*target, interns)),
            value: Box::new(fold_expr(*value, interns)),
        },
        ExprKind::Call { callee, args, optional } => ExprKind::Call {
            callee: Box::new(fold_expr(*callee, interns)),
            args: fold_args(args, interns),
            optional,
        },
        ExprKind::New { callee, args } => {
            ExprKind::New { callee: Box::new(fold_expr(*callee, interns)), args: fold_args(args, interns) }
        }
        ExprKind::Member { object, property, optional } => ExprKind::Member {
            object: Box::new(fold_expr(*object, interns)),
            property: fold_member_prop(property, interns),
            optional,
        },
        ExprKind::SuperMember { property } => {
            ExprKind::SuperMember { property: fold_member_prop(property, interns) }
        }
        ExprKind::SuperCall { args } => ExprKind::SuperCall { args: fold_args(args, interns) },
        ExprKind::Yield { argument, delegate } => ExprKind::Yield {
            argument: argument.map(|e| Box::new(fold_expr(*e, interns))),
            delegate,
        },
        ExprKind::Await(e) => ExprKind::Await(Box::new(fold_expr(*e, interns))),
        other @ (ExprKind::Literal(_)
        | ExprKind::Ident(_)
        | ExprKind::This
        | ExprKind::Regex { .. }
        | ExprKind::Temp(_)) => other,
    };
    Expr { kind, span }
}

fn fold_args(args: Vec<Arg>, interns: &mut Interns) -> Vec<Arg> {
    args.into_iter()
        .map(|a| match a {
            Arg::Expr(e) => Arg::Expr(fold_expr(e, interns)),
            Arg::Spread(e) => Arg::Spread(fold_expr(e, interns)),
        })
        .collect()
}

fn literal_truthy(lit: &Literal, interns: &Interns) -> bool {
    match lit {
        Literal::Null => false,
        Literal::Bool(b) => *b,
        Literal::Number(n) => !(*n == 0.0 || n.is_nan()),
        Literal::Str(id) => !interns.get(*id).is_empty(),
    }
}

fn literal_number(lit: &Literal, interns: &Interns) -> f64 {
    match lit {
        Literal::Null => 0.0,
        Literal::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Literal::Number(n) => *n,
        Literal::Str(id) => string_to_number(interns.get(*id)),
    }
}

fn literal_string(lit: &Literal, interns: &Interns) -> String {
    match lit {
        Literal::Null => "null".to_owned(),
        Literal::Bool(b) => b.to_string(),
        Literal::Number(n) => number_to_string(*n),
        Literal::Str(id) => interns.get(*id).to_owned(),
    }
}

fn fold_unary(op: UnaryOp, lit: &Literal, interns: &mut Interns) -> Option<ExprKind> {
    let folded = match op {
        UnaryOp::Minus => Literal::Number(-literal_number(lit, interns)),
        UnaryOp::Plus => Literal::Number(literal_number(lit, interns)),
        UnaryOp::Not => Literal::Bool(!literal_truthy(lit, interns)),
        UnaryOp::BitNot => {
            Literal::Number(f64::from(!crate::value::double_to_int32(literal_number(lit, interns))))
        }
        UnaryOp::TypeOf => {
            let s = match lit {
                Literal::Null => "object",
                Literal::Bool(_) => "boolean",
                Literal::Number(_) => "number",
                Literal::Str(_) => "string",
            };
            Literal::Str(interns.intern(s))
        }
        UnaryOp::Void => return None,
        UnaryOp::Delete => return None,
    };
    Some(ExprKind::Literal(folded))
}

fn fold_binary(op: BinaryOp, l: &Literal, r: &Literal, interns: &mut Interns) -> Option<ExprKind> {
    let folded = match op {
        BinaryOp::Add => {
            if matches!(l, Literal::Str(_)) || matches!(r, Literal::Str(_)) {
                let s = format!("{}{}", literal_string(l, interns), literal_string(r, interns));
                Literal::Str(interns.intern(&s))
            } else {
                Literal::Number(literal_number(l, interns) + literal_number(r, interns))
            }
        }
        BinaryOp::Sub => Literal::Number(literal_number(l, interns) - literal_number(r, interns)),
        BinaryOp::Mul => Literal::Number(literal_number(l, interns) * literal_number(r, interns)),
        BinaryOp::Div => Literal::Number(literal_number(l, interns) / literal_number(r, interns)),
        BinaryOp::Rem => {
            let rn = literal_number(r, interns);
            Literal::Number(if rn == 0.0 { f64::NAN } else { literal_number(l, interns) % rn })
        }
        BinaryOp::Exp => Literal::Number(literal_number(l, interns).powf(literal_number(r, interns))),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let result = if let (Literal::Str(a), Literal::Str(b)) = (l, r) {
                let ord = interns.get(*a).cmp(interns.get(*b));
                match op {
                    BinaryOp::Lt => ord.is_lt(),
                    BinaryOp::LtEq => ord.is_le(),
                    BinaryOp::Gt => ord.is_gt(),
                    _ => ord.is_ge(),
                }
            } else {
                let (a, b) = (literal_number(l, interns), literal_number(r, interns));
                match op {
                    BinaryOp::Lt => a < b,
                    BinaryOp::LtEq => a <= b,
                    BinaryOp::Gt => a > b,
                    _ => a >= b,
                }
            };
            Literal::Bool(result)
        }
        BinaryOp::StrictEq | BinaryOp::StrictNotEq => {
            let eq = match (l, r) {
                (Literal::Null, Literal::Null) => true,
                (Literal::Bool(a), Literal::Bool(b)) => a == b,
                (Literal::Number(a), Literal::Number(b)) => a == b,
                (Literal::Str(a), Literal::Str(b)) => interns.get(*a) == interns.get(*b),
                _ => false,
            };
            Literal::Bool(if matches!(op, BinaryOp::StrictEq) { eq } else { !eq })
        }
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr => {
            let a = crate::value::double_to_int32(literal_number(l, interns));
            let b = crate::value::double_to_int32(literal_number(r, interns));
            Literal::Number(f64::from(match op {
                BinaryOp::BitAnd => a & b,
                BinaryOp::BitOr => a | b,
                BinaryOp::BitXor => a ^ b,
                BinaryOp::Shl => a << (b & 31),
                _ => a >> (b & 31),
            }))
        }
        BinaryOp::UShr => {
            let a = crate::value::double_to_int32(literal_number(l, interns)) as u32;
            let b = crate::value::double_to_int32(literal_number(r, interns)) as u32;
            Literal::Number(f64::from(a >> (b & 31)))
        }
        // Loose equality's coercion table stays at runtime; `in` and
        // `instanceof` need objects.
        BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::In | BinaryOp::InstanceOf => return None,
    };
    Some(ExprKind::Literal(folded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;

    fn num(n: f64) -> Expr {
        Expr { kind: ExprKind::Literal(Literal::Number(n)), span: Span::default() }
    }

    fn bin(op: BinaryOp, l: Expr, r: Expr) -> Expr {
        Expr { kind: ExprKind::Binary { op, left: Box::new(l), right: Box::new(r) }, span: Span::default() }
    }

    #[test]
    fn folds_nested_arithmetic() {
        let mut interns = Interns::new();
        let e = bin(BinaryOp::Mul, bin(BinaryOp::Add, num(1.0), num(2.0)), num(4.0));
        let folded = fold_expr(e, &mut interns);
        assert!(matches!(folded.kind, ExprKind::Literal(Literal::Number(n)) if n == 12.0));
    }

    #[test]
    fn folds_string_concat() {
        let mut interns = Interns::new();
        let a = interns.intern("foo");
        let b = interns.intern("bar");
        let e = bin(
            BinaryOp::Add,
            Expr { kind: ExprKind::Literal(Literal::Str(a)), span: Span::default() },
            Expr { kind: ExprKind::Literal(Literal::Str(b)), span: Span::default() },
        );
        let folded = fold_expr(e, &mut interns);
        let ExprKind::Literal(Literal::Str(id)) = folded.kind else { panic!("expected string literal") };
        assert_eq!(interns.get(id), "foobar");
    }

    #[test]
    fn leaves_identifiers_alone() {
        let mut interns = Interns::new();
        let x = interns.intern("x");
        let e = bin(BinaryOp::Add, Expr { kind: ExprKind::Ident(x), span: Span::default() }, num(1.0));
        let folded = fold_expr(e, &mut interns);
        assert!(matches!(folded.kind, ExprKind::Binary { .. }));
    }

    #[test]
    fn folds_typeof_literal() {
        let mut interns = Interns::new();
        let e = Expr {
            kind: ExprKind::Unary { op: UnaryOp::TypeOf, operand: Box::new(num(1.0)) },
            span: Span::default(),
        };
        let folded = fold_expr(e, &mut interns);
        let ExprKind::Literal(Literal::Str(id)) = folded.kind else { panic!("expected string literal") };
        assert_eq!(interns.get(id), "number");
    }
}
