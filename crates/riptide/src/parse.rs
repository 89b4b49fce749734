//! Parser wrapper: oxc source text in, owned AST out.
//!
//! oxc parses into an arena; this module converts the borrowed tree into the
//! engine's owned [`crate::ast`] nodes, interning identifiers and literals
//! on the way. Constructs outside the supported subset (modules, `with`,
//! BigInt, tagged templates, private fields, class fields) are rejected here
//! with a source-anchored error rather than failing later in the pipeline.

use oxc_allocator::Allocator;
use oxc_ast::ast::{self, ChainElement};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType};
use oxc_syntax::operator::{
    AssignmentOperator, BinaryOperator, LogicalOperator, UnaryOperator, UpdateOperator,
};

use crate::{
    ast::{
        Arg, ArrayItem, AssignOp, AssignTarget, BinaryOp, CatchClause, ClassLit, ClassMember, ClassMemberKind,
        DeclKind, Declarator, Expr, ExprKind, ForHead, ForInit, FuncBody, FuncLit, Literal, LogicalOp, MemberProp,
        ObjectItem, ObjectPatternProp, Param, Pattern, Program, PropName, Span, Stmt, StmtKind, SwitchCase, UnaryOp,
        UpdateOp,
    },
    intern::Interns,
};

/// Maximum nesting depth for AST structures during conversion. Prevents
/// stack overflow on pathological inputs like `((((((…))))))`.
const MAX_NESTING_DEPTH: u16 = 200;

/// A parse (or conversion) failure anchored to the source.
#[derive(Debug)]
pub(crate) struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    fn new(message: impl Into<String>, span: Span) -> Self {
        Self { message: message.into(), span }
    }
}

/// Parses a source string into the engine's owned AST.
pub(crate) fn parse(source: &str, script_name: &str, interns: &mut Interns) -> Result<Program, ParseError> {
    let allocator = Allocator::default();
    let source_type = SourceType::cjs();
    let parsed = Parser::new(&allocator, source, source_type).parse();
    if let Some(error) = parsed.errors.first() {
        return Err(ParseError::new(error.to_string(), Span::default()));
    }
    let mut converter = Converter { source, interns, depth: 0 };
    let body = converter.convert_stmts(&parsed.program.body)?;
    Ok(Program { body, name: script_name.to_owned() })
}

struct Converter<'s, 'i> {
    source: &'s str,
    interns: &'i mut Interns,
    depth: u16,
}

fn span_of(span: oxc_span::Span) -> Span {
    Span::new(span.start, span.end)
}

impl Converter<'_, '_> {
    fn enter(&mut self, span: Span) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::new("expression nesting is too deep", span));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn convert_stmts(&mut self, stmts: &[ast::Statement<'_>]) -> Result<Vec<Stmt>, ParseError> {
        stmts.iter().map(|s| self.convert_stmt(s)).collect()
    }

    fn convert_stmt(&mut self, stmt: &ast::Statement<'_>) -> Result<Stmt, ParseError> {
        let span = span_of(stmt.span());
        self.enter(span)?;
        let kind = match stmt {
            ast::Statement::ExpressionStatement(s) => StmtKind::Expr(self.convert_expr(&s.expression)?),
            ast::Statement::EmptyStatement(_) => StmtKind::Empty,
            ast::Statement::DebuggerStatement(_) => StmtKind::Debugger,
            ast::Statement::BlockStatement(s) => StmtKind::Block(self.convert_stmts(&s.body)?),
            ast::Statement::VariableDeclaration(decl) => self.convert_var_decl(decl)?,
            ast::Statement::FunctionDeclaration(func) => {
                StmtKind::FuncDecl(std::rc::Rc::new(self.convert_function(func)?))
            }
            ast::Statement::ClassDeclaration(class) => {
                StmtKind::ClassDecl(std::rc::Rc::new(self.convert_class(class)?))
            }
            ast::Statement::ReturnStatement(s) => {
                StmtKind::Return(s.argument.as_ref().map(|e| self.convert_expr(e)).transpose()?)
            }
            ast::Statement::IfStatement(s) => StmtKind::If {
                test: self.convert_expr(&s.test)?,
                then_branch: Box::new(self.convert_stmt(&s.consequent)?),
                else_branch: s.alternate.as_ref().map(|s| self.convert_stmt(s).map(Box::new)).transpose()?,
            },
            ast::Statement::WhileStatement(s) => StmtKind::While {
                test: self.convert_expr(&s.test)?,
                body: Box::new(self.convert_stmt(&s.body)?),
            },
            ast::Statement::DoWhileStatement(s) => StmtKind::DoWhile {
                body: Box::new(self.convert_stmt(&s.body)?),
                test: self.convert_expr(&s.test)?,
            },
            ast::Statement::ForStatement(s) => StmtKind::For {
                init: s.init.as_ref().map(|init| self.convert_for_init(init)).transpose()?,
                test: s.test.as_ref().map(|e| self.convert_expr(e)).transpose()?,
                update: s.update.as_ref().map(|e| self.convert_expr(e)).transpose()?,
                body: Box::new(self.convert_stmt(&s.body)?),
            },
            ast::Statement::ForInStatement(s) => StmtKind::ForIn {
                left: self.convert_for_head(&s.left)?,
                object: self.convert_expr(&s.right)?,
                body: Box::new(self.convert_stmt(&s.body)?),
            },
            ast::Statement::ForOfStatement(s) => StmtKind::ForOf {
                left: self.convert_for_head(&s.left)?,
                iterable: self.convert_expr(&s.right)?,
                body: Box::new(self.convert_stmt(&s.body)?),
                is_await: s.r#await,
            },
            ast::Statement::SwitchStatement(s) => StmtKind::Switch {
                discriminant: self.convert_expr(&s.discriminant)?,
                cases: s
                    .cases
                    .iter()
                    .map(|c| {
                        Ok(SwitchCase {
                            test: c.test.as_ref().map(|e| self.convert_expr(e)).transpose()?,
                            body: self.convert_stmts(&c.consequent)?,
                            span: span_of(c.span),
                        })
                    })
                    .collect::<Result<_, ParseError>>()?,
            },
            ast::Statement::BreakStatement(s) => {
                StmtKind::Break(s.label.as_ref().map(|l| self.interns.intern(l.name.as_str())))
            }
            ast::Statement::ContinueStatement(s) => {
                StmtKind::Continue(s.label.as_ref().map(|l| self.interns.intern(l.name.as_str())))
            }
            ast::Statement::LabeledStatement(s) => StmtKind::Labeled {
                label: self.interns.intern(s.label.name.as_str()),
                body: Box::new(self.convert_stmt(&s.body)?),
            },
            ast::Statement::ThrowStatement(s) => StmtKind::Throw(self.convert_expr(&s.argument)?),
            ast::Statement::TryStatement(s) => StmtKind::Try {
                block: self.convert_stmts(&s.block.body)?,
                catch: s
                    .handler
                    .as_ref()
                    .map(|h| {
                        Ok(CatchClause {
                            param: h.param.as_ref().map(|p| self.convert_binding(&p.pattern)).transpose()?,
                            body: self.convert_stmts(&h.body.body)?,
                        })
                    })
                    .transpose()?,
                finally: s.finalizer.as_ref().map(|f| self.convert_stmts(&f.body)).transpose()?,
            },
            ast::Statement::WithStatement(_) => {
                return Err(ParseError::new("'with' statements are not supported", span));
            }
            ast::Statement::ImportDeclaration(_)
            | ast::Statement::ExportAllDeclaration(_)
            | ast::Statement::ExportDefaultDeclaration(_)
            | ast::Statement::ExportNamedDeclaration(_) => {
                return Err(ParseError::new("modules are not supported", span));
            }
            _ => return Err(ParseError::new("unsupported statement", span)),
        };
        self.leave();
        Ok(Stmt { kind, span })
    }

    fn convert_var_decl(&mut self, decl: &ast::VariableDeclaration<'_>) -> Result<StmtKind, ParseError> {
        let kind = match decl.kind {
            ast::VariableDeclarationKind::Var => DeclKind::Var,
            ast::VariableDeclarationKind::Let => DeclKind::Let,
            ast::VariableDeclarationKind::Const => DeclKind::Const,
            _ => return Err(ParseError::new("unsupported declaration kind", span_of(decl.span))),
        };
        let declarators = decl
            .declarations
            .iter()
            .map(|d| {
                Ok(Declarator {
                    pattern: self.convert_binding(&d.id)?,
                    init: d.init.as_ref().map(|e| self.convert_expr(e)).transpose()?,
                    span: span_of(d.span),
                })
            })
            .collect::<Result<_, ParseError>>()?;
        Ok(StmtKind::VarDecl { kind, declarators })
    }

    fn convert_for_init(&mut self, init: &ast::ForStatementInit<'_>) -> Result<ForInit, ParseError> {
        match init {
            ast::ForStatementInit::VariableDeclaration(decl) => {
                let StmtKind::VarDecl { kind, declarators } = self.convert_var_decl(decl)? else {
                    unreachable!()
                };
                Ok(ForInit::Decl { kind, declarators })
            }
            _ => {
                let expr = init.as_expression().ok_or_else(|| {
                    ParseError::new("unsupported for-loop initializer", span_of(init.span()))
                })?;
                Ok(ForInit::Expr(self.convert_expr(expr)?))
            }
        }
    }

    fn convert_for_head(&mut self, left: &ast::ForStatementLeft<'_>) -> Result<ForHead, ParseError> {
        match left {
            ast::ForStatementLeft::VariableDeclaration(decl) => {
                let kind = match decl.kind {
                    ast::VariableDeclarationKind::Var => DeclKind::Var,
                    ast::VariableDeclarationKind::Let => DeclKind::Let,
                    ast::VariableDeclarationKind::Const => DeclKind::Const,
                    _ => {
                        return Err(ParseError::new("unsupported declaration kind", span_of(decl.span)));
                    }
                };
                let declarator = decl.declarations.first().ok_or_else(|| {
                    ParseError::new("missing loop binding", span_of(decl.span))
                })?;
                Ok(ForHead::Decl { kind, pattern: self.convert_binding(&declarator.id)? })
            }
            _ => {
                let target = left.as_assignment_target().ok_or_else(|| {
                    ParseError::new("unsupported loop target", span_of(left.span()))
                })?;
                Ok(ForHead::Target(self.convert_assignment_target(target)?))
            }
        }
    }

    // -- expressions -------------------------------------------------------

    fn convert_expr(&mut self, expr: &ast::Expression<'_>) -> Result<Expr, ParseError> {
        let span = span_of(expr.span());
        self.enter(span)?;
        let kind = match expr {
            ast::Expression::NullLiteral(_) => ExprKind::Literal(Literal::Null),
            ast::Expression::BooleanLiteral(lit) => ExprKind::Literal(Literal::Bool(lit.value)),
            ast::Expression::NumericLiteral(lit) => ExprKind::Literal(Literal::Number(lit.value)),
            ast::Expression::StringLiteral(lit) => {
                ExprKind::Literal(Literal::Str(self.interns.intern(lit.value.as_str())))
            }
            ast::Expression::BigIntLiteral(_) => {
                return Err(ParseError::new("BigInt is not supported", span));
            }
            ast::Expression::RegExpLiteral(lit) => {
                // Slice the literal text instead of relying on the parsed
                // representation; `/source/flags` splits at the last slash.
                let raw = lit.span().source_text(self.source);
                let close = raw.rfind('/').unwrap_or(0);
                let source = &raw[1..close];
                let flags = &raw[close + 1..];
                ExprKind::Regex {
                    source: self.interns.intern(source),
                    flags: self.interns.intern(flags),
                }
            }
            ast::Expression::Identifier(ident) => {
                ExprKind::Ident(self.interns.intern(ident.name.as_str()))
            }
            ast::Expression::ThisExpression(_) => ExprKind::This,
            ast::Expression::Super(_) => {
                return Err(ParseError::new("'super' is only valid in member or call position", span));
            }
            ast::Expression::ParenthesizedExpression(inner) => {
                let converted = self.convert_expr(&inner.expression)?;
                self.leave();
                return Ok(converted);
            }
            ast::Expression::TemplateLiteral(lit) => self.convert_template(lit)?,
            ast::Expression::TaggedTemplateExpression(_) => {
                return Err(ParseError::new("tagged templates are not supported", span));
            }
            ast::Expression::ArrayExpression(array) => {
                let items = array
                    .elements
                    .iter()
                    .map(|element| {
                        Ok(match element {
                            ast::ArrayExpressionElement::Elision(_) => ArrayItem::Hole,
                            ast::ArrayExpressionElement::SpreadElement(spread) => {
                                ArrayItem::Spread(self.convert_expr(&spread.argument)?)
                            }
                            _ => {
                                let e = element.as_expression().ok_or_else(|| {
                                    ParseError::new("unsupported array element", span)
                                })?;
                                ArrayItem::Expr(self.convert_expr(e)?)
                            }
                        })
                    })
                    .collect::<Result<_, ParseError>>()?;
                ExprKind::Array(items)
            }
            ast::Expression::ObjectExpression(object) => self.convert_object_literal(object)?,
            ast::Expression::FunctionExpression(func) => {
                ExprKind::Function(std::rc::Rc::new(self.convert_function(func)?))
            }
            ast::Expression::ArrowFunctionExpression(arrow) => {
                ExprKind::Function(std::rc::Rc::new(self.convert_arrow(arrow)?))
            }
            ast::Expression::ClassExpression(class) => {
                ExprKind::Class(std::rc::Rc::new(self.convert_class(class)?))
            }
            ast::Expression::UnaryExpression(unary) => ExprKind::Unary {
                op: convert_unary_op(unary.operator, span)?,
                operand: Box::new(self.convert_expr(&unary.argument)?),
            },
            ast::Expression::UpdateExpression(update) => ExprKind::Update {
                op: match update.operator {
                    UpdateOperator::Increment => UpdateOp::Increment,
                    UpdateOperator::Decrement => UpdateOp::Decrement,
                },
                prefix: update.prefix,
                target: Box::new(self.convert_simple_target(&update.argument)?),
            },
            ast::Expression::BinaryExpression(binary) => ExprKind::Binary {
                op: convert_binary_op(binary.operator, span)?,
                left: Box::new(self.convert_expr(&binary.left)?),
                right: Box::new(self.convert_expr(&binary.right)?),
            },
            ast::Expression::PrivateInExpression(_) | ast::Expression::PrivateFieldExpression(_) => {
                return Err(ParseError::new("private fields are not supported", span));
            }
            ast::Expression::LogicalExpression(logical) => ExprKind::Logical {
                op: match logical.operator {
                    LogicalOperator::And => LogicalOp::And,
                    LogicalOperator::Or => LogicalOp::Or,
                    LogicalOperator::Coalesce => LogicalOp::Nullish,
                },
                left: Box::new(self.convert_expr(&logical.left)?),
                right: Box::new(self.convert_expr(&logical.right)?),
            },
            ast::Expression::ConditionalExpression(cond) => ExprKind::Cond {
                test: Box::new(self.convert_expr(&cond.test)?),
                consequent: Box::new(self.convert_expr(&cond.consequent)?),
                alternate: Box::new(self.convert_expr(&cond.alternate)?),
            },
            ast::Expression::AssignmentExpression(assign) => ExprKind::Assign {
                op: convert_assign_op(assign.operator, span)?,
                target: Box::new(self.convert_assignment_target(&assign.left)?),
                value: Box::new(self.convert_expr(&assign.right)?),
            },
            ast::Expression::SequenceExpression(seq) => ExprKind::Sequence(
                seq.expressions.iter().map(|e| self.convert_expr(e)).collect::<Result<_, ParseError>>()?,
            ),
            ast::Expression::CallExpression(call) => self.convert_call(call)?,
            ast::Expression::NewExpression(new) => ExprKind::New {
                callee: Box::new(self.convert_expr(&new.callee)?),
                args: self.convert_args(&new.arguments)?,
            },
            ast::Expression::StaticMemberExpression(member) => self.convert_static_member(member)?,
            ast::Expression::ComputedMemberExpression(member) => self.convert_computed_member(member)?,
            ast::Expression::ChainExpression(chain) => {
                let converted = self.convert_chain_element(&chain.expression)?;
                self.leave();
                return Ok(Expr { kind: converted, span });
            }
            ast::Expression::YieldExpression(yield_expr) => ExprKind::Yield {
                argument: yield_expr.argument.as_ref().map(|e| self.convert_expr(e).map(Box::new)).transpose()?,
                delegate: yield_expr.delegate,
            },
            ast::Expression::AwaitExpression(await_expr) => {
                ExprKind::Await(Box::new(self.convert_expr(&await_expr.argument)?))
            }
            ast::Expression::MetaProperty(_) => {
                return Err(ParseError::new("meta properties are not supported", span));
            }
            ast::Expression::ImportExpression(_) => {
                return Err(ParseError::new("modules are not supported", span));
            }
            _ => return Err(ParseError::new("unsupported expression", span)),
        };
        self.leave();
        Ok(Expr { kind, span })
    }

    fn convert_template(&mut self, lit: &ast::TemplateLiteral<'_>) -> Result<ExprKind, ParseError> {
        let mut quasis = Vec::with_capacity(lit.quasis.len());
        for quasi in &lit.quasis {
            let cooked = quasi
                .value
                .cooked
                .as_ref()
                .map_or_else(|| quasi.value.raw.as_str(), |c| c.as_str());
            quasis.push(self.interns.intern(cooked));
        }
        let exprs =
            lit.expressions.iter().map(|e| self.convert_expr(e)).collect::<Result<Vec<_>, ParseError>>()?;
        Ok(ExprKind::Template { quasis, exprs })
    }

    fn convert_object_literal(&mut self, object: &ast::ObjectExpression<'_>) -> Result<ExprKind, ParseError> {
        let mut items = Vec::with_capacity(object.properties.len());
        for property in &object.properties {
            match property {
                ast::ObjectPropertyKind::SpreadProperty(spread) => {
                    items.push(ObjectItem::Spread(self.convert_expr(&spread.argument)?));
                }
                ast::ObjectPropertyKind::ObjectProperty(prop) => {
                    let key = self.convert_prop_key(&prop.key, prop.computed)?;
                    match prop.kind {
                        ast::PropertyKind::Init => {
                            if prop.method {
                                let ast::Expression::FunctionExpression(func) = &prop.value else {
                                    return Err(ParseError::new(
                                        "method shorthand without a function body",
                                        span_of(prop.span),
                                    ));
                                };
                                items.push(ObjectItem::Method {
                                    key,
                                    func: std::rc::Rc::new(self.convert_function(func)?),
                                });
                            } else {
                                items.push(ObjectItem::Property { key, value: self.convert_expr(&prop.value)? });
                            }
                        }
                        ast::PropertyKind::Get => {
                            let ast::Expression::FunctionExpression(func) = &prop.value else {
                                return Err(ParseError::new("getter without a function body", span_of(prop.span)));
                            };
                            items.push(ObjectItem::Getter {
                                key,
                                func: std::rc::Rc::new(self.convert_function(func)?),
                            });
                        }
                        ast::PropertyKind::Set => {
                            let ast::Expression::FunctionExpression(func) = &prop.value else {
                                return Err(ParseError::new("setter without a function body", span_of(prop.span)));
                            };
                            items.push(ObjectItem::Setter {
                                key,
                                func: std::rc::Rc::new(self.convert_function(func)?),
                            });
                        }
                    }
                }
            }
        }
        Ok(ExprKind::Object(items))
    }

    fn convert_prop_key(&mut self, key: &ast::PropertyKey<'_>, computed: bool) -> Result<PropName, ParseError> {
        match key {
            ast::PropertyKey::StaticIdentifier(ident) => {
                Ok(PropName::Ident(self.interns.intern(ident.name.as_str())))
            }
            ast::PropertyKey::PrivateIdentifier(ident) => {
                Err(ParseError::new("private fields are not supported", span_of(ident.span)))
            }
            _ => {
                let expr = key
                    .as_expression()
                    .ok_or_else(|| ParseError::new("unsupported property key", Span::default()))?;
                if computed {
                    Ok(PropName::Computed(Box::new(self.convert_expr(expr)?)))
                } else {
                    // Non-computed literal keys: strings and numbers.
                    match expr {
                        ast::Expression::StringLiteral(lit) => {
                            Ok(PropName::Str(self.interns.intern(lit.value.as_str())))
                        }
                        ast::Expression::NumericLiteral(lit) => Ok(PropName::Num(lit.value)),
                        _ => Ok(PropName::Computed(Box::new(self.convert_expr(expr)?))),
                    }
                }
            }
        }
    }

    fn convert_call(&mut self, call: &ast::CallExpression<'_>) -> Result<ExprKind, ParseError> {
        // `super(...)` is a distinct node shape.
        if let ast::Expression::Super(_) = &call.callee {
            return Ok(ExprKind::SuperCall { args: self.convert_args(&call.arguments)? });
        }
        Ok(ExprKind::Call {
            callee: Box::new(self.convert_expr(&call.callee)?),
            args: self.convert_args(&call.arguments)?,
            optional: call.optional,
        })
    }

    fn convert_static_member(&mut self, member: &ast::StaticMemberExpression<'_>) -> Result<ExprKind, ParseError> {
        let property = MemberProp::Ident(self.interns.intern(member.property.name.as_str()));
        if let ast::Expression::Super(_) = &member.object {
            return Ok(ExprKind::SuperMember { property });
        }
        Ok(ExprKind::Member {
            object: Box::new(self.convert_expr(&member.object)?),
            property,
            optional: member.optional,
        })
    }

    fn convert_computed_member(
        &mut self,
        member: &ast::ComputedMemberExpression<'_>,
    ) -> Result<ExprKind, ParseError> {
        let property = MemberProp::Computed(Box::new(self.convert_expr(&member.expression)?));
        if let ast::Expression::Super(_) = &member.object {
            return Ok(ExprKind::SuperMember { property });
        }
        Ok(ExprKind::Member {
            object: Box::new(self.convert_expr(&member.object)?),
            property,
            optional: member.optional,
        })
    }

    fn convert_chain_element(&mut self, element: &ChainElement<'_>) -> Result<ExprKind, ParseError> {
        match element {
            ChainElement::CallExpression(call) => self.convert_call(call),
            ChainElement::StaticMemberExpression(member) => self.convert_static_member(member),
            ChainElement::ComputedMemberExpression(member) => self.convert_computed_member(member),
            _ => Err(ParseError::new("unsupported optional chain element", span_of(element.span()))),
        }
    }

    fn convert_args(&mut self, args: &[ast::Argument<'_>]) -> Result<Vec<Arg>, ParseError> {
        args.iter()
            .map(|arg| match arg {
                ast::Argument::SpreadElement(spread) => {
                    Ok(Arg::Spread(self.convert_expr(&spread.argument)?))
                }
                _ => {
                    let e = arg.as_expression().ok_or_else(|| {
                        ParseError::new("unsupported call argument", span_of(arg.span()))
                    })?;
                    Ok(Arg::Expr(self.convert_expr(e)?))
                }
            })
            .collect()
    }

    // -- functions & classes -----------------------------------------------

    fn convert_function(&mut self, func: &ast::Function<'_>) -> Result<FuncLit, ParseError> {
        let span = span_of(func.span);
        let body = func
            .body
            .as_ref()
            .ok_or_else(|| ParseError::new("function without a body", span))?;
        let (params, rest) = self.convert_params(&func.params)?;
        Ok(FuncLit {
            name: func.id.as_ref().map(|id| self.interns.intern(id.name.as_str())),
            params,
            rest,
            body: FuncBody::Block(self.convert_stmts(&body.statements)?),
            is_arrow: false,
            is_async: func.r#async,
            is_generator: func.generator,
            span,
            plan: None,
        })
    }

    fn convert_arrow(&mut self, arrow: &ast::ArrowFunctionExpression<'_>) -> Result<FuncLit, ParseError> {
        let span = span_of(arrow.span);
        let (params, rest) = self.convert_params(&arrow.params)?;
        let body = if arrow.expression {
            // Concise body: oxc stores `x => e` as a body with one
            // expression statement.
            let stmt = arrow
                .body
                .statements
                .first()
                .ok_or_else(|| ParseError::new("arrow body missing its expression", span))?;
            let ast::Statement::ExpressionStatement(expr_stmt) = stmt else {
                return Err(ParseError::new("arrow body missing its expression", span));
            };
            FuncBody::Expr(Box::new(self.convert_expr(&expr_stmt.expression)?))
        } else {
            FuncBody::Block(self.convert_stmts(&arrow.body.statements)?)
        };
        Ok(FuncLit {
            name: None,
            params,
            rest,
            body,
            is_arrow: true,
            is_async: arrow.r#async,
            is_generator: false,
            span,
            plan: None,
        })
    }

    fn convert_params(
        &mut self,
        params: &ast::FormalParameters<'_>,
    ) -> Result<(Vec<Param>, Option<Pattern>), ParseError> {
        let converted = params
            .items
            .iter()
            .map(|p| {
                Ok(Param { pattern: self.convert_binding(&p.pattern)?, span: span_of(p.span) })
            })
            .collect::<Result<Vec<_>, ParseError>>()?;
        let rest = params
            .rest
            .as_ref()
            .map(|r| self.convert_binding(&r.argument))
            .transpose()?;
        Ok((converted, rest))
    }

    fn convert_class(&mut self, class: &ast::Class<'_>) -> Result<ClassLit, ParseError> {
        let span = span_of(class.span);
        let mut constructor = None;
        let mut members = Vec::new();
        for element in &class.body.body {
            match element {
                ast::ClassElement::MethodDefinition(method) => {
                    let func = std::rc::Rc::new(self.convert_function(&method.value)?);
                    match method.kind {
                        ast::MethodDefinitionKind::Constructor => constructor = Some(func),
                        kind => {
                            let member_kind = match kind {
                                ast::MethodDefinitionKind::Get => ClassMemberKind::Getter,
                                ast::MethodDefinitionKind::Set => ClassMemberKind::Setter,
                                _ => ClassMemberKind::Method,
                            };
                            members.push(ClassMember {
                                kind: member_kind,
                                is_static: method.r#static,
                                key: self.convert_prop_key(&method.key, method.computed)?,
                                func,
                                span: span_of(method.span),
                            });
                        }
                    }
                }
                ast::ClassElement::PropertyDefinition(prop) => {
                    return Err(ParseError::new("class fields are not supported", span_of(prop.span)));
                }
                ast::ClassElement::StaticBlock(block) => {
                    return Err(ParseError::new("static blocks are not supported", span_of(block.span)));
                }
                _ => return Err(ParseError::new("unsupported class member", span)),
            }
        }
        Ok(ClassLit {
            name: class.id.as_ref().map(|id| self.interns.intern(id.name.as_str())),
            parent: class.super_class.as_ref().map(|e| self.convert_expr(e)).transpose()?,
            constructor,
            members,
            span,
        })
    }

    // -- patterns & assignment targets --------------------------------------

    fn convert_binding(&mut self, pattern: &ast::BindingPattern<'_>) -> Result<Pattern, ParseError> {
        let span = span_of(pattern.span());
        self.enter(span)?;
        let converted = match &pattern.kind {
            ast::BindingPatternKind::BindingIdentifier(ident) => {
                Pattern::Ident { name: self.interns.intern(ident.name.as_str()), span }
            }
            ast::BindingPatternKind::ArrayPattern(array) => Pattern::Array {
                elements: array
                    .elements
                    .iter()
                    .map(|e| e.as_ref().map(|p| self.convert_binding(p)).transpose())
                    .collect::<Result<_, ParseError>>()?,
                rest: array
                    .rest
                    .as_ref()
                    .map(|r| self.convert_binding(&r.argument).map(Box::new))
                    .transpose()?,
                span,
            },
            ast::BindingPatternKind::ObjectPattern(object) => Pattern::Object {
                properties: object
                    .properties
                    .iter()
                    .map(|p| {
                        Ok(ObjectPatternProp {
                            key: self.convert_prop_key(&p.key, p.computed)?,
                            value: self.convert_binding(&p.value)?,
                        })
                    })
                    .collect::<Result<_, ParseError>>()?,
                rest: object
                    .rest
                    .as_ref()
                    .map(|r| self.convert_binding(&r.argument).map(Box::new))
                    .transpose()?,
                span,
            },
            ast::BindingPatternKind::AssignmentPattern(assign) => Pattern::Default {
                pattern: Box::new(self.convert_binding(&assign.left)?),
                default: Box::new(self.convert_expr(&assign.right)?),
            },
        };
        self.leave();
        Ok(converted)
    }

    fn convert_simple_target(
        &mut self,
        target: &ast::SimpleAssignmentTarget<'_>,
    ) -> Result<AssignTarget, ParseError> {
        let span = span_of(target.span());
        match target {
            ast::SimpleAssignmentTarget::AssignmentTargetIdentifier(ident) => {
                Ok(AssignTarget::Ident { name: self.interns.intern(ident.name.as_str()), span })
            }
            ast::SimpleAssignmentTarget::StaticMemberExpression(member) => {
                let ExprKind::Member { object, property, .. } = self.convert_static_member(member)? else {
                    return Err(ParseError::new("'super' is not assignable", span));
                };
                Ok(AssignTarget::Member { object: *object, property, span })
            }
            ast::SimpleAssignmentTarget::ComputedMemberExpression(member) => {
                let ExprKind::Member { object, property, .. } = self.convert_computed_member(member)? else {
                    return Err(ParseError::new("'super' is not assignable", span));
                };
                Ok(AssignTarget::Member { object: *object, property, span })
            }
            _ => Err(ParseError::new("unsupported assignment target", span)),
        }
    }

    fn convert_assignment_target(&mut self, target: &ast::AssignmentTarget<'_>) -> Result<AssignTarget, ParseError> {
        let span = span_of(target.span());
        if let Some(simple) = target.as_simple_assignment_target() {
            return self.convert_simple_target(simple);
        }
        match target {
            ast::AssignmentTarget::ArrayAssignmentTarget(array) => {
                let elements = array
                    .elements
                    .iter()
                    .map(|e| e.as_ref().map(|t| self.convert_target_maybe_default(t)).transpose())
                    .collect::<Result<_, ParseError>>()?;
                let rest = array
                    .rest
                    .as_ref()
                    .map(|r| self.convert_assignment_target(&r.target).map(|t| Box::new(target_pattern(t))))
                    .transpose()?;
                Ok(AssignTarget::Pattern(Pattern::Array { elements, rest, span }))
            }
            ast::AssignmentTarget::ObjectAssignmentTarget(object) => {
                let properties = object
                    .properties
                    .iter()
                    .map(|p| self.convert_target_property(p))
                    .collect::<Result<_, ParseError>>()?;
                let rest = object
                    .rest
                    .as_ref()
                    .map(|r| self.convert_assignment_target(&r.target).map(|t| Box::new(target_pattern(t))))
                    .transpose()?;
                Ok(AssignTarget::Pattern(Pattern::Object { properties, rest, span }))
            }
            _ => Err(ParseError::new("unsupported assignment target", span)),
        }
    }

    fn convert_target_maybe_default(
        &mut self,
        target: &ast::AssignmentTargetMaybeDefault<'_>,
    ) -> Result<Pattern, ParseError> {
        match target {
            ast::AssignmentTargetMaybeDefault::AssignmentTargetWithDefault(with_default) => {
                let inner = self.convert_assignment_target(&with_default.binding)?;
                Ok(Pattern::Default {
                    pattern: Box::new(target_pattern(inner)),
                    default: Box::new(self.convert_expr(&with_default.init)?),
                })
            }
            _ => {
                let inner = target.as_assignment_target().ok_or_else(|| {
                    ParseError::new("unsupported assignment target", span_of(target.span()))
                })?;
                Ok(target_pattern(self.convert_assignment_target(inner)?))
            }
        }
    }

    fn convert_target_property(
        &mut self,
        property: &ast::AssignmentTargetProperty<'_>,
    ) -> Result<ObjectPatternProp, ParseError> {
        match property {
            ast::AssignmentTargetProperty::AssignmentTargetPropertyIdentifier(ident_prop) => {
                let name = self.interns.intern(ident_prop.binding.name.as_str());
                let span = span_of(ident_prop.span);
                let pattern = match &ident_prop.init {
                    Some(init) => Pattern::Default {
                        pattern: Box::new(Pattern::Ident { name, span }),
                        default: Box::new(self.convert_expr(init)?),
                    },
                    None => Pattern::Ident { name, span },
                };
                Ok(ObjectPatternProp { key: PropName::Ident(name), value: pattern })
            }
            ast::AssignmentTargetProperty::AssignmentTargetPropertyProperty(prop) => {
                Ok(ObjectPatternProp {
                    key: self.convert_prop_key(&prop.name, prop.computed)?,
                    value: self.convert_target_maybe_default(&prop.binding)?,
                })
            }
        }
    }
}

/// Converts an assignment target into the pattern space (assignment
/// destructuring reuses the pattern machinery with `kind: None`).
fn target_pattern(target: AssignTarget) -> Pattern {
    match target {
        AssignTarget::Ident { name, span } => Pattern::Ident { name, span },
        AssignTarget::Member { object, property, span } => Pattern::Member { object, property, span },
        AssignTarget::Pattern(p) => p,
    }
}

fn convert_unary_op(op: UnaryOperator, span: Span) -> Result<UnaryOp, ParseError> {
    Ok(match op {
        UnaryOperator::UnaryNegation => UnaryOp::Minus,
        UnaryOperator::UnaryPlus => UnaryOp::Plus,
        UnaryOperator::LogicalNot => UnaryOp::Not,
        UnaryOperator::BitwiseNot => UnaryOp::BitNot,
        UnaryOperator::Typeof => UnaryOp::TypeOf,
        UnaryOperator::Void => UnaryOp::Void,
        UnaryOperator::Delete => UnaryOp::Delete,
        #[expect(unreachable_patterns)]
        _ => return Err(ParseError::new("unsupported unary operator", span)),
    })
}

fn convert_binary_op(op: BinaryOperator, span: Span) -> Result<BinaryOp, ParseError> {
    Ok(match op {
        BinaryOperator::Equality => BinaryOp::Eq,
        BinaryOperator::Inequality => BinaryOp::NotEq,
        BinaryOperator::StrictEquality => BinaryOp::StrictEq,
        BinaryOperator::StrictInequality => BinaryOp::StrictNotEq,
        BinaryOperator::LessThan => BinaryOp::Lt,
        BinaryOperator::LessEqualThan => BinaryOp::LtEq,
        BinaryOperator::GreaterThan => BinaryOp::Gt,
        BinaryOperator::GreaterEqualThan => BinaryOp::GtEq,
        BinaryOperator::ShiftLeft => BinaryOp::Shl,
        BinaryOperator::ShiftRight => BinaryOp::Shr,
        BinaryOperator::ShiftRightZeroFill => BinaryOp::UShr,
        BinaryOperator::Addition => BinaryOp::Add,
        BinaryOperator::Subtraction => BinaryOp::Sub,
        BinaryOperator::Multiplication => BinaryOp::Mul,
        BinaryOperator::Division => BinaryOp::Div,
        BinaryOperator::Remainder => BinaryOp::Rem,
        BinaryOperator::Exponential => BinaryOp::Exp,
        BinaryOperator::BitwiseOR => BinaryOp::BitOr,
        BinaryOperator::BitwiseXOR => BinaryOp::BitXor,
        BinaryOperator::BitwiseAnd => BinaryOp::BitAnd,
        BinaryOperator::In => BinaryOp::In,
        BinaryOperator::Instanceof => BinaryOp::InstanceOf,
        #[expect(unreachable_patterns)]
        _ => return Err(ParseError::new("unsupported binary operator", span)),
    })
}

fn convert_assign_op(op: AssignmentOperator, span: Span) -> Result<AssignOp, ParseError> {
    Ok(match op {
        AssignmentOperator::Assign => AssignOp::Assign,
        AssignmentOperator::Addition => AssignOp::Add,
        AssignmentOperator::Subtraction => AssignOp::Sub,
        AssignmentOperator::Multiplication => AssignOp::Mul,
        AssignmentOperator::Division => AssignOp::Div,
        AssignmentOperator::Remainder => AssignOp::Rem,
        AssignmentOperator::Exponential => AssignOp::Exp,
        AssignmentOperator::ShiftLeft => AssignOp::Shl,
        AssignmentOperator::ShiftRight => AssignOp::Shr,
        AssignmentOperator::ShiftRightZeroFill => AssignOp::UShr,
        AssignmentOperator::BitwiseOR => AssignOp::BitOr,
        AssignmentOperator::BitwiseXOR => AssignOp::BitXor,
        AssignmentOperator::BitwiseAnd => AssignOp::BitAnd,
        AssignmentOperator::LogicalAnd => AssignOp::AndAssign,
        AssignmentOperator::LogicalOr => AssignOp::OrAssign,
        AssignmentOperator::LogicalNullish => AssignOp::NullishAssign,
        #[expect(unreachable_patterns)]
        _ => return Err(ParseError::new("unsupported assignment operator", span)),
    })
}
