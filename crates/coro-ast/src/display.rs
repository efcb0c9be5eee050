// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Pretty-printing for bound trees.

use std::fmt::{self, Write};

use crate::*;

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "null"),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Int(v) => write!(f, "{}", v),
            Literal::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// Renders a body with local names resolved through its table.
pub struct TreePrinter<'a> {
    locals: &'a LocalTable,
    out: String,
    indent: usize,
}

impl<'a> TreePrinter<'a> {
    pub fn new(locals: &'a LocalTable) -> Self {
        Self {
            locals,
            out: String::new(),
            indent: 0,
        }
    }

    pub fn print_block(mut self, block: &Block) -> String {
        self.block(block);
        self.out
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn block(&mut self, block: &Block) {
        let mut header = String::from("{");
        if !block.locals.is_empty() {
            let names: Vec<String> = block.locals.iter().map(|l| self.local_name(*l)).collect();
            let _ = write!(header, " let {};", names.join(", "));
        }
        self.line(&header);
        self.indent += 1;
        for stmt in &block.stmts {
            self.stmt(stmt);
        }
        self.indent -= 1;
        self.line("}");
    }

    fn local_name(&self, id: LocalId) -> String {
        match self.locals.get(id) {
            Some(local) => local.display_name(),
            None => format!("_{}", id.0),
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Block(block) => self.block(block),
            StmtKind::Expr(e) => {
                let text = format!("{};", self.expr(e));
                self.line(&text);
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let text = format!("if ({})", self.expr(cond));
                self.line(&text);
                self.nested(then_branch);
                if let Some(else_branch) = else_branch {
                    self.line("else");
                    self.nested(else_branch);
                }
            }
            StmtKind::Label(l) => {
                self.indent = self.indent.saturating_sub(1);
                self.line(&format!("{}:", l));
                self.indent += 1;
            }
            StmtKind::Goto(l) => self.line(&format!("goto {};", l)),
            StmtKind::CondGoto {
                cond,
                jump_if_true,
                label,
            } => {
                let neg = if *jump_if_true { "" } else { "!" };
                let text = format!("if {}({}) goto {};", neg, self.expr(cond), label);
                self.line(&text);
            }
            StmtKind::Switch {
                scrutinee,
                cases,
                default,
            } => {
                let text = format!("switch ({})", self.expr(scrutinee));
                self.line(&text);
                self.indent += 1;
                for case in cases {
                    let values: Vec<String> = case.values.iter().map(|v| v.to_string()).collect();
                    self.line(&format!("case {}: goto {};", values.join(", "), case.label));
                }
                if let Some(default) = default {
                    self.line(&format!("default: goto {};", default));
                }
                self.indent -= 1;
            }
            StmtKind::Try {
                body,
                catches,
                finally,
            } => {
                self.line("try");
                self.block(body);
                for catch in catches {
                    match catch.local {
                        Some(l) => {
                            let name = self.local_name(l);
                            self.line(&format!("catch ({})", name));
                        }
                        None => self.line("catch"),
                    }
                    self.block(&catch.body);
                }
                if let Some(finally) = finally {
                    self.line("finally");
                    self.block(finally);
                }
            }
            StmtKind::Throw(e) => match e {
                Some(e) => {
                    let text = format!("throw {};", self.expr(e));
                    self.line(&text);
                }
                None => self.line("throw;"),
            },
            StmtKind::Return(e) => match e {
                Some(e) => {
                    let text = format!("return {};", self.expr(e));
                    self.line(&text);
                }
                None => self.line("return;"),
            },
            StmtKind::YieldReturn(e) => {
                let text = format!("yield return {};", self.expr(e));
                self.line(&text);
            }
            StmtKind::YieldBreak => self.line("yield break;"),
            StmtKind::StateMachineScope { fields, body } => {
                let names: Vec<&str> = fields.iter().map(|f| &*f.name).collect();
                self.line(&format!("scope [{}]", names.join(", ")));
                self.nested(body);
            }
            StmtKind::Nop => self.line(";"),
        }
    }

    fn nested(&mut self, stmt: &Stmt) {
        if matches!(stmt.kind, StmtKind::Block(_)) {
            self.stmt(stmt);
        } else {
            self.indent += 1;
            self.stmt(stmt);
            self.indent -= 1;
        }
    }

    fn expr(&self, expr: &Expr) -> String {
        match &expr.kind {
            ExprKind::Literal(lit) => lit.to_string(),
            ExprKind::Default => format!("default({})", expr.ty),
            ExprKind::Local(id) => self.local_name(*id),
            ExprKind::Param(id) => format!("arg{}", id.0),
            ExprKind::This => "this".to_string(),
            ExprKind::Base => "base".to_string(),
            ExprKind::Field { receiver, field } => match receiver {
                Some(r) => format!("{}.{}", self.expr(r), field.name),
                None => format!("{}::{}", field.owner, field.name),
            },
            ExprKind::Index { array, index } => {
                format!("{}[{}]", self.expr(array), self.expr(index))
            }
            ExprKind::Call {
                receiver,
                method,
                args,
                ref_kind,
            } => {
                let args: Vec<String> = args
                    .iter()
                    .map(|a| format!("{}{}", ref_prefix(a.ref_kind), self.expr(&a.expr)))
                    .collect();
                let callee = match receiver {
                    Some(r) => format!("{}.{}", self.expr(r), method),
                    None => method.to_string(),
                };
                format!("{}{}({})", ref_prefix(*ref_kind), callee, args.join(", "))
            }
            ExprKind::Binary { op, left, right } => {
                format!("({} {} {})", self.expr(left), op.symbol(), self.expr(right))
            }
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Not => format!("!{}", self.expr(operand)),
                UnaryOp::Neg => format!("-{}", self.expr(operand)),
            },
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
                ref_kind,
            } => format!(
                "{}({} ? {} : {})",
                ref_prefix(*ref_kind),
                self.expr(cond),
                self.expr(then_expr),
                self.expr(else_expr)
            ),
            ExprKind::Assign {
                target,
                value,
                is_ref,
            } => {
                if *is_ref {
                    format!("ref {} = ref {}", self.expr(target), self.expr(value))
                } else {
                    format!("{} = {}", self.expr(target), self.expr(value))
                }
            }
            ExprKind::Await(operand) => format!("await {}", self.expr(operand)),
            ExprKind::Sequence {
                side_effects,
                value,
                ..
            } => {
                let mut parts: Vec<String> = side_effects.iter().map(|e| self.expr(e)).collect();
                parts.push(self.expr(value));
                format!("({})", parts.join("; "))
            }
            ExprKind::New { args } => {
                let args: Vec<String> = args.iter().map(|a| self.expr(a)).collect();
                format!("new {}({})", expr.ty, args.join(", "))
            }
            ExprKind::NewArray(items) => {
                let items: Vec<String> = items.iter().map(|a| self.expr(a)).collect();
                format!("[{}]", items.join(", "))
            }
            ExprKind::Intrinsic { op, args } => {
                let args: Vec<String> = args.iter().map(|a| self.expr(a)).collect();
                format!("@{}({})", op.name(), args.join(", "))
            }
            ExprKind::Shared(inner) => self.expr(inner),
        }
    }
}

fn ref_prefix(kind: RefKind) -> &'static str {
    match kind {
        RefKind::None => "",
        RefKind::Ref => "ref ",
        RefKind::Out => "out ",
        RefKind::In => "in ",
        RefKind::StrictIn => "strict in ",
    }
}

impl fmt::Display for MethodBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&TreePrinter::new(&self.locals).print_block(&self.block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prints_await_and_labels() {
        let mut b = MethodBuilder::new("m", MethodKind::Async, Type::task(Type::Int));
        let x = b.local("x", Type::Int);
        let l = b.label();
        let assign = b.f.assign_stmt(b.f.local(x), b.f.int(1));
        let wait = b.await_stmt(b.yield_task());
        let ret = b.f.ret(Some(b.f.local(x)));
        let stmts = vec![assign, b.f.label(l), wait, b.f.goto(l), ret];
        let (_, body) = b.finish(vec![x], stmts);
        let text = body.to_string();
        assert!(text.contains("{ let x;"), "{}", text);
        assert!(text.contains("x = 1;"));
        assert!(text.contains("await yield_now();"));
        assert!(text.contains("L0:"));
        assert!(text.contains("goto L0;"));
        assert!(text.contains("return x;"));
    }
}
