// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Read-only traversal of bound trees.
//!
//! Override the `visit_*` hooks you care about and call the matching `walk_*`
//! function to keep descending.

use crate::{Block, Expr, ExprKind, Stmt, StmtKind};

pub trait Visitor {
    fn visit_block(&mut self, block: &Block) {
        walk_block(self, block);
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }
}

pub fn walk_block<V: Visitor + ?Sized>(v: &mut V, block: &Block) {
    for stmt in &block.stmts {
        v.visit_stmt(stmt);
    }
}

pub fn walk_stmt<V: Visitor + ?Sized>(v: &mut V, stmt: &Stmt) {
    match &stmt.kind {
        StmtKind::Block(block) => v.visit_block(block),
        StmtKind::Expr(e) | StmtKind::YieldReturn(e) => v.visit_expr(e),
        StmtKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            v.visit_expr(cond);
            v.visit_stmt(then_branch);
            if let Some(else_branch) = else_branch {
                v.visit_stmt(else_branch);
            }
        }
        StmtKind::CondGoto { cond, .. } => v.visit_expr(cond),
        StmtKind::Switch { scrutinee, .. } => v.visit_expr(scrutinee),
        StmtKind::Try {
            body,
            catches,
            finally,
        } => {
            v.visit_block(body);
            for catch in catches {
                v.visit_block(&catch.body);
            }
            if let Some(finally) = finally {
                v.visit_block(finally);
            }
        }
        StmtKind::Throw(e) | StmtKind::Return(e) => {
            if let Some(e) = e {
                v.visit_expr(e);
            }
        }
        StmtKind::StateMachineScope { body, .. } => v.visit_stmt(body),
        StmtKind::Label(_) | StmtKind::Goto(_) | StmtKind::YieldBreak | StmtKind::Nop => {}
    }
}

pub fn walk_expr<V: Visitor + ?Sized>(v: &mut V, expr: &Expr) {
    match &expr.kind {
        ExprKind::Literal(_)
        | ExprKind::Default
        | ExprKind::Local(_)
        | ExprKind::Param(_)
        | ExprKind::This
        | ExprKind::Base => {}
        ExprKind::Field { receiver, .. } => {
            if let Some(r) = receiver {
                v.visit_expr(r);
            }
        }
        ExprKind::Index { array, index } => {
            v.visit_expr(array);
            v.visit_expr(index);
        }
        ExprKind::Call { receiver, args, .. } => {
            if let Some(r) = receiver {
                v.visit_expr(r);
            }
            for arg in args {
                v.visit_expr(&arg.expr);
            }
        }
        ExprKind::Binary { left, right, .. } => {
            v.visit_expr(left);
            v.visit_expr(right);
        }
        ExprKind::Unary { operand, .. } | ExprKind::Await(operand) => v.visit_expr(operand),
        ExprKind::Conditional {
            cond,
            then_expr,
            else_expr,
            ..
        } => {
            v.visit_expr(cond);
            v.visit_expr(then_expr);
            v.visit_expr(else_expr);
        }
        ExprKind::Assign { target, value, .. } => {
            v.visit_expr(target);
            v.visit_expr(value);
        }
        ExprKind::Sequence {
            side_effects,
            value,
            ..
        } => {
            for e in side_effects {
                v.visit_expr(e);
            }
            v.visit_expr(value);
        }
        ExprKind::New { args } | ExprKind::NewArray(args) | ExprKind::Intrinsic { args, .. } => {
            for arg in args {
                v.visit_expr(arg);
            }
        }
        ExprKind::Shared(inner) => v.visit_expr(inner),
    }
}

/// Whether `block` contains an `await` or `yield return` anywhere.
pub fn contains_suspension(block: &Block) -> bool {
    struct Finder(bool);

    impl Visitor for Finder {
        fn visit_stmt(&mut self, stmt: &Stmt) {
            if matches!(stmt.kind, StmtKind::YieldReturn(_)) {
                self.0 = true;
            }
            if !self.0 {
                walk_stmt(self, stmt);
            }
        }

        fn visit_expr(&mut self, expr: &Expr) {
            if matches!(expr.kind, ExprKind::Await(_)) {
                self.0 = true;
            }
            if !self.0 {
                walk_expr(self, expr);
            }
        }
    }

    let mut finder = Finder(false);
    finder.visit_block(block);
    finder.0
}
