// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Statement execution.
//!
//! Jumps are `Flow::Goto` unwinding to the nearest block that contains the
//! label, directly or inside a nested block, `if` or `try` body. That block
//! then re-enters execution at the label, descending through the nested
//! statements without evaluating anything on the way in.

use coro_ast::{Block, CatchClause, LabelId, Stmt, StmtKind, SwitchCase};

use super::{Exec, Flow, Interpreter, RuntimeError};
use crate::value::Value;

impl Interpreter {
    pub(crate) fn exec_block(&mut self, block: &Block, entry: Option<LabelId>) -> Exec<()> {
        let frame = self.frame()?;
        for local in &block.locals {
            frame.declare(*local);
        }
        self.exec_stmts(&block.stmts, entry)
    }

    fn exec_stmts(&mut self, stmts: &[Stmt], entry: Option<LabelId>) -> Exec<()> {
        let mut pc = 0;
        let mut target = entry;
        loop {
            let mut enter = None;
            if let Some(label) = target.take() {
                match stmts.iter().position(|s| contains_label(s, label)) {
                    Some(i) => {
                        pc = i;
                        enter = Some(label);
                    }
                    None => return Err(Flow::Goto(label)),
                }
            }
            let Some(stmt) = stmts.get(pc) else {
                return Ok(());
            };
            match self.exec_stmt(stmt, enter) {
                Ok(()) => pc += 1,
                Err(Flow::Goto(label)) => target = Some(label),
                Err(other) => return Err(other),
            }
        }
    }

    /// Execute `stmt`, or resume it at `entry` when jumping into it.
    pub(crate) fn exec_stmt(&mut self, stmt: &Stmt, entry: Option<LabelId>) -> Exec<()> {
        if let Some(label) = entry {
            return self.enter_at(stmt, label);
        }
        match &stmt.kind {
            StmtKind::Block(block) => self.exec_block(block, None),
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
                Ok(())
            }
            StmtKind::If { cond, then_branch, else_branch } => {
                if self.eval_bool(cond)? {
                    self.exec_stmt(then_branch, None)
                } else if let Some(else_branch) = else_branch {
                    self.exec_stmt(else_branch, None)
                } else {
                    Ok(())
                }
            }
            StmtKind::Label(_) | StmtKind::Nop => Ok(()),
            StmtKind::Goto(label) => Err(Flow::Goto(*label)),
            StmtKind::CondGoto { cond, jump_if_true, label } => {
                if self.eval_bool(cond)? == *jump_if_true {
                    Err(Flow::Goto(*label))
                } else {
                    Ok(())
                }
            }
            StmtKind::Switch { scrutinee, cases, default } => {
                self.exec_switch(scrutinee, cases, *default)
            }
            StmtKind::Try { body, catches, finally } => {
                self.exec_try(body, catches, finally.as_ref(), None)
            }
            StmtKind::Throw(Some(expr)) => match self.eval(expr)? {
                Value::Null => Err(RuntimeError::NullReference.into()),
                value => Err(RuntimeError::Thrown(value).into()),
            },
            StmtKind::Throw(None) => match self.handling.last() {
                Some(exception) => Err(RuntimeError::Thrown(exception.clone()).into()),
                None => Err(RuntimeError::TypeError("rethrow outside a catch handler".to_string()).into()),
            },
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Void,
                };
                Err(Flow::Return(value))
            }
            StmtKind::YieldReturn(_) => Err(RuntimeError::NotLowered("yield return").into()),
            StmtKind::YieldBreak => Err(RuntimeError::NotLowered("yield break").into()),
            StmtKind::StateMachineScope { body, .. } => self.exec_stmt(body, None),
        }
    }

    fn enter_at(&mut self, stmt: &Stmt, label: LabelId) -> Exec<()> {
        match &stmt.kind {
            StmtKind::Label(l) if *l == label => Ok(()),
            StmtKind::Block(block) => self.exec_block(block, Some(label)),
            StmtKind::If { then_branch, else_branch, .. } => {
                if contains_label(then_branch, label) {
                    self.exec_stmt(then_branch, Some(label))
                } else if let Some(else_branch) = else_branch {
                    self.exec_stmt(else_branch, Some(label))
                } else {
                    Err(Flow::Goto(label))
                }
            }
            StmtKind::StateMachineScope { body, .. } => self.exec_stmt(body, Some(label)),
            StmtKind::Try { body, catches, finally } => {
                self.exec_try(body, catches, finally.as_ref(), Some(label))
            }
            _ => Err(RuntimeError::UndefinedLabel(label.0).into()),
        }
    }

    fn exec_switch(
        &mut self,
        scrutinee: &coro_ast::Expr,
        cases: &[SwitchCase],
        default: Option<LabelId>,
    ) -> Exec<()> {
        let value = match self.eval(scrutinee)? {
            Value::Int(n) => n,
            other => {
                return Err(RuntimeError::TypeError(format!(
                    "switch over {}, expected int",
                    other.type_name()
                ))
                .into())
            }
        };
        let target = cases
            .iter()
            .find(|case| case.values.contains(&value))
            .map(|case| case.label)
            .or(default);
        match target {
            Some(label) => Err(Flow::Goto(label)),
            None => Ok(()),
        }
    }

    /// The finally block runs however the protected region is left: falling
    /// off the end, a fault, a `return`, or a jump out of it.
    fn exec_try(
        &mut self,
        body: &Block,
        catches: &[CatchClause],
        finally: Option<&Block>,
        entry: Option<LabelId>,
    ) -> Exec<()> {
        let outcome = match (self.exec_block(body, entry), catches.first()) {
            (Err(Flow::Fault(fault)), Some(clause)) => self.exec_catch(clause, fault.into_exception()),
            (other, _) => other,
        };

        if let Some(finally) = finally {
            self.exec_block(finally, None)?;
        }
        outcome
    }

    fn exec_catch(&mut self, clause: &CatchClause, exception: Value) -> Exec<()> {
        if let Some(local) = clause.local {
            self.frame()?.declare_with(local, exception.clone());
        }
        self.handling.push(exception);
        let outcome = self.exec_block(&clause.body, None);
        self.handling.pop();
        outcome
    }
}

/// Whether a jump to `label` can land inside `stmt`.
fn contains_label(stmt: &Stmt, label: LabelId) -> bool {
    match &stmt.kind {
        StmtKind::Label(l) => *l == label,
        StmtKind::Block(block) => block.stmts.iter().any(|s| contains_label(s, label)),
        StmtKind::If { then_branch, else_branch, .. } => {
            contains_label(then_branch, label)
                || else_branch.as_ref().is_some_and(|e| contains_label(e, label))
        }
        StmtKind::StateMachineScope { body, .. } => contains_label(body, label),
        StmtKind::Try { body, .. } => body.stmts.iter().any(|s| contains_label(s, label)),
        _ => false,
    }
}
