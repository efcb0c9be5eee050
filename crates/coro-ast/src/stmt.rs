// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Bound statements and method bodies.

use std::rc::Rc;

use crate::{Expr, FieldSymbol, LabelId, LocalId, LocalSymbol, RefKind, Span, SynthesizedKind, Type};

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Block(Block),
    Expr(Expr),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    Label(LabelId),
    Goto(LabelId),
    CondGoto {
        cond: Expr,
        jump_if_true: bool,
        label: LabelId,
    },
    /// Jump table over an integer; falls through when nothing matches and
    /// there is no default.
    Switch {
        scrutinee: Expr,
        cases: Vec<SwitchCase>,
        default: Option<LabelId>,
    },
    Try {
        body: Block,
        catches: Vec<CatchClause>,
        finally: Option<Block>,
    },
    /// `None` rethrows the exception being handled.
    Throw(Option<Expr>),
    Return(Option<Expr>),
    YieldReturn(Expr),
    YieldBreak,
    /// Marks the range in which hoisted fields stand in for user locals, for
    /// debuggers.
    StateMachineScope {
        fields: Vec<Rc<FieldSymbol>>,
        body: Box<Stmt>,
    },
    Nop,
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub locals: Vec<LocalId>,
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    pub values: Vec<i64>,
    pub label: LabelId,
}

#[derive(Debug, Clone)]
pub struct CatchClause {
    pub local: Option<LocalId>,
    pub body: Block,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

impl Block {
    pub fn new(locals: Vec<LocalId>, stmts: Vec<Stmt>) -> Self {
        Self { locals, stmts }
    }
}

/// Every local a body declares, indexed by `LocalId`.
#[derive(Debug, Clone, Default)]
pub struct LocalTable {
    locals: Vec<LocalSymbol>,
}

impl LocalTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(
        &mut self,
        name: Option<&str>,
        ty: Type,
        kind: SynthesizedKind,
        ref_kind: RefKind,
        span: Span,
    ) -> LocalId {
        let id = LocalId(self.locals.len() as u32);
        self.locals.push(LocalSymbol {
            id,
            name: name.map(Rc::from),
            ty,
            kind,
            ref_kind,
            is_const: false,
            span,
        });
        id
    }

    pub fn mark_const(&mut self, id: LocalId) {
        if let Some(local) = self.locals.get_mut(id.0 as usize) {
            local.is_const = true;
        }
    }

    pub fn get(&self, id: LocalId) -> Option<&LocalSymbol> {
        self.locals.get(id.0 as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocalSymbol> {
        self.locals.iter()
    }

    pub fn len(&self) -> usize {
        self.locals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locals.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct MethodBody {
    pub locals: LocalTable,
    pub block: Block,
    /// Set upstream when binding reported errors; such bodies are never
    /// lowered.
    pub has_errors: bool,
    /// First label id not used by the body.
    pub next_label: u32,
}
