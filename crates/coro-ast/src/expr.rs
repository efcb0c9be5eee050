// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Bound expressions.

use std::rc::Rc;

use crate::{FieldSymbol, LocalId, ParamId, RefKind, Span, Type};

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Literal),
    /// Default value of `ty`.
    Default,
    Local(LocalId),
    Param(ParamId),
    This,
    Base,
    Field {
        /// `None` for static fields.
        receiver: Option<Box<Expr>>,
        field: Rc<FieldSymbol>,
    },
    Index {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        receiver: Option<Box<Expr>>,
        method: Rc<str>,
        args: Vec<Arg>,
        /// How the call returns its result.
        ref_kind: RefKind,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
        ref_kind: RefKind,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
        /// `ref x = ref e` rebinds the reference rather than storing through it.
        is_ref: bool,
    },
    Await(Box<Expr>),
    Sequence {
        locals: Vec<LocalId>,
        side_effects: Vec<Expr>,
        value: Box<Expr>,
    },
    /// Instance of a class or struct; struct fields are initialized
    /// positionally from `args`.
    New {
        args: Vec<Expr>,
    },
    NewArray(Vec<Expr>),
    Intrinsic {
        op: Intrinsic,
        args: Vec<Expr>,
    },
    /// A sub-tree referenced from several places. Rewrites that hand out the
    /// same expression repeatedly share it instead of cloning.
    Shared(Rc<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Str(Rc<str>),
}

#[derive(Debug, Clone)]
pub struct Arg {
    pub expr: Expr,
    pub ref_kind: RefKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Runtime operations the lowering emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intrinsic {
    /// `() -> Builder<T>`
    CreateBuilder,
    /// `(builder, machine)`: run the first step.
    Start,
    /// `(builder) -> Task<T>`
    BuilderTask,
    /// `(builder, value)`
    SetResult,
    /// `(builder, exception)`
    SetException,
    /// `(builder, awaiter, machine)`: resume `machine` once `awaiter` completes.
    AwaitOnCompleted,
    /// `(task) -> Awaiter<T>`
    GetAwaiter,
    /// `(awaiter) -> bool`
    IsCompleted,
    /// `(awaiter) -> T`, rethrowing a fault.
    GetResult,
    /// `(message, code) -> exception` raised when resuming at a state the
    /// current method version no longer has.
    ResumeError,
}

impl Intrinsic {
    pub fn name(self) -> &'static str {
        match self {
            Intrinsic::CreateBuilder => "create_builder",
            Intrinsic::Start => "start",
            Intrinsic::BuilderTask => "builder_task",
            Intrinsic::SetResult => "set_result",
            Intrinsic::SetException => "set_exception",
            Intrinsic::AwaitOnCompleted => "await_on_completed",
            Intrinsic::GetAwaiter => "get_awaiter",
            Intrinsic::IsCompleted => "is_completed",
            Intrinsic::GetResult => "get_result",
            Intrinsic::ResumeError => "resume_error",
        }
    }
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Type, span: Span) -> Self {
        Self { kind, ty, span }
    }

    /// Look through `Shared` wrappers.
    pub fn peel(&self) -> &Expr {
        match &self.kind {
            ExprKind::Shared(inner) => inner.peel(),
            _ => self,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.peel().kind, ExprKind::Literal(_) | ExprKind::Default)
    }

    pub fn is_this(&self) -> bool {
        matches!(self.peel().kind, ExprKind::This | ExprKind::Base)
    }

    pub fn as_local(&self) -> Option<LocalId> {
        match &self.peel().kind {
            ExprKind::Local(id) => Some(*id),
            _ => None,
        }
    }

    pub fn int_value(&self) -> Option<i64> {
        match &self.peel().kind {
            ExprKind::Literal(Literal::Int(v)) => Some(*v),
            _ => None,
        }
    }
}
