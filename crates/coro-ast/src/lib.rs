// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Bound tree consumed by the state machine lowering.
//!
//! Method bodies arrive here fully typed: every local, parameter and field
//! is resolved to a symbol and every expression carries its type. Trees are
//! treated as immutable by the passes that read them; a pass that changes a
//! body builds a new one.

pub mod display;
pub mod expr;
pub mod factory;
pub mod span;
pub mod stmt;
pub mod symbols;
pub mod types;
pub mod visit;

pub use display::TreePrinter;
pub use expr::{Arg, BinOp, Expr, ExprKind, Intrinsic, Literal, UnaryOp};
pub use factory::{MethodBuilder, NodeFactory};
pub use span::{LineMap, Span};
pub use stmt::{Block, CatchClause, LocalTable, MethodBody, Stmt, StmtKind, SwitchCase};
pub use symbols::{
    ClosureFrame, FieldSymbol, FrameCapture, HoistedSlot, LabelId, LocalDebugId, LocalId,
    LocalSlotDebugInfo, LocalSymbol, MethodKind, MethodSymbol, ParamId, ParamSymbol, RefKind,
    SynthesizedKind, Variable,
};
pub use types::{StructDef, Type, TypeParam, TypeParamOwner};
