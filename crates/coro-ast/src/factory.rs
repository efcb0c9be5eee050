// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! NodeFactory - helpers for building bound trees.
//!
//! Lowering passes use the factory to synthesize nodes at the location of the
//! construct being rewritten; `MethodBuilder` wraps it for assembling whole
//! methods by hand.

use std::rc::Rc;

use crate::{
    Arg, BinOp, Block, CatchClause, ClosureFrame, Expr, ExprKind, FieldSymbol, FrameCapture,
    Intrinsic, LabelId, Literal, LocalId, LocalTable, MethodBody, MethodKind, MethodSymbol,
    ParamId, ParamSymbol, RefKind, Span, Stmt, StmtKind, SwitchCase, SynthesizedKind, Type,
    UnaryOp,
};

pub struct NodeFactory {
    pub locals: LocalTable,
    /// Location given to every node the factory creates.
    pub span: Span,
    next_label: u32,
}

impl NodeFactory {
    pub fn new(locals: LocalTable, next_label: u32) -> Self {
        Self {
            locals,
            span: Span::default(),
            next_label,
        }
    }

    pub fn new_label(&mut self) -> LabelId {
        let id = LabelId(self.next_label);
        self.next_label += 1;
        id
    }

    pub fn next_label(&self) -> u32 {
        self.next_label
    }

    pub fn temp(&mut self, ty: Type, kind: SynthesizedKind) -> LocalId {
        self.locals.declare(None, ty, kind, RefKind::None, self.span)
    }

    pub fn ref_temp(&mut self, ty: Type, kind: SynthesizedKind, ref_kind: RefKind) -> LocalId {
        self.locals.declare(None, ty, kind, ref_kind, self.span)
    }

    pub fn local_type(&self, id: LocalId) -> Type {
        self.locals.get(id).map(|l| l.ty.clone()).unwrap_or(Type::Void)
    }

    fn expr(&self, kind: ExprKind, ty: Type) -> Expr {
        Expr::new(kind, ty, self.span)
    }

    // ── Expressions ─────────────────────────────────────────────────

    pub fn local(&self, id: LocalId) -> Expr {
        self.expr(ExprKind::Local(id), self.local_type(id))
    }

    pub fn param(&self, param: &ParamSymbol) -> Expr {
        self.expr(ExprKind::Param(param.id), param.ty.clone())
    }

    pub fn this(&self, ty: Type) -> Expr {
        self.expr(ExprKind::This, ty)
    }

    pub fn field(&self, receiver: Expr, field: &Rc<FieldSymbol>) -> Expr {
        self.expr(
            ExprKind::Field {
                receiver: Some(Box::new(receiver)),
                field: field.clone(),
            },
            field.ty.clone(),
        )
    }

    pub fn static_field(&self, field: &Rc<FieldSymbol>) -> Expr {
        self.expr(
            ExprKind::Field {
                receiver: None,
                field: field.clone(),
            },
            field.ty.clone(),
        )
    }

    pub fn int(&self, value: i64) -> Expr {
        self.expr(ExprKind::Literal(Literal::Int(value)), Type::Int)
    }

    pub fn bool(&self, value: bool) -> Expr {
        self.expr(ExprKind::Literal(Literal::Bool(value)), Type::Bool)
    }

    pub fn string(&self, value: &str) -> Expr {
        self.expr(ExprKind::Literal(Literal::Str(Rc::from(value))), Type::String)
    }

    pub fn null(&self, ty: Type) -> Expr {
        self.expr(ExprKind::Literal(Literal::Null), ty)
    }

    pub fn default(&self, ty: Type) -> Expr {
        self.expr(ExprKind::Default, ty)
    }

    pub fn binary(&self, op: BinOp, left: Expr, right: Expr) -> Expr {
        let ty = if op.is_comparison() || matches!(op, BinOp::And | BinOp::Or) {
            Type::Bool
        } else {
            left.ty.clone()
        };
        self.expr(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
        )
    }

    pub fn not(&self, operand: Expr) -> Expr {
        self.expr(
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            },
            Type::Bool,
        )
    }

    pub fn assign(&self, target: Expr, value: Expr) -> Expr {
        let ty = target.ty.clone();
        self.expr(
            ExprKind::Assign {
                target: Box::new(target),
                value: Box::new(value),
                is_ref: false,
            },
            ty,
        )
    }

    pub fn ref_assign(&self, target: Expr, value: Expr) -> Expr {
        let ty = target.ty.clone();
        self.expr(
            ExprKind::Assign {
                target: Box::new(target),
                value: Box::new(value),
                is_ref: true,
            },
            ty,
        )
    }

    pub fn call(&self, receiver: Option<Expr>, method: &str, args: Vec<Expr>, ret: Type) -> Expr {
        let args = args
            .into_iter()
            .map(|expr| Arg {
                expr,
                ref_kind: RefKind::None,
            })
            .collect();
        self.call_with(receiver, method, args, ret, RefKind::None)
    }

    pub fn call_with(
        &self,
        receiver: Option<Expr>,
        method: &str,
        args: Vec<Arg>,
        ret: Type,
        ref_kind: RefKind,
    ) -> Expr {
        self.expr(
            ExprKind::Call {
                receiver: receiver.map(Box::new),
                method: Rc::from(method),
                args,
                ref_kind,
            },
            ret,
        )
    }

    pub fn index(&self, array: Expr, index: Expr) -> Expr {
        let ty = array.ty.element_type().cloned().unwrap_or(Type::Object);
        self.expr(
            ExprKind::Index {
                array: Box::new(array),
                index: Box::new(index),
            },
            ty,
        )
    }

    pub fn conditional(&self, cond: Expr, then_expr: Expr, else_expr: Expr, ref_kind: RefKind) -> Expr {
        let ty = then_expr.ty.clone();
        self.expr(
            ExprKind::Conditional {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
                ref_kind,
            },
            ty,
        )
    }

    pub fn intrinsic(&self, op: Intrinsic, args: Vec<Expr>, ty: Type) -> Expr {
        self.expr(ExprKind::Intrinsic { op, args }, ty)
    }

    pub fn await_expr(&self, operand: Expr) -> Expr {
        let ty = operand.ty.await_result().cloned().unwrap_or(Type::Void);
        self.expr(ExprKind::Await(Box::new(operand)), ty)
    }

    pub fn new_object(&self, ty: Type, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::New { args }, ty)
    }

    pub fn new_array(&self, elem: Type, items: Vec<Expr>) -> Expr {
        self.expr(ExprKind::NewArray(items), Type::array(elem))
    }

    pub fn sequence(&self, locals: Vec<LocalId>, side_effects: Vec<Expr>, value: Expr) -> Expr {
        let ty = value.ty.clone();
        self.expr(
            ExprKind::Sequence {
                locals,
                side_effects,
                value: Box::new(value),
            },
            ty,
        )
    }

    pub fn shared(&self, expr: &Rc<Expr>) -> Expr {
        self.expr(ExprKind::Shared(expr.clone()), expr.ty.clone())
    }

    // ── Statements ──────────────────────────────────────────────────

    pub fn stmt(&self, kind: StmtKind) -> Stmt {
        Stmt::new(kind, self.span)
    }

    pub fn expr_stmt(&self, expr: Expr) -> Stmt {
        self.stmt(StmtKind::Expr(expr))
    }

    pub fn assign_stmt(&self, target: Expr, value: Expr) -> Stmt {
        self.expr_stmt(self.assign(target, value))
    }

    pub fn block(&self, locals: Vec<LocalId>, stmts: Vec<Stmt>) -> Stmt {
        self.stmt(StmtKind::Block(Block::new(locals, stmts)))
    }

    /// A block without declarations.
    pub fn list(&self, stmts: Vec<Stmt>) -> Stmt {
        self.block(Vec::new(), stmts)
    }

    pub fn label(&self, label: LabelId) -> Stmt {
        self.stmt(StmtKind::Label(label))
    }

    pub fn goto(&self, label: LabelId) -> Stmt {
        self.stmt(StmtKind::Goto(label))
    }

    pub fn cond_goto(&self, cond: Expr, jump_if_true: bool, label: LabelId) -> Stmt {
        self.stmt(StmtKind::CondGoto {
            cond,
            jump_if_true,
            label,
        })
    }

    pub fn if_then(&self, cond: Expr, then_branch: Stmt) -> Stmt {
        self.stmt(StmtKind::If {
            cond,
            then_branch: Box::new(then_branch),
            else_branch: None,
        })
    }

    pub fn if_else(&self, cond: Expr, then_branch: Stmt, else_branch: Stmt) -> Stmt {
        self.stmt(StmtKind::If {
            cond,
            then_branch: Box::new(then_branch),
            else_branch: Some(Box::new(else_branch)),
        })
    }

    pub fn ret(&self, value: Option<Expr>) -> Stmt {
        self.stmt(StmtKind::Return(value))
    }

    pub fn throw(&self, value: Option<Expr>) -> Stmt {
        self.stmt(StmtKind::Throw(value))
    }

    pub fn yield_return(&self, value: Expr) -> Stmt {
        self.stmt(StmtKind::YieldReturn(value))
    }

    pub fn yield_break(&self) -> Stmt {
        self.stmt(StmtKind::YieldBreak)
    }

    pub fn try_stmt(&self, body: Block, catches: Vec<CatchClause>, finally: Option<Block>) -> Stmt {
        self.stmt(StmtKind::Try {
            body,
            catches,
            finally,
        })
    }

    pub fn switch(&self, scrutinee: Expr, cases: Vec<SwitchCase>, default: Option<LabelId>) -> Stmt {
        self.stmt(StmtKind::Switch {
            scrutinee,
            cases,
            default,
        })
    }

    pub fn nop(&self) -> Stmt {
        self.stmt(StmtKind::Nop)
    }
}

// ── Method builder ──────────────────────────────────────────────────

/// Assembles a method symbol and body by hand.
///
/// Declarations, awaits and yields each get a fresh span so they have
/// distinct syntax offsets; `at` moves the cursor to pin an offset.
pub struct MethodBuilder {
    symbol: MethodSymbol,
    pub f: NodeFactory,
    cursor: usize,
}

impl MethodBuilder {
    pub fn new(name: &str, kind: MethodKind, return_type: Type) -> Self {
        Self {
            symbol: MethodSymbol {
                name: Rc::from(name),
                kind,
                is_static: true,
                containing_type: Type::class("C"),
                params: Vec::new(),
                type_params: Vec::new(),
                return_type,
                span: Span::new(0, 100_000),
                closure_frame: None,
            },
            f: NodeFactory::new(LocalTable::new(), 0),
            cursor: 10,
        }
    }

    /// Make the method an instance member of `container`.
    pub fn instance_of(mut self, container: Type) -> Self {
        self.symbol.is_static = false;
        self.symbol.containing_type = container;
        self
    }

    pub fn symbol(&self) -> &MethodSymbol {
        &self.symbol
    }

    pub fn type_param(&mut self, name: &str) -> Type {
        self.symbol.type_params.push(Rc::from(name));
        Type::method_param(name)
    }

    pub fn param(&mut self, name: &str, ty: Type) -> ParamId {
        let id = ParamId(self.symbol.params.len() as u32);
        self.symbol.params.push(ParamSymbol {
            id,
            name: Rc::from(name),
            ty,
            ref_kind: RefKind::None,
        });
        id
    }

    pub fn at(&mut self, offset: usize) -> &mut Self {
        self.cursor = offset;
        self
    }

    fn advance(&mut self) -> Span {
        let span = Span::new(self.cursor, self.cursor + 5);
        self.cursor += 10;
        self.f.span = span;
        span
    }

    pub fn local(&mut self, name: &str, ty: Type) -> LocalId {
        let span = self.advance();
        self.f
            .locals
            .declare(Some(name), ty, SynthesizedKind::UserDefined, RefKind::None, span)
    }

    pub fn synthesized(&mut self, ty: Type, kind: SynthesizedKind) -> LocalId {
        let span = self.advance();
        self.f.locals.declare(None, ty, kind, RefKind::None, span)
    }

    pub fn ref_local(&mut self, name: Option<&str>, ty: Type, kind: SynthesizedKind, ref_kind: RefKind) -> LocalId {
        let span = self.advance();
        self.f.locals.declare(name, ty, kind, ref_kind, span)
    }

    pub fn const_local(&mut self, name: &str, ty: Type) -> LocalId {
        let id = self.local(name, ty);
        self.f.locals.mark_const(id);
        id
    }

    /// Declare a variable of the enclosing method that lives in the closure
    /// frame passed as this lambda's receiver.
    pub fn frame_local(&mut self, name: &str, ty: Type) -> LocalId {
        let frame_type = self.symbol.containing_type.clone();
        let field = Rc::new(FieldSymbol::instance(frame_type.clone(), name, ty.clone()));
        let local = self.local(name, ty);
        self.symbol
            .closure_frame
            .get_or_insert_with(|| ClosureFrame {
                frame_type,
                captured: Vec::new(),
            })
            .captured
            .push(FrameCapture { local, field });
        local
    }

    pub fn this(&self) -> Expr {
        self.f.this(self.symbol.containing_type.clone())
    }

    pub fn param_expr(&self, id: ParamId) -> Expr {
        match self.symbol.param(id) {
            Some(param) => self.f.param(param),
            None => self.f.default(Type::Void),
        }
    }

    pub fn label(&mut self) -> LabelId {
        self.f.new_label()
    }

    pub fn await_expr(&mut self, operand: Expr) -> Expr {
        self.advance();
        self.f.await_expr(operand)
    }

    /// `await operand;`
    pub fn await_stmt(&mut self, operand: Expr) -> Stmt {
        let e = self.await_expr(operand);
        self.f.expr_stmt(e)
    }

    /// `target = await operand;`
    pub fn await_into(&mut self, target: Expr, operand: Expr) -> Stmt {
        let e = self.await_expr(operand);
        self.f.assign_stmt(target, e)
    }

    pub fn yield_return(&mut self, value: Expr) -> Stmt {
        self.advance();
        self.f.yield_return(value)
    }

    /// `Task.yield()`: a task that completes on the next scheduler turn.
    pub fn yield_task(&self) -> Expr {
        self.f.call(None, "yield_now", Vec::new(), Type::task(Type::Void))
    }

    pub fn finish(self, locals: Vec<LocalId>, stmts: Vec<Stmt>) -> (MethodSymbol, MethodBody) {
        let body = MethodBody {
            next_label: self.f.next_label(),
            locals: self.f.locals,
            block: Block::new(locals, stmts),
            has_errors: false,
        };
        (self.symbol, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn awaits_get_distinct_offsets() {
        let mut b = MethodBuilder::new("m", MethodKind::Async, Type::task(Type::Void));
        let first = b.await_expr(b.yield_task());
        let second = b.await_expr(b.yield_task());
        let method = b.symbol().span;
        assert_ne!(first.span.syntax_offset(method), second.span.syntax_offset(method));
    }

    #[test]
    fn pinned_offset_is_reproducible() {
        let mut a = MethodBuilder::new("m", MethodKind::Async, Type::task(Type::Void));
        a.at(500);
        let x = a.await_expr(a.yield_task());

        let mut b = MethodBuilder::new("m", MethodKind::Async, Type::task(Type::Void));
        b.local("unrelated", Type::Int);
        b.at(500);
        let y = b.await_expr(b.yield_task());
        assert_eq!(x.span, y.span);
    }

    #[test]
    fn frame_locals_record_captures() {
        let mut b = MethodBuilder::new("lambda", MethodKind::Async, Type::task(Type::Int))
            .instance_of(Type::class("Frame"));
        let y = b.frame_local("y", Type::Int);
        let frame = b.symbol().closure_frame.as_ref().expect("frame");
        assert_eq!(frame.captured.len(), 1);
        assert_eq!(frame.captured[0].local, y);
        assert_eq!(&*frame.captured[0].field.name, "y");
    }

    #[test]
    fn await_result_type() {
        let b = MethodBuilder::new("m", MethodKind::Async, Type::task(Type::Int));
        let task = b.f.call(None, "from_result", vec![b.f.int(1)], Type::task(Type::Int));
        let awaited = b.f.await_expr(task);
        assert_eq!(awaited.ty, Type::Int);
    }
}
