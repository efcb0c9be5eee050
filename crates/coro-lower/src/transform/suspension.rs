// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Await and yield lowering.

use coro_ast::{Expr, Intrinsic, LabelId, MethodKind, Span, Stmt, SynthesizedKind, Type};

use super::rewriter::{internal_fault, BodyRewriter};
use crate::state::{StateDebugInfo, StateMachineState, SuspensionId};

impl BodyRewriter<'_> {
    /// New resume point at `span`. The state comes from the yield space of
    /// an async iterator when `yield_space` is set.
    fn add_state(&mut self, span: Span, yield_space: bool) -> (StateMachineState, LabelId) {
        let syntax_offset = self.method.syntax_offset(span);
        let ordinal = self.suspension_ordinals.assign(syntax_offset);
        let id = SuspensionId { syntax_offset, ordinal };
        let state = match (&mut self.yield_states, yield_space) {
            (Some(yields), true) => yields.allocate(id),
            _ => self.states.allocate(id),
        };
        self.state_debug_info.push(StateDebugInfo {
            syntax_offset,
            ordinal,
            state,
        });

        let label = self.f.new_label();
        self.register_dispatch(label, vec![state]);
        tracing::trace!(target: "coro_lower", state = state.0, syntax_offset, ordinal, "resume point");
        (state, label)
    }

    /// ```text
    /// tmp = GetAwaiter(e);
    /// if (!IsCompleted(tmp)) {
    ///     this.$state = cached = N;
    ///     this.$awaiterK = tmp;
    ///     AwaitOnCompleted(this.$builder, tmp, this);
    ///     return;
    /// resume:
    ///     tmp = this.$awaiterK;
    ///     this.$awaiterK = default;
    ///     this.$state = cached = -1;
    /// }
    /// [target =] GetResult(tmp);
    /// ```
    pub(super) fn lower_await(&mut self, operand: &Expr, target: Option<&Expr>, span: Span) -> Stmt {
        let operand = self.expr(operand);
        self.f.span = span;
        let awaiter_ty = operand.ty.awaiter().unwrap_or_else(|| {
            internal_fault("awaited expression is not a task");
            Type::Awaiter(Box::new(Type::Void))
        });
        let result_ty = awaiter_ty.await_result().cloned().unwrap_or(Type::Void);

        let tmp = self.f.temp(awaiter_ty.clone(), SynthesizedKind::AwaiterTemp);
        let field = self.pool.awaiter_field(&awaiter_ty);
        let (state, resume) = self.add_state(span, false);

        let get_awaiter = self
            .f
            .intrinsic(Intrinsic::GetAwaiter, vec![operand], awaiter_ty.clone());
        let is_completed = self
            .f
            .intrinsic(Intrinsic::IsCompleted, vec![self.f.local(tmp)], Type::Bool);
        let schedule = self.f.intrinsic(
            Intrinsic::AwaitOnCompleted,
            vec![self.builder(), self.f.local(tmp), self.this_container()],
            Type::Void,
        );

        let suspend = vec![
            self.set_state(state),
            self.f.assign_stmt(self.machine_field(&field), self.f.local(tmp)),
            self.f.expr_stmt(schedule),
            self.f.ret(None),
            self.f.label(resume),
            self.f.assign_stmt(self.f.local(tmp), self.machine_field(&field)),
            self.f
                .assign_stmt(self.machine_field(&field), self.f.default(awaiter_ty)),
            self.set_state(StateMachineState::NOT_STARTED_OR_RUNNING),
        ];

        let get_result = self
            .f
            .intrinsic(Intrinsic::GetResult, vec![self.f.local(tmp)], result_ty);
        let finish = match target {
            Some(target) => {
                let target = self.expr(target);
                self.f.span = span;
                self.f.assign_stmt(target, get_result)
            }
            None => self.f.expr_stmt(get_result),
        };

        let stmts = vec![
            self.f.assign_stmt(self.f.local(tmp), get_awaiter),
            self.f.if_then(self.f.not(is_completed), self.f.list(suspend)),
            finish,
        ];
        self.f.block(vec![tmp], stmts)
    }

    pub(super) fn lower_yield(&mut self, value: &Expr, span: Span) -> Stmt {
        match self.method.kind {
            MethodKind::Iterator => self.lower_iterator_yield(value, span),
            MethodKind::AsyncIterator => self.lower_async_iterator_yield(value, span),
            MethodKind::Async => {
                internal_fault("yield in an async method");
                self.f.nop()
            }
        }
    }

    fn store_current(&mut self, value: &Expr) -> Option<Stmt> {
        let value = self.expr(value);
        let current = self.fields.current.clone()?;
        Some(self.f.assign_stmt(self.machine_field(&current), value))
    }

    /// ```text
    /// this.$current = v;
    /// this.$state = cached = N;
    /// return true;
    /// resume:
    /// this.$state = cached = -1;
    /// if (this.$disposing) return false;
    /// ```
    fn lower_iterator_yield(&mut self, value: &Expr, span: Span) -> Stmt {
        let store = self.store_current(value);
        self.f.span = span;
        let (state, resume) = self.add_state(span, false);

        let mut stmts: Vec<Stmt> = store.into_iter().collect();
        stmts.push(self.set_state(state));
        stmts.push(self.f.ret(Some(self.f.bool(true))));
        stmts.push(self.f.label(resume));
        stmts.push(self.set_state(StateMachineState::NOT_STARTED_OR_RUNNING));
        if let Some(disposing) = &self.fields.disposing {
            stmts.push(self.f.if_then(
                self.machine_field(disposing),
                self.f.ret(Some(self.f.bool(false))),
            ));
        }
        self.f.list(stmts)
    }

    /// Same shape as an iterator yield, except the step completes the
    /// pending `MoveNextAsync` with `true` and the state counts down.
    fn lower_async_iterator_yield(&mut self, value: &Expr, span: Span) -> Stmt {
        let store = self.store_current(value);
        self.f.span = span;
        let (state, resume) = self.add_state(span, true);

        let signal = self.f.intrinsic(
            Intrinsic::SetResult,
            vec![self.builder(), self.f.bool(true)],
            Type::Void,
        );
        let mut stmts: Vec<Stmt> = store.into_iter().collect();
        stmts.push(self.set_state(state));
        stmts.push(self.f.expr_stmt(signal));
        stmts.push(self.f.ret(None));
        stmts.push(self.f.label(resume));
        stmts.push(self.set_state(StateMachineState::NOT_STARTED_OR_RUNNING));
        self.f.list(stmts)
    }
}
