// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Rewrites a method body into the body of the step method.
//!
//! References to hoisted variables become container field accesses, scopes
//! borrow and return pooled fields, `try` statements get their own dispatch
//! switch, and suspension points (see `suspension.rs`) become
//! save-state-and-return sequences with resume labels.

use std::rc::Rc;

use coro_ast::{
    Arg, BinOp, Block, CatchClause, Expr, ExprKind, FieldSymbol, LabelId, LocalDebugId, LocalId,
    MethodBody, MethodKind, MethodSymbol, NodeFactory, ParamId, RefKind, Span, Stmt, StmtKind,
    SwitchCase, SynthesizedKind, Type, Variable,
};
use indexmap::IndexMap;

use crate::error::{LowerDiagnostics, LowerErrorKind};
use crate::liveness::CaptureAnalysis;
use crate::names;
use crate::options::LowerOptions;
use crate::ordinals::OrdinalDispenser;
use crate::previous::PreviousGeneration;
use crate::replacement::{
    hoist_ref_initialization, HoistHost, ReplacementResolver, ReplacementTable, SymbolReplacement,
};
use crate::slots::FieldPool;
use crate::state::{StateDebugInfo, StateMachineState};
use crate::state_allocator::ResumableStateAllocator;
use crate::type_map::TypeMap;

/// Fields every container of a given kind has, plus proxies for `this` and
/// captured parameters.
pub(crate) struct MachineFields {
    pub state: Rc<FieldSymbol>,
    pub builder: Option<Rc<FieldSymbol>>,
    pub current: Option<Rc<FieldSymbol>>,
    pub disposing: Option<Rc<FieldSymbol>>,
    pub this_proxy: Option<Rc<FieldSymbol>>,
    pub param_proxies: Vec<(ParamId, Rc<FieldSymbol>)>,
}

impl MachineFields {
    pub fn declare(pool: &mut FieldPool<'_>, method: &MethodSymbol, analysis: &CaptureAnalysis, types: &TypeMap) -> Self {
        let state = pool.add_plain_field(names::STATE_FIELD, Type::Int);
        let element = types.substitute(&method.result_type());
        let (builder, current, disposing) = match method.kind {
            MethodKind::Async => (
                Some(pool.add_plain_field(names::BUILDER_FIELD, Type::Builder(Box::new(element)))),
                None,
                None,
            ),
            MethodKind::Iterator => (
                None,
                Some(pool.add_plain_field(names::CURRENT_FIELD, element)),
                Some(pool.add_plain_field(names::DISPOSING_FIELD, Type::Bool)),
            ),
            MethodKind::AsyncIterator => (
                Some(pool.add_plain_field(names::BUILDER_FIELD, Type::Builder(Box::new(Type::Bool)))),
                Some(pool.add_plain_field(names::CURRENT_FIELD, element)),
                None,
            ),
        };

        let this_proxy = (!method.is_static && analysis.contains(Variable::This))
            .then(|| pool.add_plain_field(names::THIS_PROXY, types.substitute(&method.containing_type)));

        let param_proxies = method
            .params
            .iter()
            .filter(|p| analysis.contains(Variable::Param(p.id)))
            .map(|p| {
                let field = pool.add_plain_field(&names::param_proxy(&p.name), types.substitute(&p.ty));
                (p.id, field)
            })
            .collect();

        Self {
            state,
            builder,
            current,
            disposing,
            this_proxy,
            param_proxies,
        }
    }
}

/// Locals given fields when a scope was entered.
#[derive(Default)]
struct Scope {
    debug_fields: Vec<Rc<FieldSymbol>>,
}

pub(crate) struct BodyRewriter<'a> {
    pub(super) method: &'a MethodSymbol,
    options: &'a LowerOptions,
    analysis: &'a CaptureAnalysis,
    types: TypeMap,
    pub(super) f: NodeFactory,
    pub(super) pool: FieldPool<'a>,
    table: ReplacementTable,
    pub(super) diagnostics: LowerDiagnostics,
    pub(super) fields: MachineFields,
    pub(super) container: Type,

    /// Await states, or yield states of a plain iterator.
    pub(super) states: ResumableStateAllocator<'a>,
    /// Yield states of an async iterator, counting down.
    pub(super) yield_states: Option<ResumableStateAllocator<'a>>,
    /// Resume labels of the innermost enclosing `try` (or the method body).
    pub(super) dispatch: IndexMap<LabelId, Vec<StateMachineState>>,
    pub(super) state_debug_info: Vec<StateDebugInfo>,
    pub(super) suspension_ordinals: OrdinalDispenser<i32>,

    debug_ids: Vec<LocalDebugId>,
    pub(super) cached_state: LocalId,
    pub(super) cached_this: Option<LocalId>,
    pub(super) result_local: Option<LocalId>,
    pub(super) exit_label: LabelId,
}

/// A hoisted ref local's new binding.
struct BoundRef {
    /// Stores into the new fields, then clears of the old binding.
    effects: Vec<Expr>,
    place: Rc<Expr>,
    /// The place must be read once now so a bad index or a null receiver
    /// faults at the binding.
    needs_read: bool,
}

impl BoundRef {
    /// `{ ref scratch; effects; scratch = ref place }`
    fn read(self, f: &mut NodeFactory) -> Expr {
        let scratch = f.ref_temp(self.place.ty.clone(), SynthesizedKind::LoweringTemp, RefKind::Ref);
        let read = f.ref_assign(f.local(scratch), f.shared(&self.place));
        f.sequence(vec![scratch], self.effects, read)
    }
}

impl<'a> BodyRewriter<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        method: &'a MethodSymbol,
        body: &MethodBody,
        options: &'a LowerOptions,
        analysis: &'a CaptureAnalysis,
        types: TypeMap,
        pool: FieldPool<'a>,
        fields: MachineFields,
        container: Type,
        previous: Option<&'a dyn PreviousGeneration>,
        diagnostics: LowerDiagnostics,
    ) -> Self {
        let mut f = NodeFactory::new(types.substitute_locals(&body.locals), body.next_label);
        f.span = method.span;

        let mut ordinals = OrdinalDispenser::new();
        let debug_ids = body
            .locals
            .iter()
            .map(|local| {
                let syntax_offset = method.syntax_offset(local.span);
                LocalDebugId {
                    syntax_offset,
                    ordinal: ordinals.assign((syntax_offset, local.kind)),
                }
            })
            .collect();

        let (states, yield_states) = match method.kind {
            MethodKind::Async => (
                ResumableStateAllocator::new(previous, StateMachineState::FIRST_RESUMABLE_ASYNC, true),
                None,
            ),
            MethodKind::Iterator => (
                ResumableStateAllocator::new(previous, StateMachineState::FIRST_RESUMABLE_ITERATOR, true),
                None,
            ),
            MethodKind::AsyncIterator => (
                ResumableStateAllocator::new(previous, StateMachineState::FIRST_RESUMABLE_ASYNC, true),
                Some(ResumableStateAllocator::new(
                    previous,
                    StateMachineState::FIRST_RESUMABLE_ASYNC_ITERATOR,
                    false,
                )),
            ),
        };

        let cached_state = f.temp(Type::Int, SynthesizedKind::CachedState);
        let cached_this = (!options.is_debug()
            && fields.this_proxy.is_some()
            && method.containing_type.is_reference_type())
        .then(|| f.temp(types.substitute(&method.containing_type), SynthesizedKind::FrameCache));
        let result_type = types.substitute(&method.result_type());
        let result_local = (method.kind == MethodKind::Async && result_type != Type::Void)
            .then(|| f.temp(result_type, SynthesizedKind::ReturnValue));
        let exit_label = f.new_label();

        let mut rewriter = Self {
            method,
            options,
            analysis,
            types,
            f,
            pool,
            table: ReplacementTable::new(),
            diagnostics,
            fields,
            container,
            states,
            yield_states,
            dispatch: IndexMap::new(),
            state_debug_info: Vec::new(),
            suspension_ordinals: OrdinalDispenser::new(),
            debug_ids,
            cached_state,
            cached_this,
            result_local,
            exit_label,
        };
        rewriter.install_proxies();
        rewriter
    }

    /// Replacements that live for the whole method: `this`, parameters,
    /// closure frame variables and pinned locals.
    fn install_proxies(&mut self) {
        if let Some(field) = &self.fields.this_proxy {
            self.table.install(
                Variable::This,
                SymbolReplacement::StateMachineField {
                    field: field.clone(),
                    reusable: false,
                },
            );
        }
        for (param, field) in &self.fields.param_proxies {
            self.table.install(
                Variable::Param(*param),
                SymbolReplacement::StateMachineField {
                    field: field.clone(),
                    reusable: false,
                },
            );
        }
        if let Some(frame) = &self.method.closure_frame {
            for capture in &frame.captured {
                self.table.install(
                    Variable::Local(capture.local),
                    SymbolReplacement::Frame {
                        frame_type: frame.frame_type.clone(),
                        field: capture.field.clone(),
                    },
                );
            }
        }

        let locals: Vec<LocalId> = self
            .analysis
            .hoisted
            .iter()
            .filter_map(|v| match v {
                Variable::Local(l) => Some(*l),
                _ => None,
            })
            .collect();
        for id in locals {
            if self.table.contains(Variable::Local(id)) {
                continue;
            }
            let Some(local) = self.f.locals.get(id).cloned() else {
                continue;
            };
            if local.ref_kind.is_by_ref() || !self.pool.should_preallocate(local.kind) {
                continue;
            }
            let Some(debug_id) = self.debug_ids.get(id.0 as usize).copied() else {
                continue;
            };
            let field = self.pool.allocate_long_lived(&local.ty, &local, debug_id);
            self.table.install(
                Variable::Local(id),
                SymbolReplacement::StateMachineField { field, reusable: false },
            );
        }
    }

    pub fn rewrite_body(&mut self, block: &Block) -> Block {
        self.block(block)
    }

    // ── Helpers ─────────────────────────────────────────────────────

    pub(super) fn this_container(&self) -> Expr {
        self.f.this(self.container.clone())
    }

    /// `this.<field>` on the container.
    pub(super) fn machine_field(&self, field: &Rc<FieldSymbol>) -> Expr {
        self.f.field(self.this_container(), field)
    }

    /// `this.$state = cached = state;`
    pub(super) fn set_state(&self, state: StateMachineState) -> Stmt {
        let cache = self.f.assign(self.f.local(self.cached_state), self.f.int(state.0 as i64));
        self.f.assign_stmt(self.machine_field(&self.fields.state), cache)
    }

    pub(super) fn builder(&self) -> Expr {
        match &self.fields.builder {
            Some(field) => self.machine_field(field),
            None => {
                internal_fault("builder requested by a method without one");
                self.f.null(Type::Object)
            }
        }
    }

    /// What the original receiver turned into. A receiver that was never
    /// captured stays a bare `this`.
    fn this_expr(&self, span: Span) -> Expr {
        let ty = self.types.substitute(&self.method.containing_type);
        if let Some(cached) = self.cached_this {
            return Expr::new(ExprKind::Local(cached), ty, span);
        }
        match self.table.get(Variable::This) {
            Some(replacement) => replacement.replacement(span, self),
            None => Expr::new(ExprKind::This, ty, span),
        }
    }

    pub(super) fn register_dispatch(&mut self, label: LabelId, states: Vec<StateMachineState>) {
        for state in &states {
            if self.dispatch.values().any(|existing| existing.contains(state)) {
                tracing::error!(target: "coro_lower", state = state.0, "state dispatched twice");
                debug_assert!(false, "state {} dispatched twice", state);
            }
        }
        self.dispatch.entry(label).or_default().extend(states);
    }

    /// `switch (cached) { ... }` with case groups ordered by their lowest
    /// state.
    pub(super) fn dispatch_switch(&self, table: &IndexMap<LabelId, Vec<StateMachineState>>) -> Stmt {
        let mut entries: Vec<(&LabelId, &Vec<StateMachineState>)> = table.iter().collect();
        entries.sort_by_key(|(_, states)| states.iter().min().copied());
        let cases = entries
            .into_iter()
            .map(|(label, states)| SwitchCase {
                values: states.iter().map(|s| s.0 as i64).collect(),
                label: *label,
            })
            .collect();
        self.f.switch(self.f.local(self.cached_state), cases, None)
    }

    // ── Scopes ──────────────────────────────────────────────────────

    fn block(&mut self, block: &Block) -> Block {
        let mut scope = Scope::default();
        let kept: Vec<LocalId> = block
            .locals
            .iter()
            .copied()
            .filter(|&local| self.enter_local(local, &mut scope))
            .collect();

        let mut stmts: Vec<Stmt> = block.stmts.iter().map(|s| self.stmt(s)).collect();
        stmts.extend(self.exit_scope(&block.locals));

        if self.options.emit_debug_scopes && !scope.debug_fields.is_empty() {
            let inner = self.f.block(kept, stmts);
            let marker = self.f.stmt(StmtKind::StateMachineScope {
                fields: scope.debug_fields,
                body: Box::new(inner),
            });
            Block::new(Vec::new(), vec![marker])
        } else {
            Block::new(kept, stmts)
        }
    }

    /// Give `local` its field if it needs one. Returns whether the local
    /// stays declared in the step method.
    fn enter_local(&mut self, id: LocalId, scope: &mut Scope) -> bool {
        let var = Variable::Local(id);
        if self.method.frame_capture(id).is_some() {
            return false;
        }
        let Some(local) = self.f.locals.get(id).cloned() else {
            return true;
        };
        if let Some(SymbolReplacement::StateMachineField { field, .. }) = self.table.get(var) {
            if local.kind == SynthesizedKind::UserDefined {
                scope.debug_fields.push(field.clone());
            }
            return false;
        }
        // Ref locals get their replacement where they are bound.
        if !self.analysis.contains(var) || local.ref_kind.is_by_ref() {
            return true;
        }

        let (field, reused) = self.pool.acquire(&local.ty, Some(&local));
        tracing::trace!(target: "coro_lower", local = %local.display_name(), field = %field.name, reused, "hoisted local");
        if local.kind == SynthesizedKind::UserDefined {
            scope.debug_fields.push(field.clone());
        }
        self.table
            .install(var, SymbolReplacement::StateMachineField { field, reusable: true });
        false
    }

    /// Clear and return the pooled fields of `locals`.
    fn exit_scope(&mut self, locals: &[LocalId]) -> Vec<Stmt> {
        let mut cleanup = Vec::new();
        for &local in locals {
            let var = Variable::Local(local);
            if !self.table.get(var).is_some_and(SymbolReplacement::is_reusable) {
                continue;
            }
            if let Some(replacement) = self.table.remove(var) {
                for field in replacement.fields() {
                    if let Some(clear) = self.pool.cleanup(&self.f, &field) {
                        cleanup.push(self.f.expr_stmt(clear));
                    }
                    self.pool.release(field);
                }
            }
        }
        cleanup
    }

    // ── Statements ──────────────────────────────────────────────────

    pub(super) fn stmt(&mut self, stmt: &Stmt) -> Stmt {
        self.f.span = stmt.span;
        match &stmt.kind {
            StmtKind::Block(block) => {
                let block = self.block(block);
                self.f.stmt(StmtKind::Block(block))
            }
            StmtKind::Expr(e) => self.expr_stmt(e),
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = self.expr(cond);
                let then_branch = Box::new(self.stmt(then_branch));
                let else_branch = else_branch.as_ref().map(|s| Box::new(self.stmt(s)));
                self.f.stmt(StmtKind::If {
                    cond,
                    then_branch,
                    else_branch,
                })
            }
            StmtKind::Label(label) => self.f.label(*label),
            StmtKind::Goto(label) => self.f.goto(*label),
            StmtKind::CondGoto {
                cond,
                jump_if_true,
                label,
            } => {
                let cond = self.expr(cond);
                self.f.cond_goto(cond, *jump_if_true, *label)
            }
            StmtKind::Switch {
                scrutinee,
                cases,
                default,
            } => {
                let scrutinee = self.expr(scrutinee);
                self.f.switch(scrutinee, cases.clone(), *default)
            }
            StmtKind::Try {
                body,
                catches,
                finally,
            } => self.try_stmt(body, catches, finally.as_ref()),
            StmtKind::Throw(e) => {
                let e = e.as_ref().map(|e| self.expr(e));
                self.f.throw(e)
            }
            StmtKind::Return(e) => self.return_stmt(e.as_ref()),
            StmtKind::YieldReturn(value) => self.lower_yield(value, stmt.span),
            StmtKind::YieldBreak => self.finish_iteration(),
            StmtKind::StateMachineScope { fields, body } => {
                let body = Box::new(self.stmt(body));
                self.f.stmt(StmtKind::StateMachineScope {
                    fields: fields.clone(),
                    body,
                })
            }
            StmtKind::Nop => self.f.nop(),
        }
    }

    fn expr_stmt(&mut self, e: &Expr) -> Stmt {
        match &e.kind {
            ExprKind::Await(operand) => self.lower_await(operand, None, e.span),
            ExprKind::Assign {
                target,
                value,
                is_ref: false,
            } => match &value.kind {
                ExprKind::Await(operand) => self.lower_await(operand, Some(target.as_ref()), value.span),
                _ => {
                    let e = self.expr(e);
                    self.f.expr_stmt(e)
                }
            },
            ExprKind::Assign {
                target,
                value,
                is_ref: true,
            } => match target.as_local() {
                Some(local) if self.is_hoisted_ref_local(local) => self.ref_initialization(local, value),
                _ => {
                    let e = self.expr(e);
                    self.f.expr_stmt(e)
                }
            },
            _ => {
                let e = self.expr(e);
                self.f.expr_stmt(e)
            }
        }
    }

    fn is_hoisted_ref_local(&self, id: LocalId) -> bool {
        self.analysis.contains(Variable::Local(id))
            && self.method.frame_capture(id).is_none()
            && self.f.locals.get(id).is_some_and(|l| l.ref_kind.is_by_ref())
    }

    /// `ref local = value` for a ref local that lives across a suspension,
    /// as a statement.
    fn ref_initialization(&mut self, local: LocalId, value: &Expr) -> Stmt {
        let bound = self.bind_hoisted_ref(local, value);
        let f = &mut self.f;
        if bound.needs_read {
            let read = bound.read(f);
            return f.expr_stmt(read);
        }
        let stmts: Vec<Stmt> = bound.effects.into_iter().map(|e| f.expr_stmt(e)).collect();
        match stmts.len() {
            0 => f.nop(),
            _ => f.list(stmts),
        }
    }

    /// The same binding in expression position. The result evaluates to
    /// the referent, like the ref assignment it replaces.
    fn ref_initialization_expr(&mut self, local: LocalId, value: &Expr) -> Expr {
        let bound = self.bind_hoisted_ref(local, value);
        if bound.needs_read {
            return bound.read(&mut self.f);
        }
        let value = self.f.shared(&bound.place);
        self.f.sequence(Vec::new(), bound.effects, value)
    }

    /// Decompose the place into hoisted parts and bind the local to them.
    /// Fields of an earlier binding of the same local are cleared and
    /// returned to the pool once the new parts are stored.
    fn bind_hoisted_ref(&mut self, local: LocalId, value: &Expr) -> BoundRef {
        let var = Variable::Local(local);
        let ref_kind = self.f.locals.get(local).map_or(RefKind::Ref, |l| l.ref_kind);
        let value = self.expr(value);
        let hoisted = hoist_ref_initialization(self, value, ref_kind);

        let mut effects = hoisted.side_effects;
        if let Some(previous) = self.table.remove(var) {
            for field in previous.fields() {
                effects.extend(self.pool.cleanup(&self.f, &field));
                self.pool.release(field);
            }
        }

        let place = Rc::new(hoisted.replacement);
        self.table.install(
            var,
            SymbolReplacement::Expression {
                expr: place.clone(),
                fields: hoisted.fields,
                reusable: true,
            },
        );
        BoundRef {
            effects,
            place,
            needs_read: hoisted.needs_sacrificial_read,
        }
    }

    fn return_stmt(&mut self, value: Option<&Expr>) -> Stmt {
        match self.method.kind {
            MethodKind::Async | MethodKind::AsyncIterator => {
                let mut stmts = Vec::new();
                if let Some(value) = value {
                    let value = self.expr(value);
                    match self.result_local {
                        Some(result) => stmts.push(self.f.assign_stmt(self.f.local(result), value)),
                        None => stmts.push(self.f.expr_stmt(value)),
                    }
                }
                stmts.push(self.f.goto(self.exit_label));
                self.f.list(stmts)
            }
            MethodKind::Iterator => self.f.ret(Some(self.f.bool(false))),
        }
    }

    /// `yield break`: an iterator returns `false`; an async iterator
    /// completes through the exit label.
    fn finish_iteration(&mut self) -> Stmt {
        match self.method.kind {
            MethodKind::AsyncIterator | MethodKind::Async => self.f.goto(self.exit_label),
            MethodKind::Iterator => self.f.ret(Some(self.f.bool(false))),
        }
    }

    fn try_stmt(&mut self, body: &Block, catches: &[CatchClause], finally: Option<&Block>) -> Stmt {
        let outer = std::mem::take(&mut self.dispatch);
        let mut body = self.block(body);
        let inner = std::mem::replace(&mut self.dispatch, outer);

        // Control can't enter a protected region in the middle, so the outer
        // switch jumps to the try and this switch finishes the job.
        let entry_label = if inner.is_empty() {
            None
        } else {
            body.stmts.insert(0, self.dispatch_switch(&inner));
            let label = self.f.new_label();
            let states = inner.into_values().flatten().collect();
            self.register_dispatch(label, states);
            Some(label)
        };

        let catches = catches.iter().map(|c| self.catch_clause(c)).collect();
        let finally = finally.map(|block| {
            let block = self.block(block);
            Block::new(Vec::new(), vec![self.f.if_then(self.finally_guard(), self.f.stmt(StmtKind::Block(block)))])
        });

        let try_stmt = self.f.try_stmt(body, catches, finally);
        match entry_label {
            Some(label) => self.f.list(vec![self.f.label(label), try_stmt]),
            None => try_stmt,
        }
    }

    /// A finally runs only when control leaves the try normally or by a
    /// jump, not when the step returns to suspend.
    fn finally_guard(&self) -> Expr {
        let cached = self.f.local(self.cached_state);
        match self.method.kind {
            MethodKind::AsyncIterator => self.f.binary(
                BinOp::Eq,
                cached,
                self.f.int(StateMachineState::NOT_STARTED_OR_RUNNING.0 as i64),
            ),
            _ => self.f.binary(BinOp::Lt, cached, self.f.int(StateMachineState::FIRST_UNUSED.0 as i64)),
        }
    }

    fn catch_clause(&mut self, clause: &CatchClause) -> CatchClause {
        let Some(local) = clause.local else {
            return CatchClause {
                local: None,
                body: self.block(&clause.body),
            };
        };

        let var = Variable::Local(local);
        let mut pooled = false;
        if self.analysis.contains(var) && !self.table.contains(var) {
            if let Some(symbol) = self.f.locals.get(local).cloned() {
                let (field, _) = self.pool.acquire(&symbol.ty, Some(&symbol));
                self.table
                    .install(var, SymbolReplacement::StateMachineField { field, reusable: true });
                pooled = true;
            }
        }
        // The runtime binds the exception to the plain local; copy it into
        // the field before anything reads it.
        let prologue = match self.table.get(var) {
            Some(SymbolReplacement::StateMachineField { field, .. }) => {
                Some(self.f.assign_stmt(self.machine_field(field), self.f.local(local)))
            }
            _ => None,
        };

        let mut body = self.block(&clause.body);
        if let Some(prologue) = prologue {
            body.stmts.insert(0, prologue);
        }
        if pooled {
            body.stmts.extend(self.exit_scope(&[local]));
        }
        CatchClause {
            local: Some(local),
            body,
        }
    }

    // ── Expressions ─────────────────────────────────────────────────

    pub(super) fn expr(&mut self, e: &Expr) -> Expr {
        if let ExprKind::Assign { target, value, is_ref: true } = &e.kind {
            if let Some(local) = target.as_local().filter(|&l| self.is_hoisted_ref_local(l)) {
                return self.ref_initialization_expr(local, value);
            }
        }
        let ty = self.types.substitute(&e.ty);
        let span = e.span;
        let kind = match &e.kind {
            ExprKind::Literal(lit) => ExprKind::Literal(lit.clone()),
            ExprKind::Default => ExprKind::Default,
            ExprKind::Local(id) => return self.local_expr(*id, span, ty),
            ExprKind::Param(param) => return self.param_expr(*param, span, ty),
            ExprKind::This | ExprKind::Base => return self.this_expr(span),
            ExprKind::Field { receiver, field } => ExprKind::Field {
                receiver: receiver.as_ref().map(|r| Box::new(self.expr(r))),
                field: field.clone(),
            },
            ExprKind::Index { array, index } => ExprKind::Index {
                array: Box::new(self.expr(array)),
                index: Box::new(self.expr(index)),
            },
            ExprKind::Call {
                receiver,
                method,
                args,
                ref_kind,
            } => ExprKind::Call {
                receiver: receiver.as_ref().map(|r| Box::new(self.expr(r))),
                method: method.clone(),
                args: args
                    .iter()
                    .map(|a| Arg {
                        expr: self.expr(&a.expr),
                        ref_kind: a.ref_kind,
                    })
                    .collect(),
                ref_kind: *ref_kind,
            },
            ExprKind::Binary { op, left, right } => ExprKind::Binary {
                op: *op,
                left: Box::new(self.expr(left)),
                right: Box::new(self.expr(right)),
            },
            ExprKind::Unary { op, operand } => ExprKind::Unary {
                op: *op,
                operand: Box::new(self.expr(operand)),
            },
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
                ref_kind,
            } => ExprKind::Conditional {
                cond: Box::new(self.expr(cond)),
                then_expr: Box::new(self.expr(then_expr)),
                else_expr: Box::new(self.expr(else_expr)),
                ref_kind: *ref_kind,
            },
            ExprKind::Assign {
                target,
                value,
                is_ref,
            } => ExprKind::Assign {
                target: Box::new(self.expr(target)),
                value: Box::new(self.expr(value)),
                is_ref: *is_ref,
            },
            ExprKind::Await(operand) => {
                internal_fault("await below statement level");
                ExprKind::Await(Box::new(self.expr(operand)))
            }
            ExprKind::Sequence {
                locals,
                side_effects,
                value,
            } => {
                let side_effects = side_effects.iter().map(|e| self.expr(e)).collect();
                let value = Box::new(self.expr(value));
                ExprKind::Sequence {
                    locals: locals
                        .iter()
                        .copied()
                        .filter(|l| !self.table.contains(Variable::Local(*l)))
                        .collect(),
                    side_effects,
                    value,
                }
            }
            ExprKind::New { args } => ExprKind::New {
                args: args.iter().map(|a| self.expr(a)).collect(),
            },
            ExprKind::NewArray(items) => ExprKind::NewArray(items.iter().map(|a| self.expr(a)).collect()),
            ExprKind::Intrinsic { op, args } => ExprKind::Intrinsic {
                op: *op,
                args: args.iter().map(|a| self.expr(a)).collect(),
            },
            ExprKind::Shared(inner) => ExprKind::Shared(Rc::new(self.expr(inner))),
        };
        Expr::new(kind, ty, span)
    }

    fn local_expr(&self, id: LocalId, span: Span, ty: Type) -> Expr {
        match self.table.get(Variable::Local(id)) {
            Some(replacement) => replacement.replacement(span, self),
            None => Expr::new(ExprKind::Local(id), ty, span),
        }
    }

    fn param_expr(&self, id: ParamId, span: Span, ty: Type) -> Expr {
        match self.table.get(Variable::Param(id)) {
            Some(replacement) => replacement.replacement(span, self),
            None => {
                internal_fault("parameter referenced without a proxy");
                Expr::new(ExprKind::Param(id), ty, span)
            }
        }
    }
}

impl ReplacementResolver for BodyRewriter<'_> {
    fn container_type(&self) -> &Type {
        &self.container
    }

    fn frame_receiver(&self, frame_type: &Type, span: Span) -> Expr {
        let mut receiver = self.this_expr(span);
        receiver.ty = frame_type.clone();
        receiver
    }
}

impl HoistHost for BodyRewriter<'_> {
    fn spill_field(&mut self, ty: &Type) -> Rc<FieldSymbol> {
        self.pool.acquire(ty, None).0
    }

    fn report(&mut self, kind: LowerErrorKind, span: Span) {
        self.diagnostics.report(kind, span);
    }
}

/// A broken invariant of the rewrite itself. Fails debug builds; release
/// builds log it and keep lowering.
pub(super) fn internal_fault(message: &str) {
    tracing::error!(target: "coro_lower", "{}", message);
    debug_assert!(false, "{}", message);
}

