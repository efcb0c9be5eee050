// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Puts the rewritten body together with the dispatch prologue, the
//! completion epilogue, the helper methods and the kickoff body.

use std::rc::Rc;

use coro_ast::{
    BinOp, Block, CatchClause, Expr, FieldSymbol, Intrinsic, LocalTable, MethodBody, MethodKind,
    MethodSymbol, NodeFactory, Stmt, StmtKind, SynthesizedKind, Type,
};

use super::rewriter::{BodyRewriter, MachineFields};
use crate::error::LowerDiagnostics;
use crate::liveness::CaptureAnalysis;
use crate::names;
use crate::previous::{AwaiterSlotRecord, GenerationSnapshot, HoistedSlotRecord};
use crate::state::{ResumeErrorCode, StateDebugInfo, StateMachineState};

/// A lowered method: the synthesized container plus the body that replaces
/// the original method.
#[derive(Debug)]
pub struct LoweredStateMachine {
    pub kickoff: MethodBody,
    pub container: StateMachineType,
    pub state_debug_info: Vec<StateDebugInfo>,
    /// Fields carrying slot metadata, awaiters last.
    pub hoisted_slots: Vec<Rc<FieldSymbol>>,
    pub captured: CaptureAnalysis,
    pub first_unused_increasing: Option<StateMachineState>,
    pub first_unused_decreasing: Option<StateMachineState>,
    pub hoisted_slot_count: i32,
    pub awaiter_slot_count: i32,
}

#[derive(Debug)]
pub struct StateMachineType {
    pub name: Rc<str>,
    pub kind: MethodKind,
    /// Re-declared type parameters of the lowered method.
    pub type_params: Vec<Rc<str>>,
    pub fields: Vec<Rc<FieldSymbol>>,
    pub methods: Vec<SynthesizedMethod>,
    pub ty: Type,
}

#[derive(Debug)]
pub struct SynthesizedMethod {
    pub name: Rc<str>,
    pub body: MethodBody,
}

impl StateMachineType {
    pub fn method(&self, name: &str) -> Option<&SynthesizedMethod> {
        self.methods.iter().find(|m| &*m.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&Rc<FieldSymbol>> {
        self.fields.iter().find(|f| &*f.name == name)
    }

    pub fn step(&self) -> Option<&SynthesizedMethod> {
        self.method(names::MOVE_NEXT)
    }
}

impl LoweredStateMachine {
    /// Layout record to hand back as the previous generation when the
    /// method is compiled again.
    pub fn snapshot(&self) -> GenerationSnapshot {
        let mut hoisted_slots = Vec::new();
        let mut awaiter_slots = Vec::new();
        for field in &self.hoisted_slots {
            let Some(slot) = &field.slot else { continue };
            if slot.index < 0 {
                continue;
            }
            match slot.debug {
                Some(debug) if debug.kind == SynthesizedKind::AwaiterTemp && debug.id.is_none() => {
                    awaiter_slots.push(AwaiterSlotRecord {
                        slot: slot.index,
                        ty: field.ty.to_string(),
                    });
                }
                Some(debug) => {
                    if let Some(id) = debug.id {
                        hoisted_slots.push(HoistedSlotRecord {
                            slot: slot.index,
                            kind: debug.kind,
                            id,
                            ty: field.ty.to_string(),
                        });
                    }
                }
                None => {}
            }
        }

        GenerationSnapshot {
            container_name: Some(self.container.name.to_string()),
            states: self.state_debug_info.clone(),
            first_unused_increasing: self.first_unused_increasing,
            first_unused_decreasing: self.first_unused_decreasing,
            hoisted_slots,
            awaiter_slots,
            hoisted_slot_count: self.hoisted_slot_count,
            awaiter_slot_count: self.awaiter_slot_count,
        }
    }
}

pub(super) fn assemble(
    mut rw: BodyRewriter<'_>,
    body: Block,
    analysis: &CaptureAnalysis,
    name: String,
) -> (LoweredStateMachine, LowerDiagnostics) {
    let method = rw.method;
    rw.f.span = method.span;

    let step = match method.kind {
        MethodKind::Async | MethodKind::AsyncIterator => async_step(&mut rw, body),
        MethodKind::Iterator => iterator_step(&mut rw, body),
    };

    let mut top_locals = vec![rw.cached_state];
    top_locals.extend(rw.cached_this);
    top_locals.extend(rw.result_local);
    let step_body = MethodBody {
        block: Block::new(top_locals, step),
        has_errors: false,
        next_label: rw.f.next_label(),
        locals: std::mem::take(&mut rw.f.locals),
    };

    let mut methods = vec![SynthesizedMethod {
        name: Rc::from(names::MOVE_NEXT),
        body: step_body,
    }];
    match method.kind {
        MethodKind::Iterator => methods.push(SynthesizedMethod {
            name: Rc::from(names::DISPOSE),
            body: dispose_body(&rw.fields, &rw.container),
        }),
        MethodKind::AsyncIterator => methods.push(SynthesizedMethod {
            name: Rc::from(names::MOVE_NEXT_ASYNC),
            body: move_next_async_body(&rw.fields, &rw.container),
        }),
        MethodKind::Async => {}
    }

    let kickoff = kickoff_body(method, &rw.fields, &rw.container);
    let first_unused_increasing = Some(rw.states.next_state());
    let first_unused_decreasing = rw.yield_states.as_ref().map(|s| s.next_state());
    let hoisted_slots = rw.pool.slot_fields();
    let hoisted_slot_count = rw.pool.hoisted_slot_count();
    let awaiter_slot_count = rw.pool.awaiter_slot_count();

    let container = StateMachineType {
        name: Rc::from(name.as_str()),
        kind: method.kind,
        type_params: method.type_params.clone(),
        fields: rw.pool.into_fields(),
        methods,
        ty: rw.container,
    };

    let machine = LoweredStateMachine {
        kickoff,
        container,
        state_debug_info: rw.state_debug_info,
        hoisted_slots,
        captured: analysis.clone(),
        first_unused_increasing,
        first_unused_decreasing,
        hoisted_slot_count,
        awaiter_slot_count,
    };
    (machine, rw.diagnostics)
}

/// Statements every step starts with: load the state, cache `this`, jump
/// to the resume point and reject states an edit removed.
fn prologue(rw: &mut BodyRewriter<'_>, code: ResumeErrorCode) -> Vec<Stmt> {
    let mut stmts = Vec::new();
    if let (Some(cached), Some(proxy)) = (rw.cached_this, &rw.fields.this_proxy) {
        stmts.push(rw.f.assign_stmt(rw.f.local(cached), rw.machine_field(proxy)));
    }
    let dispatch = std::mem::take(&mut rw.dispatch);
    if !dispatch.is_empty() {
        stmts.push(rw.dispatch_switch(&dispatch));
    }
    let cached = rw.f.local(rw.cached_state);
    stmts.extend(rw.states.missing_state_guard(&rw.f, cached.clone(), code));
    if let Some(yields) = &rw.yield_states {
        stmts.extend(yields.missing_state_guard(&rw.f, cached, code));
    }
    stmts
}

/// ```text
/// cached = this.$state;
/// try {
///     <prologue>
///     this.$state = cached = -1;   (async iterator only)
///     <body>
/// } catch (ex) {
///     this.$state = -2;
///     SetException(this.$builder, ex);
///     return;
/// }
/// exit:
/// this.$state = -2;
/// SetResult(this.$builder[, result]);
/// ```
fn async_step(rw: &mut BodyRewriter<'_>, body: Block) -> Vec<Stmt> {
    let load = rw
        .f
        .assign_stmt(rw.f.local(rw.cached_state), rw.machine_field(&rw.fields.state));

    let mut protected = prologue(rw, ResumeErrorCode::CannotResumeAsync);
    if rw.method.kind == MethodKind::AsyncIterator {
        // Only the first step falls through the dispatch, coming from the
        // initial state.
        protected.push(rw.set_state(StateMachineState::NOT_STARTED_OR_RUNNING));
    }
    protected.push(rw.f.stmt(StmtKind::Block(body)));

    let ex = rw.f.temp(Type::Exception, SynthesizedKind::LoweringTemp);
    let fault = rw.f.intrinsic(
        Intrinsic::SetException,
        vec![rw.builder(), rw.f.local(ex)],
        Type::Void,
    );
    let handler = Block::new(
        Vec::new(),
        vec![
            rw.set_state(StateMachineState::FINISHED),
            rw.f.expr_stmt(fault),
            rw.f.ret(None),
        ],
    );
    let catch = CatchClause {
        local: Some(ex),
        body: handler,
    };

    let result = match (rw.method.kind, rw.result_local) {
        (MethodKind::AsyncIterator, _) => vec![rw.builder(), rw.f.bool(false)],
        (_, Some(result)) => vec![rw.builder(), rw.f.local(result)],
        (_, None) => vec![rw.builder()],
    };
    let complete = rw.f.intrinsic(Intrinsic::SetResult, result, Type::Void);

    vec![
        load,
        rw.f.try_stmt(Block::new(Vec::new(), protected), vec![catch], None),
        rw.f.label(rw.exit_label),
        rw.set_state(StateMachineState::FINISHED),
        rw.f.expr_stmt(complete),
        rw.f.ret(None),
    ]
}

/// ```text
/// cached = this.$state;
/// <prologue, with case 0: goto start>
/// return false;
/// start:
/// this.$state = cached = -1;
/// <body>
/// return false;
/// ```
fn iterator_step(rw: &mut BodyRewriter<'_>, body: Block) -> Vec<Stmt> {
    let load = rw
        .f
        .assign_stmt(rw.f.local(rw.cached_state), rw.machine_field(&rw.fields.state));

    let start = rw.f.new_label();
    rw.register_dispatch(start, vec![StateMachineState::INITIAL_ITERATOR]);

    let mut stmts = vec![load];
    stmts.extend(prologue(rw, ResumeErrorCode::CannotResumeIterator));
    stmts.push(rw.f.ret(Some(rw.f.bool(false))));
    stmts.push(rw.f.label(start));
    stmts.push(rw.set_state(StateMachineState::NOT_STARTED_OR_RUNNING));
    stmts.push(rw.f.stmt(StmtKind::Block(body)));
    stmts.push(rw.f.label(rw.exit_label));
    stmts.push(rw.f.ret(Some(rw.f.bool(false))));
    stmts
}

fn helper_factory(container: &Type) -> (NodeFactory, Expr) {
    let f = NodeFactory::new(LocalTable::new(), 0);
    let this = f.this(container.clone());
    (f, this)
}

fn helper_body(f: NodeFactory, stmts: Vec<Stmt>) -> MethodBody {
    MethodBody {
        next_label: f.next_label(),
        locals: f.locals,
        block: Block::new(Vec::new(), stmts),
        has_errors: false,
    }
}

/// ```text
/// if (this.$state >= 1) {
///     this.$disposing = true;
///     this.MoveNext();
/// }
/// this.$state = -2;
/// ```
/// Resuming with `$disposing` set leaves through every pending finally.
fn dispose_body(fields: &MachineFields, container: &Type) -> MethodBody {
    let (f, this) = helper_factory(container);
    let state = f.field(this.clone(), &fields.state);
    let mut stmts = Vec::new();
    if let Some(disposing) = &fields.disposing {
        let suspended = f.binary(
            BinOp::Ge,
            state.clone(),
            f.int(StateMachineState::FIRST_RESUMABLE_ITERATOR.0 as i64),
        );
        let resume = f.list(vec![
            f.assign_stmt(f.field(this.clone(), disposing), f.bool(true)),
            f.expr_stmt(f.call(Some(this.clone()), names::MOVE_NEXT, Vec::new(), Type::Bool)),
        ]);
        stmts.push(f.if_then(suspended, resume));
    }
    stmts.push(f.assign_stmt(state, f.int(StateMachineState::FINISHED.0 as i64)));
    helper_body(f, stmts)
}

/// ```text
/// if (this.$state == -2) return from_result(false);
/// this.$builder = CreateBuilder();
/// this.MoveNext();
/// return BuilderTask(this.$builder);
/// ```
fn move_next_async_body(fields: &MachineFields, container: &Type) -> MethodBody {
    let (f, this) = helper_factory(container);
    let task = Type::task(Type::Bool);
    let mut stmts = Vec::new();

    let finished = f.binary(
        BinOp::Eq,
        f.field(this.clone(), &fields.state),
        f.int(StateMachineState::FINISHED.0 as i64),
    );
    let done = f.call(None, "from_result", vec![f.bool(false)], task.clone());
    stmts.push(f.if_then(finished, f.ret(Some(done))));

    if let Some(builder) = &fields.builder {
        let builder_ty = builder.ty.clone();
        let fresh = f.intrinsic(Intrinsic::CreateBuilder, Vec::new(), builder_ty);
        stmts.push(f.assign_stmt(f.field(this.clone(), builder), fresh));
        stmts.push(f.expr_stmt(f.call(Some(this.clone()), names::MOVE_NEXT, Vec::new(), Type::Void)));
        let pending = f.intrinsic(Intrinsic::BuilderTask, vec![f.field(this, builder)], task);
        stmts.push(f.ret(Some(pending)));
    }
    helper_body(f, stmts)
}

/// Body that replaces the original method: allocate the container, copy
/// `this` and captured parameters in, set the initial state and start it.
fn kickoff_body(method: &MethodSymbol, fields: &MachineFields, container: &Type) -> MethodBody {
    let mut f = NodeFactory::new(LocalTable::new(), 0);
    f.span = method.span;
    let sm = f.temp(container.clone(), SynthesizedKind::LoweringTemp);
    let machine = || f.local(sm);

    let mut stmts = vec![f.assign_stmt(machine(), f.new_object(container.clone(), Vec::new()))];
    if let Some(proxy) = &fields.this_proxy {
        stmts.push(f.assign_stmt(f.field(machine(), proxy), f.this(method.containing_type.clone())));
    }
    for (id, proxy) in &fields.param_proxies {
        if let Some(param) = method.param(*id) {
            stmts.push(f.assign_stmt(f.field(machine(), proxy), f.param(param)));
        }
    }

    let set_state = |state: StateMachineState| f.assign_stmt(f.field(machine(), &fields.state), f.int(state.0 as i64));
    match method.kind {
        MethodKind::Async => {
            if let Some(builder) = &fields.builder {
                let fresh = f.intrinsic(Intrinsic::CreateBuilder, Vec::new(), builder.ty.clone());
                stmts.push(f.assign_stmt(f.field(machine(), builder), fresh));
                stmts.push(set_state(StateMachineState::NOT_STARTED_OR_RUNNING));
                let start = f.intrinsic(
                    Intrinsic::Start,
                    vec![f.field(machine(), builder), machine()],
                    Type::Void,
                );
                stmts.push(f.expr_stmt(start));
                let task = f.intrinsic(
                    Intrinsic::BuilderTask,
                    vec![f.field(machine(), builder)],
                    method.return_type.clone(),
                );
                stmts.push(f.ret(Some(task)));
            }
        }
        MethodKind::Iterator => {
            stmts.push(set_state(StateMachineState::INITIAL_ITERATOR));
            stmts.push(f.ret(Some(machine())));
        }
        MethodKind::AsyncIterator => {
            stmts.push(set_state(StateMachineState::INITIAL_ASYNC_ITERATOR));
            stmts.push(f.ret(Some(machine())));
        }
    }

    MethodBody {
        block: Block::new(vec![sm], stmts),
        has_errors: false,
        next_label: f.next_label(),
        locals: f.locals,
    }
}
