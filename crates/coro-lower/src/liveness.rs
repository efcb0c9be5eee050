// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Captured-variable analysis.
//!
//! Decides which locals and parameters must move into the state machine.
//! This is definite assignment with one twist: every suspension point makes
//! all variables unassigned again. A read of a variable that is not
//! definitely assigned must then see a value stored before some suspension,
//! so the variable has to be hoisted.
//!
//! Parameters and `this` start out unassigned: the step method never sees
//! the kickoff method's arguments, so any reference to them is a capture.

use std::collections::{HashMap, HashSet};

use coro_ast::visit::{self, Visitor};
use coro_ast::{
    Block, Expr, ExprKind, LabelId, LocalId, LocalTable, MethodBody, MethodSymbol, Span, Stmt,
    StmtKind, SynthesizedKind, Variable,
};
use indexmap::{IndexMap, IndexSet};

use crate::error::{LowerDiagnostics, LowerErrorKind};
use crate::options::LowerOptions;

/// Variables that must be hoisted, in first-use order.
#[derive(Debug, Clone, Default)]
pub struct CaptureAnalysis {
    pub hoisted: IndexSet<Variable>,
}

impl CaptureAnalysis {
    pub fn contains(&self, var: Variable) -> bool {
        self.hoisted.contains(&var)
    }

    pub fn len(&self) -> usize {
        self.hoisted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hoisted.is_empty()
    }
}

pub fn analyze(
    method: &MethodSymbol,
    body: &MethodBody,
    options: &LowerOptions,
    diagnostics: &mut LowerDiagnostics,
) -> CaptureAnalysis {
    let mut walker = CaptureWalker::new(method, &body.locals);
    walker.run(&body.block);
    walker.capture_ref_referents();

    let mut hoisted = IndexSet::new();
    if options.is_debug() {
        // Debug builds keep every variable a debugger could show.
        for var in &walker.seen {
            if walker.hoist_in_debug(*var) {
                hoisted.insert(*var);
            }
        }
    }
    hoisted.extend(walker.captured.iter().copied());

    // Writes through a struct receiver must land in the hoisted copy.
    if method.has_struct_receiver() {
        hoisted.insert(Variable::This);
    }

    walker.report_disallowed(diagnostics);

    tracing::debug!(
        target: "coro_lower",
        method = %method.name,
        hoisted = hoisted.len(),
        "captured variables"
    );
    CaptureAnalysis { hoisted }
}

// ── Dataflow state ──────────────────────────────────────────────────

/// Definitely-assigned set. Unreachable states have every bit set so that
/// joining with them changes nothing.
#[derive(Debug, Clone, PartialEq)]
struct State {
    bits: Vec<u64>,
    reachable: bool,
}

impl State {
    fn unassigned(n: usize) -> Self {
        Self {
            bits: vec![0; n.div_ceil(64)],
            reachable: true,
        }
    }

    fn unreachable(n: usize) -> Self {
        Self {
            bits: vec![u64::MAX; n.div_ceil(64)],
            reachable: false,
        }
    }

    fn is_set(&self, i: usize) -> bool {
        self.bits[i / 64] & (1 << (i % 64)) != 0
    }

    fn set(&mut self, i: usize) {
        self.bits[i / 64] |= 1 << (i % 64);
    }

    fn clear(&mut self, i: usize) {
        self.bits[i / 64] &= !(1 << (i % 64));
    }

    fn clear_all(&mut self) {
        if self.reachable {
            self.bits.iter_mut().for_each(|w| *w = 0);
        }
    }

    /// Meet at a control-flow merge: assigned only if assigned on every path.
    fn join(&mut self, other: &State) {
        if !other.reachable {
            return;
        }
        if !self.reachable {
            *self = other.clone();
            return;
        }
        for (a, b) in self.bits.iter_mut().zip(&other.bits) {
            *a &= *b;
        }
    }

    /// Add the bits set in `after` but not in `before`.
    fn add_assigned_between(&mut self, before: &State, after: &State) {
        if !self.reachable {
            return;
        }
        for ((a, b), c) in self.bits.iter_mut().zip(&before.bits).zip(&after.bits) {
            *a |= *c & !*b;
        }
    }
}

// ── Walker ──────────────────────────────────────────────────────────

struct CaptureWalker<'a> {
    method: &'a MethodSymbol,
    locals: &'a LocalTable,
    state: State,
    labels: HashMap<LabelId, State>,
    labels_changed: bool,
    captured: IndexSet<Variable>,
    disallowed: IndexMap<Variable, Vec<Span>>,
    /// Every variable in order of first appearance.
    seen: IndexSet<Variable>,
    suspension_in_try: bool,
    /// Storage each ref local was bound to.
    ref_roots: IndexMap<LocalId, Vec<(Variable, Span)>>,
}

impl<'a> CaptureWalker<'a> {
    fn new(method: &'a MethodSymbol, locals: &'a LocalTable) -> Self {
        let n = Self::slot_count(method, locals);
        Self {
            method,
            locals,
            state: State::unassigned(n),
            labels: HashMap::new(),
            labels_changed: false,
            captured: IndexSet::new(),
            disallowed: IndexMap::new(),
            seen: IndexSet::new(),
            suspension_in_try: false,
            ref_roots: IndexMap::new(),
        }
    }

    fn slot_count(method: &MethodSymbol, locals: &LocalTable) -> usize {
        1 + method.params.len() + locals.len()
    }

    fn slot(&self, var: Variable) -> usize {
        match var {
            Variable::This => 0,
            Variable::Param(p) => 1 + p.0 as usize,
            Variable::Local(l) => 1 + self.method.params.len() + l.0 as usize,
        }
    }

    /// Walk until label states stop changing. Label states only shrink, so
    /// this terminates, and captures found in early passes stay valid.
    fn run(&mut self, block: &Block) {
        let n = Self::slot_count(self.method, self.locals);
        loop {
            self.state = State::unassigned(n);
            self.suspension_in_try = false;
            self.labels_changed = false;
            self.enter_method();
            self.block(block);
            if !self.labels_changed {
                break;
            }
        }
    }

    fn enter_method(&mut self) {
        if !self.method.is_static {
            self.seen.insert(Variable::This);
        }
        for p in &self.method.params {
            self.seen.insert(Variable::Param(p.id));
        }
    }

    /// A hoisted ref local must not point at stack storage, so whatever it
    /// was bound to is hoisted with it.
    fn capture_ref_referents(&mut self) {
        let mut pending: Vec<LocalId> = self
            .captured
            .iter()
            .filter_map(|v| match v {
                Variable::Local(l) => Some(*l),
                _ => None,
            })
            .collect();
        while let Some(local) = pending.pop() {
            let Some(roots) = self.ref_roots.get(&local).cloned() else {
                continue;
            };
            for (var, span) in roots {
                let newly = !self.captured.contains(&var);
                self.capture(var, span);
                if let (true, Variable::Local(l)) = (newly, var) {
                    pending.push(l);
                }
            }
        }
    }

    fn hoist_in_debug(&self, var: Variable) -> bool {
        match var {
            Variable::This => !self.method.is_static,
            Variable::Param(p) => self.method.param(p).is_some_and(|p| !p.ty.is_ref_like()),
            Variable::Local(l) => self.locals.get(l).is_some_and(|local| {
                !local.is_const
                    && !local.ref_kind.is_by_ref()
                    && local.kind.must_survive_suspension()
                    && !local.ty.is_ref_like()
                    && self.method.frame_capture(l).is_none()
            }),
        }
    }

    // ── Variable events ─────────────────────────────────────────────

    fn capture(&mut self, var: Variable, span: Span) {
        let ref_like = self
            .method
            .variable_type(self.locals, var)
            .is_some_and(|t| t.is_ref_like());
        if ref_like {
            let sites = self.disallowed.entry(var).or_default();
            if !sites.contains(&span) {
                sites.push(span);
            }
        } else if self.captured.insert(var) {
            tracing::trace!(target: "coro_lower", ?var, "capture");
        }
    }

    fn read(&mut self, var: Variable, span: Span) {
        self.seen.insert(var);
        if !self.state.is_set(self.slot(var)) {
            self.capture(var, span);
        }
    }

    fn read_local(&mut self, id: LocalId, span: Span) {
        if self.method.frame_capture(id).is_some() {
            // Frame variables are reached through the receiver.
            self.read(Variable::This, span);
            return;
        }
        let is_const = self.locals.get(id).is_some_and(|l| l.is_const);
        if is_const {
            self.seen.insert(Variable::Local(id));
        } else {
            self.read(Variable::Local(id), span);
        }
    }

    fn assign_local(&mut self, id: LocalId) {
        self.seen.insert(Variable::Local(id));
        let slot = self.slot(Variable::Local(id));
        self.state.set(slot);
    }

    fn suspend(&mut self) {
        self.state.clear_all();
        self.suspension_in_try = true;
    }

    fn unreachable(&mut self) {
        self.state = State::unreachable(Self::slot_count(self.method, self.locals));
    }

    fn merge_into_label(&mut self, label: LabelId) {
        let state = self.state.clone();
        match self.labels.get_mut(&label) {
            Some(existing) => {
                let before = existing.clone();
                existing.join(&state);
                if *existing != before {
                    self.labels_changed = true;
                }
            }
            None => {
                if state.reachable {
                    self.labels.insert(label, state);
                    self.labels_changed = true;
                }
            }
        }
    }

    // ── Statements ──────────────────────────────────────────────────

    fn block(&mut self, block: &Block) {
        for &local in &block.locals {
            if self.method.frame_capture(local).is_none() {
                self.seen.insert(Variable::Local(local));
                let slot = self.slot(Variable::Local(local));
                self.state.clear(slot);
            }
        }
        for stmt in &block.stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Block(block) => self.block(block),
            StmtKind::Expr(e) => self.expr(e),
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.expr(cond);
                let before = self.state.clone();
                self.stmt(then_branch);
                let after_then = std::mem::replace(&mut self.state, before);
                if let Some(else_branch) = else_branch {
                    self.stmt(else_branch);
                }
                self.state.join(&after_then);
            }
            StmtKind::Label(label) => {
                if let Some(incoming) = self.labels.get(label) {
                    let incoming = incoming.clone();
                    self.state.join(&incoming);
                }
            }
            StmtKind::Goto(label) => {
                self.merge_into_label(*label);
                self.unreachable();
            }
            StmtKind::CondGoto { cond, label, .. } => {
                self.expr(cond);
                self.merge_into_label(*label);
            }
            StmtKind::Switch {
                scrutinee,
                cases,
                default,
            } => {
                self.expr(scrutinee);
                for case in cases {
                    self.merge_into_label(case.label);
                }
                if let Some(default) = default {
                    self.merge_into_label(*default);
                    self.unreachable();
                }
            }
            StmtKind::Try {
                body,
                catches,
                finally,
            } => self.try_stmt(body, catches, finally.as_ref()),
            StmtKind::Throw(e) | StmtKind::Return(e) => {
                if let Some(e) = e {
                    self.expr(e);
                }
                self.unreachable();
            }
            StmtKind::YieldReturn(e) => {
                self.expr(e);
                self.suspend();
            }
            StmtKind::YieldBreak => self.unreachable(),
            StmtKind::StateMachineScope { body, .. } => self.stmt(body),
            StmtKind::Nop => {}
        }
    }

    fn try_stmt(&mut self, body: &Block, catches: &[coro_ast::CatchClause], finally: Option<&Block>) {
        let outer_flag = std::mem::replace(&mut self.suspension_in_try, false);
        let entry = self.state.clone();
        let n = Self::slot_count(self.method, self.locals);

        self.block(body);
        let mut end = self.state.clone();

        for catch in catches {
            // A handler can start anywhere in the try, including after a
            // suspension.
            self.state = if self.suspension_in_try {
                State::unassigned(n)
            } else {
                entry.clone()
            };
            if let Some(local) = catch.local {
                self.assign_local(local);
            }
            self.block(&catch.body);
            end.join(&self.state);
        }

        if let Some(finally) = finally {
            if self.suspension_in_try {
                self.capture_used_in_finally(finally);
            }
            let finally_entry = if self.suspension_in_try {
                State::unassigned(n)
            } else {
                entry
            };
            self.state = finally_entry.clone();
            self.block(finally);
            let finally_end = std::mem::replace(&mut self.state, end);
            if !finally_end.reachable || visit::contains_suspension(finally) {
                self.state = finally_end;
            } else {
                self.state.add_assigned_between(&finally_entry, &finally_end);
            }
        } else {
            self.state = end;
        }

        self.suspension_in_try |= outer_flag;
    }

    /// A `finally` reached after a suspension can't share stack slots with
    /// the code around it, so everything it touches from outside is hoisted.
    fn capture_used_in_finally(&mut self, finally: &Block) {
        let mut finder = OutsideVariables {
            method: self.method,
            declared: HashSet::new(),
            found: Vec::new(),
        };
        finder.visit_block(finally);
        for (var, span) in finder.found {
            let is_const = match var {
                Variable::Local(l) => self.locals.get(l).is_some_and(|l| l.is_const),
                _ => false,
            };
            if !is_const {
                self.seen.insert(var);
                self.capture(var, span);
            }
        }
    }

    // ── Expressions ─────────────────────────────────────────────────

    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Literal(_) | ExprKind::Default => {}
            ExprKind::Local(id) => self.read_local(*id, expr.span),
            ExprKind::Param(p) => {
                self.seen.insert(Variable::Param(*p));
                self.capture(Variable::Param(*p), expr.span);
            }
            ExprKind::This | ExprKind::Base => self.read(Variable::This, expr.span),
            ExprKind::Field { receiver, .. } => {
                if let Some(r) = receiver {
                    self.expr(r);
                }
            }
            ExprKind::Index { array, index } => {
                self.expr(array);
                self.expr(index);
            }
            ExprKind::Call { receiver, args, .. } => {
                if let Some(r) = receiver {
                    self.expr(r);
                }
                let mut out_locals = Vec::new();
                for arg in args {
                    match (arg.ref_kind, arg.expr.as_local()) {
                        (coro_ast::RefKind::Out, Some(local)) => out_locals.push(local),
                        _ => self.expr(&arg.expr),
                    }
                }
                for local in out_locals {
                    self.assign_local(local);
                }
            }
            ExprKind::Binary { op, left, right } => {
                self.expr(left);
                if matches!(op, coro_ast::BinOp::And | coro_ast::BinOp::Or) {
                    let before = self.state.clone();
                    self.expr(right);
                    self.state.join(&before);
                } else {
                    self.expr(right);
                }
            }
            ExprKind::Unary { operand, .. } => self.expr(operand),
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
                ..
            } => {
                self.expr(cond);
                let before = self.state.clone();
                self.expr(then_expr);
                let after_then = std::mem::replace(&mut self.state, before);
                self.expr(else_expr);
                self.state.join(&after_then);
            }
            ExprKind::Assign {
                target,
                value,
                is_ref,
            } => self.assignment(target, value, *is_ref),
            ExprKind::Await(operand) => {
                self.expr(operand);
                self.suspend();
            }
            ExprKind::Sequence {
                locals,
                side_effects,
                value,
            } => {
                for &local in locals {
                    self.seen.insert(Variable::Local(local));
                }
                for e in side_effects {
                    self.expr(e);
                }
                self.expr(value);
            }
            ExprKind::New { args } | ExprKind::NewArray(args) | ExprKind::Intrinsic { args, .. } => {
                for arg in args {
                    self.expr(arg);
                }
            }
            ExprKind::Shared(inner) => self.expr(inner),
        }
    }

    fn assignment(&mut self, target: &Expr, value: &Expr, is_ref: bool) {
        match &target.peel().kind {
            ExprKind::Local(id) => {
                let id = *id;
                if is_ref {
                    if let Some(root) = self.place_root(value) {
                        let roots = self.ref_roots.entry(id).or_default();
                        if !roots.contains(&root) {
                            roots.push(root);
                        }
                    }
                }
                self.expr(value);
                let through_ref = self
                    .locals
                    .get(id)
                    .is_some_and(|l| l.ref_kind.is_by_ref() && !is_ref);
                if self.method.frame_capture(id).is_some() || through_ref {
                    // Storing through a reference or a frame reads the
                    // reference or the frame.
                    self.read_local(id, target.span);
                } else {
                    self.assign_local(id);
                }
            }
            ExprKind::Param(p) => {
                self.expr(value);
                self.seen.insert(Variable::Param(*p));
                self.capture(Variable::Param(*p), target.span);
            }
            ExprKind::Field { receiver, .. } => {
                if let Some(r) = receiver {
                    self.expr(r);
                }
                self.expr(value);
            }
            ExprKind::Index { array, index } => {
                self.expr(array);
                self.expr(index);
                self.expr(value);
            }
            _ => {
                self.expr(target);
                self.expr(value);
            }
        }
    }

    /// Variable whose storage a by-ref expression points into. Array
    /// elements and class fields live on the heap and have no root.
    fn place_root(&self, expr: &Expr) -> Option<(Variable, Span)> {
        let expr = expr.peel();
        match &expr.kind {
            ExprKind::Local(id) if self.method.frame_capture(*id).is_some() => {
                Some((Variable::This, expr.span))
            }
            ExprKind::Local(id) => Some((Variable::Local(*id), expr.span)),
            ExprKind::Param(p) => Some((Variable::Param(*p), expr.span)),
            ExprKind::This | ExprKind::Base => Some((Variable::This, expr.span)),
            ExprKind::Field {
                receiver: Some(receiver),
                ..
            } if receiver.ty.is_struct() => self.place_root(receiver),
            _ => None,
        }
    }

    fn report_disallowed(&self, diagnostics: &mut LowerDiagnostics) {
        for (var, sites) in &self.disallowed {
            let Some(ty) = self.method.variable_type(self.locals, *var) else {
                continue;
            };
            let spill = match var {
                Variable::Local(l) => self
                    .locals
                    .get(*l)
                    .filter(|local| local.kind == SynthesizedKind::Spill),
                _ => None,
            };
            match spill {
                Some(local) => diagnostics.report(
                    LowerErrorKind::RefLikeSpill { ty: ty.to_string() },
                    local.span,
                ),
                None => {
                    let declared = match var {
                        Variable::Local(l) => self.locals.get(*l).map(|local| local.span),
                        _ => None,
                    };
                    for span in sites {
                        let kind = LowerErrorKind::RefLikeCapture {
                            ty: ty.to_string(),
                            declared,
                        };
                        diagnostics.report(kind, *span);
                    }
                }
            }
        }
    }
}

/// Collects references a `finally` makes to variables declared outside it.
struct OutsideVariables<'a> {
    method: &'a MethodSymbol,
    declared: HashSet<LocalId>,
    found: Vec<(Variable, Span)>,
}

impl Visitor for OutsideVariables<'_> {
    fn visit_block(&mut self, block: &Block) {
        self.declared.extend(block.locals.iter().copied());
        visit::walk_block(self, block);
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        if let StmtKind::Try { catches, .. } = &stmt.kind {
            self.declared.extend(catches.iter().filter_map(|c| c.local));
        }
        visit::walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Local(id) if self.method.frame_capture(*id).is_some() => {
                self.found.push((Variable::This, expr.span));
            }
            ExprKind::Local(id) if !self.declared.contains(id) => {
                self.found.push((Variable::Local(*id), expr.span));
            }
            ExprKind::Param(p) => self.found.push((Variable::Param(*p), expr.span)),
            ExprKind::This | ExprKind::Base => self.found.push((Variable::This, expr.span)),
            ExprKind::Sequence { locals, .. } => {
                self.declared.extend(locals.iter().copied());
            }
            _ => {}
        }
        visit::walk_expr(self, expr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coro_ast::{Block, MethodBuilder, MethodKind, RefKind, Type};

    fn analyze_release(method: &MethodSymbol, body: &MethodBody) -> (CaptureAnalysis, LowerDiagnostics) {
        let mut diags = LowerDiagnostics::new();
        let result = analyze(method, body, &LowerOptions::release(), &mut diags);
        (result, diags)
    }

    fn print_call(b: &MethodBuilder, arg: Expr) -> Stmt {
        b.f.expr_stmt(b.f.call(None, "print", vec![arg], Type::Void))
    }

    #[test]
    fn read_after_await_is_captured() {
        let mut b = MethodBuilder::new("m", MethodKind::Async, Type::task(Type::Int));
        let x = b.local("x", Type::Int);
        let init = b.f.assign_stmt(b.f.local(x), b.f.int(1));
        let wait = b.await_stmt(b.yield_task());
        let ret = b.f.ret(Some(b.f.local(x)));
        let (method, body) = b.finish(vec![x], vec![init, wait, ret]);

        let (result, diags) = analyze_release(&method, &body);
        assert!(result.contains(Variable::Local(x)), "x should be hoisted (read after await)");
        assert!(!diags.has_errors());
    }

    #[test]
    fn local_between_suspensions_stays_on_stack_in_release() {
        let mut b = MethodBuilder::new("m", MethodKind::Async, Type::task(Type::Void));
        let y = b.local("y", Type::Int);
        let first = b.await_stmt(b.yield_task());
        let init = b.f.assign_stmt(b.f.local(y), b.f.int(5));
        let use_y = print_call(&b, b.f.local(y));
        let second = b.await_stmt(b.yield_task());
        let (method, body) = b.finish(vec![y], vec![first, init, use_y, second]);

        let (release, _) = analyze_release(&method, &body);
        assert!(!release.contains(Variable::Local(y)), "y never crosses a suspension");

        let mut diags = LowerDiagnostics::new();
        let debug = analyze(&method, &body, &LowerOptions::debug(), &mut diags);
        assert!(debug.contains(Variable::Local(y)), "debug builds hoist every user local");
    }

    #[test]
    fn parameters_are_captured_when_referenced() {
        let mut b = MethodBuilder::new("m", MethodKind::Async, Type::task(Type::Int));
        let p = b.param("p", Type::Int);
        let unused = b.param("unused", Type::Int);
        let ret = b.f.ret(Some(b.param_expr(p)));
        let (method, body) = b.finish(vec![], vec![ret]);

        let (result, _) = analyze_release(&method, &body);
        assert!(result.contains(Variable::Param(p)));
        assert!(!result.contains(Variable::Param(unused)));
    }

    #[test]
    fn struct_receiver_is_always_hoisted() {
        let point = Type::struct_of("Point", vec![("x", Type::Int)]);
        let b = MethodBuilder::new("m", MethodKind::Async, Type::task(Type::Void)).instance_of(point);
        let (method, body) = b.finish(vec![], vec![]);
        let (result, _) = analyze_release(&method, &body);
        assert_eq!(result.hoisted.iter().copied().collect::<Vec<_>>(), vec![Variable::This]);
    }

    #[test]
    fn class_receiver_only_when_used() {
        let b = MethodBuilder::new("m", MethodKind::Async, Type::task(Type::Void)).instance_of(Type::class("C"));
        let (method, body) = b.finish(vec![], vec![]);
        let (result, _) = analyze_release(&method, &body);
        assert!(result.is_empty());
    }

    #[test]
    fn back_edge_reaches_fixpoint() {
        // x = 1; L: print(x); await; goto L;
        let mut b = MethodBuilder::new("m", MethodKind::Async, Type::task(Type::Void));
        let x = b.local("x", Type::Int);
        let head = b.label();
        let init = b.f.assign_stmt(b.f.local(x), b.f.int(1));
        let use_x = print_call(&b, b.f.local(x));
        let wait = b.await_stmt(b.yield_task());
        let stmts = vec![init, b.f.label(head), use_x, wait, b.f.goto(head)];
        let (method, body) = b.finish(vec![x], stmts);

        let (result, _) = analyze_release(&method, &body);
        assert!(result.contains(Variable::Local(x)), "x is read after the back edge from the await");
    }

    #[test]
    fn finally_after_suspension_captures_outside_variables() {
        // w is written then read inside the finally: dataflow alone would
        // keep it on the stack.
        let mut b = MethodBuilder::new("m", MethodKind::Async, Type::task(Type::Void));
        let w = b.local("w", Type::Int);
        let inner = b.local("inner", Type::Int);
        let wait = b.await_stmt(b.yield_task());
        let fin = Block::new(
            vec![inner],
            vec![
                b.f.assign_stmt(b.f.local(w), b.f.int(1)),
                b.f.assign_stmt(b.f.local(inner), b.f.local(w)),
                print_call(&b, b.f.local(inner)),
            ],
        );
        let try_stmt = b.f.try_stmt(Block::new(vec![], vec![wait]), vec![], Some(fin));
        let (method, body) = b.finish(vec![w], vec![try_stmt]);

        let (result, _) = analyze_release(&method, &body);
        assert!(result.contains(Variable::Local(w)), "w is used in a finally after a suspension");
        assert!(!result.contains(Variable::Local(inner)), "locals of the finally itself stay local");
    }

    #[test]
    fn finally_without_suspension_is_plain_dataflow() {
        let mut b = MethodBuilder::new("m", MethodKind::Async, Type::task(Type::Void));
        let w = b.local("w", Type::Int);
        let fin = Block::new(
            vec![],
            vec![
                b.f.assign_stmt(b.f.local(w), b.f.int(1)),
                print_call(&b, b.f.local(w)),
            ],
        );
        let try_stmt = b.f.try_stmt(Block::default(), vec![], Some(fin));
        let wait = b.await_stmt(b.yield_task());
        let (method, body) = b.finish(vec![w], vec![try_stmt, wait]);

        let (result, _) = analyze_release(&method, &body);
        assert!(!result.contains(Variable::Local(w)));
    }

    #[test]
    fn ref_like_capture_reported_per_use_site() {
        let mut b = MethodBuilder::new("m", MethodKind::Async, Type::task(Type::Void));
        let s = b.local("s", Type::ref_like("Span"));
        let init = b.f.assign_stmt(b.f.local(s), b.f.default(Type::ref_like("Span")));
        let wait = b.await_stmt(b.yield_task());
        let use1 = print_call(&b, b.f.local(s));
        // Declaring something moves the builder to a fresh span.
        b.local("spacer", Type::Int);
        let use2 = print_call(&b, b.f.local(s));
        let (method, body) = b.finish(vec![s], vec![init, wait, use1, use2]);

        let (result, diags) = analyze_release(&method, &body);
        assert!(!result.contains(Variable::Local(s)), "stack-only locals are never hoisted");
        assert_eq!(diags.errors().len(), 2);
        assert!(diags
            .errors()
            .iter()
            .all(|e| matches!(e.kind, LowerErrorKind::RefLikeCapture { .. })));
    }

    #[test]
    fn ref_like_spill_reported_once_at_declaration() {
        let mut b = MethodBuilder::new("m", MethodKind::Async, Type::task(Type::Void));
        let spill = b.synthesized(Type::ref_like("Span"), SynthesizedKind::Spill);
        let decl_span = body_local_span(&b, spill);
        let init = b.f.assign_stmt(b.f.local(spill), b.f.default(Type::ref_like("Span")));
        let wait = b.await_stmt(b.yield_task());
        let use1 = print_call(&b, b.f.local(spill));
        let use2 = print_call(&b, b.f.local(spill));
        let (method, body) = b.finish(vec![spill], vec![init, wait, use1, use2]);

        let (_, diags) = analyze_release(&method, &body);
        assert_eq!(diags.errors().len(), 1);
        assert!(matches!(diags.errors()[0].kind, LowerErrorKind::RefLikeSpill { .. }));
        assert_eq!(diags.errors()[0].span, decl_span);
    }

    fn body_local_span(b: &MethodBuilder, id: LocalId) -> Span {
        b.f.locals.get(id).map(|l| l.span).unwrap_or_default()
    }

    #[test]
    fn order_is_first_use() {
        let mut b = MethodBuilder::new("m", MethodKind::Async, Type::task(Type::Void));
        let a = b.local("a", Type::Int);
        let z = b.local("z", Type::Int);
        let init_a = b.f.assign_stmt(b.f.local(a), b.f.int(1));
        let init_z = b.f.assign_stmt(b.f.local(z), b.f.int(2));
        let wait = b.await_stmt(b.yield_task());
        let use_z = print_call(&b, b.f.local(z));
        let use_a = print_call(&b, b.f.local(a));
        let (method, body) = b.finish(vec![a, z], vec![init_a, init_z, wait, use_z, use_a]);

        let (result, _) = analyze_release(&method, &body);
        let order: Vec<Variable> = result.hoisted.iter().copied().collect();
        assert_eq!(order, vec![Variable::Local(z), Variable::Local(a)]);
    }

    #[test]
    fn ref_local_written_through_after_await_is_captured() {
        let mut b = MethodBuilder::new("m", MethodKind::Async, Type::task(Type::Void));
        let arr = b.local("arr", Type::array(Type::Int));
        let r = b.ref_local(Some("r"), Type::Int, SynthesizedKind::UserDefined, RefKind::Ref);
        let init_arr = b.f.assign_stmt(b.f.local(arr), b.f.new_array(Type::Int, vec![b.f.int(0)]));
        let bind = b.f.expr_stmt(b.f.ref_assign(b.f.local(r), b.f.index(b.f.local(arr), b.f.int(0))));
        let wait = b.await_stmt(b.yield_task());
        let write = b.f.assign_stmt(b.f.local(r), b.f.int(7));
        let (method, body) = b.finish(vec![arr, r], vec![init_arr, bind, wait, write]);

        let (result, _) = analyze_release(&method, &body);
        assert!(result.contains(Variable::Local(r)));
        assert!(!result.contains(Variable::Local(arr)), "arr is only read before the await");
    }

    #[test]
    fn ref_local_referent_is_hoisted_with_it() {
        let mut b = MethodBuilder::new("m", MethodKind::Async, Type::task(Type::Void));
        let y = b.local("y", Type::Int);
        let r = b.ref_local(Some("r"), Type::Int, SynthesizedKind::UserDefined, RefKind::Ref);
        let init = b.f.assign_stmt(b.f.local(y), b.f.int(1));
        let bind = b.f.expr_stmt(b.f.ref_assign(b.f.local(r), b.f.local(y)));
        let wait = b.await_stmt(b.yield_task());
        let read = print_call(&b, b.f.local(r));
        let (method, body) = b.finish(vec![y, r], vec![init, bind, wait, read]);

        let (result, _) = analyze_release(&method, &body);
        assert!(result.contains(Variable::Local(r)));
        assert!(result.contains(Variable::Local(y)), "r points at y");
    }

    #[test]
    fn frame_variables_capture_the_receiver() {
        let mut b = MethodBuilder::new("lambda", MethodKind::Async, Type::task(Type::Int))
            .instance_of(Type::class("Frame"));
        let y = b.frame_local("y", Type::Int);
        let wait = b.await_stmt(b.yield_task());
        let ret = b.f.ret(Some(b.f.local(y)));
        let (method, body) = b.finish(vec![], vec![wait, ret]);

        let (result, _) = analyze_release(&method, &body);
        assert!(result.contains(Variable::This));
        assert!(!result.contains(Variable::Local(y)));
    }
}
