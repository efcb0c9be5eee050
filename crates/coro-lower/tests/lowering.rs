// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! End-to-end checks of the lowered shape: which fields the container gets,
//! how states are numbered and dispatched, and what survives recompilation.

use coro_ast::{Expr, MethodBody, MethodBuilder, MethodKind, MethodSymbol, RefKind, Stmt, Type, Variable};
use coro_lower::{
    lower_state_machine, GenerationSnapshot, LowerErrorKind, LowerOptions, LowerOutcome,
    LowerResult, LoweredStateMachine, PreviousGeneration, StateMachineState,
};

fn print(b: &MethodBuilder, arg: Expr) -> Stmt {
    b.f.expr_stmt(b.f.call(None, "print", vec![arg], Type::Void))
}

fn lower(method: &MethodSymbol, body: &MethodBody, options: LowerOptions) -> LowerResult {
    lower_state_machine(method, body, &options, None)
}

fn lowered(result: &LowerResult) -> &LoweredStateMachine {
    match result.lowered() {
        Some(machine) => machine,
        None => panic!("method was not lowered"),
    }
}

fn step_text(machine: &LoweredStateMachine) -> String {
    machine.container.step().expect("MoveNext").body.to_string()
}

fn field_names(machine: &LoweredStateMachine) -> Vec<String> {
    machine.container.fields.iter().map(|f| f.name.to_string()).collect()
}

/// `x = 1; await yield; return x;`
fn single_await() -> (MethodSymbol, MethodBody) {
    let mut b = MethodBuilder::new("M", MethodKind::Async, Type::task(Type::Int));
    let x = b.local("x", Type::Int);
    let init = b.f.assign_stmt(b.f.local(x), b.f.int(1));
    let wait = b.await_stmt(b.yield_task());
    let ret = b.f.ret(Some(b.f.local(x)));
    b.finish(vec![x], vec![init, wait, ret])
}

// ── Async ───────────────────────────────────────────────────────────

#[test]
fn single_await_gets_one_state_and_hoists_x() {
    let (method, body) = single_await();
    let result = lower(&method, &body, LowerOptions::release());
    assert!(!result.has_errors());
    let machine = lowered(&result);

    assert_eq!(machine.state_debug_info.len(), 1);
    assert_eq!(machine.state_debug_info[0].state, StateMachineState(0));
    assert_eq!(&*machine.container.name, "M$sm0");
    assert!(machine.captured.contains(Variable::Local(coro_ast::LocalId(0))));

    let fields = field_names(machine);
    assert!(fields.contains(&"$state".to_string()), "{:?}", fields);
    assert!(fields.contains(&"$builder".to_string()), "{:?}", fields);
    assert!(fields.contains(&"x$r0".to_string()), "{:?}", fields);
    assert!(fields.contains(&"$awaiter0".to_string()), "{:?}", fields);

    let text = step_text(machine);
    assert!(text.contains("case 0: goto"), "{}", text);
    assert!(text.contains("this.x$r0 = 1;"), "{}", text);
    assert!(text.contains("@await_on_completed(this.$builder"), "{}", text);
    assert!(text.contains("@set_exception(this.$builder"), "{}", text);
    assert!(text.contains("@set_result(this.$builder, $ret"), "{}", text);

    let kickoff = machine.kickoff.to_string();
    assert!(kickoff.contains("@start("), "{}", kickoff);
    assert!(kickoff.contains(".$state = -1;"), "{}", kickoff);
    assert!(kickoff.contains("return @builder_task("), "{}", kickoff);
}

#[test]
fn release_keeps_locals_that_do_not_cross_a_suspension_on_the_stack() {
    let mut b = MethodBuilder::new("M", MethodKind::Async, Type::task(Type::Void));
    let y = b.local("y", Type::Int);
    let init = b.f.assign_stmt(b.f.local(y), b.f.int(5));
    let use_y = print(&b, b.f.local(y));
    let wait = b.await_stmt(b.yield_task());
    let (method, body) = b.finish(vec![y], vec![init, use_y, wait]);

    let release = lower(&method, &body, LowerOptions::release());
    let machine = lowered(&release);
    assert!(!field_names(machine).iter().any(|n| n.starts_with("y$")));
    assert!(step_text(machine).contains("{ let y;"));

    let debug = lower(&method, &body, LowerOptions::debug());
    let machine = lowered(&debug);
    let fields = field_names(machine);
    assert!(fields.iter().any(|n| n.starts_with("y$h")), "{:?}", fields);
}

#[test]
fn captured_parameter_gets_a_proxy() {
    let mut b = MethodBuilder::new("M", MethodKind::Async, Type::task(Type::Int));
    let p = b.param("p", Type::Int);
    let wait = b.await_stmt(b.yield_task());
    let ret = b.f.ret(Some(b.param_expr(p)));
    let (method, body) = b.finish(Vec::new(), vec![wait, ret]);

    let result = lower(&method, &body, LowerOptions::release());
    let machine = lowered(&result);
    assert!(field_names(machine).contains(&"$p".to_string()));
    assert!(machine.kickoff.to_string().contains(".$p = arg0;"));
    assert!(step_text(machine).contains("$ret") && step_text(machine).contains("this.$p"));
}

#[test]
fn instance_receiver_is_proxied() {
    let owner = Type::class("Widget");
    let count = std::rc::Rc::new(coro_ast::FieldSymbol::instance(owner.clone(), "count", Type::Int));
    let mut b = MethodBuilder::new("M", MethodKind::Async, Type::task(Type::Int)).instance_of(owner);
    let wait = b.await_stmt(b.yield_task());
    let ret = b.f.ret(Some(b.f.field(b.this(), &count)));
    let (method, body) = b.finish(Vec::new(), vec![wait, ret]);

    let result = lower(&method, &body, LowerOptions::release());
    let machine = lowered(&result);
    assert!(field_names(machine).contains(&"$this".to_string()));
    assert!(machine.kickoff.to_string().contains(".$this = this;"));
    // Release builds read the proxy once per step.
    assert!(step_text(machine).contains(".count"));
    assert!(step_text(machine).contains("= this.$this;"));
}

// ── Field reuse ─────────────────────────────────────────────────────

/// Two blocks, each with an int local that lives across an await, or one
/// block where both are live at once.
fn scoped_locals(overlapping: bool) -> (MethodSymbol, MethodBody) {
    let mut b = MethodBuilder::new("M", MethodKind::Async, Type::task(Type::Void));
    let a = b.local("a", Type::Int);
    let c = b.local("c", Type::Int);
    let mut first = vec![b.f.assign_stmt(b.f.local(a), b.f.int(1))];
    first.push(b.await_stmt(b.yield_task()));
    first.push(print(&b, b.f.local(a)));
    let mut second = vec![b.f.assign_stmt(b.f.local(c), b.f.int(2))];
    second.push(b.await_stmt(b.yield_task()));
    second.push(print(&b, b.f.local(c)));

    let stmts = if overlapping {
        let mut all = first;
        all.extend(second);
        all.push(print(&b, b.f.local(a)));
        vec![b.f.block(vec![a, c], all)]
    } else {
        vec![b.f.block(vec![a], first), b.f.block(vec![c], second)]
    };
    b.finish(Vec::new(), stmts)
}

#[test]
fn disjoint_scopes_share_a_field() {
    let (method, body) = scoped_locals(false);
    let result = lower(&method, &body, LowerOptions::release());
    let machine = lowered(&result);

    let pooled: Vec<String> = field_names(machine).into_iter().filter(|n| n.contains("$r")).collect();
    assert_eq!(pooled, vec!["a$r0".to_string()]);
    let text = step_text(machine);
    assert!(text.contains("this.a$r0 = 2;"), "{}", text);
}

#[test]
fn overlapping_scopes_get_distinct_fields() {
    let (method, body) = scoped_locals(true);
    let result = lower(&method, &body, LowerOptions::release());
    let machine = lowered(&result);

    let pooled: Vec<String> = field_names(machine).into_iter().filter(|n| n.contains("$r")).collect();
    assert_eq!(pooled.len(), 2, "{:?}", pooled);
}

#[test]
fn scope_exit_clears_fields_holding_references() {
    let mut b = MethodBuilder::new("M", MethodKind::Async, Type::task(Type::Void));
    let s = b.local("s", Type::String);
    let init = b.f.assign_stmt(b.f.local(s), b.f.string("hi"));
    let wait = b.await_stmt(b.yield_task());
    let use_s = print(&b, b.f.local(s));
    let inner = b.f.block(vec![s], vec![init, wait, use_s]);
    let (method, body) = b.finish(Vec::new(), vec![inner]);

    let result = lower(&method, &body, LowerOptions::release());
    let text = step_text(lowered(&result));
    assert!(text.contains("this.s$r0 = default(string);"), "{}", text);
}

// ── Edit and continue ───────────────────────────────────────────────

fn two_awaits(keep_first: bool) -> (MethodSymbol, MethodBody) {
    let mut b = MethodBuilder::new("M", MethodKind::Async, Type::task(Type::Int));
    let x = b.local("x", Type::Int);
    let mut stmts = vec![b.f.assign_stmt(b.f.local(x), b.f.int(1))];
    if keep_first {
        b.at(500);
        stmts.push(b.await_stmt(b.yield_task()));
    }
    b.at(600);
    stmts.push(b.await_stmt(b.yield_task()));
    stmts.push(b.f.ret(Some(b.f.local(x))));
    b.finish(vec![x], stmts)
}

#[test]
fn recompiling_unchanged_method_reproduces_layout() {
    let (method, body) = two_awaits(true);
    let first = lower(&method, &body, LowerOptions::debug());
    let snapshot = lowered(&first).snapshot();
    assert_eq!(snapshot.states.len(), 2);
    assert!(!snapshot.hoisted_slots.is_empty());
    assert_eq!(snapshot.awaiter_slots.len(), 1);

    let persisted = GenerationSnapshot::from_json(&snapshot.to_json().expect("serialize")).expect("parse");
    let previous: &dyn PreviousGeneration = &persisted;
    let second = lower_state_machine(&method, &body, &LowerOptions::debug(), Some(previous));
    assert_eq!(lowered(&second).snapshot(), snapshot);
    assert_eq!(field_names(lowered(&first)), field_names(lowered(&second)));
}

#[test]
fn removed_await_leaves_a_guard_for_its_state() {
    let (method, body) = two_awaits(true);
    let first = lower(&method, &body, LowerOptions::debug());
    let snapshot = lowered(&first).snapshot();

    let (method, body) = two_awaits(false);
    let second = lower_state_machine(&method, &body, &LowerOptions::debug(), Some(&snapshot));
    let machine = lowered(&second);

    // The surviving await keeps state 1; state 0 is gone.
    assert_eq!(machine.state_debug_info.len(), 1);
    assert_eq!(machine.state_debug_info[0].state, StateMachineState(1));
    let text = step_text(machine);
    assert!(text.contains(">= 0))"), "{}", text);
    assert!(text.contains("@resume_error("), "{}", text);
    assert!(text.contains(", -2)"), "{}", text);
}

#[test]
fn new_await_numbers_past_the_previous_range() {
    let (method, body) = two_awaits(false);
    let first = lower(&method, &body, LowerOptions::debug());
    let snapshot = lowered(&first).snapshot();
    assert_eq!(snapshot.first_unused_increasing, Some(StateMachineState(1)));

    let (method, body) = two_awaits(true);
    let second = lower_state_machine(&method, &body, &LowerOptions::debug(), Some(&snapshot));
    let mut states: Vec<i32> = lowered(&second).state_debug_info.iter().map(|s| s.state.0).collect();
    states.sort();
    assert_eq!(states, vec![0, 1]);
    let text = step_text(lowered(&second));
    assert!(!text.contains("@resume_error("), "{}", text);
}

/// Debug-mode method declaring one local per `(name, offset)`, all live
/// across a single await.
fn locals_at(decls: &[(&str, usize)]) -> (MethodSymbol, MethodBody) {
    let mut b = MethodBuilder::new("M", MethodKind::Async, Type::task(Type::Int));
    let mut locals = Vec::new();
    let mut stmts = Vec::new();
    for &(name, offset) in decls {
        b.at(offset);
        let local = b.local(name, Type::Int);
        stmts.push(b.f.assign_stmt(b.f.local(local), b.f.int(1)));
        locals.push(local);
    }
    b.at(900);
    stmts.push(b.await_stmt(b.yield_task()));
    stmts.push(b.f.ret(Some(b.f.local(locals[0]))));
    b.finish(locals, stmts)
}

fn slot_of(machine: &LoweredStateMachine, name: &str) -> Option<i32> {
    machine
        .hoisted_slots
        .iter()
        .find(|f| f.name.starts_with(&format!("{}$", name)))
        .and_then(|f| f.slot.as_ref())
        .map(|s| s.index)
}

#[test]
fn slots_of_deleted_locals_are_not_handed_out_again() {
    let (method, body) = locals_at(&[("x", 100), ("y", 200)]);
    let first = lower(&method, &body, LowerOptions::debug());
    assert_eq!(slot_of(lowered(&first), "y"), Some(1));
    let snapshot = lowered(&first).snapshot();

    // `y` deleted: the snapshot still remembers its slot was taken.
    let (method, body) = locals_at(&[("x", 100)]);
    let second = lower_state_machine(&method, &body, &LowerOptions::debug(), Some(&snapshot));
    let snapshot = lowered(&second).snapshot();
    assert_eq!(snapshot.hoisted_slots.len(), 1);
    assert_eq!(PreviousGeneration::hoisted_slot_count(&snapshot), 2);

    // A new local lands above every slot an older layout used.
    let (method, body) = locals_at(&[("x", 100), ("z", 300)]);
    let third = lower_state_machine(&method, &body, &LowerOptions::debug(), Some(&snapshot));
    assert_eq!(slot_of(lowered(&third), "x"), Some(0));
    assert_eq!(slot_of(lowered(&third), "z"), Some(2));
}

// ── Protected regions ───────────────────────────────────────────────

#[test]
fn await_in_try_dispatches_through_the_try() {
    let mut b = MethodBuilder::new("M", MethodKind::Async, Type::task(Type::Void));
    let wait = b.await_stmt(b.yield_task());
    let try_body = coro_ast::Block::new(Vec::new(), vec![wait]);
    let cleanup = coro_ast::Block::new(Vec::new(), vec![print(&b, b.f.string("finally"))]);
    let guarded = b.f.try_stmt(try_body, Vec::new(), Some(cleanup));
    let (method, body) = b.finish(Vec::new(), vec![guarded]);

    let result = lower(&method, &body, LowerOptions::release());
    let text = step_text(lowered(&result));
    let lines: Vec<&str> = text.lines().map(str::trim).collect();

    let outer_case = lines
        .iter()
        .find(|l| l.starts_with("case 0: goto "))
        .expect("outer dispatch");
    let label = outer_case.trim_start_matches("case 0: goto ").trim_end_matches(';');
    let at = lines
        .iter()
        .position(|l| *l == format!("{}:", label))
        .expect("pre-try label");
    assert_eq!(lines[at + 1], "try", "{}", text);
    assert_eq!(lines[at + 2], "{", "{}", text);
    assert!(lines[at + 3].starts_with("switch ("), "{}", text);

    // The finally only runs when the step isn't suspending.
    assert!(text.contains("< 0))"), "{}", text);
}

/// `try { await; try { await } finally {..}; await } finally {..}`
fn nested_tries() -> (MethodSymbol, MethodBody) {
    let mut b = MethodBuilder::new("M", MethodKind::Async, Type::task(Type::Void));
    let outer_wait = b.await_stmt(b.yield_task());
    let inner_wait = b.await_stmt(b.yield_task());
    let last_wait = b.await_stmt(b.yield_task());
    let inner = b.f.try_stmt(
        coro_ast::Block::new(Vec::new(), vec![inner_wait]),
        Vec::new(),
        Some(coro_ast::Block::new(Vec::new(), vec![print(&b, b.f.string("fin-inner"))])),
    );
    let outer = b.f.try_stmt(
        coro_ast::Block::new(Vec::new(), vec![outer_wait, inner, last_wait]),
        Vec::new(),
        Some(coro_ast::Block::new(Vec::new(), vec![print(&b, b.f.string("fin-outer"))])),
    );
    b.finish(Vec::new(), vec![outer])
}

/// `(line index, states, label)` of every dispatch case.
fn dispatch_cases(lines: &[&str]) -> Vec<(usize, Vec<i32>, String)> {
    lines
        .iter()
        .enumerate()
        .filter_map(|(at, line)| {
            let rest = line.strip_prefix("case ")?;
            let (values, label) = rest.split_once(": goto ")?;
            let states = values.split(", ").filter_map(|v| v.parse().ok()).collect();
            Some((at, states, label.trim_end_matches(';').to_string()))
        })
        .collect()
}

#[test]
fn nested_try_dispatch_goes_through_each_pre_try_label() {
    let (method, body) = nested_tries();
    let result = lower(&method, &body, LowerOptions::release());
    let text = step_text(lowered(&result));
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let cases = dispatch_cases(&lines);

    // The inner await's state is routed outer switch -> outer try ->
    // inner try -> resume label, one entry per table.
    let inner_state = 1;
    let hops: Vec<&(usize, Vec<i32>, String)> = cases.iter().filter(|c| c.1.contains(&inner_state)).collect();
    assert_eq!(hops.len(), 3, "{}", text);

    let mut switch_cases = Vec::new();
    for pair in hops.windows(2) {
        let at = lines
            .iter()
            .position(|l| *l == format!("{}:", pair[0].2))
            .expect("pre-try label");
        assert_eq!(lines[at + 1], "try", "{}", text);
        assert!(lines[at + 3].starts_with("switch ("), "{}", text);
        // The next hop is a case of the switch right after this label.
        let next = pair[1].0;
        assert!(next > at + 3, "{}", text);
        assert!(lines[at + 4..=next].iter().all(|l| l.starts_with("case ")), "{}", text);
        switch_cases.push(
            cases
                .iter()
                .filter(|c| c.0 > at + 3 && lines[at + 4..=c.0].iter().all(|l| l.starts_with("case ")))
                .map(|c| c.1.clone())
                .collect::<Vec<_>>(),
        );
    }
    let resume = lines
        .iter()
        .position(|l| *l == format!("{}:", hops[2].2))
        .expect("resume label");
    assert_ne!(lines[resume + 1], "try", "{}", text);

    // The outer switch sends all three states to the outer try, which
    // splits them; the inner switch knows only its own state.
    let mut outermost = cases[0].1.clone();
    outermost.sort();
    assert_eq!(outermost, vec![0, 1, 2], "{}", text);
    assert_eq!(switch_cases[0], vec![vec![0], vec![1], vec![2]], "{}", text);
    assert_eq!(switch_cases[1], vec![vec![inner_state]], "{}", text);
}

// ── Ref locals ──────────────────────────────────────────────────────

#[test]
fn rebinding_a_hoisted_ref_clears_its_old_spill() {
    let mut b = MethodBuilder::new("M", MethodKind::Async, Type::task(Type::Int));
    let r = b.ref_local(Some("r"), Type::Int, coro_ast::SynthesizedKind::UserDefined, RefKind::Ref);
    let element = |b: &MethodBuilder| b.f.index(b.f.call(None, "make", Vec::new(), Type::array(Type::Int)), b.f.int(0));
    let first = b.f.expr_stmt(b.f.ref_assign(b.f.local(r), element(&b)));
    let wait = b.await_stmt(b.yield_task());
    let use_r = print(&b, b.f.local(r));
    let second = b.f.expr_stmt(b.f.ref_assign(b.f.local(r), element(&b)));
    let wait_again = b.await_stmt(b.yield_task());
    let ret = b.f.ret(Some(b.f.local(r)));
    let (method, body) = b.finish(vec![r], vec![first, wait, use_r, second, wait_again, ret]);

    let result = lower(&method, &body, LowerOptions::release());
    assert!(!result.has_errors(), "{:?}", result.diagnostics);
    let text = step_text(lowered(&result));

    let calls: Vec<usize> = text.match_indices("make(").map(|(at, _)| at).collect();
    assert_eq!(calls.len(), 2, "{}", text);
    // `<field> = make()` of the first binding.
    let before = text[..calls[0]].strip_suffix(" = ").expect("spilled array");
    let field = before
        .rsplit(|c: char| c == '(' || c.is_whitespace())
        .next()
        .expect("field");
    let clear = format!("{} = default(int[])", field);
    assert!(text[calls[1]..].contains(&clear), "{}", text);
}

// ── Errors ──────────────────────────────────────────────────────────

#[test]
fn ref_local_bound_to_ref_returning_call_is_an_error() {
    let mut b = MethodBuilder::new("M", MethodKind::Async, Type::task(Type::Int));
    let r = b.ref_local(Some("r"), Type::Int, coro_ast::SynthesizedKind::UserDefined, RefKind::Ref);
    let call = b.f.call_with(None, "slot", Vec::new(), Type::Int, RefKind::Ref);
    let bind = b.f.expr_stmt(b.f.ref_assign(b.f.local(r), call));
    let wait = b.await_stmt(b.yield_task());
    let ret = b.f.ret(Some(b.f.local(r)));
    let (method, body) = b.finish(vec![r], vec![bind, wait, ret]);

    let result = lower(&method, &body, LowerOptions::release());
    assert!(result
        .diagnostics
        .iter()
        .any(|e| matches!(&e.kind, LowerErrorKind::RefReturningCallAcrossAwait { method } if method == "slot")));
}

#[test]
fn ref_like_local_across_await_is_an_error() {
    let mut b = MethodBuilder::new("M", MethodKind::Async, Type::task(Type::Void));
    let s = b.local("span", Type::ref_like("Span"));
    let init = b.f.assign_stmt(b.f.local(s), b.f.default(Type::ref_like("Span")));
    let wait = b.await_stmt(b.yield_task());
    let use_s = print(&b, b.f.local(s));
    let (method, body) = b.finish(vec![s], vec![init, wait, use_s]);

    let result = lower(&method, &body, LowerOptions::release());
    assert!(result.has_errors());
    assert!(result
        .diagnostics
        .iter()
        .all(|e| matches!(&e.kind, LowerErrorKind::RefLikeCapture { ty, .. } if ty == "Span")));
    // Lowering still produced a machine.
    assert!(result.lowered().is_some());
}

#[test]
fn body_with_errors_is_returned_untouched() {
    let (method, mut body) = single_await();
    body.has_errors = true;
    let result = lower(&method, &body, LowerOptions::release());
    assert!(matches!(result.outcome, LowerOutcome::Skipped(_)));
    assert!(result.diagnostics.is_empty());
}

// ── Iterators ───────────────────────────────────────────────────────

#[test]
fn iterator_states_count_up_from_one() {
    let mut b = MethodBuilder::new("Numbers", MethodKind::Iterator, Type::enumerator(Type::Int));
    let first = b.yield_return(b.f.int(1));
    let second = b.yield_return(b.f.int(2));
    let (method, body) = b.finish(Vec::new(), vec![first, second]);

    let result = lower(&method, &body, LowerOptions::release());
    let machine = lowered(&result);
    let states: Vec<i32> = machine.state_debug_info.iter().map(|s| s.state.0).collect();
    assert_eq!(states, vec![1, 2]);
    assert!(machine.container.method("Dispose").is_some());
    assert!(machine.container.field("$current").is_some());
    assert!(machine.container.field("$disposing").is_some());
    assert!(machine.kickoff.to_string().contains(".$state = 0;"));

    let text = step_text(machine);
    assert!(text.contains("case 0: goto"), "{}", text);
    assert!(text.contains("this.$current = 1;"), "{}", text);
    assert!(text.contains("if (this.$disposing)"), "{}", text);
}

#[test]
fn async_iterator_yields_count_down() {
    let mut b = MethodBuilder::new("Stream", MethodKind::AsyncIterator, Type::enumerator(Type::Int));
    let wait = b.await_stmt(b.yield_task());
    let first = b.yield_return(b.f.int(1));
    let second = b.yield_return(b.f.int(2));
    let (method, body) = b.finish(Vec::new(), vec![wait, first, second]);

    let result = lower(&method, &body, LowerOptions::release());
    let machine = lowered(&result);
    let states: Vec<i32> = machine.state_debug_info.iter().map(|s| s.state.0).collect();
    assert_eq!(states, vec![0, -4, -5]);
    assert_eq!(machine.first_unused_decreasing, Some(StateMachineState(-6)));
    assert!(machine.container.method("MoveNextAsync").is_some());
    assert!(machine.kickoff.to_string().contains(".$state = -3;"));
    assert!(step_text(machine).contains("@set_result(this.$builder, false)"));
}

#[test]
fn generic_method_fields_use_container_type_parameters() {
    let mut b = MethodBuilder::new("Echo", MethodKind::Async, Type::task(Type::Void));
    let t = b.type_param("T");
    let value = b.local("value", t.clone());
    let init = b.f.assign_stmt(b.f.local(value), b.f.default(t));
    let wait = b.await_stmt(b.yield_task());
    let use_value = print(&b, b.f.local(value));
    let (method, body) = b.finish(vec![value], vec![init, wait, use_value]);

    let result = lower(&method, &body, LowerOptions::release());
    let machine = lowered(&result);
    let field = machine.container.field("value$r0").expect("hoisted field");
    assert_eq!(field.ty.to_string(), "!T");
    assert_eq!(machine.container.type_params.len(), 1);
}
