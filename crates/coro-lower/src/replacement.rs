// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! What a hoisted variable turns into inside the step method.

use std::rc::Rc;

use coro_ast::{Expr, ExprKind, FieldSymbol, RefKind, Span, Type, Variable};
use indexmap::IndexMap;

use crate::error::LowerErrorKind;

/// Access to the receivers a replacement hangs off.
pub trait ReplacementResolver {
    /// Type of the state machine container (the step method's `this`).
    fn container_type(&self) -> &Type;

    /// Expression evaluating to the closure frame of type `frame_type`.
    fn frame_receiver(&self, frame_type: &Type, span: Span) -> Expr;
}

#[derive(Debug, Clone)]
pub enum SymbolReplacement {
    /// The variable lives in a closure frame reached through the receiver.
    Frame {
        frame_type: Type,
        field: Rc<FieldSymbol>,
    },
    StateMachineField {
        field: Rc<FieldSymbol>,
        reusable: bool,
    },
    /// A ref local decomposed into hoisted parts. Every use gets the same
    /// node.
    Expression {
        expr: Rc<Expr>,
        fields: Vec<Rc<FieldSymbol>>,
        reusable: bool,
    },
}

impl SymbolReplacement {
    pub fn replacement(&self, span: Span, resolver: &dyn ReplacementResolver) -> Expr {
        match self {
            SymbolReplacement::Frame { frame_type, field } => {
                let receiver = resolver.frame_receiver(frame_type, span);
                field_access(receiver, field, span)
            }
            SymbolReplacement::StateMachineField { field, .. } => {
                let receiver = Expr::new(ExprKind::This, resolver.container_type().clone(), span);
                field_access(receiver, field, span)
            }
            SymbolReplacement::Expression { expr, .. } => {
                Expr::new(ExprKind::Shared(expr.clone()), expr.ty.clone(), span)
            }
        }
    }

    pub fn is_reusable(&self) -> bool {
        match self {
            SymbolReplacement::Frame { .. } => false,
            SymbolReplacement::StateMachineField { reusable, .. }
            | SymbolReplacement::Expression { reusable, .. } => *reusable,
        }
    }

    /// Container fields backing the replacement.
    pub fn fields(&self) -> Vec<Rc<FieldSymbol>> {
        match self {
            SymbolReplacement::Frame { .. } => Vec::new(),
            SymbolReplacement::StateMachineField { field, .. } => vec![field.clone()],
            SymbolReplacement::Expression { fields, .. } => fields.clone(),
        }
    }
}

fn field_access(receiver: Expr, field: &Rc<FieldSymbol>, span: Span) -> Expr {
    Expr::new(
        ExprKind::Field {
            receiver: Some(Box::new(receiver)),
            field: field.clone(),
        },
        field.ty.clone(),
        span,
    )
}

/// One replacement per hoisted variable.
#[derive(Debug, Default)]
pub struct ReplacementTable {
    entries: IndexMap<Variable, SymbolReplacement>,
}

impl ReplacementTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&mut self, var: Variable, replacement: SymbolReplacement) {
        if self.entries.contains_key(&var) {
            tracing::error!(target: "coro_lower", ?var, "variable already has a replacement");
            debug_assert!(false, "variable {:?} already has a replacement", var);
        }
        self.entries.insert(var, replacement);
    }

    pub fn get(&self, var: Variable) -> Option<&SymbolReplacement> {
        self.entries.get(&var)
    }

    pub fn remove(&mut self, var: Variable) -> Option<SymbolReplacement> {
        self.entries.shift_remove(&var)
    }

    pub fn contains(&self, var: Variable) -> bool {
        self.entries.contains_key(&var)
    }
}

// ── Ref local hoisting ──────────────────────────────────────────────

/// Services the rewriter provides while a ref initializer is decomposed.
pub trait HoistHost: ReplacementResolver {
    /// New field to hold a by-value part of the initializer.
    fn spill_field(&mut self, ty: &Type) -> Rc<FieldSymbol>;

    fn report(&mut self, kind: LowerErrorKind, span: Span);
}

/// Result of hoisting `ref local = <expr>`.
#[derive(Debug)]
pub struct HoistedRef {
    /// Place expression the local stands for from now on.
    pub replacement: Expr,
    /// Stores into the new fields, in evaluation order.
    pub side_effects: Vec<Expr>,
    pub fields: Vec<Rc<FieldSymbol>>,
    /// The whole place must be evaluated once now so that a bad index or a
    /// null receiver faults where the original code would.
    pub needs_sacrificial_read: bool,
}

/// Split the (already rewritten) initializer of a ref local into parts
/// that stay valid across suspensions: stable places are kept as they are,
/// everything else is evaluated now and stored in fields.
pub fn hoist_ref_initialization(host: &mut dyn HoistHost, value: Expr, ref_kind: RefKind) -> HoistedRef {
    let mut out = HoistedRef {
        replacement: value.clone(),
        side_effects: Vec::new(),
        fields: Vec::new(),
        needs_sacrificial_read: false,
    };
    out.replacement = hoist_expression(host, value, ref_kind, &mut out);
    out
}

fn hoist_expression(host: &mut dyn HoistHost, expr: Expr, ref_kind: RefKind, out: &mut HoistedRef) -> Expr {
    let Expr { kind, ty, span } = expr;
    match kind {
        ExprKind::Index { array, index } => {
            let array = hoist_expression(host, *array, RefKind::None, out);
            let index = hoist_expression(host, *index, RefKind::None, out);
            out.needs_sacrificial_read = true;
            Expr::new(
                ExprKind::Index {
                    array: Box::new(array),
                    index: Box::new(index),
                },
                ty,
                span,
            )
        }
        ExprKind::Field {
            receiver: None,
            field,
        } => {
            let stable = ref_kind.is_by_ref() || field.is_readonly;
            let expr = Expr::new(ExprKind::Field { receiver: None, field }, ty, span);
            if stable {
                expr
            } else {
                spill(host, expr, ref_kind, out)
            }
        }
        ExprKind::Field {
            receiver: Some(receiver),
            field,
        } if ref_kind.is_by_ref() => {
            let of_struct = receiver.ty.is_struct();
            let receiver_ref = if of_struct { ref_kind } else { RefKind::None };
            let receiver = hoist_expression(host, *receiver, receiver_ref, out);
            if !of_struct && !receiver.is_this() {
                out.needs_sacrificial_read = true;
            }
            Expr::new(
                ExprKind::Field {
                    receiver: Some(Box::new(receiver)),
                    field,
                },
                ty,
                span,
            )
        }
        ExprKind::This | ExprKind::Base | ExprKind::Default | ExprKind::Literal(_) => Expr::new(kind, ty, span),
        // Another hoisted ref local: its place is already stable.
        ExprKind::Shared(inner) if ref_kind.is_by_ref() || inner.is_this() || inner.is_constant() => {
            Expr::new(ExprKind::Shared(inner), ty, span)
        }
        ExprKind::Call {
            receiver,
            method,
            args,
            ref_kind: returns,
        } => {
            match ref_kind {
                RefKind::Ref | RefKind::Out => host.report(
                    LowerErrorKind::RefReturningCallAcrossAwait {
                        method: method.to_string(),
                    },
                    span,
                ),
                RefKind::StrictIn => host.report(
                    LowerErrorKind::StrictInCallAcrossAwait {
                        method: method.to_string(),
                    },
                    span,
                ),
                RefKind::In | RefKind::None => {}
            }
            let call = ExprKind::Call {
                receiver,
                method,
                args,
                ref_kind: returns,
            };
            spill(host, Expr::new(call, ty, span), RefKind::None, out)
        }
        ExprKind::Conditional { .. } => {
            if matches!(ref_kind, RefKind::Ref | RefKind::Out | RefKind::StrictIn) {
                host.report(LowerErrorKind::RefConditionalAcrossAwait, span);
            }
            spill(host, Expr::new(kind, ty, span), RefKind::None, out)
        }
        other => spill(host, Expr::new(other, ty, span), ref_kind, out),
    }
}

/// `this.$rN = expr`, replaced by `this.$rN`.
fn spill(host: &mut dyn HoistHost, expr: Expr, ref_kind: RefKind, out: &mut HoistedRef) -> Expr {
    if expr.is_constant() {
        return expr;
    }
    if ref_kind.is_by_ref() {
        // Locals a hoisted ref local points into are hoisted themselves, so
        // only a rewriter bug gets here. Fall back to a copy.
        tracing::error!(target: "coro_lower", ?ref_kind, "by-ref place with no stable root");
        debug_assert!(false, "by-ref place with no stable root");
    }
    let field = host.spill_field(&expr.ty);
    let span = expr.span;
    let receiver = Expr::new(ExprKind::This, host.container_type().clone(), span);
    let target = field_access(receiver, &field, span);
    out.side_effects.push(Expr::new(
        ExprKind::Assign {
            target: Box::new(target.clone()),
            value: Box::new(expr),
            is_ref: false,
        },
        field.ty.clone(),
        span,
    ));
    out.fields.push(field);
    target
}

#[cfg(test)]
mod tests {
    use super::*;
    use coro_ast::{Arg, Literal, LocalId};

    struct Host {
        container: Type,
        spilled: Vec<Type>,
        errors: Vec<LowerErrorKind>,
    }

    impl Host {
        fn new() -> Self {
            Self {
                container: Type::class("M$sm0"),
                spilled: Vec::new(),
                errors: Vec::new(),
            }
        }
    }

    impl ReplacementResolver for Host {
        fn container_type(&self) -> &Type {
            &self.container
        }

        fn frame_receiver(&self, frame_type: &Type, span: Span) -> Expr {
            Expr::new(ExprKind::This, frame_type.clone(), span)
        }
    }

    impl HoistHost for Host {
        fn spill_field(&mut self, ty: &Type) -> Rc<FieldSymbol> {
            let name = format!("$r{}", self.spilled.len());
            self.spilled.push(ty.clone());
            Rc::new(FieldSymbol::instance(self.container.clone(), &name, ty.clone()))
        }

        fn report(&mut self, kind: LowerErrorKind, _span: Span) {
            self.errors.push(kind);
        }
    }

    fn span() -> Span {
        Span::new(40, 45)
    }

    fn e(kind: ExprKind, ty: Type) -> Expr {
        Expr::new(kind, ty, span())
    }

    fn local(id: u32, ty: Type) -> Expr {
        e(ExprKind::Local(LocalId(id)), ty)
    }

    fn int(v: i64) -> Expr {
        e(ExprKind::Literal(Literal::Int(v)), Type::Int)
    }

    #[test]
    fn array_element_hoists_array_and_index_by_value() {
        let mut host = Host::new();
        let access = e(
            ExprKind::Index {
                array: Box::new(local(0, Type::array(Type::Int))),
                index: Box::new(local(1, Type::Int)),
            },
            Type::Int,
        );
        let hoisted = hoist_ref_initialization(&mut host, access, RefKind::Ref);
        assert!(hoisted.needs_sacrificial_read);
        assert_eq!(hoisted.side_effects.len(), 2);
        assert_eq!(host.spilled, vec![Type::array(Type::Int), Type::Int]);
        assert!(matches!(hoisted.replacement.kind, ExprKind::Index { .. }));
        assert!(host.errors.is_empty());
    }

    #[test]
    fn constant_index_is_not_spilled() {
        let mut host = Host::new();
        let access = e(
            ExprKind::Index {
                array: Box::new(local(0, Type::array(Type::Int))),
                index: Box::new(int(3)),
            },
            Type::Int,
        );
        let hoisted = hoist_ref_initialization(&mut host, access, RefKind::Ref);
        assert_eq!(hoisted.fields.len(), 1);
    }

    #[test]
    fn field_of_this_is_stable() {
        let mut host = Host::new();
        let field = Rc::new(FieldSymbol::instance(Type::class("C"), "count", Type::Int));
        let access = e(
            ExprKind::Field {
                receiver: Some(Box::new(e(ExprKind::This, Type::class("C")))),
                field,
            },
            Type::Int,
        );
        let hoisted = hoist_ref_initialization(&mut host, access, RefKind::Ref);
        assert!(hoisted.side_effects.is_empty());
        assert!(!hoisted.needs_sacrificial_read);
    }

    #[test]
    fn class_receiver_is_spilled_with_null_check() {
        let mut host = Host::new();
        let field = Rc::new(FieldSymbol::instance(Type::class("Node"), "value", Type::Int));
        let access = e(
            ExprKind::Field {
                receiver: Some(Box::new(local(0, Type::class("Node")))),
                field,
            },
            Type::Int,
        );
        let hoisted = hoist_ref_initialization(&mut host, access, RefKind::Ref);
        assert!(hoisted.needs_sacrificial_read);
        assert_eq!(host.spilled, vec![Type::class("Node")]);
    }

    #[test]
    fn static_fields() {
        let mutable = Rc::new(FieldSymbol::static_field(Type::class("C"), "shared", Type::Int));
        let readonly = Rc::new(FieldSymbol::static_field(Type::class("C"), "limit", Type::Int).readonly());
        let mut host = Host::new();

        let by_ref = e(
            ExprKind::Field {
                receiver: None,
                field: mutable.clone(),
            },
            Type::Int,
        );
        assert!(hoist_ref_initialization(&mut host, by_ref, RefKind::Ref).fields.is_empty());

        let by_value = e(
            ExprKind::Field {
                receiver: None,
                field: readonly,
            },
            Type::Int,
        );
        assert!(hoist_ref_initialization(&mut host, by_value, RefKind::None).fields.is_empty());

        let mutable_by_value = e(
            ExprKind::Field {
                receiver: None,
                field: mutable,
            },
            Type::Int,
        );
        assert_eq!(hoist_ref_initialization(&mut host, mutable_by_value, RefKind::None).fields.len(), 1);
    }

    fn call(method: &str) -> Expr {
        e(
            ExprKind::Call {
                receiver: None,
                method: Rc::from(method),
                args: vec![Arg {
                    expr: int(1),
                    ref_kind: RefKind::None,
                }],
                ref_kind: RefKind::Ref,
            },
            Type::Int,
        )
    }

    #[test]
    fn calls_demote_to_a_copy() {
        let mut host = Host::new();
        let hoisted = hoist_ref_initialization(&mut host, call("get"), RefKind::Ref);
        assert_eq!(hoisted.fields.len(), 1);
        assert!(matches!(
            host.errors.as_slice(),
            [LowerErrorKind::RefReturningCallAcrossAwait { method }] if method == "get"
        ));

        let mut host = Host::new();
        hoist_ref_initialization(&mut host, call("get"), RefKind::StrictIn);
        assert!(matches!(host.errors.as_slice(), [LowerErrorKind::StrictInCallAcrossAwait { .. }]));

        let mut host = Host::new();
        let hoisted = hoist_ref_initialization(&mut host, call("get"), RefKind::In);
        assert!(host.errors.is_empty(), "plain `in` may bind to a copy");
        assert_eq!(hoisted.fields.len(), 1);
    }

    #[test]
    fn ref_conditional_is_an_error() {
        let mut host = Host::new();
        let cond = e(
            ExprKind::Conditional {
                cond: Box::new(e(ExprKind::Literal(Literal::Bool(true)), Type::Bool)),
                then_expr: Box::new(local(0, Type::Int)),
                else_expr: Box::new(local(1, Type::Int)),
                ref_kind: RefKind::Ref,
            },
            Type::Int,
        );
        hoist_ref_initialization(&mut host, cond, RefKind::Ref);
        assert!(matches!(host.errors.as_slice(), [LowerErrorKind::RefConditionalAcrossAwait]));
    }

    #[test]
    fn expression_replacement_shares_one_node() {
        let host = Host::new();
        let place = Rc::new(local(0, Type::Int));
        let replacement = SymbolReplacement::Expression {
            expr: place.clone(),
            fields: Vec::new(),
            reusable: true,
        };
        let first = replacement.replacement(Span::new(1, 2), &host);
        let second = replacement.replacement(Span::new(3, 4), &host);
        match (&first.kind, &second.kind) {
            (ExprKind::Shared(a), ExprKind::Shared(b)) => {
                assert!(Rc::ptr_eq(a, b));
                assert!(Rc::ptr_eq(a, &place));
            }
            other => panic!("expected shared nodes, got {:?}", other),
        }
    }

    #[test]
    fn table_holds_one_entry_per_variable() {
        let mut table = ReplacementTable::new();
        let field = Rc::new(FieldSymbol::instance(Type::class("M$sm0"), "x$h0", Type::Int));
        table.install(
            Variable::Local(LocalId(0)),
            SymbolReplacement::StateMachineField {
                field,
                reusable: false,
            },
        );
        assert!(table.contains(Variable::Local(LocalId(0))));
        assert!(table.remove(Variable::Local(LocalId(0))).is_some());
        assert!(table.get(Variable::Local(LocalId(0))).is_none());
    }
}
