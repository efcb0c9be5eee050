// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Storage fields of the state machine container.
//!
//! Two allocation paths exist. Long-lived variables get a field of their
//! own, pinned to a slot index that later generations match by declarator
//! identity. Everything else borrows a field from a per-type pool for the
//! duration of its scope and hands it back at scope exit.

use std::collections::BTreeSet;
use std::rc::Rc;

use coro_ast::{
    Expr, FieldSymbol, HoistedSlot, LocalDebugId, LocalSlotDebugInfo, LocalSymbol, NodeFactory,
    SynthesizedKind, Type,
};
use indexmap::IndexMap;

use crate::names;
use crate::previous::PreviousGeneration;

pub struct FieldPool<'a> {
    container: Type,
    debug: bool,
    previous: Option<&'a dyn PreviousGeneration>,
    /// Released fields by exact type; popped LIFO.
    free: IndexMap<Type, Vec<Rc<FieldSymbol>>>,
    next_ordinal: u32,
    next_slot: i32,
    used_slots: BTreeSet<i32>,
    next_awaiter_slot: i32,
    used_awaiter_slots: BTreeSet<i32>,
    plain: Vec<Rc<FieldSymbol>>,
    hoisted: Vec<Rc<FieldSymbol>>,
    awaiters: IndexMap<Type, Rc<FieldSymbol>>,
}

impl<'a> FieldPool<'a> {
    pub fn new(container: Type, debug: bool, previous: Option<&'a dyn PreviousGeneration>) -> Self {
        Self {
            container,
            debug,
            previous,
            free: IndexMap::new(),
            next_ordinal: 0,
            next_slot: previous.map_or(0, |p| p.hoisted_slot_count()),
            used_slots: BTreeSet::new(),
            next_awaiter_slot: previous.map_or(0, |p| p.awaiter_slot_count()),
            used_awaiter_slots: BTreeSet::new(),
            plain: Vec::new(),
            hoisted: Vec::new(),
            awaiters: IndexMap::new(),
        }
    }

    pub fn container(&self) -> &Type {
        &self.container
    }

    /// Whether a hoisted local of this kind gets a pinned field up front
    /// rather than a pooled one at scope entry.
    pub fn should_preallocate(&self, kind: SynthesizedKind) -> bool {
        if !self.debug && kind == SynthesizedKind::UserDefined {
            return false;
        }
        !kind.is_slot_reusable(self.debug)
    }

    /// Field outside the slot scheme: `$state`, `$builder`, proxies of
    /// `this` and parameters.
    pub fn add_plain_field(&mut self, name: &str, ty: Type) -> Rc<FieldSymbol> {
        let field = Rc::new(FieldSymbol::instance(self.container.clone(), name, ty));
        self.plain.push(field.clone());
        field
    }

    /// Borrow a field of exactly `ty`. Returns the field and whether it was
    /// handed back by an earlier scope.
    pub fn acquire(&mut self, ty: &Type, hint: Option<&LocalSymbol>) -> (Rc<FieldSymbol>, bool) {
        if let Some(field) = self.free.get_mut(ty).and_then(Vec::pop) {
            tracing::trace!(target: "coro_lower", field = %field.name, "reusing field");
            return (field, true);
        }

        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        let user_name = hint
            .filter(|l| l.kind == SynthesizedKind::UserDefined)
            .and_then(|l| l.name.as_deref());
        let debug = hint.map(|l| LocalSlotDebugInfo {
            kind: l.kind,
            id: None,
        });
        let field = Rc::new(FieldSymbol {
            slot: Some(HoistedSlot {
                index: -1,
                reusable: true,
                debug,
            }),
            ..FieldSymbol::instance(
                self.container.clone(),
                &names::reusable_field(user_name, ordinal),
                ty.clone(),
            )
        });
        self.hoisted.push(field.clone());
        (field, false)
    }

    pub fn release(&mut self, field: Rc<FieldSymbol>) {
        self.free.entry(field.ty.clone()).or_default().push(field);
    }

    /// `this.field = default` when a dead value in the field could keep an
    /// object alive.
    pub fn cleanup(&self, f: &NodeFactory, field: &Rc<FieldSymbol>) -> Option<Expr> {
        if !field.ty.might_contain_references() {
            return None;
        }
        let target = f.field(f.this(self.container.clone()), field);
        Some(f.assign(target, f.default(field.ty.clone())))
    }

    /// Pinned field for a long-lived local. Reuses the previous generation's
    /// slot for the same `(kind, declarator, type)`, otherwise takes the next
    /// slot above the previous range.
    pub fn allocate_long_lived(&mut self, ty: &Type, local: &LocalSymbol, id: LocalDebugId) -> Rc<FieldSymbol> {
        let slot = self
            .previous
            .and_then(|p| p.previous_hoisted_slot(local.kind, id, ty))
            .filter(|slot| !self.used_slots.contains(slot))
            .unwrap_or_else(|| {
                while self.used_slots.contains(&self.next_slot) {
                    self.next_slot += 1;
                }
                let slot = self.next_slot;
                self.next_slot += 1;
                slot
            });
        self.used_slots.insert(slot);

        let user_name = if local.kind == SynthesizedKind::UserDefined {
            local.name.as_deref()
        } else {
            None
        };
        let field = Rc::new(FieldSymbol {
            slot: Some(HoistedSlot {
                index: slot,
                reusable: false,
                debug: Some(LocalSlotDebugInfo {
                    kind: local.kind,
                    id: Some(id),
                }),
            }),
            ..FieldSymbol::instance(
                self.container.clone(),
                &names::hoisted_field(user_name, local.kind, slot),
                ty.clone(),
            )
        });
        tracing::trace!(target: "coro_lower", field = %field.name, slot, "pinned field");
        self.hoisted.push(field.clone());
        field
    }

    /// The field holding a pending awaiter of `ty`. All awaits of one
    /// awaiter type share it.
    pub fn awaiter_field(&mut self, ty: &Type) -> Rc<FieldSymbol> {
        if let Some(field) = self.awaiters.get(ty) {
            return field.clone();
        }
        let slot = self
            .previous
            .and_then(|p| p.previous_awaiter_slot(ty))
            .filter(|slot| !self.used_awaiter_slots.contains(slot))
            .unwrap_or_else(|| {
                while self.used_awaiter_slots.contains(&self.next_awaiter_slot) {
                    self.next_awaiter_slot += 1;
                }
                let slot = self.next_awaiter_slot;
                self.next_awaiter_slot += 1;
                slot
            });
        self.used_awaiter_slots.insert(slot);

        let field = Rc::new(FieldSymbol {
            slot: Some(HoistedSlot {
                index: slot,
                reusable: false,
                debug: Some(LocalSlotDebugInfo {
                    kind: SynthesizedKind::AwaiterTemp,
                    id: None,
                }),
            }),
            ..FieldSymbol::instance(self.container.clone(), &names::awaiter_field(slot), ty.clone())
        });
        self.awaiters.insert(ty.clone(), field.clone());
        field
    }

    /// Fields carrying slot metadata, in creation order, awaiters last.
    /// One past the highest hoisted slot this or any earlier generation
    /// used.
    pub fn hoisted_slot_count(&self) -> i32 {
        let used = self.used_slots.last().map_or(0, |s| s + 1);
        used.max(self.next_slot)
    }

    pub fn awaiter_slot_count(&self) -> i32 {
        let used = self.used_awaiter_slots.last().map_or(0, |s| s + 1);
        used.max(self.next_awaiter_slot)
    }

    pub fn slot_fields(&self) -> Vec<Rc<FieldSymbol>> {
        self.hoisted.iter().chain(self.awaiters.values()).cloned().collect()
    }

    /// Every field of the container in declaration order.
    pub fn into_fields(self) -> Vec<Rc<FieldSymbol>> {
        let mut fields = self.plain;
        fields.extend(self.hoisted);
        fields.extend(self.awaiters.into_values());
        fields
    }
}
