// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Layout of the previous compilation of a method.
//!
//! When a method is recompiled while instances of its old state machine are
//! still suspended, those instances must resume correctly in the new code.
//! Lowering therefore asks the previous generation which state number and
//! which field slot it gave to each suspension point and hoisted local, and
//! reuses them.

use coro_ast::{LocalDebugId, SynthesizedKind, Type};
use serde::{Deserialize, Serialize};

use crate::state::{StateDebugInfo, StateMachineState, SuspensionId};

/// Lookup into the previous generation of a method.
pub trait PreviousGeneration {
    fn previous_state(&self, id: SuspensionId) -> Option<StateMachineState>;

    /// First state the previous generation never handed out in the given
    /// direction.
    fn first_unused_state(&self, increasing: bool) -> Option<StateMachineState>;

    /// Slot of the hoisted local with the same kind, declarator identity and
    /// field type.
    fn previous_hoisted_slot(&self, kind: SynthesizedKind, id: LocalDebugId, ty: &Type) -> Option<i32>;

    /// Number of hoisted-local slots the previous generation used.
    fn hoisted_slot_count(&self) -> i32;

    fn previous_awaiter_slot(&self, ty: &Type) -> Option<i32>;

    fn awaiter_slot_count(&self) -> i32;

    fn container_name(&self) -> Option<&str>;
}

/// Persisted layout of one lowered method, recorded after lowering and fed
/// back as the previous generation of the next compilation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationSnapshot {
    pub container_name: Option<String>,
    pub states: Vec<StateDebugInfo>,
    pub first_unused_increasing: Option<StateMachineState>,
    pub first_unused_decreasing: Option<StateMachineState>,
    pub hoisted_slots: Vec<HoistedSlotRecord>,
    pub awaiter_slots: Vec<AwaiterSlotRecord>,
    /// Slots handed out by this and every earlier generation, including
    /// slots of locals that no longer exist.
    #[serde(default)]
    pub hoisted_slot_count: i32,
    #[serde(default)]
    pub awaiter_slot_count: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoistedSlotRecord {
    pub slot: i32,
    pub kind: SynthesizedKind,
    pub id: LocalDebugId,
    /// Field type, compared by its printed form.
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwaiterSlotRecord {
    pub slot: i32,
    pub ty: String,
}

impl GenerationSnapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl PreviousGeneration for GenerationSnapshot {
    fn previous_state(&self, id: SuspensionId) -> Option<StateMachineState> {
        self.states
            .iter()
            .find(|s| s.syntax_offset == id.syntax_offset && s.ordinal == id.ordinal)
            .map(|s| s.state)
    }

    fn first_unused_state(&self, increasing: bool) -> Option<StateMachineState> {
        if increasing {
            self.first_unused_increasing
        } else {
            self.first_unused_decreasing
        }
    }

    fn previous_hoisted_slot(&self, kind: SynthesizedKind, id: LocalDebugId, ty: &Type) -> Option<i32> {
        let ty = ty.to_string();
        self.hoisted_slots
            .iter()
            .find(|r| r.kind == kind && r.id == id && r.ty == ty)
            .map(|r| r.slot)
    }

    fn hoisted_slot_count(&self) -> i32 {
        let recorded = self.hoisted_slots.iter().map(|r| r.slot + 1).max().unwrap_or(0);
        recorded.max(self.hoisted_slot_count)
    }

    fn previous_awaiter_slot(&self, ty: &Type) -> Option<i32> {
        let ty = ty.to_string();
        self.awaiter_slots.iter().find(|r| r.ty == ty).map(|r| r.slot)
    }

    fn awaiter_slot_count(&self) -> i32 {
        let recorded = self.awaiter_slots.iter().map(|r| r.slot + 1).max().unwrap_or(0);
        recorded.max(self.awaiter_slot_count)
    }

    fn container_name(&self) -> Option<&str> {
        self.container_name.as_deref()
    }
}
