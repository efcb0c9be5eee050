// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! State machine lowering for async methods, iterators and async iterators.
//!
//! `lower_state_machine` takes a bound method body and produces a container
//! class whose `MoveNext` step runs the body one segment at a time, plus the
//! kickoff body that replaces the original method. Variables that are live
//! across a suspension are found by a definite-assignment style dataflow
//! (`liveness`) and moved to container fields (`slots`). Layouts can be made
//! stable across recompilation by passing the previous generation's
//! `GenerationSnapshot`.

mod error;
mod liveness;
mod names;
mod options;
mod ordinals;
mod previous;
mod replacement;
mod slots;
mod state;
mod state_allocator;
mod transform;
mod type_map;

pub use error::{LowerDiagnostics, LowerError, LowerErrorKind};
pub use liveness::CaptureAnalysis;
pub use names::{
    BUILDER_FIELD, CURRENT_FIELD, DISPOSE, DISPOSING_FIELD, MOVE_NEXT, MOVE_NEXT_ASYNC,
    STATE_FIELD, THIS_PROXY,
};
pub use options::{LowerOptions, OptimizationLevel};
pub use previous::{AwaiterSlotRecord, GenerationSnapshot, HoistedSlotRecord, PreviousGeneration};
pub use state::{ResumeErrorCode, StateDebugInfo, StateMachineState, SuspensionId};
pub use transform::{
    lower_state_machine, LowerOutcome, LowerResult, LoweredStateMachine, StateMachineType,
    SynthesizedMethod,
};
