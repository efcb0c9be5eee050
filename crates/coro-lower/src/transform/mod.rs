// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! State machine transform for async and iterator methods.
//!
//! The method body becomes the `MoveNext` step of a synthesized container
//! class. Variables that must survive a suspension become container fields;
//! every suspension point gets a state number and a resume label, and a
//! switch over the state at the top of the step jumps back to where the
//! previous step stopped. The original method is replaced by a kickoff body
//! that allocates the container and starts it.

mod assembler;
mod rewriter;
mod suspension;

use coro_ast::{MethodBody, MethodSymbol, Type};

use crate::error::{LowerDiagnostics, LowerError};
use crate::liveness;
use crate::names;
use crate::options::LowerOptions;
use crate::previous::PreviousGeneration;
use crate::slots::FieldPool;
use crate::type_map::TypeMap;

pub use assembler::{LoweredStateMachine, StateMachineType, SynthesizedMethod};

use rewriter::{BodyRewriter, MachineFields};

// ── Public API ──────────────────────────────────────────────────────

#[derive(Debug)]
pub enum LowerOutcome {
    /// The body carried upstream errors and was returned untouched.
    Skipped(MethodBody),
    Lowered(Box<LoweredStateMachine>),
}

#[derive(Debug)]
pub struct LowerResult {
    pub outcome: LowerOutcome,
    pub diagnostics: Vec<LowerError>,
}

impl LowerResult {
    pub fn lowered(&self) -> Option<&LoweredStateMachine> {
        match &self.outcome {
            LowerOutcome::Lowered(machine) => Some(machine),
            LowerOutcome::Skipped(_) => None,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

/// Lower one async, iterator or async-iterator method.
///
/// Errors in the body are reported and lowering carries on, so one pass
/// surfaces every independent problem. A body that already carries errors
/// is returned as it came in.
pub fn lower_state_machine(
    method: &MethodSymbol,
    body: &MethodBody,
    options: &LowerOptions,
    previous: Option<&dyn PreviousGeneration>,
) -> LowerResult {
    if body.has_errors {
        tracing::debug!(target: "coro_lower", method = %method.name, "skipping body with errors");
        return LowerResult {
            outcome: LowerOutcome::Skipped(body.clone()),
            diagnostics: Vec::new(),
        };
    }

    let span = tracing::info_span!("lower_state_machine", method = %method.name, kind = ?method.kind);
    let _enter = span.enter();

    let mut diagnostics = LowerDiagnostics::new();
    let analysis = liveness::analyze(method, body, options, &mut diagnostics);

    let name = previous
        .and_then(|p| p.container_name())
        .map(str::to_string)
        .unwrap_or_else(|| names::container_name(&method.name, options.method_ordinal));
    let container = Type::class(&name);
    let types = TypeMap::for_method(&method.type_params);

    let mut pool = FieldPool::new(container.clone(), options.is_debug(), previous);
    let fields = MachineFields::declare(&mut pool, method, &analysis, &types);

    let mut rewriter = BodyRewriter::new(
        method,
        body,
        options,
        &analysis,
        types,
        pool,
        fields,
        container,
        previous,
        diagnostics,
    );
    let rewritten = rewriter.rewrite_body(&body.block);
    let (machine, diagnostics) = assembler::assemble(rewriter, rewritten, &analysis, name);

    tracing::debug!(
        target: "coro_lower",
        kind = ?method.kind,
        hoisted = analysis.len(),
        states = machine.state_debug_info.len(),
        errors = diagnostics.errors().len(),
        "lowered state machine"
    );

    LowerResult {
        outcome: LowerOutcome::Lowered(Box::new(machine)),
        diagnostics: diagnostics.into_errors(),
    }
}
