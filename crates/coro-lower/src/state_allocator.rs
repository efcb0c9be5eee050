// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Resumable state numbering.

use std::collections::BTreeSet;

use coro_ast::{BinOp, Expr, Intrinsic, NodeFactory, Stmt, Type};

use crate::previous::PreviousGeneration;
use crate::state::{ResumeErrorCode, StateMachineState, SuspensionId};

/// Assigns state numbers to suspension points in one numbering space.
///
/// A suspension point keeps the number the previous generation gave it.
/// Fresh numbers start past everything the previous generation used, so a
/// stale instance can never land on a new, unrelated resume point.
pub struct ResumableStateAllocator<'a> {
    previous: Option<&'a dyn PreviousGeneration>,
    first_state: StateMachineState,
    increasing: bool,
    next_state: StateMachineState,
    /// End (exclusive) of the previous generation's range, when it had one.
    previous_end: Option<StateMachineState>,
    matched: BTreeSet<StateMachineState>,
}

impl<'a> ResumableStateAllocator<'a> {
    pub fn new(
        previous: Option<&'a dyn PreviousGeneration>,
        first_state: StateMachineState,
        increasing: bool,
    ) -> Self {
        let previous_end = previous
            .and_then(|p| p.first_unused_state(increasing))
            .filter(|end| if increasing { *end > first_state } else { *end < first_state });
        Self {
            previous,
            first_state,
            increasing,
            next_state: previous_end.unwrap_or(first_state),
            previous_end,
            matched: BTreeSet::new(),
        }
    }

    fn in_range(&self, state: StateMachineState) -> bool {
        if self.increasing {
            state >= self.first_state && state < self.next_state
        } else {
            state <= self.first_state && state > self.next_state
        }
    }

    pub fn allocate(&mut self, id: SuspensionId) -> StateMachineState {
        if let Some(state) = self.previous.and_then(|p| p.previous_state(id)) {
            if self.in_range(state) && !self.matched.contains(&state) {
                self.matched.insert(state);
                tracing::trace!(
                    target: "coro_lower",
                    offset = id.syntax_offset,
                    ordinal = id.ordinal,
                    state = state.0,
                    "matched previous state"
                );
                return state;
            }
        }

        let state = self.next_state;
        self.next_state = if self.increasing {
            StateMachineState(state.0 + 1)
        } else {
            StateMachineState(state.0 - 1)
        };
        state
    }

    /// First state this space never handed out.
    pub fn next_state(&self) -> StateMachineState {
        self.next_state
    }

    /// Nearest state of the previous range nothing in this generation
    /// matched, counting from the first state.
    fn lowest_missing(&self) -> Option<StateMachineState> {
        let end = self.previous_end?;
        let step = if self.increasing { 1 } else { -1 };
        let mut state = self.first_state;
        while state != end {
            if !self.matched.contains(&state) {
                return Some(state);
            }
            state = StateMachineState(state.0 + step);
        }
        None
    }

    pub fn has_missing_states(&self) -> bool {
        self.lowest_missing().is_some()
    }

    /// `if (cached_state >= missing) throw ...;` placed after the outermost
    /// dispatch. Every live state below the bound is matched and dispatched,
    /// so anything reaching the guard in the resumable range is stale.
    pub fn missing_state_guard(
        &self,
        f: &NodeFactory,
        cached_state: Expr,
        code: ResumeErrorCode,
    ) -> Option<Stmt> {
        let missing = self.lowest_missing()?;
        let op = if self.increasing { BinOp::Ge } else { BinOp::Le };
        let cond = f.binary(op, cached_state, f.int(missing.0 as i64));
        let error = f.intrinsic(
            Intrinsic::ResumeError,
            vec![f.string(code.message()), f.int(code.code())],
            Type::Exception,
        );
        Some(f.if_then(cond, f.throw(Some(error))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::previous::GenerationSnapshot;
    use crate::state::StateDebugInfo;

    fn id(offset: i32) -> SuspensionId {
        SuspensionId {
            syntax_offset: offset,
            ordinal: 0,
        }
    }

    fn previous(states: &[(i32, i32)], end: i32) -> GenerationSnapshot {
        GenerationSnapshot {
            states: states
                .iter()
                .map(|&(offset, state)| StateDebugInfo {
                    syntax_offset: offset,
                    ordinal: 0,
                    state: StateMachineState(state),
                })
                .collect(),
            first_unused_increasing: Some(StateMachineState(end)),
            ..GenerationSnapshot::default()
        }
    }

    #[test]
    fn fresh_states_increase_from_first() {
        let mut a = ResumableStateAllocator::new(None, StateMachineState::FIRST_RESUMABLE_ASYNC, true);
        assert_eq!(a.allocate(id(10)), StateMachineState(0));
        assert_eq!(a.allocate(id(20)), StateMachineState(1));
        assert!(!a.has_missing_states());
    }

    #[test]
    fn decreasing_space() {
        let mut a =
            ResumableStateAllocator::new(None, StateMachineState::FIRST_RESUMABLE_ASYNC_ITERATOR, false);
        assert_eq!(a.allocate(id(10)), StateMachineState(-4));
        assert_eq!(a.allocate(id(20)), StateMachineState(-5));
        assert_eq!(a.next_state(), StateMachineState(-6));
    }

    #[test]
    fn previous_states_are_kept_and_new_ones_go_above() {
        let prev = previous(&[(10, 0), (20, 1)], 2);
        let mut a = ResumableStateAllocator::new(Some(&prev), StateMachineState(0), true);
        // New await inserted before the old ones.
        assert_eq!(a.allocate(id(5)), StateMachineState(2));
        assert_eq!(a.allocate(id(10)), StateMachineState(0));
        assert_eq!(a.allocate(id(20)), StateMachineState(1));
        assert!(!a.has_missing_states());
    }

    #[test]
    fn a_state_never_matches_twice() {
        let prev = previous(&[(10, 0)], 1);
        let mut a = ResumableStateAllocator::new(Some(&prev), StateMachineState(0), true);
        assert_eq!(a.allocate(id(10)), StateMachineState(0));
        // Same identity again (e.g. duplicated node): gets a fresh state.
        assert_eq!(a.allocate(id(10)), StateMachineState(1));
    }

    #[test]
    fn deleted_await_leaves_missing_state_guard() {
        let prev = previous(&[(10, 0), (20, 1), (30, 2)], 3);
        let mut a = ResumableStateAllocator::new(Some(&prev), StateMachineState(0), true);
        a.allocate(id(10));
        a.allocate(id(20));
        assert!(a.has_missing_states());

        let f = NodeFactory::new(coro_ast::LocalTable::new(), 0);
        let guard = a
            .missing_state_guard(&f, f.int(0), ResumeErrorCode::CannotResumeAsync)
            .expect("guard");
        match guard.kind {
            coro_ast::StmtKind::If { cond, .. } => match cond.kind {
                coro_ast::ExprKind::Binary { op, right, .. } => {
                    assert_eq!(op, BinOp::Ge);
                    assert_eq!(right.int_value(), Some(2));
                }
                other => panic!("unexpected condition {:?}", other),
            },
            other => panic!("unexpected guard {:?}", other),
        }
    }
}
