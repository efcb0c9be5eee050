// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Resumable state numbers and suspension point identities.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Value of a state machine's state field.
///
/// Negative values are sentinels, except in the decreasing numbering space
/// async iterators use for `yield return`, which starts below them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateMachineState(pub i32);

impl StateMachineState {
    /// Not started yet (async) or currently running.
    pub const NOT_STARTED_OR_RUNNING: Self = Self(-1);
    pub const FINISHED: Self = Self(-2);
    /// Async iterator that has been created but not yet enumerated.
    pub const INITIAL_ASYNC_ITERATOR: Self = Self(-3);
    /// First yield state of an async iterator; yield states go down from here.
    pub const FIRST_RESUMABLE_ASYNC_ITERATOR: Self = Self(-4);
    /// States at or above this value were reached through a suspension point,
    /// so a `finally` must not run when resuming at one of them.
    pub const FIRST_UNUSED: Self = Self(0);
    pub const FIRST_RESUMABLE_ASYNC: Self = Self(0);
    /// Iterator created but `MoveNext` never called.
    pub const INITIAL_ITERATOR: Self = Self(0);
    pub const FIRST_RESUMABLE_ITERATOR: Self = Self(1);

    pub fn value(self) -> i32 {
        self.0
    }
}

impl fmt::Display for StateMachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a suspension point that is stable across edits: syntax offset
/// of the `await`/`yield` relative to the method plus an ordinal separating
/// several suspension points lowered from one syntax node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SuspensionId {
    pub syntax_offset: i32,
    pub ordinal: i32,
}

/// Debug record associating a state with the suspension point it resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDebugInfo {
    pub syntax_offset: i32,
    pub ordinal: i32,
    pub state: StateMachineState,
}

/// Code carried by the error raised when an instance suspended by an earlier
/// version of the method resumes at a state that no longer exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeErrorCode {
    CannotResumeIterator,
    CannotResumeAsync,
}

impl ResumeErrorCode {
    pub fn code(self) -> i64 {
        match self {
            ResumeErrorCode::CannotResumeIterator => -1,
            ResumeErrorCode::CannotResumeAsync => -2,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            ResumeErrorCode::CannotResumeIterator => {
                "cannot resume suspended iterator: its resume location was removed by an edit"
            }
            ResumeErrorCode::CannotResumeAsync => {
                "cannot resume suspended async method: its resume location was removed by an edit"
            }
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -1 => Some(ResumeErrorCode::CannotResumeIterator),
            -2 => Some(ResumeErrorCode::CannotResumeAsync),
            _ => None,
        }
    }
}
