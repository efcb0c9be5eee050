// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Tree-walk evaluator for lowered method bodies.
//!
//! Runs kickoff bodies and state machine steps against a single-threaded
//! scheduler, so lowered code can be checked by what it does rather than
//! how it prints.

mod env;
mod interp;
mod runtime;
mod value;

pub use interp::{Interpreter, RuntimeError};
pub use value::{default_value, Exception, Object, TaskRef, TaskState, TaskStatus, Value};
