// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The interpreter implementation.
//!
//! A tree-walk evaluator over lowered method bodies. State machines are
//! plain objects whose fields hold the hoisted state; a suspension is a
//! `return` out of `MoveNext` after registering the machine with the
//! scheduler, and resumption is another call to `MoveNext`.

use std::collections::HashMap;
use std::rc::Rc;

mod call;
mod eval_expr;
mod exec_stmt;
mod intrinsics;
mod operators;
mod place;

use coro_ast::{LabelId, MethodBody, MethodSymbol, Type};
use coro_lower::{LoweredStateMachine, CURRENT_FIELD, DISPOSE, MOVE_NEXT, MOVE_NEXT_ASYNC};

use crate::env::Frame;
use crate::runtime::{Job, Scheduler};
use crate::value::{TaskStatus, Value};

/// The tree-walk interpreter.
pub struct Interpreter {
    pub(crate) frames: Vec<Frame>,
    /// Methods by class name, then method name.
    pub(crate) methods: HashMap<Rc<str>, HashMap<Rc<str>, Rc<MethodBody>>>,
    /// Static methods by name.
    pub(crate) functions: HashMap<Rc<str>, Rc<MethodBody>>,
    pub(crate) statics: HashMap<String, Value>,
    pub(crate) scheduler: Scheduler,
    /// Exceptions whose catch handlers are running, innermost last.
    pub(crate) handling: Vec<Value>,
    output: Vec<String>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            methods: HashMap::new(),
            functions: HashMap::new(),
            statics: HashMap::new(),
            scheduler: Scheduler::new(),
            handling: Vec::new(),
            output: Vec::new(),
        }
    }

    /// Lines written by `print`.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub(crate) fn emit(&mut self, line: String) {
        self.output.push(line);
    }

    // ── Registration ────────────────────────────────────────────────

    /// Register a method body under `method`'s name.
    pub fn define(&mut self, method: &MethodSymbol, body: MethodBody) {
        let body = Rc::new(body);
        if method.is_static {
            self.functions.insert(method.name.clone(), body);
        } else if let Some(class) = class_of(&method.containing_type) {
            self.methods.entry(class).or_default().insert(method.name.clone(), body);
        }
    }

    /// Register a lowered method: its kickoff under the method's own name and
    /// the container's methods under the container name.
    ///
    /// Loading a newer generation of the same method replaces the container
    /// methods, so instances suspended under the old layout resume in the
    /// new code.
    pub fn load(&mut self, method: &MethodSymbol, machine: &LoweredStateMachine) {
        self.define(method, machine.kickoff.clone());
        let methods = self.methods.entry(machine.container.name.clone()).or_default();
        methods.clear();
        for synthesized in &machine.container.methods {
            methods.insert(synthesized.name.clone(), Rc::new(synthesized.body.clone()));
        }
        tracing::debug!(
            target: "coro_interp",
            container = %machine.container.name,
            methods = machine.container.methods.len(),
            "loaded state machine"
        );
    }

    // ── Drivers ─────────────────────────────────────────────────────

    /// Call a registered method and drain the scheduler, returning the
    /// result of the task it produced.
    pub fn run_async(
        &mut self,
        method: &str,
        this: Option<Value>,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let task = self.call(this, method, args)?;
        self.run_until_idle()?;
        self.task_result(&task)
    }

    /// Run queued work until nothing is left.
    pub fn run_until_idle(&mut self) -> Result<(), RuntimeError> {
        while let Some(job) = self.scheduler.next_job() {
            match job {
                Job::Complete(task, value) => self.scheduler.complete(&task, value),
                Job::Resume(machine) => {
                    self.call(Some(machine), MOVE_NEXT, Vec::new())?;
                }
            }
        }
        Ok(())
    }

    pub fn has_pending_work(&self) -> bool {
        !self.scheduler.is_idle()
    }

    pub fn task_result(&self, task: &Value) -> Result<Value, RuntimeError> {
        let Value::Task(task) = task else {
            return Err(RuntimeError::TypeError(format!(
                "expected a task, found {}",
                task.type_name()
            )));
        };
        let status = task.borrow().status.clone();
        match status {
            TaskStatus::Completed(value) => Ok(value),
            TaskStatus::Faulted(exception) => Err(RuntimeError::Thrown(exception)),
            TaskStatus::Pending => Err(RuntimeError::TaskPending),
        }
    }

    /// Step an iterator until it finishes or `limit` elements were produced.
    pub fn iterate(&mut self, enumerator: &Value, limit: Option<usize>) -> Result<Vec<Value>, RuntimeError> {
        let mut items = Vec::new();
        while limit.map_or(true, |n| items.len() < n) {
            match self.call(Some(enumerator.clone()), MOVE_NEXT, Vec::new())? {
                Value::Bool(true) => items.push(self.current(enumerator)),
                Value::Bool(false) => break,
                other => {
                    return Err(RuntimeError::TypeError(format!(
                        "{} returned {}, expected bool",
                        MOVE_NEXT,
                        other.type_name()
                    )))
                }
            }
        }
        Ok(items)
    }

    pub fn dispose(&mut self, enumerator: &Value) -> Result<(), RuntimeError> {
        self.call(Some(enumerator.clone()), DISPOSE, Vec::new())?;
        Ok(())
    }

    /// Drive an async iterator to the end, draining the scheduler between
    /// elements.
    pub fn async_iterate(&mut self, enumerator: &Value) -> Result<Vec<Value>, RuntimeError> {
        let mut items = Vec::new();
        loop {
            let task = self.call(Some(enumerator.clone()), MOVE_NEXT_ASYNC, Vec::new())?;
            self.run_until_idle()?;
            match self.task_result(&task)? {
                Value::Bool(true) => items.push(self.current(enumerator)),
                Value::Bool(false) => return Ok(items),
                other => {
                    return Err(RuntimeError::TypeError(format!(
                        "{} produced {}, expected bool",
                        MOVE_NEXT_ASYNC,
                        other.type_name()
                    )))
                }
            }
        }
    }

    fn current(&self, enumerator: &Value) -> Value {
        enumerator.field(CURRENT_FIELD).unwrap_or(Value::Null)
    }

    // ── Invocation ──────────────────────────────────────────────────

    pub(crate) fn invoke(
        &mut self,
        body: Rc<MethodBody>,
        this: Option<Value>,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        self.frames.push(Frame::new(Rc::clone(&body), this, args));
        let result = self.exec_block(&body.block, None);
        self.frames.pop();
        match result {
            Ok(()) => Ok(Value::Void),
            Err(Flow::Return(value)) => Ok(value),
            Err(Flow::Goto(label)) => Err(RuntimeError::UndefinedLabel(label.0)),
            Err(Flow::Fault(e)) => Err(e),
        }
    }

    pub(crate) fn frame(&mut self) -> Result<&mut Frame, RuntimeError> {
        self.frames
            .last_mut()
            .ok_or_else(|| RuntimeError::TypeError("no active frame".to_string()))
    }
}

fn class_of(ty: &Type) -> Option<Rc<str>> {
    match ty {
        Type::Class(name) => Some(name.clone()),
        Type::Struct(def) => Some(def.name.clone()),
        _ => None,
    }
}

/// How a statement left: normally, or by one of these.
#[derive(Debug)]
pub(crate) enum Flow {
    Return(Value),
    /// Jump to a label in this or an enclosing block.
    Goto(LabelId),
    Fault(RuntimeError),
}

impl From<RuntimeError> for Flow {
    fn from(e: RuntimeError) -> Self {
        Flow::Fault(e)
    }
}

pub(crate) type Exec<T> = Result<T, Flow>;

/// Runtime errors.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("undefined function `{0}`")]
    UndefinedFunction(String),

    #[error("{0}")]
    TypeError(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("expected {expected} argument{}, got {got}", if *.expected == 1 { "" } else { "s" })]
    ArityMismatch { expected: usize, got: usize },

    #[error("no method `{method}` on type `{ty}`")]
    NoSuchMethod { ty: String, method: String },

    #[error("index {index} out of bounds (length is {len})")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("null reference")]
    NullReference,

    #[error("jump to label L{0} that no enclosing block declares")]
    UndefinedLabel(u32),

    #[error("`{0}` reached the evaluator without being lowered")]
    NotLowered(&'static str),

    #[error("task has not completed and no work is queued")]
    TaskPending,

    #[error("unhandled exception: {0}")]
    Thrown(Value),
}

impl RuntimeError {
    /// Code carried by an unhandled resume error.
    pub fn resume_code(&self) -> Option<i64> {
        match self {
            RuntimeError::Thrown(Value::Exception(e)) => e.code,
            _ => None,
        }
    }

    /// The exception a catch clause sees for this fault.
    pub(crate) fn into_exception(self) -> Value {
        match self {
            RuntimeError::Thrown(value) => value,
            other => Value::exception(&other.to_string(), None),
        }
    }
}
