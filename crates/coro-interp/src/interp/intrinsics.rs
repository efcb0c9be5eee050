// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Builder and awaiter operations emitted by the lowering.

use coro_ast::Intrinsic;
use coro_lower::MOVE_NEXT;

use super::call::take_args;
use super::{Interpreter, RuntimeError};
use crate::value::{TaskRef, TaskState, TaskStatus, Value};

impl Interpreter {
    pub(crate) fn intrinsic(&mut self, op: Intrinsic, args: Vec<Value>) -> Result<Value, RuntimeError> {
        match op {
            Intrinsic::CreateBuilder => {
                take_args::<0>(args)?;
                Ok(Value::Builder(TaskState::pending()))
            }
            Intrinsic::Start => {
                let [_builder, machine] = take_args(args)?;
                self.call(Some(machine), MOVE_NEXT, Vec::new())?;
                Ok(Value::Void)
            }
            Intrinsic::BuilderTask => {
                let [builder] = take_args(args)?;
                Ok(Value::Task(builder_task(&builder)?))
            }
            Intrinsic::SetResult => {
                let mut args = args.into_iter();
                let builder = args.next().ok_or(RuntimeError::ArityMismatch { expected: 1, got: 0 })?;
                let value = args.next().unwrap_or(Value::Void);
                let task = builder_task(&builder)?;
                tracing::trace!(target: "coro_interp", result = %value, "task completed");
                self.scheduler.complete(&task, value);
                Ok(Value::Void)
            }
            Intrinsic::SetException => {
                let [builder, exception] = take_args(args)?;
                let task = builder_task(&builder)?;
                tracing::trace!(target: "coro_interp", exception = %exception, "task faulted");
                self.scheduler.fault(&task, exception);
                Ok(Value::Void)
            }
            Intrinsic::AwaitOnCompleted => {
                let [_builder, awaiter, machine] = take_args(args)?;
                let task = awaited_task(&awaiter)?;
                self.scheduler.on_completed(&task, machine);
                Ok(Value::Void)
            }
            Intrinsic::GetAwaiter => {
                let [task] = take_args(args)?;
                match task {
                    Value::Task(task) => Ok(Value::Awaiter(task)),
                    Value::Null => Err(RuntimeError::NullReference),
                    other => Err(RuntimeError::TypeError(format!(
                        "cannot await {}",
                        other.type_name()
                    ))),
                }
            }
            Intrinsic::IsCompleted => {
                let [awaiter] = take_args(args)?;
                let task = awaited_task(&awaiter)?;
                let done = task.borrow().is_completed();
                Ok(Value::Bool(done))
            }
            Intrinsic::GetResult => {
                let [awaiter] = take_args(args)?;
                let status = awaited_task(&awaiter)?.borrow().status.clone();
                match status {
                    TaskStatus::Completed(value) => Ok(value),
                    TaskStatus::Faulted(exception) => Err(RuntimeError::Thrown(exception)),
                    TaskStatus::Pending => Err(RuntimeError::TaskPending),
                }
            }
            Intrinsic::ResumeError => {
                let [message, code] = take_args(args)?;
                let code = match code {
                    Value::Int(code) => Some(code),
                    _ => None,
                };
                Ok(Value::exception(&message.to_string(), code))
            }
        }
    }
}

fn builder_task(builder: &Value) -> Result<TaskRef, RuntimeError> {
    match builder {
        Value::Builder(task) => Ok(task.clone()),
        Value::Null => Err(RuntimeError::NullReference),
        other => Err(RuntimeError::TypeError(format!(
            "expected a builder, found {}",
            other.type_name()
        ))),
    }
}

fn awaited_task(awaiter: &Value) -> Result<TaskRef, RuntimeError> {
    match awaiter {
        Value::Awaiter(task) => Ok(task.clone()),
        Value::Null => Err(RuntimeError::NullReference),
        other => Err(RuntimeError::TypeError(format!(
            "expected an awaiter, found {}",
            other.type_name()
        ))),
    }
}
