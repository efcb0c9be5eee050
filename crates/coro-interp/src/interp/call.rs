// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Method calls and host functions.

use std::rc::Rc;

use coro_ast::Arg;

use super::{Exec, Interpreter, RuntimeError};
use crate::env::Place;
use crate::value::{TaskState, Value};

impl Interpreter {
    /// Call `method` on `receiver`, or a static function or host function
    /// when there is no receiver.
    pub fn call(
        &mut self,
        receiver: Option<Value>,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let Some(receiver) = receiver else {
            if let Some(body) = self.functions.get(method).cloned() {
                return self.invoke(body, None, args);
            }
            return self.call_host(method, args);
        };

        let Some(class) = receiver.class_name() else {
            return match receiver {
                Value::Null => Err(RuntimeError::NullReference),
                other => Err(RuntimeError::NoSuchMethod {
                    ty: other.type_name(),
                    method: method.to_string(),
                }),
            };
        };
        let body = self
            .methods
            .get(&class)
            .and_then(|methods| methods.get(method))
            .cloned()
            .ok_or_else(|| RuntimeError::NoSuchMethod {
                ty: class.to_string(),
                method: method.to_string(),
            })?;
        tracing::trace!(target: "coro_interp", class = %class, method, state = ?receiver.field(coro_lower::STATE_FIELD), "call");
        self.invoke(body, Some(receiver), args)
    }

    /// Functions the host provides to every program.
    fn call_host(&mut self, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        match name {
            // A task that completes on the next scheduler turn.
            "yield_now" => {
                expect_args(&args, 0)?;
                Ok(Value::Task(self.scheduler.deferred(Value::Void)))
            }
            "delay_value" => {
                let [value] = take_args(args)?;
                Ok(Value::Task(self.scheduler.deferred(value)))
            }
            "from_result" => {
                let [value] = take_args(args)?;
                Ok(Value::Task(TaskState::completed(value)))
            }
            // A task that has already failed with `message`.
            "faulted" => {
                let [message] = take_args(args)?;
                let task = TaskState::pending();
                self.scheduler.fault(&task, Value::exception(&message.to_string(), None));
                Ok(Value::Task(task))
            }
            "exception" => {
                let [message] = take_args(args)?;
                Ok(Value::exception(&message.to_string(), None))
            }
            "print" => {
                let line = args.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ");
                self.emit(line);
                Ok(Value::Void)
            }
            "first" => {
                let [array] = take_args(args)?;
                match array {
                    Value::Array(items) => items.borrow().first().cloned().ok_or(
                        RuntimeError::IndexOutOfBounds { index: 0, len: 0 },
                    ),
                    Value::Null => Err(RuntimeError::NullReference),
                    other => Err(RuntimeError::TypeError(format!(
                        "first() expects an array, found {}",
                        other.type_name()
                    ))),
                }
            }
            "len" => {
                let [array] = take_args(args)?;
                match array {
                    Value::Array(items) => Ok(Value::Int(items.borrow().len() as i64)),
                    other => Err(RuntimeError::TypeError(format!(
                        "len() expects an array, found {}",
                        other.type_name()
                    ))),
                }
            }
            _ => Err(RuntimeError::UndefinedFunction(name.to_string())),
        }
    }

    /// Host functions that return a reference. `None` when `name` is not
    /// one of them.
    pub(crate) fn host_ref(&mut self, name: &str, args: &[Arg]) -> Exec<Option<Place>> {
        match name {
            "first" if args.len() == 1 => match self.eval(&args[0].expr)? {
                Value::Array(items) => {
                    let len = items.borrow().len();
                    if len == 0 {
                        return Err(RuntimeError::IndexOutOfBounds { index: 0, len }.into());
                    }
                    Ok(Some(Place::Element(Rc::clone(&items), 0)))
                }
                Value::Null => Err(RuntimeError::NullReference.into()),
                other => Err(RuntimeError::TypeError(format!(
                    "first() expects an array, found {}",
                    other.type_name()
                ))
                .into()),
            },
            _ => Ok(None),
        }
    }
}

fn expect_args(args: &[Value], expected: usize) -> Result<(), RuntimeError> {
    if args.len() != expected {
        return Err(RuntimeError::ArityMismatch { expected, got: args.len() });
    }
    Ok(())
}

pub(super) fn take_args<const N: usize>(args: Vec<Value>) -> Result<[Value; N], RuntimeError> {
    let got = args.len();
    args.try_into()
        .map_err(|_| RuntimeError::ArityMismatch { expected: N, got })
}
