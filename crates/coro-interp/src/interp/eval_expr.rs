// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Expression evaluation.

use coro_ast::{BinOp, Expr, ExprKind, Literal, Type, UnaryOp};
use indexmap::IndexMap;

use super::{Exec, Interpreter, RuntimeError};
use crate::value::{default_value, Value};

impl Interpreter {
    pub(crate) fn eval(&mut self, expr: &Expr) -> Exec<Value> {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(match lit {
                Literal::Null => Value::Null,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(n) => Value::Int(*n),
                Literal::Str(s) => Value::Str(s.clone()),
            }),
            ExprKind::Default => Ok(default_value(&expr.ty)),

            ExprKind::Local(_) | ExprKind::Param(_) | ExprKind::This | ExprKind::Base => {
                let place = self.place(expr)?;
                Ok(self.read(&place)?)
            }

            ExprKind::Field { receiver: None, field } => {
                let place = crate::env::Place::Static(field.clone());
                Ok(self.read(&place)?)
            }
            ExprKind::Field { receiver: Some(receiver), field } => {
                match self.eval(receiver)? {
                    Value::Null => Err(RuntimeError::NullReference.into()),
                    value @ (Value::Object(_) | Value::Struct { .. }) => {
                        Ok(value.field(&field.name).unwrap_or_else(|| default_value(&field.ty)))
                    }
                    other => Err(RuntimeError::TypeError(format!(
                        "no field `{}` on {}",
                        field.name,
                        other.type_name()
                    ))
                    .into()),
                }
            }

            ExprKind::Index { .. } => {
                let place = self.place(expr)?;
                Ok(self.read(&place)?)
            }

            ExprKind::Call { receiver, method, args, ref_kind } => {
                if ref_kind.is_by_ref() && receiver.is_none() {
                    if let Some(place) = self.host_ref(method, args)? {
                        return Ok(self.read(&place)?);
                    }
                }
                let receiver = match receiver {
                    Some(r) => Some(self.eval(r)?),
                    None => None,
                };
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(&arg.expr)?);
                }
                Ok(self.call(receiver, method, values)?)
            }

            ExprKind::Binary { op: BinOp::And, left, right } => {
                if !self.eval_bool(left)? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval_bool(right)?))
            }
            ExprKind::Binary { op: BinOp::Or, left, right } => {
                if self.eval_bool(left)? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval_bool(right)?))
            }
            ExprKind::Binary { op, left, right } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                Ok(self.eval_binop(*op, l, r)?)
            }
            ExprKind::Unary { op, operand } => {
                let value = self.eval(operand)?;
                match (op, value) {
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (UnaryOp::Neg, Value::Int(n)) => Ok(Value::Int(-n)),
                    (op, other) => Err(RuntimeError::TypeError(format!(
                        "cannot apply {:?} to {}",
                        op,
                        other.type_name()
                    ))
                    .into()),
                }
            }

            ExprKind::Conditional { cond, then_expr, else_expr, .. } => {
                if self.eval_bool(cond)? {
                    self.eval(then_expr)
                } else {
                    self.eval(else_expr)
                }
            }

            ExprKind::Assign { target, value, is_ref: true } => {
                let Some(local) = target.as_local() else {
                    return Err(RuntimeError::TypeError("ref assignment to a non-local".to_string()).into());
                };
                let place = self.place(value)?;
                let current = self.read(&place)?;
                self.frame()?.bind_ref(local, place);
                Ok(current)
            }
            ExprKind::Assign { target, value, is_ref: false } => {
                let place = self.place(target)?;
                let value = self.eval(value)?;
                self.write(&place, value.clone())?;
                Ok(value)
            }

            ExprKind::Await(_) => Err(RuntimeError::NotLowered("await").into()),

            ExprKind::Sequence { locals, side_effects, value } => {
                let frame = self.frame()?;
                for local in locals {
                    frame.declare(*local);
                }
                for effect in side_effects {
                    self.eval(effect)?;
                }
                self.eval(value)
            }

            ExprKind::New { args } => self.eval_new(&expr.ty, args),
            ExprKind::NewArray(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Ok(Value::array(values))
            }

            ExprKind::Intrinsic { op, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                Ok(self.intrinsic(*op, values)?)
            }

            ExprKind::Shared(inner) => self.eval(inner),
        }
    }

    pub(crate) fn eval_bool(&mut self, expr: &Expr) -> Exec<bool> {
        match self.eval(expr)? {
            Value::Bool(b) => Ok(b),
            other => Err(RuntimeError::TypeError(format!(
                "expected bool, found {}",
                other.type_name()
            ))
            .into()),
        }
    }

    fn eval_new(&mut self, ty: &Type, args: &[Expr]) -> Exec<Value> {
        match ty {
            Type::Class(name) => Ok(Value::object(name)),
            Type::Struct(def) => {
                let mut fields = IndexMap::new();
                for (i, (name, field_ty)) in def.fields.iter().enumerate() {
                    let value = match args.get(i) {
                        Some(arg) => self.eval(arg)?,
                        None => default_value(field_ty),
                    };
                    fields.insert(name.clone(), value);
                }
                Ok(Value::Struct {
                    name: def.name.clone(),
                    fields,
                })
            }
            other => Err(RuntimeError::TypeError(format!("cannot instantiate {}", other)).into()),
        }
    }
}
