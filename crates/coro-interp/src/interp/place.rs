// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Storage locations: resolving an expression to the place it names, and
//! reading or writing through a place.

use std::rc::Rc;

use coro_ast::{Expr, ExprKind};

use super::{Exec, Interpreter, RuntimeError};
use crate::env::{cell, Place};
use crate::value::{default_value, Value};

impl Interpreter {
    /// The storage `expr` denotes. Expressions that don't name storage
    /// evaluate into a fresh temporary.
    pub(crate) fn place(&mut self, expr: &Expr) -> Exec<Place> {
        match &expr.kind {
            ExprKind::Local(id) => {
                let frame = self.frame()?;
                if frame.is_ref(*id) {
                    return match frame.ref_target(*id) {
                        Some(place) => Ok(place.clone()),
                        None => Err(RuntimeError::TypeError(format!(
                            "ref local {} read before it was bound",
                            id.0
                        ))
                        .into()),
                    };
                }
                Ok(Place::Cell(frame.local(*id)))
            }
            ExprKind::Param(id) => match self.frame()?.param(*id) {
                Some(param) => Ok(Place::Cell(param)),
                None => Err(RuntimeError::TypeError(format!("missing argument {}", id.0)).into()),
            },
            ExprKind::This | ExprKind::Base => match &self.frame()?.this {
                Some(this) => Ok(Place::Cell(Rc::clone(this))),
                None => Err(RuntimeError::TypeError("`this` in a static method".to_string()).into()),
            },

            ExprKind::Field { receiver: None, field } => Ok(Place::Static(field.clone())),
            ExprKind::Field { receiver: Some(receiver), field } => {
                if receiver.ty.is_struct() {
                    let base = self.place(receiver)?;
                    return Ok(Place::StructField(Box::new(base), field.clone()));
                }
                match self.eval(receiver)? {
                    Value::Object(obj) => Ok(Place::Field(obj, field.clone())),
                    Value::Null => Err(RuntimeError::NullReference.into()),
                    other => Err(RuntimeError::TypeError(format!(
                        "no field `{}` on {}",
                        field.name,
                        other.type_name()
                    ))
                    .into()),
                }
            }

            ExprKind::Index { array, index } => {
                let array = self.eval(array)?;
                let index = self.eval(index)?;
                let (Value::Array(items), Value::Int(i)) = (&array, &index) else {
                    return match array {
                        Value::Null => Err(RuntimeError::NullReference.into()),
                        _ => Err(RuntimeError::TypeError(format!(
                            "cannot index {} with {}",
                            array.type_name(),
                            index.type_name()
                        ))
                        .into()),
                    };
                };
                let len = items.borrow().len();
                if *i < 0 || *i as usize >= len {
                    return Err(RuntimeError::IndexOutOfBounds { index: *i, len }.into());
                }
                Ok(Place::Element(Rc::clone(items), *i as usize))
            }

            ExprKind::Call { receiver: None, method, args, ref_kind } if ref_kind.is_by_ref() => {
                match self.host_ref(method, args)? {
                    Some(place) => Ok(place),
                    None => self.temporary(expr),
                }
            }

            ExprKind::Conditional { cond, then_expr, else_expr, ref_kind } if ref_kind.is_by_ref() => {
                if self.eval_bool(cond)? {
                    self.place(then_expr)
                } else {
                    self.place(else_expr)
                }
            }

            ExprKind::Sequence { locals, side_effects, value } => {
                let frame = self.frame()?;
                for local in locals {
                    frame.declare(*local);
                }
                for effect in side_effects {
                    self.eval(effect)?;
                }
                self.place(value)
            }

            ExprKind::Shared(inner) => self.place(inner),

            _ => self.temporary(expr),
        }
    }

    fn temporary(&mut self, expr: &Expr) -> Exec<Place> {
        let value = self.eval(expr)?;
        Ok(Place::Cell(cell(value)))
    }

    pub(crate) fn read(&self, place: &Place) -> Result<Value, RuntimeError> {
        match place {
            Place::Cell(c) => Ok(c.borrow().clone()),
            Place::Field(obj, field) => Ok(obj
                .borrow()
                .fields
                .get(&field.name)
                .cloned()
                .unwrap_or_else(|| default_value(&field.ty))),
            Place::StructField(base, field) => {
                let base = self.read(base)?;
                match base {
                    Value::Struct { .. } => Ok(base
                        .field(&field.name)
                        .unwrap_or_else(|| default_value(&field.ty))),
                    other => Err(RuntimeError::TypeError(format!(
                        "no field `{}` on {}",
                        field.name,
                        other.type_name()
                    ))),
                }
            }
            Place::Element(items, i) => {
                let items = items.borrow();
                items.get(*i).cloned().ok_or(RuntimeError::IndexOutOfBounds {
                    index: *i as i64,
                    len: items.len(),
                })
            }
            Place::Static(field) => Ok(self
                .statics
                .get(&static_key(field))
                .cloned()
                .unwrap_or_else(|| default_value(&field.ty))),
        }
    }

    pub(crate) fn write(&mut self, place: &Place, value: Value) -> Result<(), RuntimeError> {
        match place {
            Place::Cell(c) => {
                *c.borrow_mut() = value;
            }
            Place::Field(obj, field) => {
                obj.borrow_mut().fields.insert(field.name.clone(), value);
            }
            Place::StructField(base, field) => {
                let mut outer = self.read(base)?;
                match &mut outer {
                    Value::Struct { fields, .. } => {
                        fields.insert(field.name.clone(), value);
                    }
                    other => {
                        return Err(RuntimeError::TypeError(format!(
                            "no field `{}` on {}",
                            field.name,
                            other.type_name()
                        )))
                    }
                }
                self.write(base, outer)?;
            }
            Place::Element(items, i) => {
                let mut items = items.borrow_mut();
                let len = items.len();
                match items.get_mut(*i) {
                    Some(slot) => *slot = value,
                    None => return Err(RuntimeError::IndexOutOfBounds { index: *i as i64, len }),
                }
            }
            Place::Static(field) => {
                self.statics.insert(static_key(field), value);
            }
        }
        Ok(())
    }
}

fn static_key(field: &coro_ast::FieldSymbol) -> String {
    format!("{}::{}", field.owner, field.name)
}
