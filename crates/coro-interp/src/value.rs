// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Runtime values.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use coro_ast::Type;
use indexmap::IndexMap;

/// A runtime value in the interpreter.
///
/// Classes, arrays and tasks are shared by reference; structs are copied on
/// every read and write.
#[derive(Debug, Clone)]
pub enum Value {
    Void,
    Null,
    Bool(bool),
    Int(i64),
    Str(Rc<str>),
    Object(Rc<RefCell<Object>>),
    Struct {
        name: Rc<str>,
        fields: IndexMap<Rc<str>, Value>,
    },
    Array(Rc<RefCell<Vec<Value>>>),
    Task(TaskRef),
    /// Awaiter over a task.
    Awaiter(TaskRef),
    /// Completion side of a task.
    Builder(TaskRef),
    Exception(Rc<Exception>),
}

#[derive(Debug)]
pub struct Object {
    pub class: Rc<str>,
    pub fields: IndexMap<Rc<str>, Value>,
}

#[derive(Debug)]
pub struct Exception {
    pub message: Rc<str>,
    /// Set on the error raised when a suspended instance resumes at a state
    /// that no longer exists.
    pub code: Option<i64>,
}

pub type TaskRef = Rc<RefCell<TaskState>>;

#[derive(Debug)]
pub struct TaskState {
    pub status: TaskStatus,
    /// State machines to step once the task finishes.
    pub continuations: Vec<Value>,
}

#[derive(Debug, Clone)]
pub enum TaskStatus {
    Pending,
    Completed(Value),
    Faulted(Value),
}

impl TaskState {
    pub fn pending() -> TaskRef {
        Rc::new(RefCell::new(TaskState {
            status: TaskStatus::Pending,
            continuations: Vec::new(),
        }))
    }

    pub fn completed(value: Value) -> TaskRef {
        Rc::new(RefCell::new(TaskState {
            status: TaskStatus::Completed(value),
            continuations: Vec::new(),
        }))
    }

    pub fn is_completed(&self) -> bool {
        !matches!(self.status, TaskStatus::Pending)
    }
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(class: &str) -> Value {
        Value::Object(Rc::new(RefCell::new(Object {
            class: Rc::from(class),
            fields: IndexMap::new(),
        })))
    }

    pub fn exception(message: &str, code: Option<i64>) -> Value {
        Value::Exception(Rc::new(Exception {
            message: Rc::from(message),
            code,
        }))
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::Void => "void".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Str(_) => "string".to_string(),
            Value::Object(obj) => obj.borrow().class.to_string(),
            Value::Struct { name, .. } => name.to_string(),
            Value::Array(_) => "array".to_string(),
            Value::Task(_) => "Task".to_string(),
            Value::Awaiter(_) => "Awaiter".to_string(),
            Value::Builder(_) => "Builder".to_string(),
            Value::Exception(_) => "exception".to_string(),
        }
    }

    /// Name methods are looked up under.
    pub fn class_name(&self) -> Option<Rc<str>> {
        match self {
            Value::Object(obj) => Some(obj.borrow().class.clone()),
            Value::Struct { name, .. } => Some(name.clone()),
            _ => None,
        }
    }

    /// Read a field of an object or struct, or `None` if it was never
    /// written.
    pub fn field(&self, name: &str) -> Option<Value> {
        match self {
            Value::Object(obj) => obj.borrow().fields.get(name).cloned(),
            Value::Struct { fields, .. } => fields.get(name).cloned(),
            _ => None,
        }
    }
}

/// Zero value of `ty`.
pub fn default_value(ty: &Type) -> Value {
    match ty {
        Type::Void => Value::Void,
        Type::Bool => Value::Bool(false),
        Type::Int => Value::Int(0),
        Type::Struct(def) => Value::Struct {
            name: def.name.clone(),
            fields: def
                .fields
                .iter()
                .map(|(name, ty)| (name.clone(), default_value(ty)))
                .collect(),
        },
        _ => Value::Null,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Struct { name: n1, fields: f1 }, Value::Struct { name: n2, fields: f2 }) => {
                n1 == n2 && f1 == f2
            }
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Task(a), Value::Task(b))
            | (Value::Awaiter(a), Value::Awaiter(b))
            | (Value::Builder(a), Value::Builder(b)) => Rc::ptr_eq(a, b),
            (Value::Exception(a), Value::Exception(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "()"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::Object(obj) => write!(f, "{}", obj.borrow().class),
            Value::Struct { name, fields } => {
                write!(f, "{} {{", name)?;
                for (i, (field, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {}: {}", field, value)?;
                }
                write!(f, " }}")
            }
            Value::Array(items) => {
                let items = items.borrow();
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Task(_) => write!(f, "<task>"),
            Value::Awaiter(_) => write!(f, "<awaiter>"),
            Value::Builder(_) => write!(f, "<builder>"),
            Value::Exception(e) => match e.code {
                Some(code) => write!(f, "{} (code {})", e.message, code),
                None => write!(f, "{}", e.message),
            },
        }
    }
}
