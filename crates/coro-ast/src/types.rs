// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Types carried by bound nodes and symbols.

use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Bool,
    Int,
    String,
    Object,
    Exception,
    Array(Box<Type>),
    /// Reference type, identified by name.
    Class(Rc<str>),
    /// Value type with inline fields.
    Struct(Rc<StructDef>),
    /// Stack-only value type. Never stored in a heap field.
    RefLike(Rc<str>),
    TypeParam(TypeParam),
    Task(Box<Type>),
    Awaiter(Box<Type>),
    Enumerator(Box<Type>),
    /// Completion source driving an async state machine.
    Builder(Box<Type>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructDef {
    pub name: Rc<str>,
    pub fields: Vec<(Rc<str>, Type)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeParam {
    pub name: Rc<str>,
    pub owner: TypeParamOwner,
}

/// Who declares a type parameter. Method type parameters are re-declared
/// on the state machine container when the method is lowered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeParamOwner {
    Method,
    Container,
}

impl Type {
    pub fn class(name: &str) -> Type {
        Type::Class(Rc::from(name))
    }

    pub fn struct_of(name: &str, fields: Vec<(&str, Type)>) -> Type {
        Type::Struct(Rc::new(StructDef {
            name: Rc::from(name),
            fields: fields.into_iter().map(|(n, t)| (Rc::from(n), t)).collect(),
        }))
    }

    pub fn ref_like(name: &str) -> Type {
        Type::RefLike(Rc::from(name))
    }

    pub fn method_param(name: &str) -> Type {
        Type::TypeParam(TypeParam {
            name: Rc::from(name),
            owner: TypeParamOwner::Method,
        })
    }

    pub fn array(elem: Type) -> Type {
        Type::Array(Box::new(elem))
    }

    pub fn task(result: Type) -> Type {
        Type::Task(Box::new(result))
    }

    pub fn enumerator(elem: Type) -> Type {
        Type::Enumerator(Box::new(elem))
    }

    pub fn is_reference_type(&self) -> bool {
        matches!(
            self,
            Type::String
                | Type::Object
                | Type::Exception
                | Type::Array(_)
                | Type::Class(_)
                | Type::Task(_)
                | Type::Enumerator(_)
                | Type::Builder(_)
        )
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, Type::Struct(_))
    }

    /// Stack-only types can't be hoisted into the state machine.
    pub fn is_ref_like(&self) -> bool {
        matches!(self, Type::RefLike(_))
    }

    /// Whether a value of this type may keep an object alive.
    ///
    /// Open type parameters count, as does any struct whose transitive field
    /// closure contains one.
    pub fn might_contain_references(&self) -> bool {
        match self {
            Type::Void | Type::Bool | Type::Int => false,
            Type::Struct(def) => def.fields.iter().any(|(_, t)| t.might_contain_references()),
            Type::Awaiter(_) | Type::RefLike(_) | Type::TypeParam(_) => true,
            other => other.is_reference_type(),
        }
    }

    /// `Task<T>` → `Awaiter<T>`.
    pub fn awaiter(&self) -> Option<Type> {
        match self {
            Type::Task(result) => Some(Type::Awaiter(result.clone())),
            _ => None,
        }
    }

    /// Result produced by awaiting a value of this type.
    pub fn await_result(&self) -> Option<&Type> {
        match self {
            Type::Task(result) | Type::Awaiter(result) => Some(result),
            _ => None,
        }
    }

    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::Array(elem) | Type::Enumerator(elem) => Some(elem),
            _ => None,
        }
    }

    pub fn struct_field(&self, name: &str) -> Option<&Type> {
        match self {
            Type::Struct(def) => def.fields.iter().find(|(n, _)| &**n == name).map(|(_, t)| t),
            _ => None,
        }
    }

    /// Rebuild the type with every type parameter passed through `f`.
    pub fn map_type_params(&self, f: &impl Fn(&TypeParam) -> Type) -> Type {
        match self {
            Type::TypeParam(p) => f(p),
            Type::Array(t) => Type::Array(Box::new(t.map_type_params(f))),
            Type::Task(t) => Type::Task(Box::new(t.map_type_params(f))),
            Type::Awaiter(t) => Type::Awaiter(Box::new(t.map_type_params(f))),
            Type::Enumerator(t) => Type::Enumerator(Box::new(t.map_type_params(f))),
            Type::Builder(t) => Type::Builder(Box::new(t.map_type_params(f))),
            Type::Struct(def) => Type::Struct(Rc::new(StructDef {
                name: def.name.clone(),
                fields: def
                    .fields
                    .iter()
                    .map(|(n, t)| (n.clone(), t.map_type_params(f)))
                    .collect(),
            })),
            other => other.clone(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::String => write!(f, "string"),
            Type::Object => write!(f, "object"),
            Type::Exception => write!(f, "exception"),
            Type::Array(elem) => write!(f, "{}[]", elem),
            Type::Class(name) | Type::RefLike(name) => write!(f, "{}", name),
            Type::Struct(def) => write!(f, "{}", def.name),
            Type::TypeParam(p) => match p.owner {
                TypeParamOwner::Method => write!(f, "{}", p.name),
                TypeParamOwner::Container => write!(f, "!{}", p.name),
            },
            Type::Task(t) => write!(f, "Task<{}>", t),
            Type::Awaiter(t) => write!(f, "Awaiter<{}>", t),
            Type::Enumerator(t) => write!(f, "Enumerator<{}>", t),
            Type::Builder(t) => write!(f, "Builder<{}>", t),
        }
    }
}
