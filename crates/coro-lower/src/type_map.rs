// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Method-to-container type parameter substitution.

use coro_ast::{LocalTable, Type, TypeParam, TypeParamOwner};

/// The state machine re-declares the method's type parameters; every type
/// that ends up in the container (fields, step-method locals, expressions)
/// refers to the container's copies.
#[derive(Debug, Clone, Default)]
pub struct TypeMap {
    enabled: bool,
}

impl TypeMap {
    pub fn for_method(type_params: &[std::rc::Rc<str>]) -> Self {
        Self {
            enabled: !type_params.is_empty(),
        }
    }

    pub fn substitute(&self, ty: &Type) -> Type {
        if !self.enabled {
            return ty.clone();
        }
        ty.map_type_params(&|p| match p.owner {
            TypeParamOwner::Method => Type::TypeParam(TypeParam {
                name: p.name.clone(),
                owner: TypeParamOwner::Container,
            }),
            TypeParamOwner::Container => Type::TypeParam(p.clone()),
        })
    }

    /// Copy of `locals` with substituted types. Ids are preserved.
    pub fn substitute_locals(&self, locals: &LocalTable) -> LocalTable {
        let mut table = LocalTable::new();
        for local in locals.iter() {
            let id = table.declare(
                local.name.as_deref(),
                self.substitute(&local.ty),
                local.kind,
                local.ref_kind,
                local.span,
            );
            if local.is_const {
                table.mark_const(id);
            }
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coro_ast::{RefKind, Span, SynthesizedKind};
    use std::rc::Rc;

    #[test]
    fn method_params_move_to_container() {
        let map = TypeMap::for_method(&[Rc::from("T")]);
        let t = map.substitute(&Type::array(Type::method_param("T")));
        assert_eq!(t.to_string(), "!T[]");
    }

    #[test]
    fn local_ids_survive_substitution() {
        let mut locals = LocalTable::new();
        let a = locals.declare(Some("a"), Type::Int, SynthesizedKind::UserDefined, RefKind::None, Span::new(1, 2));
        let t = locals.declare(
            Some("t"),
            Type::method_param("T"),
            SynthesizedKind::UserDefined,
            RefKind::None,
            Span::new(3, 4),
        );
        locals.mark_const(a);

        let map = TypeMap::for_method(&[Rc::from("T")]);
        let out = map.substitute_locals(&locals);
        assert!(out.get(a).is_some_and(|l| l.is_const));
        assert_eq!(out.get(t).map(|l| l.ty.to_string()), Some("!T".to_string()));
    }
}
