// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Activation frames and storage locations.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use coro_ast::{FieldSymbol, LocalId, MethodBody, ParamId, RefKind};

use crate::value::{default_value, Object, Value};

pub type Cell = Rc<RefCell<Value>>;

pub fn cell(value: Value) -> Cell {
    Rc::new(RefCell::new(value))
}

/// Something a reference can point at.
#[derive(Debug, Clone)]
pub enum Place {
    /// A local, parameter, `this`, or a temporary holding a copied value.
    Cell(Cell),
    Field(Rc<RefCell<Object>>, Rc<FieldSymbol>),
    /// Field of a struct stored at another place; writes copy the struct
    /// out, update it and store it back.
    StructField(Box<Place>, Rc<FieldSymbol>),
    Element(Rc<RefCell<Vec<Value>>>, usize),
    Static(Rc<FieldSymbol>),
}

/// One method activation.
pub struct Frame {
    pub body: Rc<MethodBody>,
    locals: HashMap<LocalId, Cell>,
    /// Targets of by-ref locals.
    refs: HashMap<LocalId, Place>,
    params: Vec<Cell>,
    pub this: Option<Cell>,
}

impl Frame {
    pub fn new(body: Rc<MethodBody>, this: Option<Value>, args: Vec<Value>) -> Self {
        Frame {
            body,
            locals: HashMap::new(),
            refs: HashMap::new(),
            params: args.into_iter().map(cell).collect(),
            this: this.map(cell),
        }
    }

    /// Give `id` fresh storage holding its default value.
    pub fn declare(&mut self, id: LocalId) {
        if self.is_ref(id) {
            self.refs.remove(&id);
            return;
        }
        let value = self.default_of(id);
        self.locals.insert(id, cell(value));
    }

    pub fn declare_with(&mut self, id: LocalId, value: Value) {
        self.locals.insert(id, cell(value));
    }

    /// Storage of a value local, created on first use for locals no block
    /// declares.
    pub fn local(&mut self, id: LocalId) -> Cell {
        if let Some(existing) = self.locals.get(&id) {
            return Rc::clone(existing);
        }
        let fresh = cell(self.default_of(id));
        self.locals.insert(id, Rc::clone(&fresh));
        fresh
    }

    pub fn is_ref(&self, id: LocalId) -> bool {
        self.body
            .locals
            .get(id)
            .is_some_and(|l| l.ref_kind != RefKind::None)
    }

    pub fn bind_ref(&mut self, id: LocalId, place: Place) {
        self.refs.insert(id, place);
    }

    pub fn ref_target(&self, id: LocalId) -> Option<&Place> {
        self.refs.get(&id)
    }

    pub fn param(&self, id: ParamId) -> Option<Cell> {
        self.params.get(id.0 as usize).cloned()
    }

    fn default_of(&self, id: LocalId) -> Value {
        self.body
            .locals
            .get(id)
            .map(|l| default_value(&l.ty))
            .unwrap_or(Value::Null)
    }
}
