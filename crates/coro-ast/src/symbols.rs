// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Symbols referenced by bound nodes.

use std::rc::Rc;

use crate::{Span, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

/// Anything with storage a method body can read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Variable {
    This,
    Param(ParamId),
    Local(LocalId),
}

/// Where a local came from.
///
/// Long-lived kinds hold values whose lifetime can span statements, so they
/// may need to survive a suspension. Short-lived kinds never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SynthesizedKind {
    UserDefined,
    LoweringTemp,
    AwaiterTemp,
    CachedState,
    FrameCache,
    ReturnValue,
    ConditionalBranchDiscriminator,
    Spill,
    AwaitByRefSpill,
    ForEachArray,
    ForEachArrayIndex,
    ForEachEnumerator,
    Using,
    LockTaken,
    TryAwaitPendingException,
    TryAwaitPendingBranch,
}

impl SynthesizedKind {
    pub fn is_long_lived(self) -> bool {
        !matches!(
            self,
            SynthesizedKind::LoweringTemp
                | SynthesizedKind::AwaiterTemp
                | SynthesizedKind::CachedState
                | SynthesizedKind::FrameCache
                | SynthesizedKind::ReturnValue
        )
    }

    /// A branch discriminator is long-lived but is always consumed before
    /// the next suspension.
    pub fn must_survive_suspension(self) -> bool {
        self.is_long_lived() && self != SynthesizedKind::ConditionalBranchDiscriminator
    }

    /// Whether a field backing this kind may be handed to another local once
    /// the owner's scope ends. Debug builds keep every long-lived slot pinned
    /// so edits can map it; release builds only pin user locals.
    pub fn is_slot_reusable(self, debug: bool) -> bool {
        if debug {
            !self.is_long_lived()
        } else {
            self != SynthesizedKind::UserDefined
        }
    }

    /// Short tag used in synthesized field names.
    pub fn tag(self) -> &'static str {
        match self {
            SynthesizedKind::UserDefined => "h",
            SynthesizedKind::LoweringTemp => "t",
            SynthesizedKind::AwaiterTemp => "aw",
            SynthesizedKind::CachedState => "st",
            SynthesizedKind::FrameCache => "fc",
            SynthesizedKind::ReturnValue => "ret",
            SynthesizedKind::ConditionalBranchDiscriminator => "cbd",
            SynthesizedKind::Spill => "s",
            SynthesizedKind::AwaitByRefSpill => "rs",
            SynthesizedKind::ForEachArray => "fa",
            SynthesizedKind::ForEachArrayIndex => "fi",
            SynthesizedKind::ForEachEnumerator => "fe",
            SynthesizedKind::Using => "u",
            SynthesizedKind::LockTaken => "lk",
            SynthesizedKind::TryAwaitPendingException => "pe",
            SynthesizedKind::TryAwaitPendingBranch => "pb",
        }
    }
}

/// How a value is passed or bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    None,
    Ref,
    Out,
    /// Read-only reference that may silently bind to a copy.
    In,
    /// Read-only reference written with an explicit `in` modifier; must not
    /// bind to a copy.
    StrictIn,
}

impl RefKind {
    pub fn is_by_ref(self) -> bool {
        self != RefKind::None
    }
}

#[derive(Debug, Clone)]
pub struct LocalSymbol {
    pub id: LocalId,
    pub name: Option<Rc<str>>,
    pub ty: Type,
    pub kind: SynthesizedKind,
    pub ref_kind: RefKind,
    pub is_const: bool,
    /// Declarator location.
    pub span: Span,
}

impl LocalSymbol {
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.to_string(),
            None => format!("${}{}", self.kind.tag(), self.id.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamSymbol {
    pub id: ParamId,
    pub name: Rc<str>,
    pub ty: Type,
    pub ref_kind: RefKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSymbol {
    pub name: Rc<str>,
    pub owner: Type,
    pub ty: Type,
    pub is_static: bool,
    pub is_readonly: bool,
    /// Present on fields synthesized to hold hoisted state.
    pub slot: Option<HoistedSlot>,
}

impl FieldSymbol {
    pub fn instance(owner: Type, name: &str, ty: Type) -> Self {
        Self {
            name: Rc::from(name),
            owner,
            ty,
            is_static: false,
            is_readonly: false,
            slot: None,
        }
    }

    pub fn static_field(owner: Type, name: &str, ty: Type) -> Self {
        Self {
            is_static: true,
            ..Self::instance(owner, name, ty)
        }
    }

    pub fn readonly(mut self) -> Self {
        self.is_readonly = true;
        self
    }
}

/// Slot metadata on a synthesized state machine field.
#[derive(Debug, Clone, PartialEq)]
pub struct HoistedSlot {
    /// Persistent slot index, or -1 when the field is not tracked across
    /// generations.
    pub index: i32,
    pub reusable: bool,
    pub debug: Option<LocalSlotDebugInfo>,
}

/// Identity of a local declarator: syntax offset plus an ordinal that
/// separates several locals declared at the same offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LocalDebugId {
    pub syntax_offset: i32,
    pub ordinal: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalSlotDebugInfo {
    pub kind: SynthesizedKind,
    pub id: Option<LocalDebugId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    Async,
    Iterator,
    AsyncIterator,
}

impl MethodKind {
    pub fn is_async(self) -> bool {
        matches!(self, MethodKind::Async | MethodKind::AsyncIterator)
    }

    pub fn is_iterator(self) -> bool {
        matches!(self, MethodKind::Iterator | MethodKind::AsyncIterator)
    }
}

/// Closure frame of an async lambda: variables of the enclosing method the
/// lambda body reads through its receiver.
#[derive(Debug, Clone)]
pub struct ClosureFrame {
    pub frame_type: Type,
    pub captured: Vec<FrameCapture>,
}

#[derive(Debug, Clone)]
pub struct FrameCapture {
    pub local: LocalId,
    pub field: Rc<FieldSymbol>,
}

#[derive(Debug, Clone)]
pub struct MethodSymbol {
    pub name: Rc<str>,
    pub kind: MethodKind,
    pub is_static: bool,
    pub containing_type: Type,
    pub params: Vec<ParamSymbol>,
    pub type_params: Vec<Rc<str>>,
    pub return_type: Type,
    pub span: Span,
    pub closure_frame: Option<ClosureFrame>,
}

impl MethodSymbol {
    pub fn syntax_offset(&self, span: Span) -> i32 {
        span.syntax_offset(self.span)
    }

    pub fn param(&self, id: ParamId) -> Option<&ParamSymbol> {
        self.params.get(id.0 as usize)
    }

    pub fn has_struct_receiver(&self) -> bool {
        !self.is_static && self.containing_type.is_struct()
    }

    pub fn variable_type(&self, locals: &crate::LocalTable, var: Variable) -> Option<Type> {
        match var {
            Variable::This if !self.is_static => Some(self.containing_type.clone()),
            Variable::This => None,
            Variable::Param(p) => self.param(p).map(|p| p.ty.clone()),
            Variable::Local(l) => locals.get(l).map(|l| l.ty.clone()),
        }
    }

    /// The frame field backing `local`, when the local lives in the closure
    /// frame of an async lambda.
    pub fn frame_capture(&self, local: LocalId) -> Option<&FrameCapture> {
        self.closure_frame
            .as_ref()
            .and_then(|frame| frame.captured.iter().find(|c| c.local == local))
    }

    /// Value produced by a completed async method, or element type of an
    /// iterator.
    pub fn result_type(&self) -> Type {
        match (&self.kind, &self.return_type) {
            (MethodKind::Async, Type::Task(t)) => (**t).clone(),
            (MethodKind::Iterator | MethodKind::AsyncIterator, Type::Enumerator(t)) => (**t).clone(),
            _ => Type::Void,
        }
    }
}
