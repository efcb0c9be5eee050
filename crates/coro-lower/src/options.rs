// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Lowering configuration.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptimizationLevel {
    /// Every user local is hoisted and every long-lived slot is pinned, so a
    /// debugger sees all locals and edits can remap them.
    Debug,
    #[default]
    Release,
}

#[derive(Debug, Clone)]
pub struct LowerOptions {
    pub optimization: OptimizationLevel,
    /// Wrap scopes whose locals were hoisted in scope markers.
    pub emit_debug_scopes: bool,
    /// Index of this method among the state machines of its containing type,
    /// used in the container name.
    pub method_ordinal: u32,
}

impl Default for LowerOptions {
    fn default() -> Self {
        Self {
            optimization: OptimizationLevel::Release,
            emit_debug_scopes: true,
            method_ordinal: 0,
        }
    }
}

impl LowerOptions {
    pub fn debug() -> Self {
        Self {
            optimization: OptimizationLevel::Debug,
            ..Self::default()
        }
    }

    pub fn release() -> Self {
        Self::default()
    }

    pub fn with_debug_scopes(mut self, emit: bool) -> Self {
        self.emit_debug_scopes = emit;
        self
    }

    pub fn with_method_ordinal(mut self, ordinal: u32) -> Self {
        self.method_ordinal = ordinal;
        self
    }

    pub fn is_debug(&self) -> bool {
        self.optimization == OptimizationLevel::Debug
    }
}
