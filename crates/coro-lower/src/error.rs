// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Errors reported while lowering a state machine.

use coro_ast::Span;
use thiserror::Error;

/// A lowering error at a source location.
#[derive(Debug, Clone, PartialEq)]
pub struct LowerError {
    pub kind: LowerErrorKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LowerErrorKind {
    /// A stack-only variable is read after a suspension point.
    #[error("a value of stack-only type `{ty}` cannot be preserved across a suspension point")]
    RefLikeCapture { ty: String, declared: Option<Span> },

    /// A spilled temporary of stack-only type would have to survive an await.
    #[error("a temporary of stack-only type `{ty}` cannot be preserved across `await`")]
    RefLikeSpill { ty: String },

    /// A by-ref call result would be used after an await.
    #[error("the reference returned by `{method}` cannot be preserved across `await`")]
    RefReturningCallAcrossAwait { method: String },

    /// Argument bound with an explicit `in` would have to be copied to
    /// survive an await.
    #[error("the `in` argument produced by `{method}` cannot be preserved across `await` without a copy")]
    StrictInCallAcrossAwait { method: String },

    #[error("a by-ref conditional expression cannot be preserved across `await`")]
    RefConditionalAcrossAwait,
}

/// Collects errors for one method. Lowering keeps going after a report so
/// independent problems all surface in one pass.
#[derive(Debug, Default)]
pub struct LowerDiagnostics {
    errors: Vec<LowerError>,
}

impl LowerDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error. Reporting the same error at the same span twice is a
    /// no-op.
    pub fn report(&mut self, kind: LowerErrorKind, span: Span) {
        let error = LowerError { kind, span };
        if !self.errors.contains(&error) {
            tracing::trace!(target: "coro_lower", error = %error.kind, start = span.start, "reported");
            self.errors.push(error);
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[LowerError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<LowerError> {
        self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_site_reported_once() {
        let mut diags = LowerDiagnostics::new();
        let kind = LowerErrorKind::RefLikeCapture {
            ty: "Span".into(),
            declared: None,
        };
        diags.report(kind.clone(), Span::new(4, 8));
        diags.report(kind.clone(), Span::new(4, 8));
        diags.report(kind, Span::new(20, 24));
        assert_eq!(diags.errors().len(), 2);
    }

    #[test]
    fn messages_name_the_type() {
        let kind = LowerErrorKind::RefLikeSpill { ty: "Span".into() };
        assert!(kind.to_string().contains("`Span`"));
    }
}
