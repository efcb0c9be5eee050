// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Conversions from lowering and runtime errors to `Diagnostic`.

use coro_interp::RuntimeError;
use coro_lower::{LowerError, LowerErrorKind, ResumeErrorCode};

use crate::codes;
use crate::{Diagnostic, ToDiagnostic};

// ============================================================================
// Lowering Errors
// ============================================================================

impl ToDiagnostic for LowerError {
    fn to_diagnostic(&self) -> Diagnostic {
        use LowerErrorKind::*;

        let diag = Diagnostic::error(self.kind.to_string());
        match &self.kind {
            RefLikeCapture { ty, declared } => {
                let diag = diag
                    .with_code(codes::REF_LIKE_CAPTURE)
                    .with_primary(self.span, format!("`{}` is used after a suspension point", ty));
                let diag = match declared {
                    Some(declared) if *declared != self.span => diag.with_secondary(*declared, "declared here"),
                    _ => diag,
                };
                diag.with_note("state machine fields live on the heap; stack-only values can't be stored there")
                    .with_help("finish using the value before the `await` or `yield`")
            }

            RefLikeSpill { ty } => diag
                .with_code(codes::REF_LIKE_SPILL)
                .with_primary(self.span, format!("temporary of type `{}` would be spilled", ty))
                .with_help("move the `await` out of this expression into its own statement"),

            RefReturningCallAcrossAwait { method } => diag
                .with_code(codes::REF_RETURNING_CALL)
                .with_primary(self.span, format!("reference returned by `{}`", method))
                .with_help(format!("copy the result of `{}` into a local before the `await`", method)),

            StrictInCallAcrossAwait { method } => diag
                .with_code(codes::STRICT_IN_CALL)
                .with_primary(self.span, format!("`in` argument from `{}`", method))
                .with_help("drop the explicit `in` modifier to allow a copy"),

            RefConditionalAcrossAwait => diag
                .with_code(codes::REF_CONDITIONAL)
                .with_primary(self.span, "by-ref conditional")
                .with_help("bind each branch to its own local before the `await`"),
        }
    }
}

// ============================================================================
// Runtime Errors
// ============================================================================

impl ToDiagnostic for RuntimeError {
    fn to_diagnostic(&self) -> Diagnostic {
        match self.resume_code().and_then(ResumeErrorCode::from_code) {
            Some(ResumeErrorCode::CannotResumeIterator) => Diagnostic::error(self.to_string())
                .with_code(codes::CANNOT_RESUME_ITERATOR)
                .with_note("the iterator was suspended at a `yield` that the current version removed")
                .with_help("restart the iteration"),
            Some(ResumeErrorCode::CannotResumeAsync) => Diagnostic::error(self.to_string())
                .with_code(codes::CANNOT_RESUME_ASYNC)
                .with_note("the method was suspended at an `await` that the current version removed")
                .with_help("restart the operation"),
            None => match self {
                RuntimeError::Thrown(_) => {
                    Diagnostic::error(self.to_string()).with_code(codes::UNHANDLED_EXCEPTION)
                }
                _ => Diagnostic::error(self.to_string()).with_code(codes::RUNTIME_FAULT),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorCode, LabelStyle};
    use coro_ast::Span;
    use coro_interp::Value;

    #[test]
    fn lowering_error_gets_code_and_primary_label() {
        let error = LowerError {
            kind: LowerErrorKind::RefReturningCallAcrossAwait {
                method: "slot".to_string(),
            },
            span: Span::new(12, 18),
        };
        let diag = error.to_diagnostic();
        assert_eq!(diag.code, Some(ErrorCode("E4003".to_string())));
        assert_eq!(diag.primary_span(), Some(Span::new(12, 18)));
        assert!(diag.message.contains("`slot`"));
        assert!(diag.help.as_deref().is_some_and(|h| h.contains("slot")));
    }

    #[test]
    fn stack_only_capture_points_at_the_declaration() {
        let error = LowerError {
            kind: LowerErrorKind::RefLikeCapture {
                ty: "Span".to_string(),
                declared: Some(Span::new(2, 6)),
            },
            span: Span::new(30, 34),
        };
        let diag = error.to_diagnostic();
        assert_eq!(diag.primary_span(), Some(Span::new(30, 34)));
        assert_eq!(diag.labels.len(), 2);
        assert_eq!(diag.labels[1].style, LabelStyle::Secondary);
        assert_eq!(diag.labels[1].span, Span::new(2, 6));
    }

    #[test]
    fn resume_error_maps_to_its_own_code() {
        let err = RuntimeError::Thrown(Value::exception(ResumeErrorCode::CannotResumeAsync.message(), Some(-2)));
        let diag = err.to_diagnostic();
        assert_eq!(diag.code, Some(ErrorCode(codes::CANNOT_RESUME_ASYNC.to_string())));
        assert!(diag.labels.is_empty());
    }

    #[test]
    fn plain_faults_are_runtime_faults() {
        let diag = RuntimeError::DivisionByZero.to_diagnostic();
        assert_eq!(diag.code, Some(ErrorCode(codes::RUNTIME_FAULT.to_string())));
        let diag = RuntimeError::Thrown(Value::exception("boom", None)).to_diagnostic();
        assert_eq!(diag.code, Some(ErrorCode(codes::UNHANDLED_EXCEPTION.to_string())));
    }
}
