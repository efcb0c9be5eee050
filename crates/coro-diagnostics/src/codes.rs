// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Error code registry.
//!
//! Maps error codes to titles and categories. Lowering errors use E40xx,
//! runtime faults E41xx.

use std::collections::HashMap;

pub struct ErrorCodeRegistry {
    codes: HashMap<&'static str, ErrorCodeInfo>,
}

pub struct ErrorCodeInfo {
    pub code: &'static str,
    pub title: &'static str,
    pub category: ErrorCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A variable that cannot be stored in the state machine.
    Capture,
    /// A reference that cannot be preserved across a suspension.
    Reference,
    Runtime,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Capture => write!(f, "Capture"),
            ErrorCategory::Reference => write!(f, "Reference"),
            ErrorCategory::Runtime => write!(f, "Runtime"),
        }
    }
}

pub const REF_LIKE_CAPTURE: &str = "E4001";
pub const REF_LIKE_SPILL: &str = "E4002";
pub const REF_RETURNING_CALL: &str = "E4003";
pub const STRICT_IN_CALL: &str = "E4004";
pub const REF_CONDITIONAL: &str = "E4005";
pub const UNHANDLED_EXCEPTION: &str = "E4100";
pub const CANNOT_RESUME_ITERATOR: &str = "E4101";
pub const CANNOT_RESUME_ASYNC: &str = "E4102";
pub const RUNTIME_FAULT: &str = "E4103";

macro_rules! register_codes {
    ($($code:expr => ($title:literal, $cat:expr)),* $(,)?) => {{
        let mut map = HashMap::new();
        $(
            map.insert($code, ErrorCodeInfo {
                code: $code,
                title: $title,
                category: $cat,
            });
        )*
        map
    }};
}

impl Default for ErrorCodeRegistry {
    fn default() -> Self {
        use ErrorCategory::*;

        Self {
            codes: register_codes! {
                // Lowering (E40xx)
                REF_LIKE_CAPTURE => ("stack-only variable live across a suspension", Capture),
                REF_LIKE_SPILL => ("stack-only temporary live across await", Capture),
                REF_RETURNING_CALL => ("by-ref call result live across await", Reference),
                STRICT_IN_CALL => ("`in` argument live across await", Reference),
                REF_CONDITIONAL => ("by-ref conditional live across await", Reference),

                // Runtime (E41xx)
                UNHANDLED_EXCEPTION => ("unhandled exception", Runtime),
                CANNOT_RESUME_ITERATOR => ("iterator resumed at a removed state", Runtime),
                CANNOT_RESUME_ASYNC => ("async method resumed at a removed state", Runtime),
                RUNTIME_FAULT => ("evaluation fault", Runtime),
            },
        }
    }
}

impl ErrorCodeRegistry {
    pub fn get(&self, code: &str) -> Option<&ErrorCodeInfo> {
        self.codes.get(code)
    }

    pub fn all(&self) -> impl Iterator<Item = &ErrorCodeInfo> {
        self.codes.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowering_codes_are_registered() {
        let registry = ErrorCodeRegistry::default();
        for code in ["E4001", "E4002", "E4003", "E4004", "E4005"] {
            assert!(registry.get(code).is_some(), "{} missing", code);
        }
        assert_eq!(registry.get(REF_CONDITIONAL).map(|i| i.category), Some(ErrorCategory::Reference));
        assert!(registry.get("E0308").is_none());
    }
}
