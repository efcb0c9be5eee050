// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! JSON diagnostic output for tools.
//!
//! Each diagnostic carries its primary location (1-based line/col), every
//! label with the source line it points into, and the error category from
//! the code registry.

use serde::Serialize;

use coro_ast::LineMap;

use crate::{codes::ErrorCodeRegistry, Diagnostic, LabelStyle, Severity};

/// All diagnostics from one lowering or execution run.
#[derive(Debug, Serialize)]
pub struct DiagnosticReport {
    /// Schema version.
    pub version: u32,
    pub file: String,
    /// No errors were reported.
    pub success: bool,
    /// "lower" or "run".
    pub phase: String,
    pub diagnostics: Vec<JsonDiagnostic>,
    pub error_count: usize,
    pub warning_count: usize,
}

#[derive(Debug, Serialize)]
pub struct JsonDiagnostic {
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Error category, e.g. "Capture" or "Reference".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    pub labels: Vec<JsonLabel>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
    pub byte_offset: usize,
    pub source_line: String,
}

#[derive(Debug, Serialize)]
pub struct JsonLabel {
    pub role: LabelStyle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub start: LineCol,
    pub end: LineCol,
    pub source_line: String,
}

#[derive(Debug, Serialize)]
pub struct LineCol {
    pub line: usize,
    pub column: usize,
    pub byte_offset: usize,
}

/// Convert diagnostics to a structured report.
pub fn to_json_report(diagnostics: &[Diagnostic], source: &str, file: &str, phase: &str) -> DiagnosticReport {
    let registry = ErrorCodeRegistry::default();
    let lines = SourceLines::new(source);

    let error_count = diagnostics.iter().filter(|d| d.is_error()).count();
    let warning_count = diagnostics.iter().filter(|d| d.severity == Severity::Warning).count();

    DiagnosticReport {
        version: 1,
        file: file.to_string(),
        success: error_count == 0,
        phase: phase.to_string(),
        diagnostics: diagnostics
            .iter()
            .map(|d| to_json_diagnostic(d, &lines, &registry))
            .collect(),
        error_count,
        warning_count,
    }
}

/// Pretty-printed report.
pub fn to_json_string(diagnostics: &[Diagnostic], source: &str, file: &str, phase: &str) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&to_json_report(diagnostics, source, file, phase))
}

fn to_json_diagnostic(diag: &Diagnostic, lines: &SourceLines<'_>, registry: &ErrorCodeRegistry) -> JsonDiagnostic {
    let code = diag.code.as_ref().map(|c| c.0.clone());
    let category = code
        .as_deref()
        .and_then(|c| registry.get(c))
        .map(|info| info.category.to_string());

    let location = diag.primary_span().map(|span| {
        let at = lines.line_col(span.start);
        SourceLocation {
            line: at.line,
            column: at.column,
            byte_offset: at.byte_offset,
            source_line: lines.text(at.line),
        }
    });

    let labels = diag
        .labels
        .iter()
        .map(|l| {
            let start = lines.line_col(l.span.start);
            let end = lines.line_col(l.span.end);
            JsonLabel {
                role: l.style,
                message: l.message.clone(),
                source_line: lines.text(start.line),
                start,
                end,
            }
        })
        .collect();

    JsonDiagnostic {
        severity: diag.severity,
        code,
        category,
        message: diag.message.clone(),
        location,
        labels,
        notes: diag.notes.clone(),
        help: diag.help.clone(),
    }
}

struct SourceLines<'a> {
    source: &'a str,
    map: LineMap,
}

impl<'a> SourceLines<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            map: LineMap::new(source),
        }
    }

    fn line_col(&self, offset: usize) -> LineCol {
        let (line, column) = self.map.offset_to_line_col(offset);
        LineCol {
            line: line as usize,
            column: column as usize,
            byte_offset: offset,
        }
    }

    fn text(&self, line: usize) -> String {
        self.map.line_text(self.source, line as u32).unwrap_or("").to_string()
    }
}
