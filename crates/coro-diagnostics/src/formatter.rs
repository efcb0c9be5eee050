// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Terminal formatter for diagnostics.
//!
//! ```text
//! error[E4001]: a value of stack-only type `Span` cannot be preserved across a suspension point
//!   --> lib.cs:3:5
//!    |
//!  3 |     var s = stackalloc();
//!    |     ^^^^^ `Span` is used after a suspension point
//!    |
//!    = note: state machine fields live on the heap; stack-only values can't be stored there
//!    = help: finish using the value before the `await` or `yield`
//! ```

use colored::Colorize;

use coro_ast::LineMap;

use crate::{Diagnostic, LabelStyle, Severity};

pub struct DiagnosticFormatter<'a> {
    source: &'a str,
    file_name: Option<&'a str>,
    line_map: LineMap,
}

/// A source line with its labels.
struct AnnotatedLine {
    line_num: usize,
    text: String,
    annotations: Vec<Annotation>,
}

struct Annotation {
    col_start: usize,
    col_end: usize,
    style: LabelStyle,
    message: Option<String>,
}

impl<'a> DiagnosticFormatter<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            file_name: None,
            line_map: LineMap::new(source),
        }
    }

    pub fn with_file_name(mut self, name: &'a str) -> Self {
        self.file_name = Some(name);
        self
    }

    pub fn format(&self, diagnostic: &Diagnostic) -> String {
        let mut out = String::new();
        self.format_header(&mut out, diagnostic);

        let annotated = self.collect_annotated_lines(diagnostic);
        let Some(primary) = diagnostic.primary_span() else {
            // Runtime faults have no source context.
            self.format_footer(&mut out, diagnostic);
            return out;
        };

        let file = self.file_name.unwrap_or("<source>");
        let (line, col) = self.offset_to_line_col(primary.start);
        out.push_str(&format!("  {} {}:{}:{}\n", "-->".blue(), file, line, col));

        let max_line = annotated.last().map(|a| a.line_num).unwrap_or(1);
        let gutter_width = max_line.to_string().len().max(2);

        let mut prev_line_num: Option<usize> = None;
        for annotated_line in &annotated {
            match prev_line_num {
                Some(prev) if annotated_line.line_num > prev + 1 => {
                    out.push_str(&format!("{} {}\n", " ".repeat(gutter_width), "...".blue()));
                }
                Some(_) => {}
                None => {
                    out.push_str(&format!("{} {}\n", " ".repeat(gutter_width + 1), "|".blue()));
                }
            }

            out.push_str(&format!(
                "{:>width$} {} {}\n",
                annotated_line.line_num.to_string().blue().bold(),
                "|".blue(),
                annotated_line.text,
                width = gutter_width + 1,
            ));
            self.format_annotations(&mut out, annotated_line, gutter_width);
            prev_line_num = Some(annotated_line.line_num);
        }

        self.format_footer(&mut out, diagnostic);
        out
    }

    fn format_header(&self, out: &mut String, diagnostic: &Diagnostic) {
        let severity_str = match diagnostic.severity {
            Severity::Error => "error".red().bold(),
            Severity::Warning => "warning".yellow().bold(),
        };

        match &diagnostic.code {
            Some(code) => out.push_str(&format!(
                "{}[{}]: {}\n",
                severity_str,
                code.0.clone().red().bold(),
                diagnostic.message.bold()
            )),
            None => out.push_str(&format!("{}: {}\n", severity_str, diagnostic.message.bold())),
        }
    }

    fn format_footer(&self, out: &mut String, diagnostic: &Diagnostic) {
        let indent = " ".repeat(3);
        for note in &diagnostic.notes {
            out.push_str(&format!("{} {} {}: {}\n", indent, "=".cyan(), "note".cyan().bold(), note));
        }
        if let Some(help) = &diagnostic.help {
            out.push_str(&format!("{} {} {}: {}\n", indent, "=".cyan(), "help".cyan().bold(), help));
        }
    }

    fn collect_annotated_lines(&self, diagnostic: &Diagnostic) -> Vec<AnnotatedLine> {
        let mut lines_map: std::collections::BTreeMap<usize, AnnotatedLine> =
            std::collections::BTreeMap::new();

        for label in &diagnostic.labels {
            let (line_num, col_start) = self.offset_to_line_col(label.span.start);
            let (end_line, col_end) = self.offset_to_line_col(label.span.end);

            // Multi-line spans are underlined to the end of their first line.
            let effective_col_end = if end_line == line_num {
                col_end
            } else {
                self.get_line(line_num).unwrap_or("").len() + 1
            };

            let entry = lines_map.entry(line_num).or_insert_with(|| AnnotatedLine {
                line_num,
                text: self.get_line(line_num).unwrap_or("").to_string(),
                annotations: Vec::new(),
            });
            entry.annotations.push(Annotation {
                col_start,
                col_end: effective_col_end.max(col_start + 1),
                style: label.style,
                message: label.message.clone(),
            });
        }

        lines_map.into_values().collect()
    }

    fn format_annotations(&self, out: &mut String, annotated_line: &AnnotatedLine, gutter_width: usize) {
        let mut sorted: Vec<&Annotation> = annotated_line.annotations.iter().collect();
        sorted.sort_by(|a, b| {
            a.style
                .cmp_priority()
                .cmp(&b.style.cmp_priority())
                .then(a.col_start.cmp(&b.col_start))
        });

        let line_len = annotated_line.text.len() + 10;
        let mut underline = vec![' '; line_len];
        let mut messages: Vec<(usize, LabelStyle, &str)> = Vec::new();

        for ann in &sorted {
            let ch = match ann.style {
                LabelStyle::Primary => '^',
                LabelStyle::Secondary => '-',
            };
            let start = ann.col_start.saturating_sub(1);
            let end = ann.col_end.saturating_sub(1).min(line_len);
            for slot in underline.iter_mut().take(end).skip(start) {
                *slot = ch;
            }
            if let Some(msg) = &ann.message {
                messages.push((ann.col_end.saturating_sub(1), ann.style, msg));
            }
        }

        let underline_str = underline.iter().collect::<String>().trim_end().to_string();
        if underline_str.is_empty() {
            return;
        }
        let colored_underline = color_underline(&underline_str);
        let gutter = format!("{} {}", " ".repeat(gutter_width + 1), "|".blue());

        if messages.len() <= 1 {
            match messages.first() {
                Some((_, style, msg)) => out.push_str(&format!(
                    "{} {} {}\n",
                    gutter,
                    colored_underline,
                    styled(msg, *style)
                )),
                None => out.push_str(&format!("{} {}\n", gutter, colored_underline)),
            }
            return;
        }

        out.push_str(&format!("{} {}\n", gutter, colored_underline));
        for (col, style, msg) in messages.iter().rev() {
            let pipe = match style {
                LabelStyle::Primary => "|".red().bold().to_string(),
                LabelStyle::Secondary => "|".blue().to_string(),
            };
            out.push_str(&format!(
                "{} {}{} {}\n",
                gutter,
                " ".repeat(col.saturating_sub(1)),
                pipe,
                styled(msg, *style),
            ));
        }
    }

    /// 1-based (line, col).
    fn offset_to_line_col(&self, offset: usize) -> (usize, usize) {
        let (line, col) = self.line_map.offset_to_line_col(offset);
        (line as usize, col as usize)
    }

    fn get_line(&self, line_num: usize) -> Option<&str> {
        self.line_map.line_text(self.source, line_num as u32)
    }
}

impl LabelStyle {
    fn cmp_priority(&self) -> u8 {
        match self {
            LabelStyle::Primary => 0,
            LabelStyle::Secondary => 1,
        }
    }
}

fn styled(msg: &str, style: LabelStyle) -> String {
    match style {
        LabelStyle::Primary => msg.red().bold().to_string(),
        LabelStyle::Secondary => msg.blue().to_string(),
    }
}

/// Color runs of `^` red and runs of `-` blue.
fn color_underline(s: &str) -> String {
    let mut result = String::new();
    let mut current = None;
    let mut run = String::new();

    for ch in s.chars() {
        let kind = matches!(ch, '^' | '-').then_some(ch);
        if kind != current && !run.is_empty() {
            result.push_str(&flush_run(&run, current));
            run.clear();
        }
        run.push(ch);
        current = kind;
    }
    if !run.is_empty() {
        result.push_str(&flush_run(&run, current));
    }
    result
}

fn flush_run(run: &str, kind: Option<char>) -> String {
    match kind {
        Some('^') => run.red().bold().to_string(),
        Some('-') => run.blue().to_string(),
        _ => run.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coro_ast::Span;

    fn plain(f: impl FnOnce() -> String) -> String {
        colored::control::set_override(false);
        f()
    }

    #[test]
    fn renders_location_underline_and_help() {
        let source = "async m() {\n    var s = stackalloc();\n    await y;\n}";
        let diag = Diagnostic::error("stack-only value")
            .with_code("E4001")
            .with_primary(Span::new(20, 21), "used after await")
            .with_help("finish using it first");
        let out = plain(|| DiagnosticFormatter::new(source).with_file_name("m.cs").format(&diag));

        assert!(out.starts_with("error[E4001]: stack-only value\n"), "{}", out);
        assert!(out.contains("--> m.cs:2:9"), "{}", out);
        assert!(out.contains("    var s = stackalloc();"), "{}", out);
        assert!(out.contains("^ used after await"), "{}", out);
        assert!(out.contains("= help: finish using it first"), "{}", out);
    }

    #[test]
    fn secondary_label_gets_its_own_message_line() {
        let source = "var s = stackalloc();\nawait y;\nuse(s);";
        let diag = Diagnostic::error("stack-only value")
            .with_primary(Span::new(35, 36), "used after await")
            .with_secondary(Span::new(4, 5), "declared here");
        let out = plain(|| DiagnosticFormatter::new(source).format(&diag));

        assert!(out.contains("--> <source>:3:5"), "{}", out);
        assert!(out.contains("    - declared here"), "{}", out);
        assert!(out.contains("^ used after await"), "{}", out);
        // Lines between the two labels are elided.
        assert!(out.contains("..."), "{}", out);
    }

    #[test]
    fn diagnostic_without_labels_has_no_source_block() {
        let diag = Diagnostic::error("division by zero").with_note("during MoveNext");
        let out = plain(|| DiagnosticFormatter::new("").format(&diag));
        assert_eq!(out, "error: division by zero\n    = note: during MoveNext\n");
    }
}
