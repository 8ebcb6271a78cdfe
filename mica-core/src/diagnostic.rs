//! Diagnostics and the shared diagnostic log.
//!
//! Every stage of the pipeline appends to one [`DiagnosticLog`]; a
//! non-zero error count is a hard gate and later stages must not run
//! against a log that already has errors. Failure is communicated by
//! inspecting the log between stages, never by unwinding.

use crate::span::Span;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A single reported problem with a source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    /// Stable machine-readable code, e.g. `E0101`.
    pub code: Option<&'static str>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, span: Span) -> Diagnostic {
        Diagnostic {
            severity: Severity::Error,
            message: message.into(),
            span,
            code: None,
        }
    }

    pub fn warning(message: impl Into<String>, span: Span) -> Diagnostic {
        Diagnostic {
            severity: Severity::Warning,
            message: message.into(),
            span,
            code: None,
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Diagnostic {
        self.code = Some(code);
        self
    }
}

/// Accumulating log shared by every pipeline stage.
#[derive(Debug, Default)]
pub struct DiagnosticLog {
    diagnostics: Vec<Diagnostic>,
    errors: usize,
    warnings: usize,
}

impl DiagnosticLog {
    pub fn new() -> DiagnosticLog {
        DiagnosticLog::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
        }
        self.diagnostics.push(diagnostic);
    }

    /// Convenience for the common error case.
    pub fn error(&mut self, message: impl Into<String>, span: Span) {
        self.push(Diagnostic::error(message, span));
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Render every diagnostic against the source it was produced from.
    ///
    /// Each message shows `filename:line:col`, the offending source
    /// line, and a caret pointing at the exact column. Line and column
    /// are 1-based.
    pub fn render(&self, source: &str, filename: &str) -> String {
        let mut out = String::new();
        for diagnostic in &self.diagnostics {
            let (line, col) = line_col(source, diagnostic.span.start);
            let severity = match diagnostic.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
            };
            match diagnostic.code {
                Some(code) => out.push_str(&format!(
                    "{filename}:{line}:{col}: {severity}[{code}]: {}\n",
                    diagnostic.message
                )),
                None => out.push_str(&format!(
                    "{filename}:{line}:{col}: {severity}: {}\n",
                    diagnostic.message
                )),
            }
            let text = line_text(source, line);
            out.push_str(&format!("    {text}\n"));
            out.push_str("    ");
            // Tabs keep their width so the caret stays aligned.
            for ch in text.chars().take(col as usize - 1) {
                out.push(if ch == '\t' { '\t' } else { ' ' });
            }
            out.push_str("^\n");
        }
        out
    }
}

/// 1-based line and column of a byte offset.
pub fn line_col(source: &str, offset: u32) -> (u32, u32) {
    let offset = (offset as usize).min(source.len());
    let mut line = 1u32;
    let mut line_start = 0usize;
    for (i, b) in source.bytes().enumerate().take(offset) {
        if b == b'\n' {
            line += 1;
            line_start = i + 1;
        }
    }
    (line, (offset - line_start) as u32 + 1)
}

fn line_text(source: &str, line: u32) -> &str {
    source
        .lines()
        .nth(line as usize - 1)
        .unwrap_or("")
        .trim_end_matches('\r')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::FileId;

    #[test]
    fn counts_errors_and_warnings_separately() {
        let mut log = DiagnosticLog::new();
        log.push(Diagnostic::error("bad", Span::point(FileId(0), 0)));
        log.push(Diagnostic::warning("meh", Span::point(FileId(0), 0)));
        assert_eq!(log.error_count(), 1);
        assert_eq!(log.warning_count(), 1);
        assert!(log.has_errors());
    }

    #[test]
    fn line_col_is_one_based() {
        let src = "ab\ncd\nef";
        assert_eq!(line_col(src, 0), (1, 1));
        assert_eq!(line_col(src, 3), (2, 1));
        assert_eq!(line_col(src, 7), (3, 2));
    }

    #[test]
    fn render_points_a_caret_at_the_column() {
        let src = "x u32 = @;\n";
        let mut log = DiagnosticLog::new();
        log.push(
            Diagnostic::error("unexpected character", Span::point(FileId(0), 8))
                .with_code("E0100"),
        );
        let rendered = log.render(src, "demo.mica");
        assert!(rendered.contains("demo.mica:1:9: error[E0100]: unexpected character"));
        assert!(rendered.contains("    x u32 = @;"));
        let caret_line = rendered.lines().nth(2).unwrap();
        assert_eq!(caret_line.find('^'), Some(4 + 8));
    }
}
