//! Compiler orchestration: the synchronous lex → parse → resolve →
//! generate pipeline, plus a convenience entry that also runs the
//! result.
//!
//! Every stage checks the shared diagnostic log before doing further
//! work; a non-zero error count is a hard gate and surfaces as
//! [`CoreError::Diagnostics`] carrying the rendered messages.

use crate::codegen::generate;
use crate::diagnostic::DiagnosticLog;
use crate::error::CoreError;
use crate::interp::execute;
use crate::ir::Program;
use crate::lexer::tokenize;
use crate::parser::parse;
use crate::resolve::resolve;
use crate::span::FileId;
use crate::types::ScopeArena;

/// Pointer width of the interpreter's stack machine.
pub const POINTER_BITS: u32 = 64;

/// Compile one source buffer to an instruction list.
pub fn compile(source: &str, filename: &str) -> Result<Program, CoreError> {
    let mut log = DiagnosticLog::new();
    let mut scopes = ScopeArena::new();

    let tokens = tokenize(FileId(0), source, &mut log);
    gate(&log, source, filename)?;

    let (mut ast, root) = parse(source, &tokens, &mut scopes, &mut log);
    gate(&log, source, filename)?;

    resolve(&mut ast, root, &mut scopes, &mut log);
    gate(&log, source, filename)?;

    generate(&ast, root, &mut scopes, POINTER_BITS)
}

/// Compile and execute; returns the entry function's result, if it
/// declares one.
pub fn run(source: &str, filename: &str) -> Result<Option<i64>, CoreError> {
    let program = compile(source, filename)?;
    let machine = execute(&program);
    Ok(program.exit.as_ref().map(|local| machine.scalar_at(local)))
}

fn gate(log: &DiagnosticLog, source: &str, filename: &str) -> Result<(), CoreError> {
    if log.has_errors() {
        return Err(CoreError::Diagnostics {
            count: log.error_count(),
            rendered: log.render(source, filename),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_whole_pipeline_runs_the_arithmetic_scenario() {
        let src = "fn Main() { x u32 = 2; y u32 = 3; z u32 = x + y; ret z; }";
        assert_eq!(run(src, "demo.mica").unwrap(), None);

        let src = "fn Main() u32 { x u32 = 2; y u32 = 3; z u32 = x + y; ret z; }";
        assert_eq!(run(src, "demo.mica").unwrap(), Some(5));
    }

    #[test]
    fn unterminated_comments_stop_compilation_with_one_error() {
        let err = compile("fn Main() { } /* foo", "demo.mica").unwrap_err();
        let CoreError::Diagnostics { count, rendered } = err else {
            panic!("expected diagnostics");
        };
        assert_eq!(count, 1);
        assert!(rendered.contains("unterminated block comment"));
    }

    #[test]
    fn type_mismatch_reports_the_operator_position() {
        let src = "fn Main() { x u32 = 1; y s8 = -1; z = x + y; }";
        let err = compile(src, "demo.mica").unwrap_err();
        let CoreError::Diagnostics { count, rendered } = err else {
            panic!("expected diagnostics");
        };
        assert_eq!(count, 1);
        let col = src.find(" + ").unwrap() + 2;
        assert!(
            rendered.contains(&format!("demo.mica:1:{col}")),
            "missing position in: {rendered}"
        );
        assert!(rendered.contains("E0305"));
    }

    #[test]
    fn missing_entry_is_reported_by_name() {
        let err = compile("fn Helper() { ret; }", "demo.mica").unwrap_err();
        assert!(matches!(err, CoreError::MissingEntry(name) if name == "Main"));
    }

    #[test]
    fn the_dump_is_stable_for_golden_comparisons() {
        let src = "fn Main() u32 { ret 1; }";
        let a = compile(src, "demo.mica").unwrap().dump();
        let b = compile(src, "demo.mica").unwrap().dump();
        assert_eq!(a, b);
        assert!(a.contains("prologue Main"));
        assert!(a.contains("call Main"));
    }

    #[test]
    fn deferred_statements_match_manual_inlining() {
        let deferred = "fn Main() u32 {\
                          x u32 = 5;\
                          defer x = x + 1;\
                          defer x = x + 2;\
                          ret x;\
                        }";
        let inlined = "fn Main() u32 {\
                         x u32 = 5;\
                         x = x + 1;\
                         x = x + 2;\
                         ret x;\
                       }";
        assert_eq!(
            run(deferred, "demo.mica").unwrap(),
            run(inlined, "demo.mica").unwrap()
        );
        assert_eq!(run(deferred, "demo.mica").unwrap(), Some(8));
    }
}
