use thiserror::Error;

/// Errors surfaced by the compilation pipeline to an embedding host.
///
/// User-facing problems (lex, parse, type errors) accumulate in the
/// shared diagnostic log first; the gate between stages converts a
/// dirty log into [`CoreError::Diagnostics`] with the fully rendered
/// message text.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read source: {0}")]
    SourceIo(#[from] std::io::Error),
    #[error("{rendered}")]
    Diagnostics { count: usize, rendered: String },
    #[error("entry function '{0}' was not defined")]
    MissingEntry(String),
}
