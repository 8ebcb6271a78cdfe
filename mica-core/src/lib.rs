//! Core compiler pipeline for the Mica language.
//!
//! The pipeline is roughly:
//!
//!   source .mica
//!     -> lexer      (tokens, two passes)
//!     -> parser     (AST arena + lexical scopes)
//!     -> resolve    (candidate-set type resolution)
//!     -> codegen    (flat instruction list)
//!     -> interp     (stack machine)
//!
//! Higher-level tools (the CLI and any future embedders) should depend
//! on this crate rather than reimplementing the pipeline.

// ---------------------------------------------------------------------
// Error handling and diagnostics
// ---------------------------------------------------------------------

pub mod span;
pub mod diagnostic;
pub mod error;

// ---------------------------------------------------------------------
// Front-end: lexing and parsing
// ---------------------------------------------------------------------

pub mod lexer;
pub mod parser;
pub mod ast;

// ---------------------------------------------------------------------
// Semantic layers: scopes, types, resolution, layout
// ---------------------------------------------------------------------

pub mod types;
pub mod resolve;
pub mod layout;

// ---------------------------------------------------------------------
// Back-end: instruction list, code generation, interpreter
// ---------------------------------------------------------------------

pub mod ir;
pub mod codegen;
pub mod interp;
pub mod compiler;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use compiler::{compile, run};
pub use error::CoreError;
