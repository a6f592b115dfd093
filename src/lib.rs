//! The Mica language compiler and runtime library.
//!
//! This crate provides the complete Mica pipeline:
//!
//! 1. **Lexer** (`lexer`) — tokenises source text into a flat `Vec<Token>`.
//! 2. **Parser** (`parser`) — Pratt parser building an [`ast::Program`].
//! 3. **Bytecode** (`bytecode`) — the [`bytecode::Op`] instruction set, its
//!    encoding, and a disassembler.
//! 4. **Values** (`value`) — the runtime [`value::Value`] model.
//! 5. **Compiler** (`compiler`) — lowers the AST to a
//!    [`compiler::Bytecode`] bundle of instructions and constants.
//! 6. **VM** (`vm`) — the stack machine that executes a bundle.
//!
//! # Entry point
//!
//! The simplest way to run a Mica program from Rust is:
//!
//! ```rust
//! use mica::run_source;
//! let result = run_source("let x = 2; x * 21").unwrap();
//! assert_eq!(result.to_string(), "42");
//! ```

// ─────────────────────────────────────────────────────────────────────────────
// Modules
// ─────────────────────────────────────────────────────────────────────────────

pub mod ast;
pub mod bytecode;
pub mod compiler;
pub mod lexer;
pub mod parser;
pub mod token;
pub mod value;
pub mod vm;

use crate::compiler::{Bytecode, CompileError, Compiler};
use crate::lexer::LexError;
use crate::parser::ParseError;
use crate::value::Value;
use crate::vm::{RuntimeError, Vm};

// ─────────────────────────────────────────────────────────────────────────────
// Unified error type
// ─────────────────────────────────────────────────────────────────────────────

/// The unified error type for all Mica pipeline stages.
///
/// Each variant wraps errors from the corresponding stage so that callers
/// can handle them uniformly or match on the specific stage.
#[derive(Debug, thiserror::Error)]
pub enum MicaError {
    /// One or more lexical errors.
    #[error("Lex error at {}: {}", .0.first().map(|e| e.span.to_string()).unwrap_or_default(), .0.iter().map(|e| e.message.clone()).collect::<Vec<_>>().join("; "))]
    Lex(Vec<LexError>),

    /// One or more parse errors.
    #[error("Parse error at {}: {}", .0.first().map(|e| e.span.to_string()).unwrap_or_default(), .0.iter().map(|e| e.message.clone()).collect::<Vec<_>>().join("; "))]
    Parse(Vec<ParseError>),

    /// A compile-time error (name resolution, operand limits, pool overflow).
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    /// A runtime error raised by the VM.
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

/// Shorthand result type for all Mica operations.
pub type MicaResult<T> = Result<T, MicaError>;

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Lex and parse a Mica source string, returning a typed [`ast::Program`].
///
/// Lex errors are reported in preference to parse errors if both appear.
pub fn parse_source(src: &str) -> MicaResult<ast::Program> {
    let (tokens, lex_errors) = lexer::lex(src);
    if !lex_errors.is_empty() {
        return Err(MicaError::Lex(lex_errors));
    }
    let (program, parse_errors) = parser::parse_tokens(tokens);
    if !parse_errors.is_empty() {
        return Err(MicaError::Parse(parse_errors));
    }
    Ok(program)
}

/// Compile a Mica source string to a [`Bytecode`] bundle.
pub fn compile_source(src: &str) -> MicaResult<Bytecode> {
    let program = parse_source(src)?;
    Ok(Compiler::new().compile(&program)?)
}

/// Full pipeline: lex → parse → compile → run.
///
/// Returns the program's result: the value of its final expression
/// statement, or `null` if there is none.
pub fn run_source(src: &str) -> MicaResult<Value> {
    let bytecode = compile_source(src)?;
    let mut machine = Vm::new(bytecode);
    machine.run()?;
    Ok(machine.last_popped().clone())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
