//! fortc: a Fortran compiler driver
//!
//! Sequences a source file through tokenization, parsing, semantic
//! analysis, optional IR passes and one of three code generators, then
//! assembles and links the result with the system toolchain. An
//! interactive evaluator compiles and executes fragments against a
//! session that persists between inputs.
//!
//! # Architecture
//!
//! ```text
//! Source → Lexer → Parser → AST → ASR builder → Passes → Backend (llvm | cpp | x86) → Toolchain
//!                                     │
//!                                     └→ Execution engine (interactive evaluator)
//! ```
//!
//! # Example
//!
//! ```
//! let tu = fortc::analyze("x = 2\nprint *, x * 21\n").unwrap();
//! assert_eq!(tu.declaration_count(), 1);
//! ```

pub mod asr;
pub mod ast;
pub mod codegen;
pub mod color;
pub mod common;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod error;
#[cfg(feature = "llvm")]
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod passes;
#[cfg(feature = "llvm")]
pub mod repl;
pub mod toolchain;

pub use diagnostics::{CompileError, Reporter, SourceFile};
pub use driver::{CompilationRequest, Driver, StopPoint};
pub use error::{ErrorKind, ErrorRecord, StageResult};

/// Compiler version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Parse source code to an AST
pub fn parse(source: &str) -> StageResult<ast::TranslationUnit> {
    let tokens = lexer::lex(source)?;
    parser::parse(&tokens, source)
}

/// Parse and analyze source code into a verified ASR
pub fn analyze(source: &str) -> StageResult<asr::TranslationUnit> {
    let unit = parse(source)?;
    let tu = asr::build(&unit)?;
    asr::verify::verify(&tu)?;
    Ok(tu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_analyze_reports_semantic_errors() {
        let err = analyze("program p\nimplicit none\ny = 1\nend program\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Semantic);
        assert_eq!(err.exit_code(), 2);
    }
}
