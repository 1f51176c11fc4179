//! Diagnostic reporting with source locations
//!
//! Front-end failures carry a labelled span into the offending file so the
//! reporter can draw the source line; later stages only carry a message.

use crate::common::Span;
use miette::{Diagnostic, GraphicalReportHandler, GraphicalTheme, NamedSource, SourceSpan};
use std::sync::Arc;
use thiserror::Error;

/// Source file for error reporting
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub content: Arc<str>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: Arc::from(content.into()),
        }
    }

    pub fn to_named_source(&self) -> NamedSource<String> {
        NamedSource::new(self.name.clone(), self.content.to_string())
    }
}

impl From<Span> for SourceSpan {
    fn from(span: Span) -> Self {
        SourceSpan::new(span.start.into(), span.len())
    }
}

/// Compiler diagnostic
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CompileError {
    // === Tokenizer Errors ===
    #[error("Token '{text}' is not recognized")]
    #[diagnostic(code(tokenizer::unrecognized))]
    InvalidToken {
        text: String,
        #[label("token not recognized")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
    },

    #[error("String literal is not terminated")]
    #[diagnostic(code(tokenizer::unterminated_string))]
    UnterminatedString {
        #[label("string starts here")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
    },

    // === Parse Errors ===
    #[error("Expected {expected}, found {found}")]
    #[diagnostic(code(parse::unexpected_token))]
    UnexpectedToken {
        expected: String,
        found: String,
        #[label("unexpected token here")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
    },

    #[error("Unexpected end of file")]
    #[diagnostic(code(parse::unexpected_eof))]
    UnexpectedEof {
        #[label("expected more input")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
    },

    #[error("`end {found}` does not close `{expected}`")]
    #[diagnostic(code(parse::mismatched_end))]
    MismatchedEnd {
        expected: String,
        found: String,
        #[label("mismatched name")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
    },

    // === Semantic Errors ===
    #[error("{message}")]
    #[diagnostic(code(semantic::error))]
    Semantic {
        message: String,
        #[help]
        help: Option<String>,
    },

    // === Code Generation Errors ===
    #[error("{message}")]
    #[diagnostic(code(codegen::unsupported))]
    CodeGen { message: String },
}

/// Renders diagnostics to text, optionally with ANSI color
pub struct Reporter {
    handler: GraphicalReportHandler,
}

impl Reporter {
    pub fn new(color: bool) -> Self {
        let theme = if color {
            GraphicalTheme::unicode()
        } else {
            GraphicalTheme::unicode_nocolor()
        };
        Self {
            handler: GraphicalReportHandler::new_themed(theme),
        }
    }

    /// Render one diagnostic with its source snippet
    pub fn render(&self, diagnostic: &dyn Diagnostic) -> String {
        let mut out = String::new();
        if self.handler.render_report(&mut out, diagnostic).is_err() {
            out = diagnostic.to_string();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_has_snippet() {
        let src = SourceFile::new("a.f90", "x = $\n");
        let err = CompileError::InvalidToken {
            text: "$".into(),
            span: Span::new(4, 5).into(),
            src: src.to_named_source(),
        };
        let text = Reporter::new(false).render(&err);
        assert!(text.contains("a.f90"));
        assert!(text.contains("not recognized"));
    }
}
