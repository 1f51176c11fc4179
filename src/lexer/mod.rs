//! Lexer for free-form Fortran source
//!
//! Produces a flat token stream terminated by `Eof`. Comments and `&`
//! continuations are dropped here so the parser only sees statements
//! separated by `Newline`/`Semi`.

mod tokens;

pub use tokens::{Token, TokenKind};

use crate::common::Span;
use crate::diagnostics::{CompileError, SourceFile};
use crate::error::{ErrorRecord, StageResult};
use logos::Logos;

/// Tokenize anonymous source (used by the interactive prompt and tests)
pub fn lex(source: &str) -> StageResult<Vec<Token>> {
    lex_named("input", source)
}

/// Tokenize source, naming the file in diagnostics
pub fn lex_named(name: &str, source: &str) -> StageResult<Vec<Token>> {
    let mut lexer = TokenKind::lexer(source);
    let mut base = 0;
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let range = lexer.span();
        let span = Span::new(base + range.start, base + range.end);
        let text = lexer.slice();
        match result {
            // `1.eq.2`: the dot belongs to the operator, restart lexing there
            Ok(TokenKind::RealLit) if text.ends_with('.') && starts_dot_operator(&source[span.end - 1..]) => {
                tokens.push(Token {
                    kind: TokenKind::IntLit,
                    span: Span::new(span.start, span.end - 1),
                    text: text[..text.len() - 1].to_string(),
                });
                base = span.end - 1;
                lexer = TokenKind::lexer(&source[base..]);
            }
            Ok(kind) => tokens.push(Token {
                kind,
                span,
                text: text.to_string(),
            }),
            Err(()) => {
                let src = SourceFile::new(name, source).to_named_source();
                let diagnostic = if text.starts_with('\'') || text.starts_with('"') {
                    CompileError::UnterminatedString {
                        span: span.into(),
                        src,
                    }
                } else {
                    CompileError::InvalidToken {
                        text: text.to_string(),
                        span: span.into(),
                        src,
                    }
                };
                return Err(ErrorRecord::tokenizer(diagnostic));
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span::new(source.len(), source.len()),
        text: String::new(),
    });
    tracing::trace!("lexed {} tokens from {}", tokens.len(), name);
    Ok(tokens)
}

/// Whether `rest` opens with a dotted operator or logical constant
fn starts_dot_operator(rest: &str) -> bool {
    let Some(after) = rest.strip_prefix('.') else {
        return false;
    };
    let len = after.bytes().take_while(u8::is_ascii_alphabetic).count();
    if !after[len..].starts_with('.') {
        return false;
    }
    matches!(
        after[..len].to_ascii_lowercase().as_str(),
        "eq" | "ne" | "lt" | "le" | "gt" | "ge" | "and" | "or" | "not" | "true" | "false"
    )
}

/// Render the `--show-tokens` dump, one token per line
pub fn pickle_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        out.push_str(&token.pickle());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_keywords_ignore_case() {
        assert_eq!(
            kinds("PRINT Print print"),
            vec![
                TokenKind::Print,
                TokenKind::Print,
                TokenKind::Print,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_dot_operators() {
        assert_eq!(
            kinds("a .EQ. b .and. .not. c"),
            vec![
                TokenKind::Ident,
                TokenKind::EqEq,
                TokenKind::Ident,
                TokenKind::And,
                TokenKind::Not,
                TokenKind::Ident,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_integer_before_dot_operator() {
        assert_eq!(
            kinds("1.eq.2"),
            vec![
                TokenKind::IntLit,
                TokenKind::EqEq,
                TokenKind::IntLit,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_real_literals() {
        for src in ["1.5", "2.0e3", "1.0d0", "3e2", ".25", "1.", "1.e5", "2.D-1"] {
            assert_eq!(kinds(src), vec![TokenKind::RealLit, TokenKind::Eof], "{src}");
        }
    }

    #[test]
    fn test_continuation_and_comment() {
        let src = "x = 1 + & ! trailing\n    & 2 ! done\n";
        assert_eq!(
            kinds(src),
            vec![
                TokenKind::Ident,
                TokenKind::Eq,
                TokenKind::IntLit,
                TokenKind::Plus,
                TokenKind::IntLit,
                TokenKind::Newline,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_trailing_dot_before_operator() {
        let tokens = lex("if (n.gt.1.and.1.ne.n) x = 1.").unwrap();
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::If,
                TokenKind::LParen,
                TokenKind::Ident,
                TokenKind::Gt,
                TokenKind::IntLit,
                TokenKind::And,
                TokenKind::IntLit,
                TokenKind::Ne,
                TokenKind::Ident,
                TokenKind::RParen,
                TokenKind::Ident,
                TokenKind::Eq,
                TokenKind::RealLit,
                TokenKind::Eof
            ]
        );
        assert_eq!(tokens[4].text, "1");
        assert_eq!(tokens[4].span, Span::new(9, 10));
        assert_eq!(tokens[5].span, Span::new(10, 15));
        assert_eq!(tokens[12].text, "1.");
    }

    #[test]
    fn test_continuation_across_comment_lines() {
        let src = "x = 1 + &\n! note\n\n   ! another\n  2\n";
        assert_eq!(
            kinds(src),
            vec![
                TokenKind::Ident,
                TokenKind::Eq,
                TokenKind::IntLit,
                TokenKind::Plus,
                TokenKind::IntLit,
                TokenKind::Newline,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_doubled_quote_string() {
        let tokens = lex("print *, 'it''s'").unwrap();
        assert_eq!(tokens[3].kind, TokenKind::StringLit);
        assert_eq!(tokens[3].text, "'it''s'");
    }

    #[test]
    fn test_unterminated_string() {
        let err = lex("print *, 'abc").unwrap_err();
        assert!(matches!(
            err.diagnostic,
            Some(CompileError::UnterminatedString { .. })
        ));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_invalid_character() {
        let err = lex("x = 1 $ 2").unwrap_err();
        assert!(err.message.contains('$'));
    }

    #[test]
    fn test_pickle() {
        let tokens = lex("print *, x + 5").unwrap();
        let dump = pickle_tokens(&tokens);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(
            lines,
            vec![
                "(KEYWORD \"print\")",
                "(TOKEN \"*\")",
                "(TOKEN \",\")",
                "(TOKEN \"identifier\" x)",
                "(TOKEN \"+\")",
                "(TOKEN \"integer\" 5)",
                "(EOF)",
            ]
        );
    }
}
