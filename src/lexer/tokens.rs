//! Token definitions for the Fortran lexer

use crate::common::Span;
use logos::Logos;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A token with its kind, span, and text
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub text: String,
}

/// Token kinds recognized by the lexer
///
/// Keywords match regardless of case. A trailing `&` joins the next
/// non-blank, non-comment line, and a leading `&` on that line is optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Logos, Serialize, Deserialize)]
#[logos(skip r"[ \t\f]+")]
#[logos(skip r"![^\n]*")]
#[logos(skip r"&[ \t]*(![^\n]*)?\r?\n([ \t]*(![^\n]*)?\r?\n)*[ \t]*&?")]
pub enum TokenKind {
    // Program units
    #[token("program", ignore(ascii_case))]
    Program,
    #[token("module", ignore(ascii_case))]
    Module,
    #[token("contains", ignore(ascii_case))]
    Contains,
    #[token("subroutine", ignore(ascii_case))]
    Subroutine,
    #[token("function", ignore(ascii_case))]
    Function,
    #[token("result", ignore(ascii_case))]
    Result,
    #[token("end", ignore(ascii_case))]
    End,
    #[token("endprogram", ignore(ascii_case))]
    EndProgram,
    #[token("endmodule", ignore(ascii_case))]
    EndModule,
    #[token("endsubroutine", ignore(ascii_case))]
    EndSubroutine,
    #[token("endfunction", ignore(ascii_case))]
    EndFunction,

    // Specification
    #[token("use", ignore(ascii_case))]
    Use,
    #[token("implicit", ignore(ascii_case))]
    Implicit,
    #[token("none", ignore(ascii_case))]
    None,
    #[token("integer", ignore(ascii_case))]
    Integer,
    #[token("real", ignore(ascii_case))]
    Real,
    #[token("logical", ignore(ascii_case))]
    Logical,
    #[token("character", ignore(ascii_case))]
    Character,
    #[token("parameter", ignore(ascii_case))]
    Parameter,
    #[token("intent", ignore(ascii_case))]
    Intent,

    // Execution
    #[token("call", ignore(ascii_case))]
    Call,
    #[token("return", ignore(ascii_case))]
    Return,
    #[token("print", ignore(ascii_case))]
    Print,
    #[token("if", ignore(ascii_case))]
    If,
    #[token("then", ignore(ascii_case))]
    Then,
    #[token("else", ignore(ascii_case))]
    Else,
    #[token("elseif", ignore(ascii_case))]
    ElseIf,
    #[token("endif", ignore(ascii_case))]
    EndIf,
    #[token("do", ignore(ascii_case))]
    Do,
    #[token("enddo", ignore(ascii_case))]
    EndDo,
    #[token("while", ignore(ascii_case))]
    While,
    #[token("exit", ignore(ascii_case))]
    Exit,
    #[token("cycle", ignore(ascii_case))]
    Cycle,

    // Dot operators and logical literals
    #[token(".true.", ignore(ascii_case))]
    True,
    #[token(".false.", ignore(ascii_case))]
    False,
    #[token(".and.", ignore(ascii_case))]
    And,
    #[token(".or.", ignore(ascii_case))]
    Or,
    #[token(".not.", ignore(ascii_case))]
    Not,
    #[token(".eq.", ignore(ascii_case))]
    #[token("==")]
    EqEq,
    #[token(".ne.", ignore(ascii_case))]
    #[token("/=")]
    Ne,
    #[token(".lt.", ignore(ascii_case))]
    #[token("<")]
    Lt,
    #[token(".le.", ignore(ascii_case))]
    #[token("<=")]
    Le,
    #[token(".gt.", ignore(ascii_case))]
    #[token(">")]
    Gt,
    #[token(".ge.", ignore(ascii_case))]
    #[token(">=")]
    Ge,

    // Literals
    #[regex(r"[0-9]+", priority = 3)]
    IntLit,
    #[regex(r"[0-9]+\.[0-9]+([eEdD][+-]?[0-9]+)?")]
    #[regex(r"[0-9]+\.([eEdD][+-]?[0-9]+)?")]
    #[regex(r"\.[0-9]+([eEdD][+-]?[0-9]+)?")]
    #[regex(r"[0-9]+[eEdD][+-]?[0-9]+")]
    RealLit,
    #[regex(r#"'([^'\n]|'')*'"#)]
    #[regex(r#""([^"\n]|"")*""#)]
    StringLit,

    #[regex(r"[a-zA-Z][a-zA-Z0-9_]*", priority = 1)]
    Ident,

    // Operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("**")]
    StarStar,
    #[token("/")]
    Slash,
    #[token("=")]
    Eq,

    // Punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token("::")]
    ColonColon,
    #[token(";")]
    Semi,
    #[regex(r"\r?\n")]
    Newline,

    // Special
    Eof,
}

impl TokenKind {
    pub fn is_keyword(&self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Program
                | Module
                | Contains
                | Subroutine
                | Function
                | Result
                | End
                | EndProgram
                | EndModule
                | EndSubroutine
                | EndFunction
                | Use
                | Implicit
                | None
                | Integer
                | Real
                | Logical
                | Character
                | Parameter
                | Intent
                | Call
                | Return
                | Print
                | If
                | Then
                | Else
                | ElseIf
                | EndIf
                | Do
                | EndDo
                | While
                | Exit
                | Cycle
        )
    }

    /// Statement separators
    pub fn is_terminator(&self) -> bool {
        matches!(self, TokenKind::Newline | TokenKind::Semi | TokenKind::Eof)
    }

    /// Keywords that may still be used as names
    ///
    /// Fortran reserves nothing; the parser only treats these as keywords
    /// where a keyword is expected.
    pub fn can_be_name(&self) -> bool {
        self.is_keyword()
            && !matches!(
                self,
                TokenKind::End
                    | TokenKind::EndProgram
                    | TokenKind::EndModule
                    | TokenKind::EndSubroutine
                    | TokenKind::EndFunction
                    | TokenKind::EndIf
                    | TokenKind::EndDo
            )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Program => "program",
            TokenKind::Module => "module",
            TokenKind::Contains => "contains",
            TokenKind::Subroutine => "subroutine",
            TokenKind::Function => "function",
            TokenKind::Result => "result",
            TokenKind::End => "end",
            TokenKind::EndProgram => "endprogram",
            TokenKind::EndModule => "endmodule",
            TokenKind::EndSubroutine => "endsubroutine",
            TokenKind::EndFunction => "endfunction",
            TokenKind::Use => "use",
            TokenKind::Implicit => "implicit",
            TokenKind::None => "none",
            TokenKind::Integer => "integer",
            TokenKind::Real => "real",
            TokenKind::Logical => "logical",
            TokenKind::Character => "character",
            TokenKind::Parameter => "parameter",
            TokenKind::Intent => "intent",
            TokenKind::Call => "call",
            TokenKind::Return => "return",
            TokenKind::Print => "print",
            TokenKind::If => "if",
            TokenKind::Then => "then",
            TokenKind::Else => "else",
            TokenKind::ElseIf => "elseif",
            TokenKind::EndIf => "endif",
            TokenKind::Do => "do",
            TokenKind::EndDo => "enddo",
            TokenKind::While => "while",
            TokenKind::Exit => "exit",
            TokenKind::Cycle => "cycle",
            TokenKind::True => ".true.",
            TokenKind::False => ".false.",
            TokenKind::And => ".and.",
            TokenKind::Or => ".or.",
            TokenKind::Not => ".not.",
            TokenKind::EqEq => "==",
            TokenKind::Ne => "/=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::IntLit => "integer",
            TokenKind::RealLit => "real",
            TokenKind::StringLit => "string",
            TokenKind::Ident => "identifier",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::StarStar => "**",
            TokenKind::Slash => "/",
            TokenKind::Eq => "=",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::ColonColon => "::",
            TokenKind::Semi => ";",
            TokenKind::Newline => "newline",
            TokenKind::Eof => "end of file",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Token {
    /// One line of the `--show-tokens` dump
    pub fn pickle(&self) -> String {
        match self.kind {
            TokenKind::Newline | TokenKind::Semi => "(NEWLINE)".to_string(),
            TokenKind::Eof => "(EOF)".to_string(),
            TokenKind::Ident | TokenKind::IntLit | TokenKind::RealLit | TokenKind::StringLit => {
                format!("(TOKEN \"{}\" {})", self.kind.as_str(), self.text)
            }
            kind if kind.is_keyword() => format!("(KEYWORD \"{}\")", kind.as_str()),
            kind => format!("(TOKEN \"{}\")", kind.as_str()),
        }
    }
}
