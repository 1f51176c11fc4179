//! Front-end integration tests
//!
//! Source text through tokens, AST and ASR, checked the way the
//! inspection stop-points print them.

use fortc::ast::unparse::{FormatOptions, unparse};
use fortc::ast::{BinOp, Expr, Item, Stmt, TranslationUnit};
use fortc::error::ErrorKind;
use fortc::lexer::{lex, pickle_tokens};
use proptest::prelude::*;

#[test]
fn test_token_dump() {
    let tokens = lex("print *, 1+2\n").expect("lexes");
    insta::assert_snapshot!(pickle_tokens(&tokens), @r###"
    (KEYWORD "print")
    (TOKEN "*")
    (TOKEN ",")
    (TOKEN "integer" 1)
    (TOKEN "+")
    (TOKEN "integer" 2)
    (NEWLINE)
    (EOF)
    "###);
}

#[test]
fn test_print_statement_ast() {
    let unit = fortc::parse("print *, 1+2\n").expect("parses");
    let expected = TranslationUnit {
        items: vec![Item::Statement(Stmt::Print(vec![Expr::BinOp {
            op: BinOp::Add,
            left: Box::new(Expr::Integer(1)),
            right: Box::new(Expr::Integer(2)),
        }]))],
    };
    pretty_assertions::assert_eq!(unit, expected);
}

#[test]
fn test_ast_json_round_trip() {
    let source = "\
program demo
implicit none
integer :: i, total
total = 0
do i = 1, 10
if (mod(i, 2) == 0) cycle
total = total + i
end do
print *, total, total > 20
end program
";
    let unit = fortc::parse(source).expect("parses");
    let json = serde_json::to_string(&unit).expect("serializes");
    let back: TranslationUnit = serde_json::from_str(&json).expect("deserializes");
    pretty_assertions::assert_eq!(unit, back);
}

#[test]
fn test_unparse_reparses_to_same_tree() {
    let source = "\
module counters
integer :: hits = 0
contains
subroutine bump(n)
integer, intent(inout) :: n
n = n + 1
end subroutine
end module
program main
use counters
integer :: k
do while (hits < 3)
call bump(hits)
end do
k = 2 ** 3 - (1 + 1)
print *, k, 'done'
end program
";
    let unit = fortc::parse(source).expect("parses");
    let text = unparse(&unit, FormatOptions::default());
    let again = fortc::parse(&text).expect("formatted source parses");
    pretty_assertions::assert_eq!(unit, again);
}

#[test]
fn test_stage_errors_carry_exit_codes() {
    let tok = fortc::parse("x = 1 @ 2\n").unwrap_err();
    assert_eq!(tok.kind, ErrorKind::Tokenizer);
    assert_eq!(tok.exit_code(), 1);

    let parse = fortc::parse("print *, (1 + 2\n").unwrap_err();
    assert_eq!(parse.kind, ErrorKind::Parser);
    assert_eq!(parse.exit_code(), 2);

    let sem = fortc::analyze("integer :: x\nx = .true.\n").unwrap_err();
    assert_eq!(sem.kind, ErrorKind::Semantic);
    assert_eq!(sem.exit_code(), 2);
}

#[test]
fn test_diagnostics_are_rendered() {
    let err = fortc::parse("x = 1 @ 2\n").unwrap_err();
    let text = err.render(false, false);
    assert!(text.contains('@'), "got: {}", text);
}

#[test]
fn test_asr_dump_names_symbols() {
    let tu = fortc::analyze("program p\ninteger :: n\nn = 3\nprint *, n * 2\nend program\n")
        .expect("analyzes");
    let dump = fortc::asr::pickle::pickle(&tu, false);
    assert!(dump.starts_with("(TranslationUnit"));
    assert!(dump.contains("Program"));
    assert!(dump.contains(" n "));
}

proptest! {
    // Arbitrary text either tokenizes or yields a tokenizer error
    #[test]
    fn lex_is_total(src in "\\PC{0,64}") {
        match lex(&src) {
            Ok(tokens) => prop_assert!(!tokens.is_empty()),
            Err(err) => prop_assert_eq!(err.kind, ErrorKind::Tokenizer),
        }
    }

    #[test]
    fn parse_never_panics(src in "[a-z0-9 =+*(),\\n]{0,48}") {
        let _ = fortc::parse(&src);
    }

    #[test]
    fn integer_literals_survive_the_front_end(n in 0i64..1_000_000) {
        let unit = fortc::parse(&format!("print *, {}\n", n)).expect("parses");
        prop_assert_eq!(
            unit.items,
            vec![Item::Statement(Stmt::Print(vec![Expr::Integer(n)]))]
        );
    }
}
