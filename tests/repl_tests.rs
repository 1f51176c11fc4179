//! Interactive evaluator tests
#![cfg(feature = "llvm")]

use fortc::error::ErrorKind;
use fortc::repl::{EvalOutcome, Session, is_incomplete};
use proptest::prelude::*;

#[test]
fn test_variables_persist_between_turns() {
    let mut session = Session::capturing();
    let first = session.evaluate("integer :: x\nx = 1\n").expect("first turn");
    assert_eq!(first.outcome, EvalOutcome::Statement);
    let second = session.evaluate("x + 1").expect("second turn");
    assert_eq!(second.outcome, EvalOutcome::Integer(2));
}

#[test]
fn test_rejected_turn_leaves_session_unchanged() {
    let mut session = Session::capturing();
    session.evaluate("integer :: x\nx = 5\n").expect("declares");
    let before = session.declaration_count();
    let transcript = session.transcript().len();

    let err = session.evaluate("integer :: y\ny = x +\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Parser);
    let err = session.evaluate("integer :: y\ny = undefined_thing(1)\n").unwrap_err();
    assert_eq!(err.exit_code(), 2);

    assert_eq!(session.declaration_count(), before);
    assert_eq!(session.transcript().len(), transcript);
    // `y` was never committed, so it can be declared again
    session.evaluate("integer :: y\ny = x * 2\n").expect("redeclares");
    assert_eq!(session.evaluate("y").expect("reads").outcome, EvalOutcome::Integer(10));
}

#[test]
fn test_runtime_error_restores_values() {
    let mut session = Session::capturing();
    session.evaluate("integer :: n\nn = 7\n").expect("declares");
    let err = session.evaluate("n = 0\nn = 1 / n\n").unwrap_err();
    assert!(err.message.contains("division by zero"), "got: {}", err.message);
    assert_eq!(session.evaluate("n").expect("reads").outcome, EvalOutcome::Integer(7));
}

#[test]
fn test_procedures_defined_in_one_turn_called_in_another() {
    let mut session = Session::capturing();
    let defined = session
        .evaluate("integer function square(k)\ninteger, intent(in) :: k\nsquare = k * k\nend function\n")
        .expect("defines");
    assert_eq!(defined.outcome, EvalOutcome::None);
    assert_eq!(
        session.evaluate("square(12)").expect("calls").outcome,
        EvalOutcome::Integer(144)
    );
}

#[test]
fn test_print_output_is_captured() {
    let mut session = Session::capturing();
    session.evaluate("print *, 1 + 2, .true.").expect("prints");
    assert_eq!(session.take_output(), vec!["3 T".to_string()]);
}

#[test]
fn test_verbose_sections() {
    let mut session = Session::capturing().with_verbose(true).with_color(false);
    let turn = session.evaluate("2 * 3.5").expect("evaluates");
    assert_eq!(turn.outcome, EvalOutcome::Real(7.0));
    let titles: Vec<&str> = turn.sections.iter().map(|(t, _)| *t).collect();
    assert_eq!(
        titles,
        vec!["Input", "AST", "ASR", "LLVM IR", "Return type", "Result"]
    );
    assert_eq!(turn.sections[4].1, "real");
    assert_eq!(turn.sections[5].1, "7.0");
}

#[test]
fn test_multi_line_entry_detection() {
    assert!(is_incomplete("do i = 1, 3"));
    assert!(is_incomplete("program p\ninteger :: k"));
    assert!(is_incomplete("x = 1 + &"));
    assert!(!is_incomplete("do i = 1, 3\nprint *, i\nend do"));
    assert!(!is_incomplete("x = 1"));
}

fn turn_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        (0i64..50).prop_map(|n| format!("{}", n)),
        (0i64..50).prop_map(|n| format!("print *, {}", n)),
        Just("1 +".to_string()),
        Just("undefined_name".to_string()),
        Just("1 / 0".to_string()),
        Just("@".to_string()),
        (0i64..50).prop_map(|n| format!("{} * 2 + 1", n)),
    ]
}

proptest! {
    #[test]
    fn declaration_count_only_grows(turns in prop::collection::vec(turn_strategy(), 1..12)) {
        let mut session = Session::capturing();
        let mut last = session.declaration_count();
        for input in &turns {
            let accepted = session.evaluate(input).is_ok();
            let now = session.declaration_count();
            if accepted {
                prop_assert!(now >= last);
            } else {
                prop_assert_eq!(now, last);
            }
            last = now;
        }
    }
}
