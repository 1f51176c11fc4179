//! ASR pass tests

use fortc::asr::pickle::pickle;
use fortc::passes::{DoLoops, GlobalStmts, Pass, PassKind, resolve, run_passes};
use proptest::prelude::*;

fn dump(tu: &fortc::asr::TranslationUnit) -> String {
    pickle(tu, false)
}

fn loop_source(start: i64, end: i64, step: i64) -> String {
    format!(
        "integer :: i, s\ns = 0\ndo i = {}, {}, {}\ns = s + i\nend do\ns\n",
        start, end, step
    )
}

fn expected_sum(start: i64, end: i64, step: i64) -> i64 {
    let mut sum = 0;
    let mut i = start;
    while (step > 0 && i <= end) || (step < 0 && i >= end) {
        sum += i;
        i += step;
    }
    sum
}

#[test]
fn test_resolve_keeps_order() {
    let passes = resolve(&["global_stmts", "do_loops"]).expect("known passes");
    assert_eq!(passes, vec![PassKind::GlobalStmts, PassKind::DoLoops]);
    let split = resolve(&["do_loops,global_stmts"]).expect("known passes");
    assert_eq!(split, vec![PassKind::DoLoops, PassKind::GlobalStmts]);
}

#[test]
fn test_do_loops_removes_counted_loops() {
    let mut tu = fortc::analyze(&loop_source(1, 10, 1)).expect("analyzes");
    assert!(dump(&tu).contains("DoLoop"));
    DoLoops.run(&mut tu).expect("lowers");
    let lowered = dump(&tu);
    assert!(!lowered.contains("DoLoop"));
    assert!(lowered.contains("WhileLoop"));
    fortc::asr::verify::verify(&tu).expect("still verifies");
}

#[test]
fn test_global_stmts_wraps_into_function() {
    let mut tu = fortc::analyze("x = 2\nx * 21\n").expect("analyzes");
    assert_eq!(tu.items.len(), 2);
    GlobalStmts::named("entry").run(&mut tu).expect("wraps");
    assert!(tu.items.is_empty());
    let id = tu.lookup(tu.global_scope, "entry").expect("function created");
    assert!(tu.procedure(id).is_some());
}

#[test]
fn test_global_stmts_name_clash() {
    let mut tu = fortc::analyze("integer function f()\nf = 1\nend function\nprint *, f()\n")
        .expect("analyzes");
    let err = GlobalStmts::default().run(&mut tu).unwrap_err();
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_run_passes_in_sequence() {
    let mut tu = fortc::analyze(&loop_source(3, 1, -1)).expect("analyzes");
    run_passes(&mut tu, &[PassKind::DoLoops, PassKind::GlobalStmts]).expect("passes run");
    let text = dump(&tu);
    assert!(!text.contains("DoLoop"));
    assert!(tu.items.is_empty());
}

proptest! {
    #[test]
    fn do_loops_is_idempotent(
        start in -20i64..20,
        end in -20i64..20,
        step in prop::sample::select(vec![-3i64, -2, -1, 1, 2, 3]),
    ) {
        let mut tu = fortc::analyze(&loop_source(start, end, step)).expect("analyzes");
        DoLoops.run(&mut tu).expect("lowers");
        let once = dump(&tu);
        DoLoops.run(&mut tu).expect("lowers again");
        prop_assert_eq!(once, dump(&tu));
    }

    #[test]
    fn global_stmts_is_idempotent(n in 0i64..100) {
        let mut tu = fortc::analyze(&format!("y = {}\ny + 1\n", n)).expect("analyzes");
        GlobalStmts::default().run(&mut tu).expect("wraps");
        let once = dump(&tu);
        GlobalStmts::default().run(&mut tu).expect("no-op");
        prop_assert_eq!(once, dump(&tu));
    }
}

#[cfg(feature = "llvm")]
mod lowering_preserves_meaning {
    use super::*;
    use fortc::interp::{Machine, Value};

    fn run(tu: &fortc::asr::TranslationUnit) -> Option<Value> {
        let mut machine = Machine::capturing();
        machine.run_items(tu, &tu.items).expect("runs")
    }

    fn run_program(src: &str, lower: bool) -> Vec<String> {
        let mut tu = fortc::analyze(src).expect("analyzes");
        if lower {
            DoLoops.run(&mut tu).expect("lowers");
        }
        let program = tu.programs()[0];
        let mut machine = Machine::capturing();
        machine.run_program(&tu, program).expect("runs");
        machine.take_output()
    }

    #[test]
    fn test_loop_variable_after_completed_loop() {
        let src = "program p\ninteger :: i, s\ns = 0\ndo i = 1, 10\ns = s + i\nend do\nprint *, s, i\nend program\n";
        assert_eq!(run_program(src, false), vec!["55 11".to_string()]);
        assert_eq!(run_program(src, true), vec!["55 11".to_string()]);
    }

    #[test]
    fn test_loop_variable_after_exit_and_cycle() {
        let src = "\
program p
integer :: i, j, s
s = 0
do i = 10, 1, -3
if (i == 7) cycle
s = s + i
end do
do j = 1, 10
if (j == 4) exit
end do
print *, s, i, j
end program
";
        let expected = vec!["15 -2 4".to_string()];
        assert_eq!(run_program(src, false), expected);
        assert_eq!(run_program(src, true), expected);
    }

    proptest! {
        #[test]
        fn lowered_loop_computes_same_sum(
            start in -20i64..20,
            end in -20i64..20,
            step in prop::sample::select(vec![-3i64, -2, -1, 1, 2, 3]),
        ) {
            let src = loop_source(start, end, step);
            let original = fortc::analyze(&src).expect("analyzes");
            let mut lowered = fortc::analyze(&src).expect("analyzes");
            DoLoops.run(&mut lowered).expect("lowers");

            let expected = Some(Value::Integer(expected_sum(start, end, step)));
            prop_assert_eq!(run(&original), expected.clone());
            prop_assert_eq!(run(&lowered), expected);

            let after = format!("integer :: i\ndo i = {}, {}, {}\nend do\ni\n", start, end, step);
            let original = fortc::analyze(&after).expect("analyzes");
            let mut lowered = fortc::analyze(&after).expect("analyzes");
            DoLoops.run(&mut lowered).expect("lowers");
            prop_assert_eq!(run(&lowered), run(&original));
        }
    }
}
