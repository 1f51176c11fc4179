//! Counted `do` loops to `do while`
//!
//! ```text
//! do i = a, b, c        i = a
//!     body         =>   do while (i <= b)
//! end do                    body
//!                           i = i + c
//!                       end do
//! ```
//!
//! A `cycle` of the lowered loop becomes `i = i + c; cycle`, so a loop that
//! runs to completion leaves `i` one step past the last value used while
//! `exit` leaves it unchanged. When the sign of `c` is not known at compile
//! time the condition tests both directions.

use super::Pass;
use crate::asr::fold::{Constant, fold};
use crate::asr::*;
use crate::error::StageResult;

pub struct DoLoops;

impl Pass for DoLoops {
    fn name(&self) -> &'static str {
        "do_loops"
    }

    fn run(&self, tu: &mut TranslationUnit) -> StageResult<()> {
        let items = std::mem::take(&mut tu.items);
        tu.items = lower_block(tu, items);

        let owners: Vec<SymbolId> = tu
            .symbols
            .iter()
            .filter(|(_, s)| matches!(s, Symbol::Program(_) | Symbol::Procedure(_)))
            .map(|(id, _)| id)
            .collect();
        for id in owners {
            let body = match tu.symbol_mut(id) {
                Symbol::Program(p) => std::mem::take(&mut p.body),
                Symbol::Procedure(p) => std::mem::take(&mut p.body),
                _ => continue,
            };
            let body = lower_block(tu, body);
            match tu.symbol_mut(id) {
                Symbol::Program(p) => p.body = body,
                Symbol::Procedure(p) => p.body = body,
                _ => {}
            }
        }
        Ok(())
    }
}

fn lower_block(tu: &TranslationUnit, body: Vec<Stmt>) -> Vec<Stmt> {
    body.into_iter().flat_map(|s| lower_stmt(tu, s)).collect()
}

fn lower_stmt(tu: &TranslationUnit, stmt: Stmt) -> Vec<Stmt> {
    match stmt {
        Stmt::DoLoop {
            var,
            start,
            end,
            step,
            body,
        } => {
            let step = step.unwrap_or_else(|| Expr::integer(1));
            let counter = Expr::var(var, Type::Integer);
            let cond = match fold(tu, &step) {
                Some(Constant::Integer(n)) if n > 0 => Expr::compare(CmpOp::LtE, counter.clone(), end),
                Some(Constant::Integer(n)) if n < 0 => Expr::compare(CmpOp::GtE, counter.clone(), end),
                _ => either_direction(&step, &counter, end),
            };
            let increment = Stmt::Assignment {
                target: var,
                value: Expr::binop(BinOp::Add, counter, step),
            };
            let mut new_body = advance_on_cycle(lower_block(tu, body), &increment);
            new_body.push(increment);
            vec![
                Stmt::Assignment {
                    target: var,
                    value: start,
                },
                Stmt::WhileLoop {
                    cond,
                    body: new_body,
                },
            ]
        }
        Stmt::If { cond, body, orelse } => vec![Stmt::If {
            cond,
            body: lower_block(tu, body),
            orelse: lower_block(tu, orelse),
        }],
        Stmt::WhileLoop { cond, body } => vec![Stmt::WhileLoop {
            cond,
            body: lower_block(tu, body),
        }],
        other => vec![other],
    }
}

/// Put `increment` in front of every `cycle` that targets this loop
///
/// Nested loops own the `cycle`s inside them and are left alone.
fn advance_on_cycle(body: Vec<Stmt>, increment: &Stmt) -> Vec<Stmt> {
    let mut out = Vec::with_capacity(body.len());
    for s in body {
        match s {
            Stmt::Cycle => {
                out.push(increment.clone());
                out.push(Stmt::Cycle);
            }
            Stmt::If { cond, body, orelse } => out.push(Stmt::If {
                cond,
                body: advance_on_cycle(body, increment),
                orelse: advance_on_cycle(orelse, increment),
            }),
            other => out.push(other),
        }
    }
    out
}

/// `(c > 0 .and. i <= end) .or. (c < 0 .and. i >= end)`
fn either_direction(step: &Expr, counter: &Expr, end: Expr) -> Expr {
    let up = bool_op(
        BoolOp::And,
        Expr::compare(CmpOp::Gt, step.clone(), Expr::integer(0)),
        Expr::compare(CmpOp::LtE, counter.clone(), end.clone()),
    );
    let down = bool_op(
        BoolOp::And,
        Expr::compare(CmpOp::Lt, step.clone(), Expr::integer(0)),
        Expr::compare(CmpOp::GtE, counter.clone(), end),
    );
    bool_op(BoolOp::Or, up, down)
}

fn bool_op(op: BoolOp, left: Expr, right: Expr) -> Expr {
    Expr::new(
        ExprKind::BoolOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        Type::Logical,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::pickle::pickle;
    use crate::asr::verify::verify;
    use crate::lexer::lex;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;

    fn build_src(src: &str) -> TranslationUnit {
        let tokens = lex(src).unwrap();
        build(&parse(&tokens, src).unwrap()).unwrap()
    }

    fn has_do_loop(body: &[Stmt]) -> bool {
        body.iter().any(|s| match s {
            Stmt::DoLoop { .. } => true,
            Stmt::If { body, orelse, .. } => has_do_loop(body) || has_do_loop(orelse),
            Stmt::WhileLoop { body, .. } => has_do_loop(body),
            _ => false,
        })
    }

    #[test]
    fn test_lowers_nested_loops() {
        let mut tu = build_src(
            "program p\ninteger :: i, j, s\ns = 0\ndo i = 1, 3\ndo j = i, 1, -1\ns = s + j\nend do\nend do\nend program\n",
        );
        DoLoops.run(&mut tu).unwrap();
        let Symbol::Program(p) = tu.symbol(tu.programs()[0]) else {
            panic!("expected program");
        };
        assert!(!has_do_loop(&p.body));
        assert!(verify(&tu).is_ok());
    }

    #[test]
    fn test_second_run_is_identity() {
        let mut tu = build_src("integer :: i, n\nn = 2\ndo i = 1, 10, n\nprint *, i\nend do\n");
        DoLoops.run(&mut tu).unwrap();
        let once = pickle(&tu, false);
        DoLoops.run(&mut tu).unwrap();
        assert_eq!(pickle(&tu, false), once);
    }

    #[test]
    fn test_increment_closes_body_and_precedes_cycle() {
        let mut tu = build_src(
            "integer :: i, s\ns = 0\ndo i = 1, 10\nif (i == 3) cycle\ns = s + i\nend do\n",
        );
        DoLoops.run(&mut tu).unwrap();
        let Some(Stmt::WhileLoop { body, .. }) = tu.items.last() else {
            panic!("expected while loop");
        };
        let Some(Stmt::Assignment { value, .. }) = body.last() else {
            panic!("expected trailing increment");
        };
        assert!(matches!(value.kind, ExprKind::BinOp { op: BinOp::Add, .. }));
        let Stmt::If { body: then, .. } = &body[0] else {
            panic!("expected single-line if");
        };
        assert!(matches!(then.as_slice(), [Stmt::Assignment { .. }, Stmt::Cycle]));
    }

    #[test]
    fn test_inner_loop_keeps_its_own_cycle() {
        let mut tu = build_src(
            "integer :: i, j\ndo i = 1, 2\ndo while (j < 3)\nj = j + 1\ncycle\nend do\nend do\n",
        );
        DoLoops.run(&mut tu).unwrap();
        let Some(Stmt::WhileLoop { body, .. }) = tu.items.last() else {
            panic!("expected while loop");
        };
        let Stmt::WhileLoop { body: inner, .. } = &body[0] else {
            panic!("expected inner while loop");
        };
        assert_eq!(inner.len(), 2);
        assert!(matches!(inner[1], Stmt::Cycle));
    }

    #[test]
    fn test_unknown_step_checks_both_directions() {
        let mut tu = build_src("integer :: i, n\nn = 2\ndo i = 1, 10, n\nend do\n");
        DoLoops.run(&mut tu).unwrap();
        let Some(Stmt::WhileLoop { cond, .. }) = tu.items.last() else {
            panic!("expected while loop");
        };
        assert!(matches!(cond.kind, ExprKind::BoolOp { op: BoolOp::Or, .. }));
    }
}
