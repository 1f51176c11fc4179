//! Compile-time evaluation of constant expressions
//!
//! Used for `parameter` initializers and static initial values, which the
//! backends must emit as literals.

use super::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Integer(i64),
    Real(f64),
    Logical(bool),
    Str(String),
}

impl Constant {
    pub fn ty(&self) -> Type {
        match self {
            Constant::Integer(_) => Type::Integer,
            Constant::Real(_) => Type::Real,
            Constant::Logical(_) => Type::Logical,
            Constant::Str(s) => Type::Character {
                len: Some(s.len() as u32),
            },
        }
    }

    pub fn into_expr(self) -> Expr {
        let ty = self.ty();
        let kind = match self {
            Constant::Integer(n) => ExprKind::IntegerConstant(n),
            Constant::Real(x) => ExprKind::RealConstant(x),
            Constant::Logical(b) => ExprKind::LogicalConstant(b),
            Constant::Str(s) => ExprKind::StringConstant(s),
        };
        Expr::new(kind, ty)
    }
}

/// Evaluate `expr` if it only involves literals, parameters and pure
/// operations; `None` otherwise
pub fn fold(tu: &TranslationUnit, expr: &Expr) -> Option<Constant> {
    use Constant::*;
    match &expr.kind {
        ExprKind::IntegerConstant(n) => Some(Integer(*n)),
        ExprKind::RealConstant(x) => Some(Real(*x)),
        ExprKind::LogicalConstant(b) => Some(Logical(*b)),
        ExprKind::StringConstant(s) => Some(Str(s.clone())),
        ExprKind::Var(id) => {
            let var = tu.variable(*id)?;
            if var.storage != Storage::Parameter {
                return None;
            }
            fold(tu, var.init.as_ref()?)
        }
        ExprKind::FunctionCall { .. } => None,
        ExprKind::Intrinsic { func, args } => {
            let args: Option<Vec<Constant>> = args.iter().map(|a| fold(tu, a)).collect();
            fold_intrinsic(*func, &args?)
        }
        ExprKind::BinOp { op, left, right } => {
            match (fold(tu, left)?, fold(tu, right)?) {
                (Integer(a), Integer(b)) => Some(Integer(int_binop(*op, a, b)?)),
                (Real(a), Real(b)) => Some(Real(real_binop(*op, a, b))),
                _ => None,
            }
        }
        ExprKind::UnaryMinus(arg) => match fold(tu, arg)? {
            Integer(n) => n.checked_neg().map(Integer),
            Real(x) => Some(Real(-x)),
            _ => None,
        },
        ExprKind::Not(arg) => match fold(tu, arg)? {
            Logical(b) => Some(Logical(!b)),
            _ => None,
        },
        ExprKind::Compare { op, left, right } => {
            let ord = match (fold(tu, left)?, fold(tu, right)?) {
                (Integer(a), Integer(b)) => a.partial_cmp(&b),
                (Real(a), Real(b)) => a.partial_cmp(&b),
                _ => None,
            }?;
            Some(Logical(compare_holds(*op, ord)))
        }
        ExprKind::BoolOp { op, left, right } => match (fold(tu, left)?, fold(tu, right)?) {
            (Logical(a), Logical(b)) => Some(Logical(match op {
                BoolOp::And => a && b,
                BoolOp::Or => a || b,
            })),
            _ => None,
        },
        ExprKind::Cast { kind, arg } => match (kind, fold(tu, arg)?) {
            (CastKind::IntegerToReal, Integer(n)) => Some(Real(n as f64)),
            (CastKind::RealToInteger, Real(x)) => Some(Integer(x.trunc() as i64)),
            _ => None,
        },
    }
}

pub fn compare_holds(op: CmpOp, ord: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        CmpOp::Eq => ord == Equal,
        CmpOp::NotEq => ord != Equal,
        CmpOp::Lt => ord == Less,
        CmpOp::LtE => ord != Greater,
        CmpOp::Gt => ord == Greater,
        CmpOp::GtE => ord != Less,
    }
}

/// Integer arithmetic; `None` on division by zero or overflow
pub fn int_binop(op: BinOp, a: i64, b: i64) -> Option<i64> {
    match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mul => a.checked_mul(b),
        BinOp::Div => a.checked_div(b),
        BinOp::Pow => {
            if b < 0 {
                // Fortran integer power with a negative exponent truncates
                return Some(match a {
                    1 => 1,
                    -1 => {
                        if b % 2 == 0 {
                            1
                        } else {
                            -1
                        }
                    }
                    0 => return None,
                    _ => 0,
                });
            }
            a.checked_pow(u32::try_from(b).ok()?)
        }
    }
}

pub fn real_binop(op: BinOp, a: f64, b: f64) -> f64 {
    match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Pow => a.powf(b),
    }
}

pub fn fold_intrinsic(func: Intrinsic, args: &[Constant]) -> Option<Constant> {
    use Constant::*;
    match (func, args) {
        (Intrinsic::Abs, [Integer(n)]) => n.checked_abs().map(Integer),
        (Intrinsic::Abs, [Real(x)]) => Some(Real(x.abs())),
        (Intrinsic::Mod, [Integer(a), Integer(b)]) => a.checked_rem(*b).map(Integer),
        (Intrinsic::Mod, [Real(a), Real(b)]) => Some(Real(a % b)),
        (Intrinsic::Sqrt, [Real(x)]) => Some(Real(x.sqrt())),
        (Intrinsic::Exp, [Real(x)]) => Some(Real(x.exp())),
        (Intrinsic::Sin, [Real(x)]) => Some(Real(x.sin())),
        (Intrinsic::Cos, [Real(x)]) => Some(Real(x.cos())),
        (Intrinsic::Min | Intrinsic::Max, [first, rest @ ..]) => {
            let pick_max = func == Intrinsic::Max;
            rest.iter().try_fold(first.clone(), |acc, c| match (acc, c) {
                (Integer(a), Integer(b)) => Some(Integer(if pick_max { a.max(*b) } else { a.min(*b) })),
                (Real(a), Real(b)) => Some(Real(if pick_max { a.max(*b) } else { a.min(*b) })),
                _ => None,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_pow() {
        assert_eq!(int_binop(BinOp::Pow, 2, 10), Some(1024));
        assert_eq!(int_binop(BinOp::Pow, 2, -1), Some(0));
        assert_eq!(int_binop(BinOp::Pow, -1, -3), Some(-1));
    }

    #[test]
    fn test_division_by_zero_does_not_fold() {
        assert_eq!(int_binop(BinOp::Div, 1, 0), None);
    }

    #[test]
    fn test_min_max() {
        assert_eq!(
            fold_intrinsic(
                Intrinsic::Max,
                &[Constant::Integer(3), Constant::Integer(7), Constant::Integer(5)]
            ),
            Some(Constant::Integer(7))
        );
    }
}
