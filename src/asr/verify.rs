//! Structural checks on the ASR
//!
//! Run after the passes. A failure here is a compiler bug, never a user
//! error, and is reported as an internal error.

use super::*;
use crate::error::{ErrorRecord, StageResult};

pub fn verify(tu: &TranslationUnit) -> StageResult<()> {
    let v = Verifier { tu };
    v.scope(tu.global_scope)?;
    v.body(&tu.items)
}

struct Verifier<'a> {
    tu: &'a TranslationUnit,
}

fn failed<T>(message: String) -> StageResult<T> {
    Err(ErrorRecord::internal("ASRVerifyFailed", message))
}

impl<'a> Verifier<'a> {
    fn scope(&self, scope: ScopeId) -> StageResult<()> {
        for (name, id) in &self.tu.scopes[scope].symbols {
            let sym = self.tu.symbol(*id);
            if sym.name() != name {
                return failed(format!(
                    "symbol table entry '{}' points at '{}'",
                    name,
                    sym.name()
                ));
            }
            match sym {
                Symbol::Program(p) => {
                    self.parent_is(p.scope, scope)?;
                    self.scope(p.scope)?;
                    self.body(&p.body)?;
                }
                Symbol::Module(m) => {
                    self.parent_is(m.scope, scope)?;
                    self.scope(m.scope)?;
                }
                Symbol::Procedure(p) => {
                    self.parent_is(p.scope, scope)?;
                    for arg in p.args.iter().chain(p.return_var.iter()) {
                        match self.tu.variable(*arg) {
                            Some(var) if var.parent == p.scope => {}
                            _ => {
                                return failed(format!(
                                    "argument of '{}' is not a variable of its scope",
                                    p.name
                                ));
                            }
                        }
                    }
                    self.scope(p.scope)?;
                    self.body(&p.body)?;
                }
                Symbol::Variable(v) => {
                    if v.parent != scope {
                        return failed(format!("variable '{}' has the wrong parent", v.name));
                    }
                    if let Some(init) = &v.init {
                        self.expr(init)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn parent_is(&self, child: ScopeId, parent: ScopeId) -> StageResult<()> {
        if self.tu.scopes[child].parent != Some(parent) {
            return failed("scope is not nested in its owner's scope".to_string());
        }
        Ok(())
    }

    fn body(&self, body: &[Stmt]) -> StageResult<()> {
        for s in body {
            self.stmt(s)?;
        }
        Ok(())
    }

    fn variable(&self, id: SymbolId) -> StageResult<Type> {
        match self.tu.variable(id) {
            Some(v) => Ok(v.ty),
            None => failed(format!("'{}' is used as a variable", self.tu.symbol(id).name())),
        }
    }

    fn stmt(&self, s: &Stmt) -> StageResult<()> {
        match s {
            Stmt::Assignment { target, value } => {
                let ty = self.variable(*target)?;
                self.expr(value)?;
                if !ty.same_kind(value.ty) {
                    return failed(format!("assignment of {} to {}", value.ty, ty));
                }
                Ok(())
            }
            Stmt::Print(values) => values.iter().try_for_each(|e| self.expr(e)),
            Stmt::SubroutineCall { sub, args } => {
                self.callee(*sub, args.len())?;
                args.iter().try_for_each(|e| self.expr(e))
            }
            Stmt::If { cond, body, orelse } => {
                self.logical(cond)?;
                self.body(body)?;
                self.body(orelse)
            }
            Stmt::DoLoop {
                var,
                start,
                end,
                step,
                body,
            } => {
                if self.variable(*var)? != Type::Integer {
                    return failed("non-integer loop variable".to_string());
                }
                self.expr(start)?;
                self.expr(end)?;
                if let Some(step) = step {
                    self.expr(step)?;
                }
                self.body(body)
            }
            Stmt::WhileLoop { cond, body } => {
                self.logical(cond)?;
                self.body(body)
            }
            Stmt::Exit | Stmt::Cycle | Stmt::Return => Ok(()),
            Stmt::Expr(e) => self.expr(e),
        }
    }

    fn callee(&self, id: SymbolId, nargs: usize) -> StageResult<()> {
        match self.tu.procedure(id) {
            Some(p) if p.args.len() == nargs => Ok(()),
            Some(p) => failed(format!("call to '{}' has {} arguments", p.name, nargs)),
            None => failed(format!("'{}' is called but is not a procedure", self.tu.symbol(id).name())),
        }
    }

    fn logical(&self, e: &Expr) -> StageResult<()> {
        self.expr(e)?;
        if e.ty != Type::Logical {
            return failed(format!("condition of type {}", e.ty));
        }
        Ok(())
    }

    fn expr(&self, e: &Expr) -> StageResult<()> {
        match &e.kind {
            ExprKind::IntegerConstant(_)
            | ExprKind::RealConstant(_)
            | ExprKind::LogicalConstant(_)
            | ExprKind::StringConstant(_) => Ok(()),
            ExprKind::Var(id) => {
                let ty = self.variable(*id)?;
                if !ty.same_kind(e.ty) {
                    return failed(format!("variable of type {} used as {}", ty, e.ty));
                }
                Ok(())
            }
            ExprKind::FunctionCall { func, args } => {
                self.callee(*func, args.len())?;
                args.iter().try_for_each(|a| self.expr(a))
            }
            ExprKind::Intrinsic { args, .. } => args.iter().try_for_each(|a| self.expr(a)),
            ExprKind::BinOp { left, right, .. } | ExprKind::Compare { left, right, .. } => {
                self.expr(left)?;
                self.expr(right)?;
                if left.ty != right.ty {
                    return failed(format!("operands of type {} and {}", left.ty, right.ty));
                }
                Ok(())
            }
            ExprKind::BoolOp { left, right, .. } => {
                self.logical(left)?;
                self.logical(right)
            }
            ExprKind::UnaryMinus(arg) | ExprKind::Cast { arg, .. } => self.expr(arg),
            ExprKind::Not(arg) => self.logical(arg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_mixed_operands_rejected() {
        let mut tu = TranslationUnit::new();
        tu.items.push(Stmt::Expr(Expr::binop(
            BinOp::Add,
            Expr::integer(1),
            Expr::new(ExprKind::RealConstant(1.0), Type::Real),
        )));
        let err = verify(&tu).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal("ASRVerifyFailed".into()));
    }

    #[test]
    fn test_empty_unit_is_valid() {
        assert!(verify(&TranslationUnit::new()).is_ok());
    }
}
