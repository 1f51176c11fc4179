//! Wrap top-level statements into a procedure
//!
//! The statements and expressions found outside any program unit become
//! the body of a new global procedure. A trailing expression turns it into
//! a function returning that value; otherwise it is a subroutine. The
//! interactive evaluator wraps every turn this way so the execution engine
//! only ever runs procedures.

use super::Pass;
use crate::asr::*;
use crate::error::{ErrorRecord, StageResult};

pub struct GlobalStmts {
    pub function_name: String,
}

impl Default for GlobalStmts {
    fn default() -> Self {
        Self::named("f")
    }
}

impl GlobalStmts {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            function_name: name.into(),
        }
    }
}

impl Pass for GlobalStmts {
    fn name(&self) -> &'static str {
        "global_stmts"
    }

    fn run(&self, tu: &mut TranslationUnit) -> StageResult<()> {
        if tu.items.is_empty() {
            return Ok(());
        }
        let global = tu.global_scope;
        let name = self.function_name.as_str();
        if tu.scopes[global].symbols.contains_key(name) {
            return Err(ErrorRecord::semantic_with_help(
                format!("Symbol '{}' is already defined", name),
                "global statements are wrapped into a function of this name",
            ));
        }

        let mut body = std::mem::take(&mut tu.items);
        let result = match body.last() {
            Some(Stmt::Expr(_)) => match body.pop() {
                Some(Stmt::Expr(e)) => Some(e),
                _ => None,
            },
            _ => None,
        };

        let scope = tu.new_scope(Some(global));
        let id = tu.symbols.alloc(Symbol::Procedure(Procedure {
            name: name.to_string(),
            scope,
            parent: global,
            args: Vec::new(),
            return_var: None,
            body: Vec::new(),
        }));
        tu.scopes[global].symbols.insert(name.to_string(), id);
        tu.scopes[scope].owner = Some(id);

        let return_var = result.map(|value| {
            let ret = tu.symbols.alloc(Symbol::Variable(Variable {
                name: name.to_string(),
                parent: scope,
                ty: value.ty,
                intent: VarIntent::ReturnVar,
                storage: Storage::Default,
                init: None,
            }));
            tu.scopes[scope].symbols.insert(name.to_string(), ret);
            body.push(Stmt::Assignment { target: ret, value });
            ret
        });

        if let Symbol::Procedure(p) = tu.symbol_mut(id) {
            p.return_var = return_var;
            p.body = body;
        }
        tracing::debug!(
            "wrapped global statements into {} '{}'",
            if return_var.is_some() { "function" } else { "subroutine" },
            name
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::pickle::pickle;
    use crate::asr::verify::verify;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn build_src(src: &str) -> TranslationUnit {
        let tokens = lex(src).unwrap();
        build(&parse(&tokens, src).unwrap()).unwrap()
    }

    #[test]
    fn test_trailing_expression_becomes_result() {
        let mut tu = build_src("x = 1\nx + 1\n");
        GlobalStmts::default().run(&mut tu).unwrap();
        assert!(tu.items.is_empty());
        let f = tu.lookup(tu.global_scope, "f").unwrap();
        let p = tu.procedure(f).unwrap();
        assert!(p.is_function());
        assert_eq!(p.body.len(), 2);
        assert_eq!(tu.variable(p.return_var.unwrap()).unwrap().ty, Type::Integer);
        assert!(verify(&tu).is_ok());
    }

    #[test]
    fn test_statements_only_become_subroutine() {
        let mut tu = build_src("print *, 1\n");
        GlobalStmts::named("__turn").run(&mut tu).unwrap();
        let id = tu.lookup(tu.global_scope, "__turn").unwrap();
        assert!(!tu.procedure(id).unwrap().is_function());
    }

    #[test]
    fn test_idempotent() {
        let mut tu = build_src("print *, 1 + 2\n");
        let pass = GlobalStmts::default();
        pass.run(&mut tu).unwrap();
        let once = pickle(&tu, false);
        pass.run(&mut tu).unwrap();
        assert_eq!(pickle(&tu, false), once);
    }

    #[test]
    fn test_name_clash() {
        let mut tu = build_src("integer :: f\nf = 1\n");
        assert!(GlobalStmts::default().run(&mut tu).is_err());
    }
}
