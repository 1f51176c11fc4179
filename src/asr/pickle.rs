//! Deterministic S-expression dump of the ASR for `--show-asr`
//!
//! Scopes are numbered by arena index (starting at 1) so references to a
//! symbol print as `(Var <scope> <name>)`.

use super::*;
use crate::color::{Painter, Style};

pub fn pickle(tu: &TranslationUnit, color: bool) -> String {
    let p = Pickler {
        tu,
        painter: Painter::new(color),
    };
    format!(
        "({} {} {})",
        p.node("TranslationUnit"),
        p.scope(tu.global_scope),
        p.stmts(&tu.items)
    )
}

struct Pickler<'a> {
    tu: &'a TranslationUnit,
    painter: Painter,
}

impl<'a> Pickler<'a> {
    fn node(&self, name: &str) -> String {
        self.painter.paint(Style::Node, name)
    }

    fn name(&self, name: &str) -> String {
        self.painter.paint(Style::Name, name)
    }

    fn ty(&self, ty: Type) -> String {
        let text = match ty {
            Type::Integer => "Integer".to_string(),
            Type::Real => "Real".to_string(),
            Type::Logical => "Logical".to_string(),
            Type::Character { len: Some(n) } => format!("(Character {})", n),
            Type::Character { len: None } => "(Character *)".to_string(),
        };
        self.painter.paint(Style::Type, &text)
    }

    fn scope_number(&self, scope: ScopeId) -> usize {
        scope.index() + 1
    }

    fn scope(&self, scope: ScopeId) -> String {
        let table = &self.tu.scopes[scope];
        let entries: Vec<String> = table
            .symbols
            .iter()
            .map(|(name, id)| format!("{}: {}", name, self.symbol(*id)))
            .collect();
        format!(
            "({} {} {{{}}})",
            self.node("SymbolTable"),
            self.scope_number(scope),
            entries.join(", ")
        )
    }

    fn symbol(&self, id: SymbolId) -> String {
        match self.tu.symbol(id) {
            Symbol::Program(p) => format!(
                "({} {} {} {})",
                self.node("Program"),
                self.scope(p.scope),
                self.name(&p.name),
                self.stmts(&p.body)
            ),
            Symbol::Module(m) => format!(
                "({} {} {})",
                self.node("Module"),
                self.scope(m.scope),
                self.name(&m.name)
            ),
            Symbol::Procedure(p) => {
                let args: Vec<String> = p.args.iter().map(|a| self.var_ref(*a)).collect();
                let ret = p
                    .return_var
                    .map(|r| self.var_ref(r))
                    .unwrap_or_else(|| "()".to_string());
                format!(
                    "({} {} {} [{}] {} {})",
                    self.node(if p.is_function() { "Function" } else { "Subroutine" }),
                    self.scope(p.scope),
                    self.name(&p.name),
                    args.join(" "),
                    self.stmts(&p.body),
                    ret
                )
            }
            Symbol::Variable(v) => format!(
                "({} {} {} {} {} {} {})",
                self.node("Variable"),
                self.scope_number(v.parent),
                self.name(&v.name),
                v.intent.name(),
                match v.storage {
                    Storage::Default => "Default",
                    Storage::Parameter => "Parameter",
                },
                self.ty(v.ty),
                v.init
                    .as_ref()
                    .map(|e| self.expr(e))
                    .unwrap_or_else(|| "()".to_string())
            ),
        }
    }

    fn var_ref(&self, id: SymbolId) -> String {
        let (scope, name) = match self.tu.symbol(id) {
            Symbol::Variable(v) => (v.parent, v.name.as_str()),
            Symbol::Procedure(p) => (p.parent, p.name.as_str()),
            other => (self.tu.global_scope, other.name()),
        };
        format!(
            "({} {} {})",
            self.node("Var"),
            self.scope_number(scope),
            self.name(name)
        )
    }

    fn stmts(&self, body: &[Stmt]) -> String {
        let parts: Vec<String> = body.iter().map(|s| self.stmt(s)).collect();
        format!("[{}]", parts.join(" "))
    }

    fn exprs(&self, exprs: &[Expr]) -> String {
        let parts: Vec<String> = exprs.iter().map(|e| self.expr(e)).collect();
        format!("[{}]", parts.join(" "))
    }

    fn stmt(&self, s: &Stmt) -> String {
        match s {
            Stmt::Assignment { target, value } => {
                format!("(= {} {})", self.var_ref(*target), self.expr(value))
            }
            Stmt::Print(values) => format!("({} {})", self.node("Print"), self.exprs(values)),
            Stmt::SubroutineCall { sub, args } => format!(
                "({} {} {})",
                self.node("SubroutineCall"),
                self.var_ref(*sub),
                self.exprs(args)
            ),
            Stmt::If { cond, body, orelse } => format!(
                "({} {} {} {})",
                self.node("If"),
                self.expr(cond),
                self.stmts(body),
                self.stmts(orelse)
            ),
            Stmt::DoLoop {
                var,
                start,
                end,
                step,
                body,
            } => format!(
                "({} ({} {} {} {}) {})",
                self.node("DoLoop"),
                self.var_ref(*var),
                self.expr(start),
                self.expr(end),
                step.as_ref()
                    .map(|e| self.expr(e))
                    .unwrap_or_else(|| "()".to_string()),
                self.stmts(body)
            ),
            Stmt::WhileLoop { cond, body } => format!(
                "({} {} {})",
                self.node("WhileLoop"),
                self.expr(cond),
                self.stmts(body)
            ),
            Stmt::Exit => format!("({})", self.node("Exit")),
            Stmt::Cycle => format!("({})", self.node("Cycle")),
            Stmt::Return => format!("({})", self.node("Return")),
            Stmt::Expr(e) => self.expr(e),
        }
    }

    fn expr(&self, e: &Expr) -> String {
        let lit = |text: String| self.painter.paint(Style::Literal, &text);
        match &e.kind {
            ExprKind::IntegerConstant(n) => format!(
                "({} {} {})",
                self.node("IntegerConstant"),
                lit(n.to_string()),
                self.ty(e.ty)
            ),
            ExprKind::RealConstant(x) => format!(
                "({} {} {})",
                self.node("RealConstant"),
                lit(format!("{:?}", x)),
                self.ty(e.ty)
            ),
            ExprKind::LogicalConstant(b) => format!(
                "({} {} {})",
                self.node("LogicalConstant"),
                lit(if *b { ".true.".into() } else { ".false.".into() }),
                self.ty(e.ty)
            ),
            ExprKind::StringConstant(s) => format!(
                "({} {} {})",
                self.node("StringConstant"),
                lit(format!("{:?}", s)),
                self.ty(e.ty)
            ),
            ExprKind::Var(id) => self.var_ref(*id),
            ExprKind::FunctionCall { func, args } => format!(
                "({} {} {} {})",
                self.node("FunctionCall"),
                self.var_ref(*func),
                self.exprs(args),
                self.ty(e.ty)
            ),
            ExprKind::Intrinsic { func, args } => format!(
                "({} {} {} {})",
                self.node("IntrinsicFunction"),
                func.name(),
                self.exprs(args),
                self.ty(e.ty)
            ),
            ExprKind::BinOp { op, left, right } => format!(
                "({} {} {} {} {})",
                self.node("BinOp"),
                self.expr(left),
                op.name(),
                self.expr(right),
                self.ty(e.ty)
            ),
            ExprKind::UnaryMinus(arg) => format!(
                "({} {} {})",
                self.node("UnaryMinus"),
                self.expr(arg),
                self.ty(e.ty)
            ),
            ExprKind::Not(arg) => format!("({} {})", self.node("Not"), self.expr(arg)),
            ExprKind::Compare { op, left, right } => format!(
                "({} {} {} {} {})",
                self.node("Compare"),
                self.expr(left),
                op.name(),
                self.expr(right),
                self.ty(e.ty)
            ),
            ExprKind::BoolOp { op, left, right } => format!(
                "({} {} {} {})",
                self.node("BoolOp"),
                self.expr(left),
                match op {
                    BoolOp::And => "And",
                    BoolOp::Or => "Or",
                },
                self.expr(right)
            ),
            ExprKind::Cast { kind, arg } => format!(
                "({} {} {} {})",
                self.node("Cast"),
                self.expr(arg),
                match kind {
                    CastKind::IntegerToReal => "IntegerToReal",
                    CastKind::RealToInteger => "RealToInteger",
                },
                self.ty(e.ty)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pickle_global_assignment() {
        let mut tu = TranslationUnit::new();
        let global = tu.global_scope;
        let x = tu.symbols.alloc(Symbol::Variable(Variable {
            name: "x".into(),
            parent: global,
            ty: Type::Integer,
            intent: VarIntent::Local,
            storage: Storage::Default,
            init: None,
        }));
        tu.scopes[global].symbols.insert("x".into(), x);
        tu.items.push(Stmt::Assignment {
            target: x,
            value: Expr::integer(1),
        });
        assert_eq!(
            pickle(&tu, false),
            "(TranslationUnit (SymbolTable 1 {x: (Variable 1 x Local Default Integer ())}) \
             [(= (Var 1 x) (IntegerConstant 1 Integer))])"
        );
    }
}
