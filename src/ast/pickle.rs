//! S-expression rendering of the AST for `--show-ast`

use super::*;
use crate::color::{Painter, Style};

pub fn pickle(unit: &TranslationUnit, color: bool) -> String {
    let p = Pickler {
        painter: Painter::new(color),
    };
    let items: Vec<String> = unit.items.iter().map(|i| p.item(i)).collect();
    format!("({} [{}])", p.node("TranslationUnit"), items.join(" "))
}

struct Pickler {
    painter: Painter,
}

impl Pickler {
    fn node(&self, name: &str) -> String {
        self.painter.paint(Style::Node, name)
    }

    fn name(&self, name: &str) -> String {
        self.painter.paint(Style::Name, name)
    }

    fn lit(&self, text: &str) -> String {
        self.painter.paint(Style::Literal, text)
    }

    fn list<T>(&self, xs: &[T], f: impl Fn(&T) -> String) -> String {
        let parts: Vec<String> = xs.iter().map(f).collect();
        format!("[{}]", parts.join(" "))
    }

    fn item(&self, item: &Item) -> String {
        match item {
            Item::Program(p) => format!(
                "({} {} {} {} {})",
                self.node("Program"),
                self.name(&p.name),
                self.spec(&p.spec),
                self.list(&p.body, |s| self.stmt(s)),
                self.list(&p.contains, |c| self.procedure(c)),
            ),
            Item::Module(m) => format!(
                "({} {} {} {})",
                self.node("Module"),
                self.name(&m.name),
                self.spec(&m.spec),
                self.list(&m.contains, |c| self.procedure(c)),
            ),
            Item::Procedure(p) => self.procedure(p),
            Item::Declaration(d) => self.decl(d),
            Item::Statement(s) => self.stmt(s),
            Item::Expression(e) => self.expr(e),
        }
    }

    fn spec(&self, spec: &SpecificationPart) -> String {
        format!(
            "[{}] {} {}",
            spec.uses
                .iter()
                .map(|u| format!("({} {})", self.node("Use"), self.name(u)))
                .collect::<Vec<_>>()
                .join(" "),
            if spec.implicit_none {
                format!("({})", self.node("ImplicitNone"))
            } else {
                "()".to_string()
            },
            self.list(&spec.decls, |d| self.decl(d)),
        )
    }

    fn procedure(&self, p: &Procedure) -> String {
        let head = match &p.kind {
            ProcedureKind::Subroutine => self.node("Subroutine"),
            ProcedureKind::Function {
                return_type,
                result,
            } => format!(
                "{} {} {}",
                self.node("Function"),
                return_type
                    .map(|t| self.painter.paint(Style::Type, &t.keyword()))
                    .unwrap_or_else(|| "()".into()),
                result
                    .as_deref()
                    .map(|r| self.name(r))
                    .unwrap_or_else(|| "()".into()),
            ),
        };
        format!(
            "({} {} [{}] {} {})",
            head,
            self.name(&p.name),
            p.args
                .iter()
                .map(|a| self.name(a))
                .collect::<Vec<_>>()
                .join(" "),
            self.spec(&p.spec),
            self.list(&p.body, |s| self.stmt(s)),
        )
    }

    fn decl(&self, d: &Declaration) -> String {
        let attrs: Vec<String> = d
            .attrs
            .iter()
            .map(|a| match a {
                Attribute::Parameter => "parameter".to_string(),
                Attribute::Intent(Intent::In) => "intent(in)".to_string(),
                Attribute::Intent(Intent::Out) => "intent(out)".to_string(),
                Attribute::Intent(Intent::InOut) => "intent(inout)".to_string(),
            })
            .collect();
        let entities: Vec<String> = d
            .entities
            .iter()
            .map(|e| match &e.init {
                Some(init) => format!("({} {})", self.name(&e.name), self.expr(init)),
                None => format!("({} ())", self.name(&e.name)),
            })
            .collect();
        format!(
            "({} {} [{}] [{}])",
            self.node("Declaration"),
            self.painter.paint(Style::Type, &d.ty.keyword()),
            attrs.join(" "),
            entities.join(" ")
        )
    }

    fn stmt(&self, s: &Stmt) -> String {
        match s {
            Stmt::Assignment { target, value } => format!(
                "({} {} {})",
                self.node("Assignment"),
                self.name(target),
                self.expr(value)
            ),
            Stmt::Print(values) => format!(
                "({} () {})",
                self.node("Print"),
                self.list(values, |e| self.expr(e))
            ),
            Stmt::Call { name, args } => format!(
                "({} {} {})",
                self.node("SubroutineCall"),
                self.name(name),
                self.list(args, |e| self.expr(e))
            ),
            Stmt::If { cond, body, orelse } => format!(
                "({} {} {} {})",
                self.node("If"),
                self.expr(cond),
                self.list(body, |s| self.stmt(s)),
                self.list(orelse, |s| self.stmt(s))
            ),
            Stmt::SingleIf { cond, stmt } => format!(
                "({} {} {})",
                self.node("IfSingle"),
                self.expr(cond),
                self.stmt(stmt)
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
                self.name(var),
                self.expr(start),
                self.expr(end),
                step.as_ref()
                    .map(|e| self.expr(e))
                    .unwrap_or_else(|| "()".into()),
                self.list(body, |s| self.stmt(s))
            ),
            Stmt::DoWhile { cond, body } => format!(
                "({} {} {})",
                self.node("WhileLoop"),
                self.expr(cond),
                self.list(body, |s| self.stmt(s))
            ),
            Stmt::DoForever { body } => format!(
                "({} {})",
                self.node("DoLoop"),
                self.list(body, |s| self.stmt(s))
            ),
            Stmt::Exit => format!("({})", self.node("Exit")),
            Stmt::Cycle => format!("({})", self.node("Cycle")),
            Stmt::Return => format!("({})", self.node("Return")),
        }
    }

    fn expr(&self, e: &Expr) -> String {
        match e {
            Expr::Integer(n) => self.lit(&n.to_string()),
            Expr::Real(text) => format!("({} {})", self.node("Real"), self.lit(&format!("\"{}\"", text))),
            Expr::Logical(b) => self.lit(if *b { ".true." } else { ".false." }),
            Expr::Str(s) => format!("({} {})", self.node("Str"), self.lit(&format!("\"{}\"", s))),
            Expr::Name(n) => self.name(n),
            Expr::FuncCall { name, args } => format!(
                "({} {} {})",
                self.node("FuncCallOrArray"),
                self.name(name),
                self.list(args, |a| self.expr(a))
            ),
            Expr::BinOp { op, left, right } => format!(
                "({} {} {} {})",
                self.node("BinOp"),
                self.expr(left),
                op.name(),
                self.expr(right)
            ),
            Expr::UnaryOp { op, operand } => format!(
                "({} {} {})",
                self.node("UnaryOp"),
                match op {
                    UnaryOp::Minus => "USub",
                    UnaryOp::Not => "Not",
                },
                self.expr(operand)
            ),
            Expr::Compare { op, left, right } => format!(
                "({} {} {} {})",
                self.node("Compare"),
                self.expr(left),
                op.name(),
                self.expr(right)
            ),
            Expr::BoolOp { op, left, right } => format!(
                "({} {} {} {})",
                self.node("BoolOp"),
                self.expr(left),
                match op {
                    BoolOp::And => "And",
                    BoolOp::Or => "Or",
                },
                self.expr(right)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_binop() {
        let unit = TranslationUnit {
            items: vec![Item::Statement(Stmt::Print(vec![Expr::BinOp {
                op: BinOp::Add,
                left: Box::new(Expr::Integer(1)),
                right: Box::new(Expr::Integer(2)),
            }]))],
        };
        assert_eq!(
            pickle(&unit, false),
            "(TranslationUnit [(Print () [(BinOp 1 Add 2)])])"
        );
    }
}
