//! AST to Fortran source, used by `--show-ast-f90` and `fmt`
//!
//! Output is lower-case free form. Parentheses are emitted only where the
//! operator precedence requires them, so parsing the output gives back the
//! same tree.

use super::precedence::{COMPARE, NOT, POWER};
use super::*;
use crate::color::{Painter, Style};

#[derive(Debug, Clone, Copy)]
pub struct FormatOptions {
    /// Spaces per indentation level
    pub indent: usize,
    /// Also indent the contents of program units
    pub indent_unit: bool,
    pub color: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            indent: 4,
            indent_unit: false,
            color: false,
        }
    }
}

pub fn unparse(unit: &TranslationUnit, options: FormatOptions) -> String {
    let mut w = Writer {
        out: String::new(),
        level: 0,
        options,
        painter: Painter::new(options.color),
    };
    for (i, item) in unit.items.iter().enumerate() {
        if i > 0 && is_unit(item) {
            w.out.push('\n');
        }
        w.item(item);
    }
    w.out
}

fn is_unit(item: &Item) -> bool {
    matches!(item, Item::Program(_) | Item::Module(_) | Item::Procedure(_))
}

struct Writer {
    out: String,
    level: usize,
    options: FormatOptions,
    painter: Painter,
}

impl Writer {
    fn kw(&self, text: &str) -> String {
        self.painter.paint(Style::Keyword, text)
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.level * self.options.indent {
            self.out.push(' ');
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn enter_unit(&mut self) {
        if self.options.indent_unit {
            self.level += 1;
        }
    }

    fn leave_unit(&mut self) {
        if self.options.indent_unit {
            self.level -= 1;
        }
    }

    fn item(&mut self, item: &Item) {
        match item {
            Item::Program(p) => {
                let head = format!("{} {}", self.kw("program"), p.name);
                self.line(&head);
                self.enter_unit();
                self.spec(&p.spec);
                self.block(&p.body);
                self.contains(&p.contains);
                self.leave_unit();
                let tail = format!("{} {}", self.kw("end program"), p.name);
                self.line(&tail);
            }
            Item::Module(m) => {
                let head = format!("{} {}", self.kw("module"), m.name);
                self.line(&head);
                self.enter_unit();
                self.spec(&m.spec);
                self.contains(&m.contains);
                self.leave_unit();
                let tail = format!("{} {}", self.kw("end module"), m.name);
                self.line(&tail);
            }
            Item::Procedure(p) => self.procedure(p),
            Item::Declaration(d) => {
                let text = self.decl(d);
                self.line(&text);
            }
            Item::Statement(s) => self.stmt(s),
            Item::Expression(e) => {
                let text = self.expr(e);
                self.line(&text);
            }
        }
    }

    fn spec(&mut self, spec: &SpecificationPart) {
        for u in &spec.uses {
            let text = format!("{} {}", self.kw("use"), u);
            self.line(&text);
        }
        if spec.implicit_none {
            let text = self.kw("implicit none");
            self.line(&text);
        }
        for d in &spec.decls {
            let text = self.decl(d);
            self.line(&text);
        }
    }

    fn contains(&mut self, procs: &[Procedure]) {
        if procs.is_empty() {
            return;
        }
        let text = self.kw("contains");
        self.line(&text);
        for (i, p) in procs.iter().enumerate() {
            if i > 0 {
                self.out.push('\n');
            }
            self.procedure(p);
        }
    }

    fn procedure(&mut self, p: &Procedure) {
        let args = p.args.join(", ");
        let (head, tail) = match &p.kind {
            ProcedureKind::Subroutine => (
                format!("{} {}({})", self.kw("subroutine"), p.name, args),
                format!("{} {}", self.kw("end subroutine"), p.name),
            ),
            ProcedureKind::Function {
                return_type,
                result,
            } => {
                let prefix = return_type
                    .map(|t| format!("{} ", self.kw(&t.keyword())))
                    .unwrap_or_default();
                let suffix = result
                    .as_deref()
                    .map(|r| format!(" {}({})", self.kw("result"), r))
                    .unwrap_or_default();
                (
                    format!(
                        "{}{} {}({}){}",
                        prefix,
                        self.kw("function"),
                        p.name,
                        args,
                        suffix
                    ),
                    format!("{} {}", self.kw("end function"), p.name),
                )
            }
        };
        self.line(&head);
        self.enter_unit();
        self.spec(&p.spec);
        self.block(&p.body);
        self.leave_unit();
        self.line(&tail);
    }

    fn decl(&self, d: &Declaration) -> String {
        let mut text = self.kw(&d.ty.keyword());
        for attr in &d.attrs {
            text.push_str(", ");
            text.push_str(&self.kw(match attr {
                Attribute::Parameter => "parameter",
                Attribute::Intent(Intent::In) => "intent(in)",
                Attribute::Intent(Intent::Out) => "intent(out)",
                Attribute::Intent(Intent::InOut) => "intent(inout)",
            }));
        }
        text.push_str(" :: ");
        let entities: Vec<String> = d
            .entities
            .iter()
            .map(|e| match &e.init {
                Some(init) => format!("{} = {}", e.name, self.expr(init)),
                None => e.name.clone(),
            })
            .collect();
        text.push_str(&entities.join(", "));
        text
    }

    fn block(&mut self, body: &[Stmt]) {
        for s in body {
            self.stmt(s);
        }
    }

    fn nested(&mut self, body: &[Stmt]) {
        self.level += 1;
        self.block(body);
        self.level -= 1;
    }

    fn stmt(&mut self, s: &Stmt) {
        match s {
            Stmt::If { cond, body, orelse } => {
                let head = format!("{} ({}) {}", self.kw("if"), self.expr(cond), self.kw("then"));
                self.line(&head);
                self.nested(body);
                self.orelse(orelse);
                let tail = self.kw("end if");
                self.line(&tail);
            }
            Stmt::DoLoop {
                var,
                start,
                end,
                step,
                body,
            } => {
                let mut head = format!(
                    "{} {} = {}, {}",
                    self.kw("do"),
                    var,
                    self.expr(start),
                    self.expr(end)
                );
                if let Some(step) = step {
                    head.push_str(", ");
                    head.push_str(&self.expr(step));
                }
                self.line(&head);
                self.nested(body);
                let tail = self.kw("end do");
                self.line(&tail);
            }
            Stmt::DoWhile { cond, body } => {
                let head = format!("{} ({})", self.kw("do while"), self.expr(cond));
                self.line(&head);
                self.nested(body);
                let tail = self.kw("end do");
                self.line(&tail);
            }
            Stmt::DoForever { body } => {
                let head = self.kw("do");
                self.line(&head);
                self.nested(body);
                let tail = self.kw("end do");
                self.line(&tail);
            }
            simple => {
                let text = self.simple_stmt(simple);
                self.line(&text);
            }
        }
    }

    /// An `else` holding a single block `if` prints as `else if`
    fn orelse(&mut self, orelse: &[Stmt]) {
        if orelse.is_empty() {
            return;
        }
        if let [Stmt::If { cond, body, orelse }] = orelse {
            let head = format!(
                "{} ({}) {}",
                self.kw("else if"),
                self.expr(cond),
                self.kw("then")
            );
            self.line(&head);
            self.nested(body);
            self.orelse(orelse);
        } else {
            let head = self.kw("else");
            self.line(&head);
            self.nested(orelse);
        }
    }

    /// Statements that fit on one line
    fn simple_stmt(&self, s: &Stmt) -> String {
        match s {
            Stmt::Assignment { target, value } => format!("{} = {}", target, self.expr(value)),
            Stmt::Print(values) => {
                let mut text = format!("{} *", self.kw("print"));
                for v in values {
                    text.push_str(", ");
                    text.push_str(&self.expr(v));
                }
                text
            }
            Stmt::Call { name, args } => {
                let args: Vec<String> = args.iter().map(|a| self.expr(a)).collect();
                format!("{} {}({})", self.kw("call"), name, args.join(", "))
            }
            Stmt::SingleIf { cond, stmt } => format!(
                "{} ({}) {}",
                self.kw("if"),
                self.expr(cond),
                self.simple_stmt(stmt)
            ),
            Stmt::Exit => self.kw("exit"),
            Stmt::Cycle => self.kw("cycle"),
            Stmt::Return => self.kw("return"),
            // Block statements never appear after a single-line `if`
            block => {
                let mut nested = Writer {
                    out: String::new(),
                    level: 0,
                    options: self.options,
                    painter: self.painter,
                };
                nested.stmt(block);
                nested.out.trim_end().to_string()
            }
        }
    }

    fn expr(&self, e: &Expr) -> String {
        match e {
            Expr::Integer(n) => n.to_string(),
            Expr::Real(text) => text.clone(),
            Expr::Logical(true) => self.kw(".true."),
            Expr::Logical(false) => self.kw(".false."),
            Expr::Str(s) => format!("'{}'", s.replace('\'', "''")),
            Expr::Name(n) => n.clone(),
            Expr::FuncCall { name, args } => {
                let args: Vec<String> = args.iter().map(|a| self.expr(a)).collect();
                format!("{}({})", name, args.join(", "))
            }
            Expr::BinOp { op, left, right } => {
                let prec = e.precedence();
                let (l, r) = if *op == BinOp::Pow {
                    (
                        self.operand(left, left.precedence() <= POWER),
                        self.operand(right, right.precedence() < POWER),
                    )
                } else {
                    (
                        self.operand(left, left.precedence() < prec),
                        self.operand(right, right.precedence() <= prec),
                    )
                };
                if *op == BinOp::Pow {
                    format!("{}**{}", l, r)
                } else {
                    format!("{} {} {}", l, op.symbol(), r)
                }
            }
            Expr::UnaryOp {
                op: UnaryOp::Minus,
                operand,
            } => format!(
                "-{}",
                self.operand(operand, operand.precedence() <= e.precedence())
            ),
            Expr::UnaryOp {
                op: UnaryOp::Not,
                operand,
            } => format!(
                "{} {}",
                self.kw(".not."),
                self.operand(operand, operand.precedence() < NOT)
            ),
            Expr::Compare { op, left, right } => format!(
                "{} {} {}",
                self.operand(left, left.precedence() <= COMPARE),
                op.symbol(),
                self.operand(right, right.precedence() <= COMPARE)
            ),
            Expr::BoolOp { op, left, right } => {
                let prec = e.precedence();
                format!(
                    "{} {} {}",
                    self.operand(left, left.precedence() < prec),
                    self.kw(op.symbol()),
                    self.operand(right, right.precedence() <= prec)
                )
            }
        }
    }

    fn operand(&self, e: &Expr, parens: bool) -> String {
        if parens {
            format!("({})", self.expr(e))
        } else {
            self.expr(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bin(op: BinOp, l: Expr, r: Expr) -> Expr {
        Expr::BinOp {
            op,
            left: Box::new(l),
            right: Box::new(r),
        }
    }

    fn name(n: &str) -> Expr {
        Expr::Name(n.into())
    }

    fn render(e: Expr) -> String {
        let unit = TranslationUnit {
            items: vec![Item::Expression(e)],
        };
        unparse(&unit, FormatOptions::default()).trim_end().to_string()
    }

    #[test]
    fn test_left_assoc_needs_parens_on_right() {
        let e = bin(BinOp::Sub, name("a"), bin(BinOp::Sub, name("b"), name("c")));
        assert_eq!(render(e), "a - (b - c)");
    }

    #[test]
    fn test_power_is_right_assoc() {
        let e = bin(BinOp::Pow, name("a"), bin(BinOp::Pow, name("b"), name("c")));
        assert_eq!(render(e), "a**b**c");
        let e = bin(BinOp::Pow, bin(BinOp::Pow, name("a"), name("b")), name("c"));
        assert_eq!(render(e), "(a**b)**c");
    }

    #[test]
    fn test_unary_minus_operand() {
        let e = bin(
            BinOp::Mul,
            Expr::UnaryOp {
                op: UnaryOp::Minus,
                operand: Box::new(name("a")),
            },
            name("b"),
        );
        assert_eq!(render(e), "(-a) * b");
    }

    #[test]
    fn test_string_quotes_doubled() {
        assert_eq!(render(Expr::Str("it's".into())), "'it''s'");
    }
}
