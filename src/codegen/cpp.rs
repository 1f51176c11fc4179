//! C++ backend
//!
//! Translates the ASR to a single C++17 translation unit. Dummy arguments
//! become references; `intent(in)` ones are `const`. Actual arguments that
//! are not variables are bound through `_fortc_tmp`, which keeps the
//! temporary alive for the duration of the call. With Kokkos enabled the
//! generated `main` brackets the program with `Kokkos::initialize` and
//! `Kokkos::finalize`.

use std::fmt::Write;

use crate::asr::fold::{Constant, fold};
use crate::asr::*;
use crate::error::{ErrorRecord, StageResult};

const PRELUDE: &str = "\
#include <cmath>
#include <cstdint>
#include <cstdio>
#include <algorithm>
#include <string>
";

const HELPERS: &str = "
template <class T> static T &_fortc_tmp(T &&value) { return value; }

static int64_t _fortc_ipow(int64_t base, int64_t exp) {
    if (exp < 0) {
        if (base == 1) return 1;
        if (base == -1) return (exp % 2 == 0) ? 1 : -1;
        return 0;
    }
    int64_t acc = 1;
    while (exp-- > 0) acc *= base;
    return acc;
}
";

const RESERVED: &[&str] = &[
    "auto", "bool", "break", "case", "char", "class", "const", "continue", "default", "delete",
    "double", "else", "enum", "extern", "float", "for", "goto", "int", "long", "main", "namespace",
    "new", "operator", "private", "public", "register", "short", "signed", "sizeof", "static",
    "struct", "switch", "template", "this", "throw", "try", "typedef", "union", "unsigned",
    "virtual", "void", "volatile", "while",
];

fn identifier(name: String) -> String {
    if RESERVED.contains(&name.as_str()) {
        format!("{}_", name)
    } else {
        name
    }
}

fn cpp_type(ty: Type) -> &'static str {
    match ty {
        Type::Integer => "int64_t",
        Type::Real => "double",
        Type::Logical => "bool",
        Type::Character { .. } => "std::string",
    }
}

fn real_literal(x: f64) -> String {
    if x.is_nan() {
        "NAN".into()
    } else if x.is_infinite() {
        if x > 0.0 { "HUGE_VAL".into() } else { "(-HUGE_VAL)".into() }
    } else {
        format!("{:?}", x)
    }
}

fn string_literal(s: &str) -> String {
    let mut out = String::from("\"");
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn constant(c: &Constant) -> String {
    match c {
        Constant::Integer(n) => format!("INT64_C({})", n),
        Constant::Real(x) => real_literal(*x),
        Constant::Logical(b) => b.to_string(),
        Constant::Str(s) => format!("std::string({})", string_literal(s)),
    }
}

fn default_value(ty: Type) -> String {
    match ty {
        Type::Integer => "0".into(),
        Type::Real => "0.0".into(),
        Type::Logical => "false".into(),
        Type::Character { len } => format!("std::string({}, ' ')", len.unwrap_or(0)),
    }
}

/// C++ source generator
pub struct CppCodegen {
    kokkos: bool,
    indent: usize,
    output: String,
    /// Counter for hidden loop bounds
    next_hidden: usize,
}

impl CppCodegen {
    pub fn new(kokkos: bool) -> Self {
        Self {
            kokkos,
            indent: 0,
            output: String::new(),
            next_hidden: 0,
        }
    }

    /// Translate the whole unit to C++ source
    pub fn generate(mut self, tu: &TranslationUnit) -> StageResult<String> {
        let programs = tu.programs();
        if programs.len() > 1 {
            return Err(ErrorRecord::codegen("Only one program unit is allowed per file"));
        }
        if !programs.is_empty() && !tu.items.is_empty() {
            return Err(ErrorRecord::codegen(
                "Global statements cannot be compiled together with a program unit",
            ));
        }

        self.output.push_str(PRELUDE);
        if self.kokkos {
            self.output.push_str("#include <Kokkos_Core.hpp>\n");
        }
        self.output.push_str(HELPERS);
        self.output.push('\n');

        for id in tu.static_variables() {
            self.static_variable(tu, id);
        }
        self.output.push('\n');

        let procedures = tu.all_procedures();
        for id in &procedures {
            if let Some(p) = tu.procedure(*id) {
                let sig = self.signature(tu, *id, p);
                writeln!(self.output, "{};", sig).unwrap();
            }
        }
        if !procedures.is_empty() {
            self.output.push('\n');
        }
        for id in &procedures {
            self.procedure(tu, *id)?;
        }

        let body = match programs.first() {
            Some(id) => match tu.symbol(*id) {
                Symbol::Program(p) => Some(&p.body),
                _ => None,
            },
            None if !tu.items.is_empty() => Some(&tu.items),
            None => None,
        };
        if let Some(body) = body {
            self.main(tu, body)?;
        }
        tracing::debug!("generated {} bytes of C++", self.output.len());
        Ok(self.output)
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.output.push_str("    ");
        }
        self.output.push_str(text);
        self.output.push('\n');
    }

    fn is_external(tu: &TranslationUnit, scope: ScopeId) -> bool {
        matches!(
            tu.scopes[scope].owner.map(|o| tu.symbol(o)),
            Some(Symbol::Module(Module { external: true, .. }))
        )
    }

    fn name(tu: &TranslationUnit, id: SymbolId) -> String {
        identifier(tu.mangled_name(id))
    }

    fn static_variable(&mut self, tu: &TranslationUnit, id: SymbolId) {
        let Some(var) = tu.variable(id) else { return };
        let name = Self::name(tu, id);
        let ty = cpp_type(var.ty);
        let init = var.init.as_ref().and_then(|e| fold(tu, e));
        let text = if var.storage == Storage::Parameter {
            format!(
                "static const {} {} = {};",
                ty,
                name,
                init.as_ref().map(constant).unwrap_or_else(|| default_value(var.ty))
            )
        } else if Self::is_external(tu, var.parent) {
            format!("extern {} {};", ty, name)
        } else {
            format!(
                "{} {} = {};",
                ty,
                name,
                init.as_ref().map(constant).unwrap_or_else(|| default_value(var.ty))
            )
        };
        self.line(&text);
    }

    fn signature(&self, tu: &TranslationUnit, id: SymbolId, p: &Procedure) -> String {
        let ret = p
            .return_var
            .and_then(|r| tu.variable(r))
            .map(|v| cpp_type(v.ty))
            .unwrap_or("void");
        let params: Vec<String> = p
            .args
            .iter()
            .filter_map(|a| tu.variable(*a))
            .map(|v| {
                let constness = if v.intent == VarIntent::In { "const " } else { "" };
                format!("{}{} &{}", constness, cpp_type(v.ty), identifier(v.name.clone()))
            })
            .collect();
        format!("{} {}({})", ret, Self::name(tu, id), params.join(", "))
    }

    fn procedure(&mut self, tu: &TranslationUnit, id: SymbolId) -> StageResult<()> {
        let Some(p) = tu.procedure(id) else {
            return Ok(());
        };
        if Self::is_external(tu, p.parent) {
            return Ok(());
        }
        let sig = self.signature(tu, id, p);
        self.line(&format!("{} {{", sig));
        self.indent += 1;
        for local in tu.locals(p).into_iter().chain(p.return_var) {
            let Some(var) = tu.variable(local) else { continue };
            let init = var
                .init
                .as_ref()
                .and_then(|e| fold(tu, e))
                .map(|c| constant(&c))
                .unwrap_or_else(|| default_value(var.ty));
            let constness = if var.storage == Storage::Parameter { "const " } else { "" };
            self.line(&format!(
                "{}{} {} = {};",
                constness,
                cpp_type(var.ty),
                self.local_name(tu, local),
                init
            ));
        }
        let ret = p.return_var.map(|r| self.local_name(tu, r));
        let mut body = BodyEmitter {
            tu,
            codegen: self,
            return_value: ret.clone(),
        };
        body.block(&p.body)?;
        if let Some(ret) = ret {
            self.line(&format!("return {};", ret));
        }
        self.indent -= 1;
        self.line("}");
        self.output.push('\n');
        Ok(())
    }

    fn local_name(&self, tu: &TranslationUnit, id: SymbolId) -> String {
        identifier(tu.symbol(id).name().to_string())
    }

    fn main(&mut self, tu: &TranslationUnit, body: &[Stmt]) -> StageResult<()> {
        self.line("int main(int argc, char *argv[]) {");
        self.indent += 1;
        if self.kokkos {
            self.line("Kokkos::initialize(argc, argv);");
        } else {
            self.line("(void)argc;");
            self.line("(void)argv;");
        }
        self.line("{");
        self.indent += 1;
        let mut emitter = BodyEmitter {
            tu,
            codegen: self,
            return_value: None,
        };
        emitter.block(body)?;
        self.indent -= 1;
        self.line("}");
        if self.kokkos {
            self.line("Kokkos::finalize();");
        }
        self.line("return 0;");
        self.indent -= 1;
        self.line("}");
        Ok(())
    }
}

/// Statement and expression translation inside one function body
struct BodyEmitter<'a, 'c> {
    tu: &'a TranslationUnit,
    codegen: &'c mut CppCodegen,
    /// Name of the result variable in functions
    return_value: Option<String>,
}

impl<'a, 'c> BodyEmitter<'a, 'c> {
    fn line(&mut self, text: &str) {
        self.codegen.line(text);
    }

    fn var_name(&self, id: SymbolId) -> String {
        let Some(var) = self.tu.variable(id) else {
            return identifier(self.tu.mangled_name(id));
        };
        let in_procedure = matches!(
            self.tu.scopes[var.parent].owner.map(|o| self.tu.symbol(o)),
            Some(Symbol::Procedure(_))
        );
        if in_procedure {
            identifier(var.name.clone())
        } else {
            identifier(self.tu.mangled_name(id))
        }
    }

    fn block(&mut self, body: &[Stmt]) -> StageResult<()> {
        for s in body {
            self.stmt(s)?;
        }
        Ok(())
    }

    fn nested(&mut self, body: &[Stmt]) -> StageResult<()> {
        self.codegen.indent += 1;
        let result = self.block(body);
        self.codegen.indent -= 1;
        result
    }

    fn stmt(&mut self, s: &Stmt) -> StageResult<()> {
        match s {
            Stmt::Assignment { target, value } => {
                let text = format!("{} = {};", self.var_name(*target), self.expr(value)?);
                self.line(&text);
            }
            Stmt::Print(values) => self.print(values)?,
            Stmt::SubroutineCall { sub, args } => {
                let call = self.call(*sub, args)?;
                self.line(&format!("{};", call));
            }
            Stmt::If { cond, body, orelse } => {
                let c = self.expr(cond)?;
                self.line(&format!("if ({}) {{", c));
                self.nested(body)?;
                if orelse.is_empty() {
                    self.line("}");
                } else {
                    self.line("} else {");
                    self.nested(orelse)?;
                    self.line("}");
                }
            }
            Stmt::DoLoop {
                var,
                start,
                end,
                step,
                body,
            } => {
                self.codegen.next_hidden += 1;
                let n = self.codegen.next_hidden;
                let var = self.var_name(*var);
                let first = self.expr(start)?;
                let last = self.expr(end)?;
                let increment = match step {
                    Some(s) => self.expr(s)?,
                    None => "1".to_string(),
                };
                let cond = match step.as_ref().map(|s| fold(self.tu, s)) {
                    None | Some(Some(Constant::Integer(1..))) => format!("{} <= _end{}", var, n),
                    Some(Some(Constant::Integer(..0))) => format!("{} >= _end{}", var, n),
                    _ => format!(
                        "(_step{n} > 0) ? ({v} <= _end{n}) : ({v} >= _end{n})",
                        n = n,
                        v = var
                    ),
                };
                self.line("{");
                self.codegen.indent += 1;
                self.line(&format!("const int64_t _end{} = {};", n, last));
                self.line(&format!("const int64_t _step{} = {};", n, increment));
                self.line(&format!(
                    "for ({v} = {first}; {cond}; {v} += _step{n}) {{",
                    v = var,
                    first = first,
                    cond = cond,
                    n = n
                ));
                self.nested(body)?;
                self.line("}");
                self.codegen.indent -= 1;
                self.line("}");
            }
            Stmt::WhileLoop { cond, body } => {
                let c = self.expr(cond)?;
                self.line(&format!("while ({}) {{", c));
                self.nested(body)?;
                self.line("}");
            }
            Stmt::Exit => self.line("break;"),
            Stmt::Cycle => self.line("continue;"),
            Stmt::Return => match self.return_value.clone() {
                Some(r) => self.line(&format!("return {};", r)),
                None => self.line("return;"),
            },
            Stmt::Expr(e) => {
                let text = format!("(void)({});", self.expr(e)?);
                self.line(&text);
            }
        }
        Ok(())
    }

    fn print(&mut self, values: &[Expr]) -> StageResult<()> {
        let mut format = String::new();
        let mut args = Vec::new();
        for (i, v) in values.iter().enumerate() {
            if i > 0 {
                format.push(' ');
            }
            let value = self.expr(v)?;
            match v.ty {
                Type::Integer => {
                    format.push_str("%lld");
                    args.push(format!("(long long)({})", value));
                }
                Type::Real => {
                    format.push_str("%f");
                    args.push(value);
                }
                Type::Logical => {
                    format.push_str("%s");
                    args.push(format!("({}) ? \"T\" : \"F\"", value));
                }
                Type::Character { .. } => {
                    format.push_str("%s");
                    args.push(format!("std::string({}).c_str()", value));
                }
            }
        }
        format.push('\n');
        let mut call = format!("std::printf({}", string_literal(&format));
        for a in args {
            call.push_str(", ");
            call.push_str(&a);
        }
        call.push_str(");");
        self.line(&call);
        Ok(())
    }

    fn call(&mut self, id: SymbolId, args: &[Expr]) -> StageResult<String> {
        let mut actuals = Vec::with_capacity(args.len());
        for a in args {
            actuals.push(match &a.kind {
                ExprKind::Var(v)
                    if self
                        .tu
                        .variable(*v)
                        .is_some_and(|v| v.storage != Storage::Parameter) =>
                {
                    self.var_name(*v)
                }
                _ => format!("_fortc_tmp({})", self.expr(a)?),
            });
        }
        Ok(format!(
            "{}({})",
            identifier(self.tu.mangled_name(id)),
            actuals.join(", ")
        ))
    }

    fn expr(&mut self, e: &Expr) -> StageResult<String> {
        Ok(match &e.kind {
            ExprKind::IntegerConstant(n) => format!("INT64_C({})", n),
            ExprKind::RealConstant(x) => real_literal(*x),
            ExprKind::LogicalConstant(b) => b.to_string(),
            ExprKind::StringConstant(s) => format!("std::string({})", string_literal(s)),
            ExprKind::Var(id) => self.var_name(*id),
            ExprKind::FunctionCall { func, args } => self.call(*func, args)?,
            ExprKind::Intrinsic { func, args } => {
                let mut values = Vec::with_capacity(args.len());
                for a in args {
                    values.push(self.expr(a)?);
                }
                match func {
                    Intrinsic::Abs => format!("std::abs({})", values.join(", ")),
                    Intrinsic::Mod if e.ty == Type::Real => {
                        format!("std::fmod({})", values.join(", "))
                    }
                    Intrinsic::Mod => format!("({} % {})", values[0], values[1]),
                    Intrinsic::Min | Intrinsic::Max => {
                        let f = if *func == Intrinsic::Min { "std::min" } else { "std::max" };
                        format!("{}({{{}}})", f, values.join(", "))
                    }
                    other => format!("std::{}({})", other.name(), values.join(", ")),
                }
            }
            ExprKind::BinOp { op, left, right } => {
                let l = self.expr(left)?;
                let r = self.expr(right)?;
                match (op, e.ty) {
                    (BinOp::Pow, Type::Integer) => format!("_fortc_ipow({}, {})", l, r),
                    (BinOp::Pow, _) => format!("std::pow({}, {})", l, r),
                    (op, _) => format!("({} {} {})", l, op.symbol(), r),
                }
            }
            ExprKind::UnaryMinus(arg) => format!("(-{})", self.expr(arg)?),
            ExprKind::Not(arg) => format!("(!{})", self.expr(arg)?),
            ExprKind::Compare { op, left, right } => {
                let symbol = match op {
                    CmpOp::Eq => "==",
                    CmpOp::NotEq => "!=",
                    other => other.symbol(),
                };
                format!("({} {} {})", self.expr(left)?, symbol, self.expr(right)?)
            }
            ExprKind::BoolOp { op, left, right } => {
                let symbol = match op {
                    BoolOp::And => "&&",
                    BoolOp::Or => "||",
                };
                format!("({} {} {})", self.expr(left)?, symbol, self.expr(right)?)
            }
            ExprKind::Cast { kind, arg } => match kind {
                CastKind::IntegerToReal => format!("(double)({})", self.expr(arg)?),
                CastKind::RealToInteger => format!("(int64_t)({})", self.expr(arg)?),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn cpp(src: &str, kokkos: bool) -> String {
        let tokens = lex(src).unwrap();
        let tu = build(&parse(&tokens, src).unwrap()).unwrap();
        CppCodegen::new(kokkos).generate(&tu).unwrap()
    }

    #[test]
    fn test_kokkos_bracket() {
        let out = cpp("program p\nprint *, 'hi'\nend program\n", true);
        assert!(out.contains("#include <Kokkos_Core.hpp>"));
        assert!(out.contains("Kokkos::initialize(argc, argv);"));
        assert!(out.contains("Kokkos::finalize();"));
    }

    #[test]
    fn test_plain_main() {
        let out = cpp("x = 2\nprint *, x * 3\n", false);
        assert!(!out.contains("Kokkos"));
        assert!(out.contains("int64_t x = 0;"));
        assert!(out.contains("std::printf(\"%lld\\n\", (long long)((x * INT64_C(3))));"));
    }

    #[test]
    fn test_reference_arguments() {
        let src = "\
subroutine scale(a, k)
real, intent(inout) :: a
real, intent(in) :: k
a = a * k
end subroutine
";
        let out = cpp(src, false);
        assert!(out.contains("void scale(double &a, const double &k);"));
    }

    #[test]
    fn test_counted_loop() {
        let out = cpp("integer :: i\ndo i = 10, 1, -2\nprint *, i\nend do\n", false);
        assert!(out.contains("for (i = INT64_C(10); i >= _end1; i += _step1) {"));
    }
}
