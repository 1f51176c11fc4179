//! LLVM backend
//!
//! Lowers the ASR to textual LLVM IR with opaque pointers. Every variable
//! lives in memory: statics are globals, locals are `alloca`s in the entry
//! block and dummy arguments arrive as pointers, which is exactly Fortran's
//! pass-by-reference. Object and assembly files are produced by handing
//! the text to `llc` (see [`crate::toolchain`]).

use std::collections::HashMap;
use std::fmt::Write;
use std::path::Path;

use indexmap::IndexMap;

use crate::asr::fold::{Constant, fold};
use crate::asr::*;
use crate::error::{ErrorRecord, StageResult};

/// A generated module, held as IR text
#[derive(Debug, Clone, PartialEq)]
pub struct IrModule {
    pub name: String,
    text: String,
}

impl IrModule {
    pub fn print_to_string(&self) -> &str {
        &self.text
    }

    pub fn write_to_file(&self, path: &Path) -> StageResult<()> {
        std::fs::write(path, &self.text).map_err(|e| ErrorRecord::io(path, &e))
    }
}

/// LLVM IR generator
pub struct LlvmCodegen {
    module_name: String,
}

/// Declarations and helpers every module carries
const PRELUDE: &str = "\
declare i32 @printf(ptr, ...)
declare double @llvm.pow.f64(double, double)
declare double @llvm.fabs.f64(double)
declare double @llvm.sqrt.f64(double)
declare double @llvm.exp.f64(double)
declare double @llvm.sin.f64(double)
declare double @llvm.cos.f64(double)
declare double @llvm.minnum.f64(double, double)
declare double @llvm.maxnum.f64(double, double)

define internal i64 @_fortc_ipow(i64 %base, i64 %exp) {
entry:
  %negative = icmp slt i64 %exp, 0
  br i1 %negative, label %neg, label %loop
neg:
  %is_one = icmp eq i64 %base, 1
  %is_minus_one = icmp eq i64 %base, -1
  %parity = and i64 %exp, 1
  %odd = icmp ne i64 %parity, 0
  %sign = select i1 %odd, i64 -1, i64 1
  %r0 = select i1 %is_minus_one, i64 %sign, i64 0
  %r1 = select i1 %is_one, i64 1, i64 %r0
  ret i64 %r1
loop:
  %acc = phi i64 [ 1, %entry ], [ %acc.next, %body ]
  %n = phi i64 [ %exp, %entry ], [ %n.next, %body ]
  %done = icmp eq i64 %n, 0
  br i1 %done, label %exit, label %body
body:
  %acc.next = mul i64 %acc, %base
  %n.next = sub i64 %n, 1
  br label %loop
exit:
  ret i64 %acc
}
";

fn codegen<T>(message: impl Into<String>) -> StageResult<T> {
    Err(ErrorRecord::codegen(message))
}

fn llvm_type(ty: Type) -> StageResult<&'static str> {
    match ty {
        Type::Integer => Ok("i64"),
        Type::Real => Ok("double"),
        Type::Logical => Ok("i1"),
        Type::Character { .. } => codegen("Character variables are not supported by the LLVM backend"),
    }
}

/// Doubles are written as their bit pattern so no precision is lost
fn real_literal(x: f64) -> String {
    format!("0x{:016X}", x.to_bits())
}

fn constant_literal(c: &Constant) -> StageResult<String> {
    match c {
        Constant::Integer(n) => Ok(n.to_string()),
        Constant::Real(x) => Ok(real_literal(*x)),
        Constant::Logical(b) => Ok(b.to_string()),
        Constant::Str(_) => codegen("Character values are not supported by the LLVM backend"),
    }
}

fn zero(ty: Type) -> StageResult<String> {
    Ok(match ty {
        Type::Integer => "0".into(),
        Type::Real => real_literal(0.0),
        Type::Logical => "false".into(),
        Type::Character { .. } => return llvm_type(ty).map(str::to_string),
    })
}

/// Global string constants, interned by content
#[derive(Default)]
struct StringPool {
    strings: IndexMap<String, String>,
}

impl StringPool {
    fn intern(&mut self, text: &str) -> String {
        let next = self.strings.len();
        self.strings
            .entry(text.to_string())
            .or_insert_with(|| format!("@.str.{}", next))
            .clone()
    }

    fn emit(&self, out: &mut String) {
        for (text, name) in &self.strings {
            let mut escaped = String::new();
            for b in text.bytes() {
                if (b.is_ascii_graphic() && b != b'"' && b != b'\\') || b == b' ' {
                    escaped.push(b as char);
                } else {
                    write!(escaped, "\\{:02X}", b).unwrap();
                }
            }
            writeln!(
                out,
                "{} = private unnamed_addr constant [{} x i8] c\"{}\\00\"",
                name,
                text.len() + 1,
                escaped
            )
            .unwrap();
        }
    }
}

impl LlvmCodegen {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
        }
    }

    /// Lower the whole unit
    pub fn generate(&self, tu: &TranslationUnit) -> StageResult<IrModule> {
        let programs = tu.programs();
        if programs.len() > 1 {
            return codegen("Only one program unit is allowed per file");
        }
        if !programs.is_empty() && !tu.items.is_empty() {
            return codegen(
                "Global statements cannot be compiled together with a program unit",
            );
        }

        let mut strings = StringPool::default();
        let mut globals = String::new();
        let mut functions = String::new();

        for id in tu.static_variables() {
            self.emit_static(tu, id, &mut globals)?;
        }
        for id in tu.all_procedures() {
            self.emit_procedure(tu, id, &mut strings, &mut functions)?;
        }
        match programs.first() {
            Some(id) => {
                let Symbol::Program(p) = tu.symbol(*id) else {
                    return Err(ErrorRecord::internal("AssertFailed", "program symbol expected"));
                };
                self.emit_main(tu, &p.body, &mut strings, &mut functions)?;
            }
            None if !tu.items.is_empty() => {
                self.emit_main(tu, &tu.items, &mut strings, &mut functions)?;
            }
            None => {}
        }

        let mut text = String::new();
        writeln!(text, "; ModuleID = '{}'", self.module_name).unwrap();
        writeln!(text, "source_filename = \"{}\"", self.module_name).unwrap();
        writeln!(text).unwrap();
        strings.emit(&mut text);
        text.push_str(&globals);
        writeln!(text).unwrap();
        text.push_str(PRELUDE);
        text.push_str(&functions);
        tracing::debug!("generated {} bytes of LLVM IR", text.len());
        Ok(IrModule {
            name: self.module_name.clone(),
            text,
        })
    }

    fn is_external(tu: &TranslationUnit, scope: ScopeId) -> bool {
        matches!(
            tu.scopes[scope].owner.map(|o| tu.symbol(o)),
            Some(Symbol::Module(Module { external: true, .. }))
        )
    }

    fn emit_static(&self, tu: &TranslationUnit, id: SymbolId, out: &mut String) -> StageResult<()> {
        let Some(var) = tu.variable(id) else {
            return Ok(());
        };
        if var.storage == Storage::Parameter {
            // Parameters are inlined at every use
            return Ok(());
        }
        let ty = llvm_type(var.ty)?;
        let name = tu.mangled_name(id);
        if Self::is_external(tu, var.parent) {
            writeln!(out, "@{} = external global {}", name, ty).unwrap();
            return Ok(());
        }
        let init = match var.init.as_ref().and_then(|e| fold(tu, e)) {
            Some(c) => constant_literal(&c)?,
            None => zero(var.ty)?,
        };
        writeln!(out, "@{} = global {} {}", name, ty, init).unwrap();
        Ok(())
    }

    fn signature(tu: &TranslationUnit, p: &Procedure) -> StageResult<(&'static str, Vec<String>)> {
        let ret = match p.return_var {
            Some(r) => llvm_type(tu.variable(r).map(|v| v.ty).unwrap_or(Type::Integer))?,
            None => "void",
        };
        let mut params = Vec::with_capacity(p.args.len());
        for arg in &p.args {
            let var = tu
                .variable(*arg)
                .ok_or_else(|| ErrorRecord::internal("AssertFailed", "dummy argument expected"))?;
            llvm_type(var.ty)?;
            params.push(format!("ptr %arg.{}", var.name));
        }
        Ok((ret, params))
    }

    fn emit_procedure(
        &self,
        tu: &TranslationUnit,
        id: SymbolId,
        strings: &mut StringPool,
        out: &mut String,
    ) -> StageResult<()> {
        let Some(p) = tu.procedure(id) else {
            return Ok(());
        };
        let name = tu.mangled_name(id);
        let (ret, params) = Self::signature(tu, p)?;
        if Self::is_external(tu, p.parent) {
            let types = vec!["ptr"; params.len()].join(", ");
            writeln!(out, "declare {} @{}({})\n", ret, name, types).unwrap();
            return Ok(());
        }

        let mut f = FunctionBuilder::new(tu, strings);
        for arg in &p.args {
            if let Some(var) = tu.variable(*arg) {
                f.slots.insert(*arg, format!("%arg.{}", var.name));
            }
        }
        for local in tu.locals(p).into_iter().chain(p.return_var) {
            let Some(var) = tu.variable(local) else { continue };
            if var.storage == Storage::Parameter {
                continue;
            }
            let ty = llvm_type(var.ty)?;
            let slot = format!("%{}.addr", var.name);
            writeln!(f.entry, "  {} = alloca {}", slot, ty).unwrap();
            if let Some(c) = var.init.as_ref().and_then(|e| fold(tu, e)) {
                writeln!(f.entry, "  store {} {}, ptr {}", ty, constant_literal(&c)?, slot).unwrap();
            }
            f.slots.insert(local, slot);
        }

        f.block(&p.body)?;
        f.branch("return");
        f.label("return");
        match p.return_var {
            Some(r) => {
                let value = f.load(r, ret);
                writeln!(f.body, "  ret {} {}", ret, value).unwrap();
            }
            None => writeln!(f.body, "  ret void").unwrap(),
        }
        writeln!(out, "define {} @{}({}) {{", ret, name, params.join(", ")).unwrap();
        f.finish(out);
        Ok(())
    }

    fn emit_main(
        &self,
        tu: &TranslationUnit,
        body: &[Stmt],
        strings: &mut StringPool,
        out: &mut String,
    ) -> StageResult<()> {
        let mut f = FunctionBuilder::new(tu, strings);
        f.block(body)?;
        f.branch("return");
        f.label("return");
        writeln!(f.body, "  ret i32 0").unwrap();
        writeln!(out, "define i32 @main() {{").unwrap();
        f.finish(out);
        Ok(())
    }
}

/// Emits the body of one function
struct FunctionBuilder<'a> {
    tu: &'a TranslationUnit,
    strings: &'a mut StringPool,
    entry: String,
    body: String,
    next_tmp: usize,
    next_label: usize,
    /// Pointer operand of every non-static variable in reach
    slots: HashMap<SymbolId, String>,
    /// (continue, break) targets of the enclosing loops
    loops: Vec<(String, String)>,
}

impl<'a> FunctionBuilder<'a> {
    fn new(tu: &'a TranslationUnit, strings: &'a mut StringPool) -> Self {
        Self {
            tu,
            strings,
            entry: String::new(),
            body: String::new(),
            next_tmp: 0,
            next_label: 0,
            slots: HashMap::new(),
            loops: Vec::new(),
        }
    }

    fn finish(self, out: &mut String) {
        writeln!(out, "entry:").unwrap();
        out.push_str(&self.entry);
        writeln!(out, "  br label %start").unwrap();
        writeln!(out, "start:").unwrap();
        out.push_str(&self.body);
        writeln!(out, "}}\n").unwrap();
    }

    fn tmp(&mut self) -> String {
        self.next_tmp += 1;
        format!("%t{}", self.next_tmp)
    }

    fn fresh_label(&mut self, prefix: &str) -> String {
        self.next_label += 1;
        format!("{}.{}", prefix, self.next_label)
    }

    fn label(&mut self, label: &str) {
        writeln!(self.body, "{}:", label).unwrap();
    }

    fn branch(&mut self, label: &str) {
        writeln!(self.body, "  br label %{}", label).unwrap();
    }

    /// Jump away and open an unreachable block for whatever follows
    fn jump(&mut self, label: &str) {
        self.branch(label);
        let dead = self.fresh_label("dead");
        self.label(&dead);
    }

    fn instr(&mut self, text: String) -> String {
        let t = self.tmp();
        writeln!(self.body, "  {} = {}", t, text).unwrap();
        t
    }

    fn slot(&self, id: SymbolId) -> String {
        self.slots
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("@{}", self.tu.mangled_name(id)))
    }

    fn load(&mut self, id: SymbolId, ty: &str) -> String {
        let ptr = self.slot(id);
        self.instr(format!("load {}, ptr {}", ty, ptr))
    }

    fn parameter(&self, id: SymbolId) -> Option<Constant> {
        let var = self.tu.variable(id)?;
        if var.storage != Storage::Parameter {
            return None;
        }
        fold(self.tu, var.init.as_ref()?)
    }

    // ==================== STATEMENTS ====================

    fn block(&mut self, body: &[Stmt]) -> StageResult<()> {
        for s in body {
            self.stmt(s)?;
        }
        Ok(())
    }

    fn stmt(&mut self, s: &Stmt) -> StageResult<()> {
        match s {
            Stmt::Assignment { target, value } => {
                let v = self.expr(value)?;
                let ty = llvm_type(value.ty)?;
                let ptr = self.slot(*target);
                writeln!(self.body, "  store {} {}, ptr {}", ty, v, ptr).unwrap();
            }
            Stmt::Print(values) => self.print(values)?,
            Stmt::SubroutineCall { sub, args } => {
                self.call(*sub, args)?;
            }
            Stmt::If { cond, body, orelse } => {
                let c = self.expr(cond)?;
                let then = self.fresh_label("then");
                let otherwise = self.fresh_label("else");
                let done = self.fresh_label("ifcont");
                writeln!(self.body, "  br i1 {}, label %{}, label %{}", c, then, otherwise).unwrap();
                self.label(&then);
                self.block(body)?;
                self.branch(&done);
                self.label(&otherwise);
                self.block(orelse)?;
                self.branch(&done);
                self.label(&done);
            }
            Stmt::DoLoop {
                var,
                start,
                end,
                step,
                body,
            } => self.do_loop(*var, start, end, step.as_ref(), body)?,
            Stmt::WhileLoop { cond, body } => {
                let head = self.fresh_label("loop.head");
                let inner = self.fresh_label("loop.body");
                let done = self.fresh_label("loop.end");
                self.branch(&head);
                self.label(&head);
                let c = self.expr(cond)?;
                writeln!(self.body, "  br i1 {}, label %{}, label %{}", c, inner, done).unwrap();
                self.label(&inner);
                self.loops.push((head.clone(), done.clone()));
                self.block(body)?;
                self.loops.pop();
                self.branch(&head);
                self.label(&done);
            }
            Stmt::Exit | Stmt::Cycle => {
                let Some((next, done)) = self.loops.last().cloned() else {
                    return Err(ErrorRecord::internal("AssertFailed", "loop control outside a loop"));
                };
                self.jump(if matches!(s, Stmt::Exit) { &done } else { &next });
            }
            Stmt::Return => self.jump("return"),
            Stmt::Expr(e) => {
                if !matches!(e.ty, Type::Character { .. }) {
                    self.expr(e)?;
                }
            }
        }
        Ok(())
    }

    fn do_loop(
        &mut self,
        var: SymbolId,
        start: &Expr,
        end: &Expr,
        step: Option<&Expr>,
        body: &[Stmt],
    ) -> StageResult<()> {
        let ptr = self.slot(var);
        let first = self.expr(start)?;
        writeln!(self.body, "  store i64 {}, ptr {}", first, ptr).unwrap();
        let last = self.expr(end)?;
        let (increment, sign) = match step {
            Some(step) => (
                self.expr(step)?,
                match fold(self.tu, step) {
                    Some(Constant::Integer(n)) => Some(n > 0),
                    _ => None,
                },
            ),
            None => ("1".to_string(), Some(true)),
        };

        let head = self.fresh_label("do.head");
        let inner = self.fresh_label("do.body");
        let latch = self.fresh_label("do.latch");
        let done = self.fresh_label("do.end");
        self.branch(&head);
        self.label(&head);
        let current = self.instr(format!("load i64, ptr {}", ptr));
        let cond = match sign {
            Some(true) => self.instr(format!("icmp sle i64 {}, {}", current, last)),
            Some(false) => self.instr(format!("icmp sge i64 {}, {}", current, last)),
            None => {
                let up = self.instr(format!("icmp sle i64 {}, {}", current, last));
                let down = self.instr(format!("icmp sge i64 {}, {}", current, last));
                let positive = self.instr(format!("icmp sgt i64 {}, 0", increment));
                self.instr(format!("select i1 {}, i1 {}, i1 {}", positive, up, down))
            }
        };
        writeln!(self.body, "  br i1 {}, label %{}, label %{}", cond, inner, done).unwrap();
        self.label(&inner);
        self.loops.push((latch.clone(), done.clone()));
        self.block(body)?;
        self.loops.pop();
        self.branch(&latch);
        self.label(&latch);
        let current = self.instr(format!("load i64, ptr {}", ptr));
        let next = self.instr(format!("add i64 {}, {}", current, increment));
        writeln!(self.body, "  store i64 {}, ptr {}", next, ptr).unwrap();
        self.branch(&head);
        self.label(&done);
        Ok(())
    }

    /// `printf` with one conversion per item, separated by spaces
    fn print(&mut self, values: &[Expr]) -> StageResult<()> {
        let mut format = String::new();
        let mut args = Vec::new();
        for (i, v) in values.iter().enumerate() {
            if i > 0 {
                format.push(' ');
            }
            if let Type::Character { .. } = v.ty {
                let Some(Constant::Str(s)) = fold(self.tu, v) else {
                    return codegen("Character variables are not supported by the LLVM backend");
                };
                format.push_str("%s");
                let g = self.strings.intern(&s);
                args.push(format!("ptr {}", g));
                continue;
            }
            let value = self.expr(v)?;
            match v.ty {
                Type::Integer => {
                    format.push_str("%lld");
                    args.push(format!("i64 {}", value));
                }
                Type::Real => {
                    format.push_str("%f");
                    args.push(format!("double {}", value));
                }
                _ => {
                    let t = self.strings.intern("T");
                    let f = self.strings.intern("F");
                    let chosen = self.instr(format!("select i1 {}, ptr {}, ptr {}", value, t, f));
                    format.push_str("%s");
                    args.push(format!("ptr {}", chosen));
                }
            }
        }
        format.push('\n');
        let fmt = self.strings.intern(&format);
        let mut call = format!("call i32 (ptr, ...) @printf(ptr {}", fmt);
        for a in args {
            call.push_str(", ");
            call.push_str(&a);
        }
        call.push(')');
        self.instr(call);
        Ok(())
    }

    /// Returns the result operand for functions
    fn call(&mut self, id: SymbolId, args: &[Expr]) -> StageResult<Option<String>> {
        let tu = self.tu;
        let p = tu
            .procedure(id)
            .ok_or_else(|| ErrorRecord::internal("AssertFailed", "procedure symbol expected"))?;
        let mut operands = Vec::with_capacity(args.len());
        for a in args {
            let ptr = match &a.kind {
                ExprKind::Var(v) if self.parameter(*v).is_none() => self.slot(*v),
                _ => {
                    let value = self.expr(a)?;
                    let ty = llvm_type(a.ty)?;
                    let tmp = self.tmp();
                    writeln!(self.entry, "  {} = alloca {}", tmp, ty).unwrap();
                    writeln!(self.body, "  store {} {}, ptr {}", ty, value, tmp).unwrap();
                    tmp
                }
            };
            operands.push(format!("ptr {}", ptr));
        }
        let name = tu.mangled_name(id);
        match p.return_var {
            Some(r) => {
                let ty = llvm_type(tu.variable(r).map(|v| v.ty).unwrap_or(Type::Integer))?;
                let t = self.instr(format!("call {} @{}({})", ty, name, operands.join(", ")));
                Ok(Some(t))
            }
            None => {
                writeln!(self.body, "  call void @{}({})", name, operands.join(", ")).unwrap();
                Ok(None)
            }
        }
    }

    // ==================== EXPRESSIONS ====================

    fn expr(&mut self, e: &Expr) -> StageResult<String> {
        Ok(match &e.kind {
            ExprKind::IntegerConstant(n) => n.to_string(),
            ExprKind::RealConstant(x) => real_literal(*x),
            ExprKind::LogicalConstant(b) => b.to_string(),
            ExprKind::StringConstant(_) => {
                return codegen("Character expressions are only supported in print statements");
            }
            ExprKind::Var(id) => match self.parameter(*id) {
                Some(c) => constant_literal(&c)?,
                None => {
                    let ty = llvm_type(e.ty)?;
                    self.load(*id, ty)
                }
            },
            ExprKind::FunctionCall { func, args } => match self.call(*func, args)? {
                Some(value) => value,
                None => return Err(ErrorRecord::internal("AssertFailed", "subroutine used as a value")),
            },
            ExprKind::Intrinsic { func, args } => self.intrinsic(*func, args, e.ty)?,
            ExprKind::BinOp { op, left, right } => {
                let l = self.expr(left)?;
                let r = self.expr(right)?;
                match (e.ty, op) {
                    (Type::Integer, BinOp::Pow) => {
                        self.instr(format!("call i64 @_fortc_ipow(i64 {}, i64 {})", l, r))
                    }
                    (Type::Real, BinOp::Pow) => {
                        self.instr(format!("call double @llvm.pow.f64(double {}, double {})", l, r))
                    }
                    (Type::Integer, _) => {
                        let instr = match op {
                            BinOp::Add => "add",
                            BinOp::Sub => "sub",
                            BinOp::Mul => "mul",
                            _ => "sdiv",
                        };
                        self.instr(format!("{} i64 {}, {}", instr, l, r))
                    }
                    _ => {
                        let instr = match op {
                            BinOp::Add => "fadd",
                            BinOp::Sub => "fsub",
                            BinOp::Mul => "fmul",
                            _ => "fdiv",
                        };
                        self.instr(format!("{} double {}, {}", instr, l, r))
                    }
                }
            }
            ExprKind::UnaryMinus(arg) => {
                let v = self.expr(arg)?;
                match e.ty {
                    Type::Real => self.instr(format!("fneg double {}", v)),
                    _ => self.instr(format!("sub i64 0, {}", v)),
                }
            }
            ExprKind::Not(arg) => {
                let v = self.expr(arg)?;
                self.instr(format!("xor i1 {}, true", v))
            }
            ExprKind::Compare { op, left, right } => {
                let l = self.expr(left)?;
                let r = self.expr(right)?;
                if left.ty == Type::Real {
                    let pred = match op {
                        CmpOp::Eq => "oeq",
                        CmpOp::NotEq => "one",
                        CmpOp::Lt => "olt",
                        CmpOp::LtE => "ole",
                        CmpOp::Gt => "ogt",
                        CmpOp::GtE => "oge",
                    };
                    self.instr(format!("fcmp {} double {}, {}", pred, l, r))
                } else {
                    let pred = match op {
                        CmpOp::Eq => "eq",
                        CmpOp::NotEq => "ne",
                        CmpOp::Lt => "slt",
                        CmpOp::LtE => "sle",
                        CmpOp::Gt => "sgt",
                        CmpOp::GtE => "sge",
                    };
                    let ty = llvm_type(left.ty)?;
                    self.instr(format!("icmp {} {} {}, {}", pred, ty, l, r))
                }
            }
            ExprKind::BoolOp { op, left, right } => {
                let l = self.expr(left)?;
                let r = self.expr(right)?;
                let instr = match op {
                    BoolOp::And => "and",
                    BoolOp::Or => "or",
                };
                self.instr(format!("{} i1 {}, {}", instr, l, r))
            }
            ExprKind::Cast { kind, arg } => {
                let v = self.expr(arg)?;
                match kind {
                    CastKind::IntegerToReal => self.instr(format!("sitofp i64 {} to double", v)),
                    CastKind::RealToInteger => self.instr(format!("fptosi double {} to i64", v)),
                }
            }
        })
    }

    fn intrinsic(&mut self, func: Intrinsic, args: &[Expr], ty: Type) -> StageResult<String> {
        let mut values = Vec::with_capacity(args.len());
        for a in args {
            values.push(self.expr(a)?);
        }
        let real = ty == Type::Real;
        let first = values.first().cloned().unwrap_or_default();
        Ok(match func {
            Intrinsic::Abs if real => {
                self.instr(format!("call double @llvm.fabs.f64(double {})", first))
            }
            Intrinsic::Abs => {
                let negated = self.instr(format!("sub i64 0, {}", first));
                let negative = self.instr(format!("icmp slt i64 {}, 0", first));
                self.instr(format!("select i1 {}, i64 {}, i64 {}", negative, negated, first))
            }
            Intrinsic::Sqrt | Intrinsic::Exp | Intrinsic::Sin | Intrinsic::Cos => {
                self.instr(format!("call double @llvm.{}.f64(double {})", func.name(), first))
            }
            Intrinsic::Mod => {
                let second = values.get(1).cloned().unwrap_or_default();
                if real {
                    self.instr(format!("frem double {}, {}", first, second))
                } else {
                    self.instr(format!("srem i64 {}, {}", first, second))
                }
            }
            Intrinsic::Min | Intrinsic::Max => {
                let is_max = func == Intrinsic::Max;
                let mut acc = first;
                for v in values.into_iter().skip(1) {
                    acc = if real {
                        let f = if is_max { "maxnum" } else { "minnum" };
                        self.instr(format!("call double @llvm.{}.f64(double {}, double {})", f, acc, v))
                    } else {
                        let pred = if is_max { "sgt" } else { "slt" };
                        let keep = self.instr(format!("icmp {} i64 {}, {}", pred, acc, v));
                        self.instr(format!("select i1 {}, i64 {}, i64 {}", keep, acc, v))
                    };
                }
                acc
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn ir(src: &str) -> StageResult<IrModule> {
        let tokens = lex(src)?;
        let tu = build(&parse(&tokens, src)?)?;
        LlvmCodegen::new("test").generate(&tu)
    }

    #[test]
    fn test_print_program() {
        let module = ir("program p\nprint *, 1 + 2\nend program\n").unwrap();
        let text = module.print_to_string();
        assert!(text.contains("define i32 @main()"));
        assert!(text.contains("add i64 1, 2"));
        assert!(text.contains("c\"%lld\\0A\\00\""));
    }

    #[test]
    fn test_statics_are_mangled() {
        let text = ir("module m\ninteger :: counter = 3\nend module\n")
            .unwrap()
            .print_to_string()
            .to_string();
        assert!(text.contains("@m__counter = global i64 3"));
        assert!(!text.contains("@main"));
    }

    #[test]
    fn test_arguments_by_reference() {
        let src = "subroutine inc(n)\ninteger, intent(inout) :: n\nn = n + 1\nend subroutine\n";
        let text = ir(src).unwrap().print_to_string().to_string();
        assert!(text.contains("define void @inc(ptr %arg.n)"));
        assert!(text.contains("load i64, ptr %arg.n"));
    }

    #[test]
    fn test_character_variable_is_codegen_error() {
        let err = ir("program p\ncharacter(len=5) :: s\nend program\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::CodeGen);
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_global_statements_with_program() {
        let err = ir("program p\nend program\nprint *, 1\n").unwrap_err();
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_real_literals_are_exact() {
        assert_eq!(real_literal(1.0), "0x3FF0000000000000");
    }
}
