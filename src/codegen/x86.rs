//! Native x86-64 backend
//!
//! Emits GNU assembler source in Intel syntax for a freestanding Linux
//! executable: `_start` runs the program body and leaves through the
//! `exit` system call, and output goes straight to `write(1, ...)`. Only
//! integer and logical scalars are handled. Expressions are evaluated into
//! `rax` using the machine stack for intermediate operands.

use std::fmt::Write;

use crate::asr::fold::{Constant, fold};
use crate::asr::*;
use crate::error::{ErrorRecord, StageResult};

const RUNTIME: &str = "
_fortc_write:
    mov rax, 1
    mov rdi, 1
    syscall
    ret

_fortc_print_int:
    push rbx
    lea rsi, [rip + _fortc_buf + 32]
    mov rbx, rax
    mov rcx, 10
    xor r8, r8
    test rax, rax
    jns 1f
    neg rax
1:
    xor edx, edx
    div rcx
    add dl, 48
    dec rsi
    mov byte ptr [rsi], dl
    inc r8
    test rax, rax
    jnz 1b
    test rbx, rbx
    jns 2f
    dec rsi
    mov byte ptr [rsi], 45
    inc r8
2:
    mov rdx, r8
    call _fortc_write
    pop rbx
    ret

_fortc_ipow:
    test rcx, rcx
    js 3f
    mov rdx, rax
    mov rax, 1
1:
    test rcx, rcx
    jz 2f
    imul rax, rdx
    dec rcx
    jmp 1b
2:
    ret
3:
    cmp rax, 1
    je 2b
    cmp rax, -1
    jne 4f
    test rcx, 1
    jnz 2b
    mov rax, 1
    ret
4:
    xor eax, eax
    ret
";

fn unsupported<T>(what: &str) -> StageResult<T> {
    Err(ErrorRecord::codegen(format!(
        "{} are not supported by the x86 backend",
        what
    )))
}

/// x86-64 assembly generator
pub struct X86Codegen {
    text: String,
    strings: Vec<String>,
    next_label: usize,
    hidden: usize,
    /// (continue, break) targets of the enclosing loops
    loops: Vec<(String, String)>,
}

impl Default for X86Codegen {
    fn default() -> Self {
        Self::new()
    }
}

impl X86Codegen {
    pub fn new() -> Self {
        Self {
            text: String::new(),
            strings: Vec::new(),
            next_label: 0,
            hidden: 0,
            loops: Vec::new(),
        }
    }

    /// Translate the unit to assembler source
    pub fn generate(mut self, tu: &TranslationUnit) -> StageResult<String> {
        if !tu.all_procedures().is_empty() {
            return unsupported("Functions and subroutines");
        }
        let programs = tu.programs();
        if programs.len() > 1 {
            return Err(ErrorRecord::codegen("Only one program unit is allowed per file"));
        }
        if !programs.is_empty() && !tu.items.is_empty() {
            return Err(ErrorRecord::codegen(
                "Global statements cannot be compiled together with a program unit",
            ));
        }
        let statics = tu.static_variables();
        for id in &statics {
            if let Some(v) = tu.variable(*id) {
                match v.ty {
                    Type::Real => return unsupported("Real variables"),
                    Type::Character { .. } => return unsupported("Character variables"),
                    _ => {}
                }
            }
        }

        let body: &[Stmt] = match programs.first().map(|id| tu.symbol(*id)) {
            Some(Symbol::Program(p)) => &p.body,
            _ => &tu.items,
        };
        self.block(tu, body)?;

        let mut out = String::new();
        writeln!(out, "    .intel_syntax noprefix").unwrap();
        writeln!(out, "    .text").unwrap();
        writeln!(out, "    .globl _start").unwrap();
        writeln!(out, "_start:").unwrap();
        out.push_str(&self.text);
        writeln!(out, "    mov rax, 60").unwrap();
        writeln!(out, "    xor edi, edi").unwrap();
        writeln!(out, "    syscall").unwrap();
        out.push_str(RUNTIME);

        writeln!(out, "\n    .data").unwrap();
        for id in &statics {
            let Some(v) = tu.variable(*id) else { continue };
            if v.storage == Storage::Parameter {
                continue;
            }
            let init = match v.init.as_ref().and_then(|e| fold(tu, e)) {
                Some(Constant::Integer(n)) => n,
                Some(Constant::Logical(b)) => b as i64,
                _ => 0,
            };
            writeln!(out, "v_{}:\n    .quad {}", tu.mangled_name(*id), init).unwrap();
        }
        for n in 0..self.hidden {
            writeln!(out, "_fortc_hidden{}:\n    .quad 0", n).unwrap();
        }

        writeln!(out, "\n    .section .rodata").unwrap();
        writeln!(out, "_fortc_space:\n    .ascii \" \"").unwrap();
        writeln!(out, "_fortc_newline:\n    .ascii \"\\n\"").unwrap();
        writeln!(out, "_fortc_true:\n    .ascii \"T\"").unwrap();
        writeln!(out, "_fortc_false:\n    .ascii \"F\"").unwrap();
        for (i, s) in self.strings.iter().enumerate() {
            let bytes: Vec<String> = s.bytes().map(|b| b.to_string()).collect();
            if bytes.is_empty() {
                writeln!(out, "_fortc_str{}:", i).unwrap();
            } else {
                writeln!(out, "_fortc_str{}:\n    .byte {}", i, bytes.join(", ")).unwrap();
            }
        }

        writeln!(out, "\n    .bss").unwrap();
        writeln!(out, "_fortc_buf:\n    .skip 32").unwrap();
        writeln!(out, "    .section .note.GNU-stack,\"\",@progbits").unwrap();
        tracing::debug!("generated {} bytes of x86 assembly", out.len());
        Ok(out)
    }

    fn emit(&mut self, instr: &str) {
        writeln!(self.text, "    {}", instr).unwrap();
    }

    fn fresh_label(&mut self, prefix: &str) -> String {
        self.next_label += 1;
        format!(".L{}{}", prefix, self.next_label)
    }

    fn label(&mut self, label: &str) {
        writeln!(self.text, "{}:", label).unwrap();
    }

    fn hidden_slot(&mut self) -> String {
        let slot = format!("[rip + _fortc_hidden{}]", self.hidden);
        self.hidden += 1;
        slot
    }

    fn slot(tu: &TranslationUnit, id: SymbolId) -> String {
        format!("[rip + v_{}]", tu.mangled_name(id))
    }

    fn block(&mut self, tu: &TranslationUnit, body: &[Stmt]) -> StageResult<()> {
        for s in body {
            self.stmt(tu, s)?;
        }
        Ok(())
    }

    fn stmt(&mut self, tu: &TranslationUnit, s: &Stmt) -> StageResult<()> {
        match s {
            Stmt::Assignment { target, value } => {
                self.expr(tu, value)?;
                self.emit(&format!("mov qword ptr {}, rax", Self::slot(tu, *target)));
            }
            Stmt::Print(values) => {
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        self.write_static("_fortc_space", 1);
                    }
                    self.print_item(tu, v)?;
                }
                self.write_static("_fortc_newline", 1);
            }
            Stmt::SubroutineCall { .. } => return unsupported("Functions and subroutines"),
            Stmt::If { cond, body, orelse } => {
                let otherwise = self.fresh_label("else");
                let done = self.fresh_label("endif");
                self.expr(tu, cond)?;
                self.emit("test rax, rax");
                self.emit(&format!("jz {}", otherwise));
                self.block(tu, body)?;
                self.emit(&format!("jmp {}", done));
                self.label(&otherwise);
                self.block(tu, orelse)?;
                self.label(&done);
            }
            Stmt::DoLoop {
                var,
                start,
                end,
                step,
                body,
            } => {
                let counter = Self::slot(tu, *var);
                let last = self.hidden_slot();
                let increment = self.hidden_slot();
                self.expr(tu, start)?;
                self.emit(&format!("mov qword ptr {}, rax", counter));
                self.expr(tu, end)?;
                self.emit(&format!("mov qword ptr {}, rax", last));
                match step {
                    Some(step) => self.expr(tu, step)?,
                    None => self.emit("mov rax, 1"),
                }
                self.emit(&format!("mov qword ptr {}, rax", increment));

                let head = self.fresh_label("do");
                let down = self.fresh_label("down");
                let inner = self.fresh_label("body");
                let latch = self.fresh_label("latch");
                let done = self.fresh_label("enddo");
                self.label(&head);
                self.emit(&format!("mov rax, qword ptr {}", counter));
                self.emit(&format!("mov rcx, qword ptr {}", last));
                self.emit(&format!("cmp qword ptr {}, 0", increment));
                self.emit(&format!("jl {}", down));
                self.emit("cmp rax, rcx");
                self.emit(&format!("jg {}", done));
                self.emit(&format!("jmp {}", inner));
                self.label(&down);
                self.emit("cmp rax, rcx");
                self.emit(&format!("jl {}", done));
                self.label(&inner);
                self.loops.push((latch.clone(), done.clone()));
                self.block(tu, body)?;
                self.loops.pop();
                self.label(&latch);
                self.emit(&format!("mov rax, qword ptr {}", increment));
                self.emit(&format!("add qword ptr {}, rax", counter));
                self.emit(&format!("jmp {}", head));
                self.label(&done);
            }
            Stmt::WhileLoop { cond, body } => {
                let head = self.fresh_label("while");
                let done = self.fresh_label("endwhile");
                self.label(&head);
                self.expr(tu, cond)?;
                self.emit("test rax, rax");
                self.emit(&format!("jz {}", done));
                self.loops.push((head.clone(), done.clone()));
                self.block(tu, body)?;
                self.loops.pop();
                self.emit(&format!("jmp {}", head));
                self.label(&done);
            }
            Stmt::Exit | Stmt::Cycle => {
                let Some((next, done)) = self.loops.last().cloned() else {
                    return Err(ErrorRecord::internal("AssertFailed", "loop control outside a loop"));
                };
                let target = if matches!(s, Stmt::Exit) { done } else { next };
                self.emit(&format!("jmp {}", target));
            }
            Stmt::Return => return unsupported("Functions and subroutines"),
            Stmt::Expr(e) => {
                if !matches!(e.ty, Type::Character { .. }) {
                    self.expr(tu, e)?;
                }
            }
        }
        Ok(())
    }

    fn write_static(&mut self, label: &str, len: usize) {
        self.emit(&format!("lea rsi, [rip + {}]", label));
        self.emit(&format!("mov rdx, {}", len));
        self.emit("call _fortc_write");
    }

    fn print_item(&mut self, tu: &TranslationUnit, v: &Expr) -> StageResult<()> {
        match v.ty {
            Type::Integer => {
                self.expr(tu, v)?;
                self.emit("call _fortc_print_int");
            }
            Type::Logical => {
                let f = self.fresh_label("false");
                let done = self.fresh_label("printed");
                self.expr(tu, v)?;
                self.emit("test rax, rax");
                self.emit(&format!("jz {}", f));
                self.write_static("_fortc_true", 1);
                self.emit(&format!("jmp {}", done));
                self.label(&f);
                self.write_static("_fortc_false", 1);
                self.label(&done);
            }
            Type::Character { .. } => {
                let Some(Constant::Str(s)) = fold(tu, v) else {
                    return unsupported("Character variables");
                };
                let label = format!("_fortc_str{}", self.strings.len());
                let len = s.len();
                self.strings.push(s);
                self.write_static(&label, len);
            }
            Type::Real => return unsupported("Real values"),
        }
        Ok(())
    }

    /// Evaluate `e` into `rax`
    fn expr(&mut self, tu: &TranslationUnit, e: &Expr) -> StageResult<()> {
        if e.ty == Type::Real {
            return unsupported("Real values");
        }
        match &e.kind {
            ExprKind::IntegerConstant(n) => self.emit(&format!("mov rax, {}", n)),
            ExprKind::LogicalConstant(b) => self.emit(&format!("mov rax, {}", *b as i64)),
            ExprKind::RealConstant(_) => return unsupported("Real values"),
            ExprKind::StringConstant(_) => return unsupported("Character expressions"),
            ExprKind::Var(id) => match fold(tu, e) {
                Some(Constant::Integer(n)) => self.emit(&format!("mov rax, {}", n)),
                Some(Constant::Logical(b)) => self.emit(&format!("mov rax, {}", b as i64)),
                _ => self.emit(&format!("mov rax, qword ptr {}", Self::slot(tu, *id))),
            },
            ExprKind::FunctionCall { .. } => return unsupported("Functions and subroutines"),
            ExprKind::Intrinsic { func, args } => self.intrinsic(tu, *func, args)?,
            ExprKind::BinOp { op, left, right } => {
                self.operands(tu, left, right)?;
                match op {
                    BinOp::Add => self.emit("add rax, rcx"),
                    BinOp::Sub => self.emit("sub rax, rcx"),
                    BinOp::Mul => self.emit("imul rax, rcx"),
                    BinOp::Div => {
                        self.emit("cqo");
                        self.emit("idiv rcx");
                    }
                    BinOp::Pow => self.emit("call _fortc_ipow"),
                }
            }
            ExprKind::UnaryMinus(arg) => {
                self.expr(tu, arg)?;
                self.emit("neg rax");
            }
            ExprKind::Not(arg) => {
                self.expr(tu, arg)?;
                self.emit("xor rax, 1");
            }
            ExprKind::Compare { op, left, right } => {
                self.operands(tu, left, right)?;
                let cc = match op {
                    CmpOp::Eq => "e",
                    CmpOp::NotEq => "ne",
                    CmpOp::Lt => "l",
                    CmpOp::LtE => "le",
                    CmpOp::Gt => "g",
                    CmpOp::GtE => "ge",
                };
                self.emit("cmp rax, rcx");
                self.emit(&format!("set{} al", cc));
                self.emit("movzx rax, al");
            }
            ExprKind::BoolOp { op, left, right } => {
                self.operands(tu, left, right)?;
                match op {
                    BoolOp::And => self.emit("and rax, rcx"),
                    BoolOp::Or => self.emit("or rax, rcx"),
                }
            }
            ExprKind::Cast { .. } => return unsupported("Real values"),
        }
        Ok(())
    }

    /// Left operand in `rax`, right in `rcx`
    fn operands(&mut self, tu: &TranslationUnit, left: &Expr, right: &Expr) -> StageResult<()> {
        self.expr(tu, left)?;
        self.emit("push rax");
        self.expr(tu, right)?;
        self.emit("mov rcx, rax");
        self.emit("pop rax");
        Ok(())
    }

    fn intrinsic(&mut self, tu: &TranslationUnit, func: Intrinsic, args: &[Expr]) -> StageResult<()> {
        match (func, args) {
            (Intrinsic::Abs, [arg]) => {
                self.expr(tu, arg)?;
                self.emit("mov rcx, rax");
                self.emit("neg rax");
                self.emit("cmovs rax, rcx");
            }
            (Intrinsic::Mod, [a, b]) => {
                self.operands(tu, a, b)?;
                self.emit("cqo");
                self.emit("idiv rcx");
                self.emit("mov rax, rdx");
            }
            (Intrinsic::Min | Intrinsic::Max, [first, rest @ ..]) => {
                let keep = if func == Intrinsic::Min { "cmovg" } else { "cmovl" };
                self.expr(tu, first)?;
                for arg in rest {
                    self.emit("push rax");
                    self.expr(tu, arg)?;
                    self.emit("mov rcx, rax");
                    self.emit("pop rax");
                    self.emit("cmp rax, rcx");
                    self.emit(&format!("{} rax, rcx", keep));
                }
            }
            _ => return unsupported("Real values"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn asm(src: &str) -> StageResult<String> {
        let tokens = lex(src)?;
        let tu = build(&parse(&tokens, src)?)?;
        X86Codegen::new().generate(&tu)
    }

    #[test]
    fn test_freestanding_entry() {
        let out = asm("program p\ninteger :: x\nx = 6 * 7\nprint *, x\nend program\n").unwrap();
        assert!(out.contains(".globl _start"));
        assert!(out.contains("imul rax, rcx"));
        assert!(out.contains("v_p__x:"));
        assert!(out.contains("call _fortc_print_int"));
    }

    #[test]
    fn test_reals_rejected() {
        let err = asm("program p\nreal :: x\nx = 1.5\nend program\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::CodeGen);
    }

    #[test]
    fn test_procedures_rejected() {
        let err = asm("subroutine s()\nend subroutine\n").unwrap_err();
        assert_eq!(err.exit_code(), 5);
    }
}
