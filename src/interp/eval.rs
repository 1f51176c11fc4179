//! Tree-walking executor over the ASR
//!
//! Static variables (globals, module and program variables) live in one
//! map for the lifetime of the machine; procedure locals live in a stack
//! of frames. Arguments are copied in on call and copied back out to
//! variable actuals on return, unless the dummy is `intent(in)`.

use std::collections::HashMap;

use crate::asr::fold::{Constant, compare_holds, fold, fold_intrinsic, int_binop, real_binop};
use crate::asr::*;
use crate::error::{ErrorRecord, StageResult};

use super::value::Value;

const MAX_CALL_DEPTH: usize = 1000;

/// Non-local control flow, carried on the error channel
enum Signal {
    Exit,
    Cycle,
    Return,
    Fault(ErrorRecord),
}

impl From<ErrorRecord> for Signal {
    fn from(err: ErrorRecord) -> Self {
        Signal::Fault(err)
    }
}

type Exec<T> = Result<T, Signal>;

fn fault<T>(message: impl Into<String>) -> Exec<T> {
    Err(Signal::Fault(ErrorRecord::runtime(message)))
}

fn misplaced(signal: Signal) -> ErrorRecord {
    match signal {
        Signal::Fault(err) => err,
        Signal::Exit | Signal::Cycle => {
            ErrorRecord::internal("AssertFailed", "loop control escaped its loop")
        }
        Signal::Return => ErrorRecord::internal("AssertFailed", "return outside a procedure"),
    }
}

/// Saved static storage
#[derive(Debug, Clone)]
pub struct Snapshot {
    statics: HashMap<SymbolId, Value>,
}

/// Execution context; lives as long as an interactive session
#[derive(Default)]
pub struct Machine {
    statics: HashMap<SymbolId, Value>,
    frames: Vec<HashMap<SymbolId, Value>>,
    /// `None` prints straight to stdout
    captured: Option<Vec<String>>,
}

impl Machine {
    /// A machine whose `print` output goes to stdout
    pub fn new() -> Self {
        Self::default()
    }

    /// A machine that buffers `print` output (for testing)
    pub fn capturing() -> Self {
        Self {
            captured: Some(Vec::new()),
            ..Self::default()
        }
    }

    pub fn take_output(&mut self) -> Vec<String> {
        self.captured.as_mut().map(std::mem::take).unwrap_or_default()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            statics: self.statics.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: Snapshot) {
        self.statics = snapshot.statics;
        self.frames.clear();
    }

    /// Current value of a static variable
    pub fn value_of(&self, tu: &TranslationUnit, id: SymbolId) -> Option<Value> {
        self.statics
            .get(&id)
            .cloned()
            .or_else(|| tu.variable(id).map(|v| initial_value(tu, v)))
    }

    /// Call a procedure without arguments; returns the function result
    pub fn call(&mut self, tu: &TranslationUnit, id: SymbolId) -> StageResult<Option<Value>> {
        self.frames.clear();
        self.call_procedure(tu, id, &[]).map_err(misplaced)
    }

    /// Run top-level statements; returns the value of the last expression
    pub fn run_items(&mut self, tu: &TranslationUnit, items: &[Stmt]) -> StageResult<Option<Value>> {
        let mut last = None;
        for item in items {
            match item {
                Stmt::Expr(e) => last = Some(self.expr(tu, e).map_err(misplaced)?),
                s => {
                    self.stmt(tu, s).map_err(misplaced)?;
                    last = None;
                }
            }
        }
        Ok(last)
    }

    pub fn run_program(&mut self, tu: &TranslationUnit, id: SymbolId) -> StageResult<()> {
        let Symbol::Program(p) = tu.symbol(id) else {
            return Err(ErrorRecord::internal("AssertFailed", "program symbol expected"));
        };
        self.block(tu, &p.body).map_err(misplaced)
    }

    fn emit_line(&mut self, line: String) {
        match &mut self.captured {
            Some(lines) => lines.push(line),
            None => println!("{}", line),
        }
    }

    // ==================== STORAGE ====================

    fn is_local(tu: &TranslationUnit, var: &Variable) -> bool {
        matches!(
            tu.scopes[var.parent].owner.map(|o| tu.symbol(o)),
            Some(Symbol::Procedure(_))
        )
    }

    fn load(&mut self, tu: &TranslationUnit, id: SymbolId) -> Exec<Value> {
        let var = tu
            .variable(id)
            .ok_or_else(|| ErrorRecord::internal("AssertFailed", "variable expected"))?;
        if var.storage == Storage::Parameter {
            return Ok(initial_value(tu, var));
        }
        if Self::is_local(tu, var) {
            let frame = self
                .frames
                .last()
                .ok_or_else(|| ErrorRecord::internal("AssertFailed", "local read without a frame"))?;
            return Ok(frame
                .get(&id)
                .cloned()
                .unwrap_or_else(|| Value::default_for(var.ty)));
        }
        Ok(self
            .statics
            .entry(id)
            .or_insert_with(|| initial_value(tu, var))
            .clone())
    }

    fn store(&mut self, tu: &TranslationUnit, id: SymbolId, value: Value) -> Exec<()> {
        let var = tu
            .variable(id)
            .ok_or_else(|| ErrorRecord::internal("AssertFailed", "variable expected"))?;
        if Self::is_local(tu, var) {
            let frame = self
                .frames
                .last_mut()
                .ok_or_else(|| ErrorRecord::internal("AssertFailed", "local write without a frame"))?;
            frame.insert(id, value);
        } else {
            self.statics.insert(id, value);
        }
        Ok(())
    }

    // ==================== CALLS ====================

    fn call_procedure(&mut self, tu: &TranslationUnit, id: SymbolId, actuals: &[Expr]) -> Exec<Option<Value>> {
        let p = tu
            .procedure(id)
            .ok_or_else(|| ErrorRecord::internal("AssertFailed", "procedure symbol expected"))?;
        if self.frames.len() >= MAX_CALL_DEPTH {
            return fault(format!("Call depth limit exceeded in '{}'", p.name));
        }
        let external = matches!(
            tu.scopes[p.parent].owner.map(|o| tu.symbol(o)),
            Some(Symbol::Module(Module { external: true, .. }))
        );
        if external {
            return fault(format!(
                "'{}' comes from a module file and has no body to execute",
                p.name
            ));
        }

        let mut frame = HashMap::new();
        for (dummy, actual) in p.args.iter().zip(actuals) {
            frame.insert(*dummy, self.expr(tu, actual)?);
        }
        for local in tu.locals(p).into_iter().chain(p.return_var) {
            if let Some(var) = tu.variable(local) {
                frame.insert(local, initial_value(tu, var));
            }
        }

        self.frames.push(frame);
        let result = self.block(tu, &p.body);
        let frame = self.frames.pop().unwrap_or_default();
        match result {
            Ok(()) | Err(Signal::Return) => {}
            Err(other) => return Err(other),
        }

        for (dummy, actual) in p.args.iter().zip(actuals) {
            let writable = tu.variable(*dummy).is_some_and(|v| v.intent != VarIntent::In);
            if let (true, ExprKind::Var(target)) = (writable, &actual.kind) {
                let is_parameter = tu
                    .variable(*target)
                    .is_some_and(|v| v.storage == Storage::Parameter);
                if !is_parameter {
                    if let Some(value) = frame.get(dummy) {
                        self.store(tu, *target, value.clone())?;
                    }
                }
            }
        }
        Ok(p.return_var.and_then(|r| frame.get(&r).cloned()))
    }

    // ==================== STATEMENTS ====================

    fn block(&mut self, tu: &TranslationUnit, body: &[Stmt]) -> Exec<()> {
        for s in body {
            self.stmt(tu, s)?;
        }
        Ok(())
    }

    /// Run a loop body; `Ok(false)` means the loop was exited
    fn iteration(&mut self, tu: &TranslationUnit, body: &[Stmt]) -> Exec<bool> {
        match self.block(tu, body) {
            Ok(()) | Err(Signal::Cycle) => Ok(true),
            Err(Signal::Exit) => Ok(false),
            Err(other) => Err(other),
        }
    }

    fn stmt(&mut self, tu: &TranslationUnit, s: &Stmt) -> Exec<()> {
        match s {
            Stmt::Assignment { target, value } => {
                let v = self.expr(tu, value)?;
                self.store(tu, *target, v)
            }
            Stmt::Print(values) => {
                let mut items = Vec::with_capacity(values.len());
                for v in values {
                    items.push(self.expr(tu, v)?.print_item());
                }
                self.emit_line(items.join(" "));
                Ok(())
            }
            Stmt::SubroutineCall { sub, args } => {
                self.call_procedure(tu, *sub, args)?;
                Ok(())
            }
            Stmt::If { cond, body, orelse } => {
                if self.condition(tu, cond)? {
                    self.block(tu, body)
                } else {
                    self.block(tu, orelse)
                }
            }
            Stmt::DoLoop {
                var,
                start,
                end,
                step,
                body,
            } => {
                let first = self.integer(tu, start)?;
                let last = self.integer(tu, end)?;
                let increment = match step {
                    Some(s) => self.integer(tu, s)?,
                    None => 1,
                };
                if increment == 0 {
                    return fault("Step of a do loop is zero");
                }
                let trips = last
                    .checked_sub(first)
                    .and_then(|d| d.checked_add(increment))
                    .map(|d| (d / increment).max(0))
                    .ok_or_else(|| ErrorRecord::runtime("Integer overflow in do loop bounds"))?;
                let mut current = first;
                for _ in 0..trips {
                    self.store(tu, *var, Value::Integer(current))?;
                    if !self.iteration(tu, body)? {
                        return Ok(());
                    }
                    current = self.integer_of_var(tu, *var)?.wrapping_add(increment);
                }
                self.store(tu, *var, Value::Integer(current))
            }
            Stmt::WhileLoop { cond, body } => {
                while self.condition(tu, cond)? {
                    if !self.iteration(tu, body)? {
                        break;
                    }
                }
                Ok(())
            }
            Stmt::Exit => Err(Signal::Exit),
            Stmt::Cycle => Err(Signal::Cycle),
            Stmt::Return => Err(Signal::Return),
            Stmt::Expr(e) => {
                self.expr(tu, e)?;
                Ok(())
            }
        }
    }

    fn condition(&mut self, tu: &TranslationUnit, e: &Expr) -> Exec<bool> {
        match self.expr(tu, e)? {
            Value::Logical(b) => Ok(b),
            other => fault(format!("Condition evaluated to a {} value", other.type_name())),
        }
    }

    fn integer(&mut self, tu: &TranslationUnit, e: &Expr) -> Exec<i64> {
        match self.expr(tu, e)? {
            Value::Integer(n) => Ok(n),
            other => fault(format!("Expected an integer, found a {} value", other.type_name())),
        }
    }

    fn integer_of_var(&mut self, tu: &TranslationUnit, id: SymbolId) -> Exec<i64> {
        match self.load(tu, id)? {
            Value::Integer(n) => Ok(n),
            other => fault(format!("Loop variable holds a {} value", other.type_name())),
        }
    }

    // ==================== EXPRESSIONS ====================

    fn expr(&mut self, tu: &TranslationUnit, e: &Expr) -> Exec<Value> {
        Ok(match &e.kind {
            ExprKind::IntegerConstant(n) => Value::Integer(*n),
            ExprKind::RealConstant(x) => Value::Real(*x),
            ExprKind::LogicalConstant(b) => Value::Logical(*b),
            ExprKind::StringConstant(s) => Value::Character(s.clone()),
            ExprKind::Var(id) => self.load(tu, *id)?,
            ExprKind::FunctionCall { func, args } => match self.call_procedure(tu, *func, args)? {
                Some(v) => v,
                None => {
                    return Err(Signal::Fault(ErrorRecord::internal(
                        "AssertFailed",
                        "subroutine used as a value",
                    )));
                }
            },
            ExprKind::Intrinsic { func, args } => {
                let mut values = Vec::with_capacity(args.len());
                for a in args {
                    values.push(Constant::from(self.expr(tu, a)?));
                }
                match fold_intrinsic(*func, &values) {
                    Some(c) => Value::from(c),
                    None => return fault(format!("Invalid arguments to intrinsic '{}'", func.name())),
                }
            }
            ExprKind::BinOp { op, left, right } => {
                let l = self.expr(tu, left)?;
                let r = self.expr(tu, right)?;
                match (l, r) {
                    (Value::Integer(a), Value::Integer(b)) => match int_binop(*op, a, b) {
                        Some(n) => Value::Integer(n),
                        None if *op == BinOp::Div && b == 0 => return fault("Integer division by zero"),
                        None => return fault(format!("Integer overflow in '{}'", op.symbol())),
                    },
                    (Value::Real(a), Value::Real(b)) => Value::Real(real_binop(*op, a, b)),
                    (l, r) => {
                        return fault(format!(
                            "Operator '{}' applied to {} and {}",
                            op.symbol(),
                            l.type_name(),
                            r.type_name()
                        ));
                    }
                }
            }
            ExprKind::UnaryMinus(arg) => match self.expr(tu, arg)? {
                Value::Integer(n) => match n.checked_neg() {
                    Some(n) => Value::Integer(n),
                    None => return fault("Integer overflow in negation"),
                },
                Value::Real(x) => Value::Real(-x),
                other => return fault(format!("Cannot negate a {} value", other.type_name())),
            },
            ExprKind::Not(arg) => Value::Logical(!self.condition(tu, arg)?),
            ExprKind::Compare { op, left, right } => {
                let l = self.expr(tu, left)?;
                let r = self.expr(tu, right)?;
                let ord = match (&l, &r) {
                    (Value::Integer(a), Value::Integer(b)) => a.partial_cmp(b),
                    (Value::Real(a), Value::Real(b)) => a.partial_cmp(b),
                    _ => None,
                };
                match ord {
                    Some(ord) => Value::Logical(compare_holds(*op, ord)),
                    // Comparisons involving NaN are false, except /=
                    None if l.type_name() == "real" => Value::Logical(*op == CmpOp::NotEq),
                    None => return fault("Comparison of incompatible values"),
                }
            }
            ExprKind::BoolOp { op, left, right } => {
                let l = self.condition(tu, left)?;
                let r = self.condition(tu, right)?;
                Value::Logical(match op {
                    BoolOp::And => l && r,
                    BoolOp::Or => l || r,
                })
            }
            ExprKind::Cast { kind, arg } => match (kind, self.expr(tu, arg)?) {
                (CastKind::IntegerToReal, Value::Integer(n)) => Value::Real(n as f64),
                (CastKind::RealToInteger, Value::Real(x)) => Value::Integer(x.trunc() as i64),
                (_, other) => return fault(format!("Invalid cast of a {} value", other.type_name())),
            },
        })
    }
}

fn initial_value(tu: &TranslationUnit, var: &Variable) -> Value {
    var.init
        .as_ref()
        .and_then(|e| fold(tu, e))
        .map(Value::from)
        .unwrap_or_else(|| Value::default_for(var.ty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn run(src: &str) -> (TranslationUnit, Machine, StageResult<Option<Value>>) {
        let tokens = lex(src).unwrap();
        let tu = build(&parse(&tokens, src).unwrap()).unwrap();
        let mut machine = Machine::capturing();
        let result = match tu.programs().first() {
            Some(id) => machine.run_program(&tu, *id).map(|_| None),
            None => machine.run_items(&tu, &tu.items),
        };
        (tu, machine, result)
    }

    #[test]
    fn test_last_expression_is_result() {
        let (_, _, result) = run("x = 1\nx + 1\n");
        assert_eq!(result.unwrap(), Some(Value::Integer(2)));
    }

    #[test]
    fn test_do_loop_sum() {
        let (_, mut m, result) = run(
            "program p\ninteger :: i, s\ns = 0\ndo i = 1, 10\ns = s + i\nend do\nprint *, s, i\nend program\n",
        );
        result.unwrap();
        assert_eq!(m.take_output(), vec!["55 11".to_string()]);
    }

    #[test]
    fn test_exit_and_cycle() {
        let src = "\
program p
integer :: i, s
s = 0
do i = 1, 10
if (mod(i, 2) == 0) cycle
if (i > 7) exit
s = s + i
end do
print *, s
end program
";
        let (_, mut m, result) = run(src);
        result.unwrap();
        assert_eq!(m.take_output(), vec!["16".to_string()]);
    }

    #[test]
    fn test_copy_out() {
        let src = "\
subroutine bump(n)
integer, intent(inout) :: n
n = n + 1
end subroutine
integer :: k
k = 41
call bump(k)
k
";
        let (_, _, result) = run(src);
        assert_eq!(result.unwrap(), Some(Value::Integer(42)));
    }

    #[test]
    fn test_recursive_function() {
        let src = "\
integer function fact(n) result(r)
integer, intent(in) :: n
if (n <= 1) then
r = 1
else
r = n * fact(n - 1)
end if
end function
fact(10)
";
        let (_, _, result) = run(src);
        assert_eq!(result.unwrap(), Some(Value::Integer(3628800)));
    }

    #[test]
    fn test_division_by_zero() {
        let (_, _, result) = run("x = 0\n1 / x\n");
        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Runtime);
        assert!(err.message.contains("division by zero"));
    }

    #[test]
    fn test_snapshot_restore() {
        let (tu, mut m, result) = run("x = 1\n");
        result.unwrap();
        let x = tu.lookup(tu.global_scope, "x").unwrap();
        let snap = m.snapshot();
        m.run_items(&tu, &tu.items).unwrap();
        m.statics.insert(x, Value::Integer(9));
        m.restore(snap);
        assert_eq!(m.value_of(&tu, x), Some(Value::Integer(1)));
    }
}
