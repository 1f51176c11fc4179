//! Interactive evaluator
//!
//! A [`Session`] keeps one ASR and one execution [`Machine`] for its whole
//! lifetime. Each turn is tokenized, parsed and merged into the session
//! ASR, wrapped into a fresh global procedure and executed. A turn that
//! fails at any stage is rolled back: the ASR scope and item lists return
//! to their pre-turn lengths and the machine's variables are restored.

use std::fmt;

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::asr::{self, Symbol, TranslationUnit, Type};
use crate::ast;
use crate::codegen::llvm::LlvmCodegen;
use crate::error::{Failure, StageResult};
use crate::interp::{Machine, Value};
use crate::lexer;
use crate::parser;
use crate::passes::{GlobalStmts, Pass};
use crate::toolchain::strip_comment;

/// Result of one accepted turn
#[derive(Debug, Clone, PartialEq)]
pub enum EvalOutcome {
    Integer(i64),
    Real(f64),
    Logical(bool),
    Character(String),
    /// Statements ran; there is no value
    Statement,
    /// Only declarations or definitions
    None,
}

impl EvalOutcome {
    fn from_value(value: Value) -> Self {
        match value {
            Value::Integer(n) => EvalOutcome::Integer(n),
            Value::Real(x) => EvalOutcome::Real(x),
            Value::Logical(b) => EvalOutcome::Logical(b),
            Value::Character(s) => EvalOutcome::Character(s),
        }
    }

    pub fn has_value(&self) -> bool {
        !matches!(self, EvalOutcome::Statement | EvalOutcome::None)
    }
}

impl fmt::Display for EvalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalOutcome::Integer(n) => write!(f, "{}", n),
            EvalOutcome::Real(x) => write!(f, "{:?}", x),
            EvalOutcome::Logical(b) => write!(f, "{}", if *b { ".true." } else { ".false." }),
            EvalOutcome::Character(s) => write!(f, "{}", s),
            EvalOutcome::Statement | EvalOutcome::None => Ok(()),
        }
    }
}

/// One accepted turn
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub outcome: EvalOutcome,
    /// Titled intermediate renderings, filled in verbose mode
    pub sections: Vec<(&'static str, String)>,
}

pub struct Session {
    tu: TranslationUnit,
    machine: Machine,
    transcript: Vec<String>,
    verbose: bool,
    color: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Machine::new())
    }
}

impl Session {
    pub fn new(machine: Machine) -> Self {
        Self {
            tu: TranslationUnit::new(),
            machine,
            transcript: Vec::new(),
            verbose: false,
            color: false,
        }
    }

    /// Session whose `print` output is buffered (see [`Session::take_output`])
    pub fn capturing() -> Self {
        Self::new(Machine::capturing())
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Global declarations accumulated so far
    pub fn declaration_count(&self) -> usize {
        self.tu.declaration_count()
    }

    /// Accepted inputs, oldest first
    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    pub fn take_output(&mut self) -> Vec<String> {
        self.machine.take_output()
    }

    pub fn asr(&self) -> &TranslationUnit {
        &self.tu
    }

    /// Evaluate one input; on failure the session is left as it was
    pub fn evaluate(&mut self, input: &str) -> StageResult<Turn> {
        let checkpoint = self.tu.checkpoint();
        let snapshot = self.machine.snapshot();
        match self.turn(input) {
            Ok(turn) => {
                self.transcript.push(input.to_string());
                Ok(turn)
            }
            Err(err) => {
                tracing::debug!("turn rejected, rolling back: {}", err);
                self.tu.rollback(checkpoint);
                self.machine.restore(snapshot);
                Err(err)
            }
        }
    }

    fn turn(&mut self, input: &str) -> StageResult<Turn> {
        let mut sections = Vec::new();
        if self.verbose {
            sections.push(("Input", input.trim_end().to_string()));
        }
        let name = format!("<input {}>", self.transcript.len() + 1);
        let tokens = lexer::lex_named(&name, input)?;
        let unit = parser::parse_named(&name, &tokens, input)?;
        if self.verbose {
            sections.push(("AST", ast::pickle::pickle(&unit, self.color)));
        }

        asr::extend(&mut self.tu, &unit)?;
        let function_name = format!("__fortc_eval_{}", self.transcript.len());
        let had_items = !self.tu.items.is_empty();
        GlobalStmts::named(function_name.clone()).run(&mut self.tu)?;
        asr::verify::verify(&self.tu)?;

        let entry = if had_items {
            self.tu.lookup(self.tu.global_scope, &function_name)
        } else {
            None
        };
        let return_type = entry.and_then(|id| self.return_type(id));

        if self.verbose {
            sections.push(("ASR", asr::pickle::pickle(&self.tu, self.color)));
            // Statements the LLVM backend cannot express still execute
            let ir = match LlvmCodegen::new("repl").generate(&self.tu) {
                Ok(module) => module.print_to_string().to_string(),
                Err(err) => format!("(not available: {})", err.message),
            };
            sections.push(("LLVM IR", ir));
        }

        let outcome = match entry {
            None => EvalOutcome::None,
            Some(id) => match self.machine.call(&self.tu, id)? {
                Some(value) => EvalOutcome::from_value(value),
                None => EvalOutcome::Statement,
            },
        };

        if self.verbose {
            if let Some(ty) = return_type {
                sections.push(("Return type", ty.name()));
            }
            sections.push(("Result", outcome.to_string()));
        }
        Ok(Turn { outcome, sections })
    }

    fn return_type(&self, id: asr::SymbolId) -> Option<Type> {
        match self.tu.symbol(id) {
            Symbol::Procedure(p) => p
                .return_var
                .and_then(|r| self.tu.variable(r))
                .map(|v| v.ty),
            _ => None,
        }
    }
}

// ==================== LINE EDITING ====================

/// Whether `input` needs more lines before it can be evaluated
///
/// True while a program unit, `do` loop or block `if` is open, or when the
/// last line ends with a `&` continuation.
pub fn is_incomplete(input: &str) -> bool {
    let mut depth = 0i32;
    let mut continued = false;
    for line in input.lines() {
        let code = strip_comment(line).trim().to_ascii_lowercase();
        if code.is_empty() {
            continue;
        }
        continued = code.ends_with('&');
        depth += block_delta(&code);
    }
    continued || depth > 0
}

fn block_delta(code: &str) -> i32 {
    let words: Vec<&str> = code
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .collect();
    let Some(first) = words.first() else {
        return 0;
    };
    if let Some(rest) = code.strip_prefix(first).map(str::trim_start) {
        // Assignment to a variable named like a keyword
        if rest.starts_with('=') && !rest.starts_with("==") {
            return 0;
        }
    }
    match *first {
        "end" | "enddo" | "endif" | "endprogram" | "endmodule" | "endsubroutine" | "endfunction" => -1,
        "program" | "module" | "subroutine" | "function" | "do" => 1,
        "if" if code.ends_with("then") => 1,
        "integer" | "real" | "logical" | "character" if words.contains(&"function") && !code.contains("::") => 1,
        _ => 0,
    }
}

pub struct ReplOptions {
    pub verbose: bool,
    pub color: bool,
    pub show_stacktrace: bool,
}

const PROMPT: &str = ">>> ";
const CONTINUATION_PROMPT: &str = "... ";

fn readline_failure(err: ReadlineError) -> Failure {
    match err {
        ReadlineError::Io(e) => Failure::Runtime(e),
        other => Failure::Other(miette::miette!("line editor failed: {}", other)),
    }
}

/// Run the interactive loop until end of input
pub fn run(options: ReplOptions) -> Result<i32, Failure> {
    let mut editor = DefaultEditor::new().map_err(readline_failure)?;
    let mut session = Session::default()
        .with_verbose(options.verbose)
        .with_color(options.color);

    println!("fortc {} interactive evaluator", crate::VERSION);
    println!("Enter Fortran statements, declarations or expressions. Ctrl-D exits.");

    loop {
        let mut entry = String::new();
        let mut prompt = PROMPT;
        let interrupted = loop {
            match editor.readline(prompt) {
                Ok(line) => {
                    entry.push_str(&line);
                    entry.push('\n');
                    if !is_incomplete(&entry) {
                        break false;
                    }
                    prompt = CONTINUATION_PROMPT;
                }
                Err(ReadlineError::Interrupted) => break true,
                Err(ReadlineError::Eof) => {
                    println!("Exiting.");
                    return Ok(0);
                }
                Err(err) => return Err(readline_failure(err)),
            }
        };
        if interrupted || entry.trim().is_empty() {
            continue;
        }
        if let Err(err) = editor.add_history_entry(entry.trim_end()) {
            tracing::debug!("history not updated: {}", err);
        }

        match session.evaluate(&entry) {
            Ok(turn) => {
                for (title, body) in &turn.sections {
                    println!("{}:", title);
                    println!("{}", body.trim_end());
                    println!();
                }
                if !options.verbose && turn.outcome.has_value() {
                    println!("{}", turn.outcome);
                }
            }
            Err(err) => {
                eprintln!("{}", err.render(options.color, options.show_stacktrace));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_variable_persists_across_turns() {
        let mut s = Session::capturing();
        assert_eq!(s.evaluate("x = 1").unwrap().outcome, EvalOutcome::Statement);
        assert_eq!(s.evaluate("x + 1").unwrap().outcome, EvalOutcome::Integer(2));
    }

    #[test]
    fn test_failed_turn_leaves_state_unchanged() {
        let mut s = Session::capturing();
        s.evaluate("n = 10").unwrap();
        let before = s.declaration_count();
        assert!(s.evaluate("n = n +").is_err());
        assert!(s.evaluate("m = undefined_fn(1)").is_err());
        assert_eq!(s.declaration_count(), before);
        assert_eq!(s.evaluate("n * 2").unwrap().outcome, EvalOutcome::Integer(20));
        assert_eq!(s.transcript().len(), 2);
    }

    #[test]
    fn test_runtime_failure_restores_variables() {
        let mut s = Session::capturing();
        s.evaluate("k = 5").unwrap();
        s.evaluate("z = 0").unwrap();
        let err = s.evaluate("k = 7\nk / z").unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert_eq!(s.evaluate("k").unwrap().outcome, EvalOutcome::Integer(5));
    }

    #[test]
    fn test_procedures_remain_callable() {
        let mut s = Session::capturing();
        let defined = s
            .evaluate("integer function twice(n)\ninteger, intent(in) :: n\ntwice = 2 * n\nend function\n")
            .unwrap();
        assert_eq!(defined.outcome, EvalOutcome::None);
        assert_eq!(s.evaluate("twice(21)").unwrap().outcome, EvalOutcome::Integer(42));
    }

    #[test]
    fn test_print_goes_to_output() {
        let mut s = Session::capturing();
        s.evaluate("print *, 1 + 2, .true.").unwrap();
        assert_eq!(s.take_output(), vec!["3 T".to_string()]);
    }

    #[test]
    fn test_real_and_logical_outcomes() {
        let mut s = Session::capturing();
        assert_eq!(s.evaluate("1.5 * 2.0").unwrap().outcome, EvalOutcome::Real(3.0));
        assert_eq!(s.evaluate("3 > 2").unwrap().outcome, EvalOutcome::Logical(true));
    }

    #[test]
    fn test_verbose_sections() {
        let mut s = Session::capturing().with_verbose(true);
        let turn = s.evaluate("2 + 3").unwrap();
        let titles: Vec<&str> = turn.sections.iter().map(|(t, _)| *t).collect();
        assert_eq!(titles, vec!["Input", "AST", "ASR", "LLVM IR", "Return type", "Result"]);
        assert_eq!(turn.sections.last().unwrap().1, "5");
    }

    #[test]
    fn test_is_incomplete() {
        assert!(is_incomplete("do i = 1, 3\n"));
        assert!(!is_incomplete("do i = 1, 3\nprint *, i\nend do\n"));
        assert!(is_incomplete("if (x > 1) then\n"));
        assert!(!is_incomplete("if (x > 1) print *, x\n"));
        assert!(is_incomplete("x = 1 + &\n"));
        assert!(is_incomplete("integer function f(n)\n"));
        assert!(!is_incomplete("integer :: function_count\n"));
        assert!(!is_incomplete("do = 3\n"));
        assert!(is_incomplete("subroutine s()\nif (.true.) then\nend if\n"));
    }
}
