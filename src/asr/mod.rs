//! Abstract Semantic Representation
//!
//! The ASR is the resolved, type-checked form every pass and backend works
//! on. Symbols and scopes live in two arenas owned by the
//! [`TranslationUnit`] and refer to each other through stable `Id` handles;
//! nothing is freed before the unit is dropped. The interactive evaluator
//! keeps one unit for the whole session and grows it turn by turn.

pub mod builder;
pub mod fold;
pub mod modfile;
pub mod pickle;
pub mod verify;

pub use crate::ast::{BinOp, BoolOp, CmpOp, Intent};
pub use builder::{build, extend};

use id_arena::{Arena, Id};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type SymbolId = Id<Symbol>;
pub type ScopeId = Id<SymbolTable>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Integer,
    Real,
    Logical,
    /// `None` is an assumed length dummy argument
    Character { len: Option<u32> },
}

impl Type {
    pub fn is_numeric(self) -> bool {
        matches!(self, Type::Integer | Type::Real)
    }

    pub fn name(self) -> String {
        match self {
            Type::Integer => "integer".into(),
            Type::Real => "real".into(),
            Type::Logical => "logical".into(),
            Type::Character { len: Some(n) } => format!("character(len={})", n),
            Type::Character { len: None } => "character(len=*)".into(),
        }
    }

    /// Type equality that ignores character length
    pub fn same_kind(self, other: Type) -> bool {
        matches!(
            (self, other),
            (Type::Integer, Type::Integer)
                | (Type::Real, Type::Real)
                | (Type::Logical, Type::Logical)
                | (Type::Character { .. }, Type::Character { .. })
        )
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl From<crate::ast::TypeSpec> for Type {
    fn from(spec: crate::ast::TypeSpec) -> Self {
        match spec {
            crate::ast::TypeSpec::Integer => Type::Integer,
            crate::ast::TypeSpec::Real => Type::Real,
            crate::ast::TypeSpec::Logical => Type::Logical,
            crate::ast::TypeSpec::Character { len } => Type::Character { len },
        }
    }
}

// ==================== SYMBOLS ====================

/// Names visible in one scope
#[derive(Debug)]
pub struct SymbolTable {
    pub parent: Option<ScopeId>,
    /// Program, module or procedure this scope belongs to
    pub owner: Option<SymbolId>,
    pub symbols: IndexMap<String, SymbolId>,
    /// Modules made visible by `use`
    pub uses: Vec<SymbolId>,
}

#[derive(Debug)]
pub enum Symbol {
    Program(Program),
    Module(Module),
    Procedure(Procedure),
    Variable(Variable),
}

#[derive(Debug)]
pub struct Program {
    pub name: String,
    pub scope: ScopeId,
    pub body: Vec<Stmt>,
}

#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub scope: ScopeId,
    /// Loaded from a module file; procedures have no bodies
    pub external: bool,
}

/// Function or subroutine
#[derive(Debug)]
pub struct Procedure {
    pub name: String,
    pub scope: ScopeId,
    pub parent: ScopeId,
    pub args: Vec<SymbolId>,
    /// Present for functions
    pub return_var: Option<SymbolId>,
    pub body: Vec<Stmt>,
}

impl Procedure {
    pub fn is_function(&self) -> bool {
        self.return_var.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Storage {
    Default,
    Parameter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarIntent {
    Local,
    In,
    Out,
    InOut,
    /// Dummy argument declared without `intent`
    Unspecified,
    ReturnVar,
}

impl VarIntent {
    pub fn is_dummy(self) -> bool {
        matches!(
            self,
            VarIntent::In | VarIntent::Out | VarIntent::InOut | VarIntent::Unspecified
        )
    }

    /// The actual argument must be a definable variable
    pub fn requires_variable(self) -> bool {
        matches!(self, VarIntent::Out | VarIntent::InOut)
    }

    pub fn name(self) -> &'static str {
        match self {
            VarIntent::Local => "Local",
            VarIntent::In => "In",
            VarIntent::Out => "Out",
            VarIntent::InOut => "InOut",
            VarIntent::Unspecified => "Unspecified",
            VarIntent::ReturnVar => "ReturnVar",
        }
    }
}

#[derive(Debug)]
pub struct Variable {
    pub name: String,
    pub parent: ScopeId,
    pub ty: Type,
    pub intent: VarIntent,
    pub storage: Storage,
    pub init: Option<Expr>,
}

impl Symbol {
    pub fn name(&self) -> &str {
        match self {
            Symbol::Program(p) => &p.name,
            Symbol::Module(m) => &m.name,
            Symbol::Procedure(p) => &p.name,
            Symbol::Variable(v) => &v.name,
        }
    }

    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Symbol::Variable(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_procedure(&self) -> Option<&Procedure> {
        match self {
            Symbol::Procedure(p) => Some(p),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Symbol::Program(_) => "program",
            Symbol::Module(_) => "module",
            Symbol::Procedure(p) if p.is_function() => "function",
            Symbol::Procedure(_) => "subroutine",
            Symbol::Variable(_) => "variable",
        }
    }
}

// ==================== EXPRESSIONS ====================

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
}

/// Elemental intrinsics kept as calls; `real` and `int` become casts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intrinsic {
    Abs,
    Mod,
    Sqrt,
    Min,
    Max,
    Exp,
    Sin,
    Cos,
}

impl Intrinsic {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "abs" => Intrinsic::Abs,
            "mod" => Intrinsic::Mod,
            "sqrt" => Intrinsic::Sqrt,
            "min" => Intrinsic::Min,
            "max" => Intrinsic::Max,
            "exp" => Intrinsic::Exp,
            "sin" => Intrinsic::Sin,
            "cos" => Intrinsic::Cos,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Intrinsic::Abs => "abs",
            Intrinsic::Mod => "mod",
            Intrinsic::Sqrt => "sqrt",
            Intrinsic::Min => "min",
            Intrinsic::Max => "max",
            Intrinsic::Exp => "exp",
            Intrinsic::Sin => "sin",
            Intrinsic::Cos => "cos",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    IntegerToReal,
    RealToInteger,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    IntegerConstant(i64),
    RealConstant(f64),
    LogicalConstant(bool),
    StringConstant(String),
    Var(SymbolId),
    FunctionCall {
        func: SymbolId,
        args: Vec<Expr>,
    },
    Intrinsic {
        func: Intrinsic,
        args: Vec<Expr>,
    },
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryMinus(Box<Expr>),
    Not(Box<Expr>),
    Compare {
        op: CmpOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    BoolOp {
        op: BoolOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Cast {
        kind: CastKind,
        arg: Box<Expr>,
    },
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Type) -> Self {
        Self { kind, ty }
    }

    pub fn integer(n: i64) -> Self {
        Self::new(ExprKind::IntegerConstant(n), Type::Integer)
    }

    pub fn logical(b: bool) -> Self {
        Self::new(ExprKind::LogicalConstant(b), Type::Logical)
    }

    pub fn var(id: SymbolId, ty: Type) -> Self {
        Self::new(ExprKind::Var(id), ty)
    }

    pub fn binop(op: BinOp, left: Expr, right: Expr) -> Self {
        let ty = left.ty;
        Self::new(
            ExprKind::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
        )
    }

    pub fn compare(op: CmpOp, left: Expr, right: Expr) -> Self {
        Self::new(
            ExprKind::Compare {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            Type::Logical,
        )
    }
}

// ==================== STATEMENTS ====================

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assignment {
        target: SymbolId,
        value: Expr,
    },
    Print(Vec<Expr>),
    SubroutineCall {
        sub: SymbolId,
        args: Vec<Expr>,
    },
    If {
        cond: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    DoLoop {
        var: SymbolId,
        start: Expr,
        end: Expr,
        step: Option<Expr>,
        body: Vec<Stmt>,
    },
    WhileLoop {
        cond: Expr,
        body: Vec<Stmt>,
    },
    Exit,
    Cycle,
    Return,
    /// Top-level expression whose value is the turn's result
    Expr(Expr),
}

// ==================== TRANSLATION UNIT ====================

/// Position to roll a session back to after a rejected turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    global_symbols: usize,
    items: usize,
}

pub struct TranslationUnit {
    pub symbols: Arena<Symbol>,
    pub scopes: Arena<SymbolTable>,
    pub global_scope: ScopeId,
    /// Top-level statements, in source order
    pub items: Vec<Stmt>,
}

impl fmt::Debug for TranslationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationUnit")
            .field("symbols", &self.symbols.len())
            .field("scopes", &self.scopes.len())
            .field("items", &self.items.len())
            .finish()
    }
}

impl Default for TranslationUnit {
    fn default() -> Self {
        Self::new()
    }
}

impl TranslationUnit {
    pub fn new() -> Self {
        let mut scopes = Arena::new();
        let global_scope = scopes.alloc(SymbolTable {
            parent: None,
            owner: None,
            symbols: IndexMap::new(),
            uses: Vec::new(),
        });
        Self {
            symbols: Arena::new(),
            scopes,
            global_scope,
            items: Vec::new(),
        }
    }

    pub fn new_scope(&mut self, parent: Option<ScopeId>) -> ScopeId {
        self.scopes.alloc(SymbolTable {
            parent,
            owner: None,
            symbols: IndexMap::new(),
            uses: Vec::new(),
        })
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id]
    }

    pub fn variable(&self, id: SymbolId) -> Option<&Variable> {
        self.symbols[id].as_variable()
    }

    pub fn procedure(&self, id: SymbolId) -> Option<&Procedure> {
        self.symbols[id].as_procedure()
    }

    /// Resolve `name` from `scope` outward, including `use`d modules
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let table = &self.scopes[id];
            if let Some(sym) = table.symbols.get(name) {
                return Some(*sym);
            }
            for module in &table.uses {
                if let Symbol::Module(m) = &self.symbols[*module] {
                    if let Some(sym) = self.scopes[m.scope].symbols.get(name) {
                        return Some(*sym);
                    }
                }
            }
            current = table.parent;
        }
        None
    }

    /// Link-level name: owner-qualified for anything outside the global scope
    pub fn mangled_name(&self, id: SymbolId) -> String {
        let (name, scope) = match &self.symbols[id] {
            Symbol::Variable(v) => (&v.name, Some(v.parent)),
            Symbol::Procedure(p) => (&p.name, Some(p.parent)),
            Symbol::Program(p) => (&p.name, None),
            Symbol::Module(m) => (&m.name, None),
        };
        match scope.and_then(|s| self.scopes[s].owner) {
            Some(owner) => format!("{}__{}", self.mangled_name(owner), name),
            None => name.clone(),
        }
    }

    /// Number of declarations visible at the top level
    pub fn declaration_count(&self) -> usize {
        self.scopes[self.global_scope].symbols.len()
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            global_symbols: self.scopes[self.global_scope].symbols.len(),
            items: self.items.len(),
        }
    }

    /// Forget everything added since `checkpoint`
    ///
    /// Arena slots stay allocated but become unreachable.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        let global = self.global_scope;
        self.scopes[global]
            .symbols
            .truncate(checkpoint.global_symbols);
        self.items.truncate(checkpoint.items);
    }

    /// Global-scope symbols of a given shape, in declaration order
    pub fn global_symbols(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.scopes[self.global_scope]
            .symbols
            .values()
            .map(move |id| (*id, &self.symbols[*id]))
    }

    pub fn programs(&self) -> Vec<SymbolId> {
        self.global_symbols()
            .filter(|(_, s)| matches!(s, Symbol::Program(_)))
            .map(|(id, _)| id)
            .collect()
    }

    pub fn modules(&self) -> Vec<SymbolId> {
        self.global_symbols()
            .filter(|(_, s)| matches!(s, Symbol::Module(_)))
            .map(|(id, _)| id)
            .collect()
    }

    /// Every procedure reachable from the global scope, outermost first
    pub fn all_procedures(&self) -> Vec<SymbolId> {
        let mut out = Vec::new();
        self.collect_procedures(self.global_scope, &mut out);
        out
    }

    fn collect_procedures(&self, scope: ScopeId, out: &mut Vec<SymbolId>) {
        for id in self.scopes[scope].symbols.values() {
            match &self.symbols[*id] {
                Symbol::Procedure(p) => {
                    out.push(*id);
                    self.collect_procedures(p.scope, out);
                }
                Symbol::Program(p) => self.collect_procedures(p.scope, out),
                Symbol::Module(m) => self.collect_procedures(m.scope, out),
                Symbol::Variable(_) => {}
            }
        }
    }

    /// Variables with static storage: globals, module and program variables
    pub fn static_variables(&self) -> Vec<SymbolId> {
        let mut out = Vec::new();
        let mut scopes = vec![self.global_scope];
        while let Some(scope) = scopes.pop() {
            for id in self.scopes[scope].symbols.values() {
                match &self.symbols[*id] {
                    Symbol::Variable(_) => out.push(*id),
                    Symbol::Program(p) => scopes.push(p.scope),
                    Symbol::Module(m) => scopes.push(m.scope),
                    Symbol::Procedure(_) => {}
                }
            }
        }
        out
    }

    /// Locals of a procedure, excluding its arguments
    pub fn locals(&self, proc: &Procedure) -> Vec<SymbolId> {
        self.scopes[proc.scope]
            .symbols
            .values()
            .copied()
            .filter(|id| {
                matches!(&self.symbols[*id], Symbol::Variable(v) if !proc.args.contains(id) && v.intent != VarIntent::ReturnVar)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_var(tu: &mut TranslationUnit, scope: ScopeId, name: &str) -> SymbolId {
        let id = tu.symbols.alloc(Symbol::Variable(Variable {
            name: name.into(),
            parent: scope,
            ty: Type::Integer,
            intent: VarIntent::Local,
            storage: Storage::Default,
            init: None,
        }));
        tu.scopes[scope].symbols.insert(name.into(), id);
        id
    }

    #[test]
    fn test_lookup_walks_parents() {
        let mut tu = TranslationUnit::new();
        let global = tu.global_scope;
        let x = add_var(&mut tu, global, "x");
        let inner = tu.new_scope(Some(global));
        assert_eq!(tu.lookup(inner, "x"), Some(x));
        assert_eq!(tu.lookup(inner, "y"), None);
    }

    #[test]
    fn test_rollback_restores_count() {
        let mut tu = TranslationUnit::new();
        let global = tu.global_scope;
        add_var(&mut tu, global, "x");
        let cp = tu.checkpoint();
        add_var(&mut tu, global, "y");
        tu.items.push(Stmt::Exit);
        assert_eq!(tu.declaration_count(), 2);
        tu.rollback(cp);
        assert_eq!(tu.declaration_count(), 1);
        assert!(tu.items.is_empty());
        assert_eq!(tu.symbols.len(), 2);
    }
}
