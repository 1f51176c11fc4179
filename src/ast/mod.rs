//! Abstract Syntax Tree for free-form Fortran
//!
//! Names are stored lower-cased since Fortran is case-insensitive. The tree
//! carries no source positions, so two parses of equivalent text compare
//! equal; this is what makes the source round trip checkable.

pub mod pickle;
pub mod unparse;

use serde::{Deserialize, Serialize};

/// Top-level AST of one file or one interactive fragment
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TranslationUnit {
    pub items: Vec<Item>,
}

/// Top-level item
///
/// Bare declarations, statements and expressions are only accepted at the
/// top level, which is how interactive fragments are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Item {
    Program(ProgramUnit),
    Module(ModuleUnit),
    Procedure(Procedure),
    Declaration(Declaration),
    Statement(Stmt),
    Expression(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramUnit {
    pub name: String,
    pub spec: SpecificationPart,
    pub body: Vec<Stmt>,
    pub contains: Vec<Procedure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleUnit {
    pub name: String,
    pub spec: SpecificationPart,
    pub contains: Vec<Procedure>,
}

/// `use`, `implicit none` and declarations at the head of a unit
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpecificationPart {
    pub uses: Vec<String>,
    pub implicit_none: bool,
    pub decls: Vec<Declaration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    pub name: String,
    pub kind: ProcedureKind,
    pub args: Vec<String>,
    pub spec: SpecificationPart,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProcedureKind {
    Subroutine,
    Function {
        /// Prefix type, as in `integer function f(x)`
        return_type: Option<TypeSpec>,
        /// Name given by `result(r)`
        result: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeSpec {
    Integer,
    Real,
    Logical,
    /// `None` is an assumed length, `character(len=*)`
    Character { len: Option<u32> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    In,
    Out,
    InOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Attribute {
    Parameter,
    Intent(Intent),
}

/// `integer, parameter :: n = 10, m = 2`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub ty: TypeSpec,
    pub attrs: Vec<Attribute>,
    pub entities: Vec<Entity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub init: Option<Expr>,
}

impl Declaration {
    pub fn intent(&self) -> Option<Intent> {
        self.attrs.iter().find_map(|a| match a {
            Attribute::Intent(i) => Some(*i),
            Attribute::Parameter => None,
        })
    }

    pub fn is_parameter(&self) -> bool {
        self.attrs.contains(&Attribute::Parameter)
    }
}

// ==================== STATEMENTS ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Assignment {
        target: String,
        value: Expr,
    },
    /// `print *, a, b`
    Print(Vec<Expr>),
    Call {
        name: String,
        args: Vec<Expr>,
    },
    /// Block `if`; an `else if` chain nests in `orelse`
    If {
        cond: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    /// Single-line `if (cond) stmt`
    SingleIf {
        cond: Expr,
        stmt: Box<Stmt>,
    },
    DoLoop {
        var: String,
        start: Expr,
        end: Expr,
        step: Option<Expr>,
        body: Vec<Stmt>,
    },
    DoWhile {
        cond: Expr,
        body: Vec<Stmt>,
    },
    /// Bare `do ... end do`
    DoForever {
        body: Vec<Stmt>,
    },
    Exit,
    Cycle,
    Return,
}

// ==================== EXPRESSIONS ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Integer(i64),
    /// Literal text, kept as written so it prints back unchanged
    Real(String),
    Logical(bool),
    Str(String),
    Name(String),
    /// Function reference or intrinsic call
    FuncCall {
        name: String,
        args: Vec<Expr>,
    },
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
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
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Minus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoolOp {
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Pow => "**",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BinOp::Add => "Add",
            BinOp::Sub => "Sub",
            BinOp::Mul => "Mul",
            BinOp::Div => "Div",
            BinOp::Pow => "Pow",
        }
    }
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "/=",
            CmpOp::Lt => "<",
            CmpOp::LtE => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtE => ">=",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CmpOp::Eq => "Eq",
            CmpOp::NotEq => "NotEq",
            CmpOp::Lt => "Lt",
            CmpOp::LtE => "LtE",
            CmpOp::Gt => "Gt",
            CmpOp::GtE => "GtE",
        }
    }
}

impl BoolOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BoolOp::And => ".and.",
            BoolOp::Or => ".or.",
        }
    }
}

impl TypeSpec {
    pub fn keyword(&self) -> String {
        match self {
            TypeSpec::Integer => "integer".into(),
            TypeSpec::Real => "real".into(),
            TypeSpec::Logical => "logical".into(),
            TypeSpec::Character { len: None } => "character(len=*)".into(),
            TypeSpec::Character { len: Some(1) } => "character".into(),
            TypeSpec::Character { len: Some(n) } => format!("character(len={})", n),
        }
    }
}

/// Binding strength, weakest first
pub mod precedence {
    pub const OR: u8 = 1;
    pub const AND: u8 = 2;
    pub const NOT: u8 = 3;
    pub const COMPARE: u8 = 4;
    pub const ADDITIVE: u8 = 5;
    pub const MULTIPLICATIVE: u8 = 6;
    pub const POWER: u8 = 7;
    pub const PRIMARY: u8 = 8;
}

impl Expr {
    pub fn precedence(&self) -> u8 {
        use precedence::*;
        match self {
            Expr::BoolOp { op: BoolOp::Or, .. } => OR,
            Expr::BoolOp { op: BoolOp::And, .. } => AND,
            Expr::UnaryOp {
                op: UnaryOp::Not, ..
            } => NOT,
            Expr::Compare { .. } => COMPARE,
            Expr::BinOp {
                op: BinOp::Add | BinOp::Sub,
                ..
            }
            | Expr::UnaryOp {
                op: UnaryOp::Minus,
                ..
            } => ADDITIVE,
            Expr::BinOp {
                op: BinOp::Mul | BinOp::Div,
                ..
            } => MULTIPLICATIVE,
            Expr::BinOp { op: BinOp::Pow, .. } => POWER,
            // A negative literal prints with a sign, so it binds like unary minus
            Expr::Integer(n) if *n < 0 => ADDITIVE,
            _ => PRIMARY,
        }
    }
}

impl TranslationUnit {
    /// Names of the modules defined in this unit, in source order
    pub fn module_names(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter_map(|item| match item {
                Item::Module(m) => Some(m.name.as_str()),
                _ => None,
            })
            .collect()
    }
}
