//! Runtime values for the execution engine

use std::fmt;

use crate::asr::Type;
use crate::asr::fold::Constant;

/// Runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Real(f64),
    Logical(bool),
    Character(String),
}

impl Value {
    /// Value of a variable that was never assigned
    pub fn default_for(ty: Type) -> Self {
        match ty {
            Type::Integer => Value::Integer(0),
            Type::Real => Value::Real(0.0),
            Type::Logical => Value::Logical(false),
            Type::Character { len } => Value::Character(" ".repeat(len.unwrap_or(0) as usize)),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Logical(_) => "logical",
            Value::Character(_) => "character",
        }
    }

    pub fn as_logical(&self) -> Option<bool> {
        match self {
            Value::Logical(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// One item of a `print` statement
    pub fn print_item(&self) -> String {
        match self {
            Value::Integer(n) => n.to_string(),
            Value::Real(x) => format!("{:.6}", x),
            Value::Logical(true) => "T".into(),
            Value::Logical(false) => "F".into(),
            Value::Character(s) => s.clone(),
        }
    }
}

impl From<Constant> for Value {
    fn from(c: Constant) -> Self {
        match c {
            Constant::Integer(n) => Value::Integer(n),
            Constant::Real(x) => Value::Real(x),
            Constant::Logical(b) => Value::Logical(b),
            Constant::Str(s) => Value::Character(s),
        }
    }
}

impl From<Value> for Constant {
    fn from(v: Value) -> Self {
        match v {
            Value::Integer(n) => Constant::Integer(n),
            Value::Real(x) => Constant::Real(x),
            Value::Logical(b) => Constant::Logical(b),
            Value::Character(s) => Constant::Str(s),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Real(x) => write!(f, "{:?}", x),
            Value::Logical(b) => write!(f, "{}", if *b { ".true." } else { ".false." }),
            Value::Character(s) => write!(f, "{}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_items() {
        assert_eq!(Value::Integer(-3).print_item(), "-3");
        assert_eq!(Value::Real(2.5).print_item(), "2.500000");
        assert_eq!(Value::Logical(true).print_item(), "T");
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Real(3.0).to_string(), "3.0");
        assert_eq!(Value::Logical(false).to_string(), ".false.");
    }

    #[test]
    fn test_character_default_is_blank() {
        assert_eq!(
            Value::default_for(Type::Character { len: Some(3) }),
            Value::Character("   ".into())
        );
    }
}
