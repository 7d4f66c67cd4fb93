//! Constant pool entries
//!
//! Literal values referenced by `LoadConst` and by name operands.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A constant pool entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// String literal, also used for global/attribute names
    Str(String),
    /// Boolean literal
    Bool(bool),
    /// `None`
    None,
}

impl Constant {
    /// String payload, if this is a string constant
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Constant::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(i) => write!(f, "{}", i),
            Constant::Float(x) => write!(f, "{:?}", x),
            Constant::Str(s) => write!(f, "{:?}", s),
            Constant::Bool(true) => write!(f, "True"),
            Constant::Bool(false) => write!(f, "False"),
            Constant::None => write!(f, "None"),
        }
    }
}
