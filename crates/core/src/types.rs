//! Scalar types of the FullCircle language.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The three value types a FullCircle expression can have.
///
/// `void` is not a value type; it exists only as the absence of a function
/// return value and is represented as `Option<ScalarType>` where needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    /// 32-bit two's-complement signed integer.
    Int,
    /// IEEE-754 single-precision floating point number.
    Float,
    /// 8-bit unsigned character.
    Char,
}

impl ScalarType {
    /// Size in bytes a value of this type occupies on the VM stack.
    pub fn size(self) -> u32 {
        match self {
            ScalarType::Int | ScalarType::Float => 4,
            ScalarType::Char => 1,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarType::Int => write!(f, "int"),
            ScalarType::Float => write!(f, "float"),
            ScalarType::Char => write!(f, "char"),
        }
    }
}
