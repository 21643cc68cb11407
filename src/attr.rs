//! Column types, values and schemas.

use std::fmt;

use crate::error::{Error, Result};

/// The type of one column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttrType {
    /// Categorical codes in `0..cap`.
    Enum {
        /// Number of distinct codes the column may hold.
        cap: u32,
    },
    /// Signed 64-bit integers.
    Integer,
    /// Finite double-precision reals.
    Real,
    /// UTF-8 text.
    String,
}

impl AttrType {
    /// Short lowercase name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            AttrType::Enum { .. } => "enum",
            AttrType::Integer => "integer",
            AttrType::Real => "real",
            AttrType::String => "string",
        }
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrType::Enum { cap } => write!(f, "enum({cap})"),
            other => f.write_str(other.name()),
        }
    }
}

/// A single column value.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    /// Categorical code.
    Enum(u32),
    /// Integer.
    Integer(i64),
    /// Real number.
    Real(f64),
    /// Text.
    String(String),
}

impl AttrValue {
    /// The categorical code, if this is an enum value.
    pub fn as_enum(&self) -> Option<u32> {
        match self {
            AttrValue::Enum(v) => Some(*v),
            _ => None,
        }
    }

    /// The integer, if this is an integer value.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttrValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// The real, if this is a real value.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            AttrValue::Real(v) => Some(*v),
            _ => None,
        }
    }

    /// The text, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the variant matches `attr_type`, ignoring enum capacity.
    pub fn is_a(&self, attr_type: AttrType) -> bool {
        matches!(
            (self, attr_type),
            (AttrValue::Enum(_), AttrType::Enum { .. })
                | (AttrValue::Integer(_), AttrType::Integer)
                | (AttrValue::Real(_), AttrType::Real)
                | (AttrValue::String(_), AttrType::String)
        )
    }
}

/// Ordered column types of a relation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Schema {
    attr_types: Vec<AttrType>,
}

impl Schema {
    /// Build a schema from column types.
    pub fn new(attr_types: Vec<AttrType>) -> Self {
        Self { attr_types }
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.attr_types.len()
    }

    /// Whether the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.attr_types.is_empty()
    }

    /// Type of `column`, if it exists.
    pub fn attr_type(&self, column: usize) -> Option<AttrType> {
        self.attr_types.get(column).copied()
    }

    /// All column types in order.
    pub fn attr_types(&self) -> &[AttrType] {
        &self.attr_types
    }

    /// Check that `tuple` has one value of the right type per column, that
    /// enum codes are below their capacity and reals are finite.
    pub fn check_tuple(&self, tuple: &[AttrValue]) -> Result<()> {
        if tuple.len() != self.len() {
            return Err(Error::TupleShape {
                expected: self.len(),
                found: tuple.len(),
            });
        }
        for (column, (value, &attr_type)) in tuple.iter().zip(&self.attr_types).enumerate() {
            if !value.is_a(attr_type) {
                return Err(Error::TypeMismatch {
                    column,
                    expected: attr_type.name(),
                });
            }
            match (value, attr_type) {
                (AttrValue::Enum(v), AttrType::Enum { cap }) if *v >= cap => {
                    return Err(Error::Unencodable {
                        column,
                        reason: format!("code {v} is not below capacity {cap}"),
                    });
                }
                (AttrValue::Real(v), _) if !v.is_finite() => {
                    return Err(Error::Unencodable {
                        column,
                        reason: format!("{v} is not finite"),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Read access to the enum columns a predictor table is keyed on.
///
/// Implemented for complete tuples (encoding) and for partially decoded
/// tuples (decoding), where columns not yet reconstructed are `None`.
pub trait Row {
    /// The enum code at `column`, if present.
    fn enum_value(&self, column: usize) -> Option<u32>;
}

impl Row for [AttrValue] {
    fn enum_value(&self, column: usize) -> Option<u32> {
        self.get(column).and_then(AttrValue::as_enum)
    }
}

impl Row for [Option<AttrValue>] {
    fn enum_value(&self, column: usize) -> Option<u32> {
        self.get(column)
            .and_then(Option::as_ref)
            .and_then(AttrValue::as_enum)
    }
}
