use std::fmt::{Display, Formatter};

use ragged_dtype::PType;
use ragged_error::{RaggedResult, ragged_bail};
use serde_json::{Value, json};
use static_assertions::assert_eq_size;

use crate::content::{Content, RecordArray};
use crate::data::Values;

/// A single primitive value read out of a leaf.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
}

assert_eq_size!(Scalar, [u8; 16]);

impl Scalar {
    /// Element `i` of `values`. The caller checks bounds.
    pub(crate) fn from_values(values: &Values, i: usize) -> Self {
        let ptype = values.ptype();
        if ptype.is_bool() {
            Scalar::Bool(values.get_i64(i) != 0)
        } else if ptype.is_float() {
            Scalar::Float(values.get_f64(i))
        } else if ptype.is_unsigned_int() {
            Scalar::UInt(values.get_i64(i) as u64)
        } else {
            Scalar::Int(values.get_i64(i))
        }
    }

    /// The value as JSON; NaN becomes `null`.
    pub fn to_json(self) -> Value {
        match self {
            Scalar::Bool(b) => json!(b),
            Scalar::Int(i) => json!(i),
            Scalar::UInt(u) => json!(u),
            Scalar::Float(f) if f.is_finite() => json!(f),
            Scalar::Float(_) => Value::Null,
        }
    }

    /// The value as a kernel scalar argument.
    pub fn as_i64(self) -> i64 {
        match self {
            Scalar::Bool(b) => i64::from(b),
            Scalar::Int(i) => i,
            Scalar::UInt(u) => u as i64,
            Scalar::Float(f) => f as i64,
        }
    }

    /// The value as a float.
    pub fn as_f64(self) -> f64 {
        match self {
            Scalar::Bool(b) => f64::from(u8::from(b)),
            Scalar::Int(i) => i as f64,
            Scalar::UInt(u) => u as f64,
            Scalar::Float(f) => f,
        }
    }

    /// The narrowest primitive type holding this value.
    pub fn ptype(self) -> PType {
        match self {
            Scalar::Bool(_) => PType::Bool,
            Scalar::Int(_) => PType::I64,
            Scalar::UInt(_) => PType::U64,
            Scalar::Float(_) => PType::F64,
        }
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<u64> for Scalar {
    fn from(value: u64) -> Self {
        Scalar::UInt(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

/// The result of selecting one element of a layout.
#[derive(Debug, Clone)]
pub enum Element {
    /// A primitive value.
    Scalar(Scalar),
    /// A nested list, as the layout of its items.
    Array(Content),
    /// One row of a record array.
    Record(RecordArray, usize),
    /// A missing value.
    Missing,
    /// A value of the given type that the typetracer cannot see.
    Unknown(PType),
}

impl Element {
    pub fn is_missing(&self) -> bool {
        matches!(self, Element::Missing)
    }

    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            Element::Scalar(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Content> {
        match self {
            Element::Array(c) => Some(c),
            _ => None,
        }
    }

    /// Render as JSON, in the same way as [`Content::to_list`].
    pub fn to_json(&self) -> RaggedResult<Value> {
        match self {
            Element::Scalar(s) => Ok(s.to_json()),
            Element::Array(content) => content.to_list(),
            Element::Record(record, at) => record.row_to_json(*at),
            Element::Missing => Ok(Value::Null),
            Element::Unknown(ptype) => {
                ragged_bail!(NotImplemented: "cannot render an unknown {ptype} value")
            }
        }
    }
}
