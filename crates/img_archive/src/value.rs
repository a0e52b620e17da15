//! The typed value domain carried by SERI records

use indexmap::IndexMap;

/// An insertion ordered mapping, the order is kept in the written records
pub type Object = IndexMap<String, Value>;

/// A single SERI value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    UInt(u32),
    Float(f32),
    Bool(bool),
    Str(String),
    /// Homogeneous list of values
    Array(Vec<Value>),
    Object(Object),
}

impl Value {
    /// The tag byte describing this value when stored as a plain (non slot) value
    pub fn tag(&self) -> u8 {
        match self {
            Value::UInt(_) => b'i',
            Value::Float(_) => b'f',
            Value::Bool(_) => b'b',
            Value::Str(_) => b's',
            Value::Array(_) => b'a',
            Value::Object(_) => b'h',
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::UInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::UInt(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}

impl From<Object> for Value {
    fn from(value: Object) -> Self {
        Value::Object(value)
    }
}
