//! Host-side view of guest values.

use crate::error::CoreError;
use crate::proxy::RemoteObject;
use guestwire_protocol::Primitive;
use std::fmt;

/// A value received from (or sent to) the guest.
///
/// Data arrives by value and is fully owned by the host. Objects arrive as
/// [`RemoteObject`] handles whose state stays in the guest.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<RemoteValue>),
    Tuple(Vec<RemoteValue>),
    Set(Vec<RemoteValue>),
    /// Entries in guest iteration order. Keys are always scalars.
    Dict(Vec<(Primitive, RemoteValue)>),
    Object(RemoteObject),
    /// A file-like object.
    Stream(RemoteObject),
}

impl RemoteValue {
    /// Guest type name for data, class name for objects.
    pub fn type_name(&self) -> &str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Set(_) => "set",
            Self::Dict(_) => "dict",
            Self::Object(o) | Self::Stream(o) => o.class_name(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Float value; integers widen.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Items of a list, tuple or set.
    pub fn as_items(&self) -> Option<&[RemoteValue]> {
        match self {
            Self::List(items) | Self::Tuple(items) | Self::Set(items) => Some(items),
            _ => None,
        }
    }

    /// Handle of an object or stream.
    pub fn as_object(&self) -> Option<&RemoteObject> {
        match self {
            Self::Object(o) | Self::Stream(o) => Some(o),
            _ => None,
        }
    }

    /// Look up a string key in a dict.
    pub fn get(&self, key: &str) -> Option<&RemoteValue> {
        match self {
            Self::Dict(entries) => entries.iter().find_map(|(k, v)| match k {
                Primitive::Str(s) if s == key => Some(v),
                _ => None,
            }),
            _ => None,
        }
    }

    fn mismatch(&self, expected: &str) -> CoreError {
        CoreError::Protocol(format!("expected {expected}, got {}", self.type_name()))
    }
}

impl From<Primitive> for RemoteValue {
    fn from(value: Primitive) -> Self {
        match value {
            Primitive::None => Self::None,
            Primitive::Bool(b) => Self::Bool(b),
            Primitive::Int(n) => Self::Int(n),
            Primitive::Float(f) => Self::Float(f),
            Primitive::Str(s) => Self::Str(s),
        }
    }
}

impl From<bool> for RemoteValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for RemoteValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for RemoteValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for RemoteValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for RemoteValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for RemoteValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl<T: Into<RemoteValue>> From<Vec<T>> for RemoteValue {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<RemoteValue>> From<Option<T>> for RemoteValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::None, Into::into)
    }
}

impl From<RemoteObject> for RemoteValue {
    fn from(object: RemoteObject) -> Self {
        if object.is_stream() {
            Self::Stream(object)
        } else {
            Self::Object(object)
        }
    }
}

impl TryFrom<RemoteValue> for bool {
    type Error = CoreError;

    fn try_from(value: RemoteValue) -> Result<Self, Self::Error> {
        value.as_bool().ok_or_else(|| value.mismatch("bool"))
    }
}

impl TryFrom<RemoteValue> for i64 {
    type Error = CoreError;

    fn try_from(value: RemoteValue) -> Result<Self, Self::Error> {
        value.as_i64().ok_or_else(|| value.mismatch("int"))
    }
}

impl TryFrom<RemoteValue> for f64 {
    type Error = CoreError;

    fn try_from(value: RemoteValue) -> Result<Self, Self::Error> {
        value.as_f64().ok_or_else(|| value.mismatch("float"))
    }
}

impl TryFrom<RemoteValue> for String {
    type Error = CoreError;

    fn try_from(value: RemoteValue) -> Result<Self, Self::Error> {
        match value {
            RemoteValue::Str(s) => Ok(s),
            other => Err(other.mismatch("str")),
        }
    }
}

impl TryFrom<RemoteValue> for RemoteObject {
    type Error = CoreError;

    fn try_from(value: RemoteValue) -> Result<Self, Self::Error> {
        match value {
            RemoteValue::Object(o) | RemoteValue::Stream(o) => Ok(o),
            other => Err(other.mismatch("object")),
        }
    }
}

impl<T> TryFrom<RemoteValue> for Vec<T>
where
    T: TryFrom<RemoteValue, Error = CoreError>,
{
    type Error = CoreError;

    fn try_from(value: RemoteValue) -> Result<Self, Self::Error> {
        match value {
            RemoteValue::List(items) | RemoteValue::Tuple(items) | RemoteValue::Set(items) => {
                items.into_iter().map(T::try_from).collect()
            }
            other => Err(other.mismatch("sequence")),
        }
    }
}

/// Guest-style repr: strings quoted, `True`/`False`, one-element tuples
/// with a trailing comma.
impl fmt::Display for RemoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) if x.fract() == 0.0 && x.is_finite() => write!(f, "{x:.1}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Self::List(items) => write_items(f, "[", items, "]"),
            Self::Tuple(items) if items.len() == 1 => write!(f, "({},)", items[0]),
            Self::Tuple(items) => write_items(f, "(", items, ")"),
            Self::Set(items) if items.is_empty() => f.write_str("set()"),
            Self::Set(items) => write_items(f, "{", items, "}"),
            Self::Dict(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {value}", RemoteValue::from(key.clone()))?;
                }
                f.write_str("}")
            }
            Self::Object(o) | Self::Stream(o) => write!(f, "{o}"),
        }
    }
}

fn write_items(
    f: &mut fmt::Formatter<'_>,
    open: &str,
    items: &[RemoteValue],
    close: &str,
) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(close)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_guest_repr() {
        let value = RemoteValue::List(vec![
            RemoteValue::Int(1),
            RemoteValue::Float(2.0),
            RemoteValue::from("it's"),
            RemoteValue::Tuple(vec![RemoteValue::Bool(true)]),
            RemoteValue::None,
        ]);
        assert_eq!(value.to_string(), "[1, 2.0, 'it\\'s', (True,), None]");
        assert_eq!(RemoteValue::Set(vec![]).to_string(), "set()");
    }

    #[test]
    fn test_try_from_conversions() {
        let n: i64 = RemoteValue::Int(7).try_into().unwrap();
        assert_eq!(n, 7);

        let names: Vec<String> = RemoteValue::from(vec!["a", "b"]).try_into().unwrap();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);

        let err = String::try_from(RemoteValue::Int(1)).unwrap_err();
        assert_eq!(err.to_string(), "protocol error: expected str, got int");
    }

    #[test]
    fn test_dict_lookup() {
        let dict = RemoteValue::Dict(vec![
            (Primitive::Int(1), RemoteValue::from("one")),
            (Primitive::from("two"), RemoteValue::Int(2)),
        ]);
        assert_eq!(dict.get("two"), Some(&RemoteValue::Int(2)));
        assert_eq!(dict.get("one"), None);
        assert_eq!(dict.to_string(), "{1: 'one', 'two': 2}");
    }

    #[test]
    fn test_float_widening() {
        assert_eq!(RemoteValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(RemoteValue::from("3").as_f64(), None);
    }
}
