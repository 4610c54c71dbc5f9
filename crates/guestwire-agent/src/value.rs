//! Runtime values of the guest interpreter.

use crate::error::{GuestError, Result};
use guestwire_protocol::MethodDescriptor;
use std::fmt;
use std::sync::Arc;

/// Shared handle to a guest object.
pub type ObjectRef = Arc<dyn GuestObject>;

/// Keyword arguments, in call order.
pub type Kwargs = Vec<(String, Value)>;

/// A guest value.
///
/// Containers hold their items by value. Everything with behaviour or
/// identity (modules, functions, open files) is an [`ObjectRef`].
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    /// Insertion-ordered, without duplicates.
    Set(Vec<Value>),
    /// Insertion-ordered entries. Keys are always scalars.
    Dict(Vec<(Value, Value)>),
    Object(ObjectRef),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    /// Name of the value's type.
    pub fn type_name(&self) -> String {
        match self {
            Self::None => "NoneType".into(),
            Self::Bool(_) => "bool".into(),
            Self::Int(_) => "int".into(),
            Self::Float(_) => "float".into(),
            Self::Str(_) => "str".into(),
            Self::List(_) => "list".into(),
            Self::Tuple(_) => "tuple".into(),
            Self::Set(_) => "set".into(),
            Self::Dict(_) => "dict".into(),
            Self::Object(obj) => obj.class_name().to_string(),
        }
    }

    /// Whether the value is a scalar that may key a dict.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Self::None | Self::Bool(_) | Self::Int(_) | Self::Float(_) | Self::Str(_)
        )
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness.
    pub fn truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) | Self::Tuple(items) | Self::Set(items) => !items.is_empty(),
            Self::Dict(entries) => !entries.is_empty(),
            Self::Object(_) => true,
        }
    }

    /// Numeric view, with bools as 0 and 1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Int(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer view, with bools as 0 and 1.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Human-readable form, as `str()` renders it.
    pub fn to_display(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Object(obj) => obj.str(),
            other => other.to_repr(),
        }
    }

    /// Unambiguous form, as `repr()` renders it.
    pub fn to_repr(&self) -> String {
        match self {
            Self::None => "None".into(),
            Self::Bool(true) => "True".into(),
            Self::Bool(false) => "False".into(),
            Self::Int(n) => n.to_string(),
            Self::Float(f) => format_float(*f),
            Self::Str(s) => quote(s),
            Self::List(items) => format!("[{}]", join_repr(items)),
            Self::Tuple(items) if items.len() == 1 => format!("({},)", items[0].to_repr()),
            Self::Tuple(items) => format!("({})", join_repr(items)),
            Self::Set(items) if items.is_empty() => "set()".into(),
            Self::Set(items) => format!("{{{}}}", join_repr(items)),
            Self::Dict(entries) => {
                let parts: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.to_repr(), v.to_repr()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Self::Object(obj) => obj.repr(),
        }
    }

    /// Equality as the `==` operator sees it: numbers compare across int,
    /// float and bool, sets ignore order, objects compare by identity.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) | (Self::Tuple(a), Self::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (Self::Set(a), Self::Set(b)) => {
                a.len() == b.len() && a.iter().all(|x| b.iter().any(|y| x.loose_eq(y)))
            }
            (Self::Dict(a), Self::Dict(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.iter()
                            .find(|(k2, _)| k.loose_eq(k2))
                            .is_some_and(|(_, v2)| v.loose_eq(v2))
                    })
            }
            (Self::Object(a), Self::Object(b)) => same_object(a, b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

/// Strict structural equality: variants must match exactly.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Tuple(a), Self::Tuple(b)) => a == b,
            (Self::Set(a), Self::Set(b)) => a == b,
            (Self::Dict(a), Self::Dict(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => same_object(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Self::Object(obj)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display())
    }
}

/// Whether two handles point at the same object.
pub fn same_object(a: &ObjectRef, b: &ObjectRef) -> bool {
    identity(a) == identity(b)
}

/// Address of the object behind a handle, used as its identity.
pub fn identity(obj: &ObjectRef) -> usize {
    Arc::as_ptr(obj) as *const () as usize
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".into()
    } else if f.is_infinite() {
        if f > 0.0 { "inf".into() } else { "-inf".into() }
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

fn quote(s: &str) -> String {
    let delim = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(delim);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == delim => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(delim);
    out
}

fn join_repr(items: &[Value]) -> String {
    items
        .iter()
        .map(Value::to_repr)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Behaviour shared by every guest object.
///
/// Attribute access, calls and method invocation are the only ways the
/// interpreter and the remote operations touch an object. Defaults describe
/// an inert object with no attributes.
pub trait GuestObject: Send + Sync + fmt::Debug {
    /// Class name, e.g. `TextIOWrapper`.
    fn class_name(&self) -> &str;

    /// Module the class lives in.
    fn module_name(&self) -> &str {
        "builtins"
    }

    /// Methods the object can be asked to run, in declaration order.
    fn methods(&self) -> Vec<MethodDescriptor> {
        Vec::new()
    }

    /// Data attribute names, for `dir()`.
    fn attr_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Read a data attribute. Methods are resolved by the caller.
    fn get_attr(&self, name: &str) -> Result<Value> {
        Err(GuestError::attribute_error(self.class_name(), name))
    }

    fn set_attr(&self, name: &str, _value: Value) -> Result<()> {
        Err(GuestError::attribute_error(self.class_name(), name))
    }

    fn del_attr(&self, name: &str) -> Result<()> {
        Err(GuestError::attribute_error(self.class_name(), name))
    }

    /// Invoke the object itself.
    fn call(&self, _args: Vec<Value>, _kwargs: Kwargs) -> Result<Value> {
        Err(GuestError::type_error(format!(
            "'{}' object is not callable",
            self.class_name()
        )))
    }

    /// Run one of the methods listed by [`GuestObject::methods`].
    fn call_method(&self, name: &str, _args: Vec<Value>, _kwargs: Kwargs) -> Result<Value> {
        Err(GuestError::attribute_error(self.class_name(), name))
    }

    /// Items produced by `for x in obj`.
    fn iterate(&self) -> Result<Vec<Value>> {
        Err(GuestError::type_error(format!(
            "'{}' object is not iterable",
            self.class_name()
        )))
    }

    fn is_callable(&self) -> bool {
        false
    }

    /// Whether the object is file-like and travels as a stream.
    fn is_stream(&self) -> bool {
        false
    }

    fn is_module(&self) -> bool {
        false
    }

    fn repr(&self) -> String {
        format!("<{}.{} object>", self.module_name(), self.class_name())
    }

    fn str(&self) -> String {
        self.repr()
    }
}
