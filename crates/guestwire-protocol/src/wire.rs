//! Marshalled value representation.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Keyword arguments as they travel on the wire, in call order.
pub type WireKwargs = Vec<(String, WireValue)>;

/// A JSON-safe scalar.
///
/// Serialized untagged so that a primitive looks like plain JSON
/// (`null`, `true`, `3`, `2.5`, `"text"`). Integers and floats stay
/// distinct: `2` decodes as [`Primitive::Int`], `2.0` as [`Primitive::Float`].
/// JSON has no infinities or NaN, so those travel as `{"float": "inf"}`,
/// `{"float": "-inf"}` and `{"float": "nan"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Primitive {
    /// The null value.
    None,
    /// A boolean.
    Bool(bool),
    /// A signed 64-bit integer.
    Int(i64),
    /// A 64-bit float.
    Float(#[serde(with = "float_repr")] f64),
    /// A UTF-8 string.
    Str(String),
}

mod float_repr {
    use serde::de::Error as _;
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Finite(f64),
        Special { float: String },
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            return serializer.serialize_f64(*value);
        }
        let name = if value.is_nan() {
            "nan"
        } else if value.is_sign_positive() {
            "inf"
        } else {
            "-inf"
        };
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("float", name)?;
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Finite(value) => Ok(value),
            Repr::Special { float } => match float.as_str() {
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                "nan" => Ok(f64::NAN),
                other => Err(D::Error::custom(format!("unknown float value '{other}'"))),
            },
        }
    }
}

impl Primitive {
    /// Name of the primitive's type, as the guest reports it.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
        }
    }
}

impl From<&str> for Primitive {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Primitive {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Primitive {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for Primitive {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// The container a [`WireValue::Sequence`] was packed from.
///
/// The receiver rebuilds the same kind of container, so a tuple stays a
/// tuple and a set stays a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Container {
    List,
    Tuple,
    Set,
}

/// Identity of an object held in a guest-side registry.
///
/// `registry` names the registry instance that issued the id, so an id
/// presented to a different (or restarted) registry is recognised as stale
/// instead of aliasing an unrelated object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    /// Registry instance that issued the id.
    pub registry: Uuid,
    /// Slot within that registry. Never reused.
    pub slot: u64,
}

impl ObjectId {
    pub fn new(registry: Uuid, slot: u64) -> Self {
        Self { registry, slot }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.slot)
    }
}

/// A publicly invocable method discovered on a guest object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    /// Method name.
    pub name: String,
    /// Docstring, if the method has one.
    #[serde(default)]
    pub doc: Option<String>,
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>, doc: Option<&str>) -> Self {
        Self {
            name: name.into(),
            doc: doc.map(str::to_string),
        }
    }
}

/// Everything the host needs to build a proxy for a guest object.
///
/// The method list is a snapshot taken when the object was packed; it is
/// not refreshed if the guest object changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    /// Registry identity of the object.
    pub id: ObjectId,
    /// Class name of the object in the guest.
    pub class_name: String,
    /// Module the class belongs to.
    pub module_name: String,
    /// Invocable methods, in a stable order.
    #[serde(default)]
    pub methods: Vec<MethodDescriptor>,
}

/// The marshalled form of any value crossing the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireValue {
    /// A scalar, carried by value.
    Primitive { value: Primitive },
    /// An ordered collection, carried by value.
    Sequence {
        container: Container,
        items: Vec<WireValue>,
    },
    /// A key/value collection with scalar keys, carried by value.
    Mapping { entries: Vec<(Primitive, WireValue)> },
    /// An opaque guest object, carried by identity.
    Reference(ObjectDescriptor),
    /// A file-like guest object, carried by identity.
    Stream(ObjectDescriptor),
}

impl WireValue {
    /// Wrap a scalar.
    pub fn primitive(value: impl Into<Primitive>) -> Self {
        Self::Primitive {
            value: value.into(),
        }
    }

    /// The null value.
    pub fn none() -> Self {
        Self::Primitive {
            value: Primitive::None,
        }
    }

    /// Name of the variant, for logs and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Primitive { .. } => "primitive",
            Self::Sequence { .. } => "sequence",
            Self::Mapping { .. } => "mapping",
            Self::Reference(_) => "reference",
            Self::Stream(_) => "stream",
        }
    }

    /// Descriptor of a by-identity value.
    pub fn descriptor(&self) -> Option<&ObjectDescriptor> {
        match self {
            Self::Reference(d) | Self::Stream(d) => Some(d),
            _ => None,
        }
    }
}

/// How the guest classifies an attribute of a module.
///
/// Returned by the `inspect` operation so a module handle can decide, in a
/// single round trip, whether to hand out a submodule handle, a callable
/// handle or the attribute's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeKind {
    Module,
    Callable,
    Value { value: WireValue },
}
