//! Guest-side conversion between [`Value`] and [`WireValue`].

use crate::classify::{classify, Classification};
use crate::error::Result;
use crate::introspect;
use crate::objects::OpaqueValue;
use crate::registry::ObjectRegistry;
use crate::value::{Kwargs, ObjectRef, Value};
use guestwire_protocol::{Container, Primitive, WireKwargs, WireValue};
use tracing::trace;

/// Packs and unpacks values against one session's registry.
///
/// Packing a reference or stream registers the object (and bumps its
/// reference count); unpacking one resolves it. Neither direction is pure.
pub struct Marshaller<'a> {
    registry: &'a ObjectRegistry,
}

impl<'a> Marshaller<'a> {
    pub fn new(registry: &'a ObjectRegistry) -> Self {
        Self { registry }
    }

    /// Convert a guest value to its wire form.
    ///
    /// Side effect: objects sent by identity are registered.
    pub fn pack(&self, value: &Value) -> WireValue {
        match classify(value) {
            Classification::Primitive => WireValue::Primitive {
                value: to_primitive(value),
            },
            Classification::Sequence(container) => WireValue::Sequence {
                container,
                items: sequence_items(value).iter().map(|v| self.pack(v)).collect(),
            },
            Classification::Mapping => {
                let entries = match value {
                    Value::Dict(entries) => entries
                        .iter()
                        .map(|(k, v)| (to_primitive(k), self.pack(v)))
                        .collect(),
                    _ => Vec::new(),
                };
                WireValue::Mapping { entries }
            }
            Classification::Stream => {
                let obj = self.object_of(value);
                WireValue::Stream(self.register(&obj))
            }
            Classification::Reference => {
                let obj = self.object_of(value);
                WireValue::Reference(self.register(&obj))
            }
        }
    }

    /// Convert a wire value back to a guest value.
    ///
    /// Side effect-free for data; references must resolve in this registry.
    pub fn unpack(&self, wire: &WireValue) -> Result<Value> {
        Ok(match wire {
            WireValue::Primitive { value } => from_primitive(value),
            WireValue::Sequence { container, items } => {
                let items = items
                    .iter()
                    .map(|item| self.unpack(item))
                    .collect::<Result<Vec<_>>>()?;
                match container {
                    Container::List => Value::List(items),
                    Container::Tuple => Value::Tuple(items),
                    Container::Set => Value::Set(crate::ops::set_from(items)?),
                }
            }
            WireValue::Mapping { entries } => Value::Dict(
                entries
                    .iter()
                    .map(|(k, v)| Ok((from_primitive(k), self.unpack(v)?)))
                    .collect::<Result<Vec<_>>>()?,
            ),
            WireValue::Reference(descriptor) | WireValue::Stream(descriptor) => {
                Value::Object(self.registry.resolve(&descriptor.id)?)
            }
        })
    }

    /// Unpack positional and keyword arguments.
    pub fn unpack_args(&self, args: &[WireValue], kwargs: &WireKwargs) -> Result<(Vec<Value>, Kwargs)> {
        let args = args
            .iter()
            .map(|a| self.unpack(a))
            .collect::<Result<Vec<_>>>()?;
        let kwargs = kwargs
            .iter()
            .map(|(name, value)| Ok((name.clone(), self.unpack(value)?)))
            .collect::<Result<Kwargs>>()?;
        Ok((args, kwargs))
    }

    /// Pack positional and keyword arguments.
    pub fn pack_args(&self, args: &[Value], kwargs: &Kwargs) -> (Vec<WireValue>, WireKwargs) {
        (
            args.iter().map(|a| self.pack(a)).collect(),
            kwargs
                .iter()
                .map(|(name, value)| (name.clone(), self.pack(value)))
                .collect(),
        )
    }

    /// The object behind a by-identity value. Data that fell through to the
    /// reference rule is boxed so it can live in the registry.
    fn object_of(&self, value: &Value) -> ObjectRef {
        match value {
            Value::Object(obj) => obj.clone(),
            data => OpaqueValue::wrap(data.clone()),
        }
    }

    fn register(&self, obj: &ObjectRef) -> guestwire_protocol::ObjectDescriptor {
        let id = self.registry.register(obj);
        trace!(object_id = %id, class = obj.class_name(), "packed by reference");
        introspect::descriptor(id, obj.as_ref())
    }
}

fn sequence_items(value: &Value) -> &[Value] {
    match value {
        Value::List(items) | Value::Tuple(items) | Value::Set(items) => items,
        _ => &[],
    }
}

fn to_primitive(value: &Value) -> Primitive {
    match value {
        Value::Bool(b) => Primitive::Bool(*b),
        Value::Int(n) => Primitive::Int(*n),
        Value::Float(f) => Primitive::Float(*f),
        Value::Str(s) => Primitive::Str(s.clone()),
        _ => Primitive::None,
    }
}

fn from_primitive(value: &Primitive) -> Value {
    match value {
        Primitive::None => Value::None,
        Primitive::Bool(b) => Value::Bool(*b),
        Primitive::Int(n) => Value::Int(*n),
        Primitive::Float(f) => Value::Float(*f),
        Primitive::Str(s) => Value::Str(s.clone()),
    }
}
