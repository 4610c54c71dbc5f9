//! Host-side marshalling.
//!
//! Packing never fails: every [`RemoteValue`] has a wire form, and object
//! handles travel back as the descriptor they arrived with. Unpacking turns
//! every reference into a [`RemoteObject`] bound to the session it came
//! from.

use crate::proxy::RemoteObject;
use crate::session::RemoteSession;
use crate::value::RemoteValue;
use guestwire_protocol::{Container, Primitive, WireKwargs, WireValue};

/// Convert a host value to its wire form.
pub fn pack(value: &RemoteValue) -> WireValue {
    match value {
        RemoteValue::None => WireValue::none(),
        RemoteValue::Bool(b) => WireValue::primitive(*b),
        RemoteValue::Int(n) => WireValue::primitive(*n),
        RemoteValue::Float(x) => WireValue::Primitive {
            value: Primitive::Float(*x),
        },
        RemoteValue::Str(s) => WireValue::primitive(s.as_str()),
        RemoteValue::List(items) => sequence(Container::List, items),
        RemoteValue::Tuple(items) => sequence(Container::Tuple, items),
        RemoteValue::Set(items) => sequence(Container::Set, items),
        RemoteValue::Dict(entries) => WireValue::Mapping {
            entries: entries
                .iter()
                .map(|(key, value)| (key.clone(), pack(value)))
                .collect(),
        },
        RemoteValue::Object(object) => WireValue::Reference(object.descriptor().clone()),
        RemoteValue::Stream(object) => WireValue::Stream(object.descriptor().clone()),
    }
}

fn sequence(container: Container, items: &[RemoteValue]) -> WireValue {
    WireValue::Sequence {
        container,
        items: items.iter().map(pack).collect(),
    }
}

/// Pack call arguments.
pub fn pack_args(args: &[RemoteValue], kwargs: &[(&str, RemoteValue)]) -> (Vec<WireValue>, WireKwargs) {
    let args = args.iter().map(pack).collect();
    let kwargs = kwargs
        .iter()
        .map(|(name, value)| (name.to_string(), pack(value)))
        .collect();
    (args, kwargs)
}

/// Convert a wire value into a host value, creating handles for references.
pub fn unpack(session: &RemoteSession, wire: WireValue) -> RemoteValue {
    match wire {
        WireValue::Primitive { value } => value.into(),
        WireValue::Sequence { container, items } => {
            let items = items.into_iter().map(|item| unpack(session, item)).collect();
            match container {
                Container::List => RemoteValue::List(items),
                Container::Tuple => RemoteValue::Tuple(items),
                Container::Set => RemoteValue::Set(items),
            }
        }
        WireValue::Mapping { entries } => RemoteValue::Dict(
            entries
                .into_iter()
                .map(|(key, value)| (key, unpack(session, value)))
                .collect(),
        ),
        WireValue::Reference(descriptor) => {
            RemoteValue::Object(RemoteObject::new(session.clone(), descriptor, false))
        }
        WireValue::Stream(descriptor) => {
            RemoteValue::Stream(RemoteObject::new(session.clone(), descriptor, true))
        }
    }
}
