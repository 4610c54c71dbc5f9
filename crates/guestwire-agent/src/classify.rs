//! Decide how a guest value crosses the wire.
//!
//! Classification is an ordered chain of rules; the first rule that accepts
//! a value decides its kind, and anything no rule accepts travels by
//! reference. The order matters: a file is iterable but must stay a stream,
//! and a string is iterable but must stay a primitive.

use crate::value::Value;
use guestwire_protocol::Container;

/// Wire kind chosen for a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// A file-like object, sent as a stream handle.
    Stream,
    /// A dict with scalar keys, sent by value.
    Mapping,
    /// An ordered collection, sent by value as the given container.
    Sequence(Container),
    /// A scalar, sent by value.
    Primitive,
    /// Anything else, sent by identity.
    Reference,
}

type Rule = fn(&Value) -> Option<Classification>;

/// Rules in priority order.
const RULES: &[Rule] = &[stream, mapping, sequence, primitive];

/// Classify `value`. Never fails: unmatched values are references.
pub fn classify(value: &Value) -> Classification {
    RULES
        .iter()
        .find_map(|rule| rule(value))
        .unwrap_or(Classification::Reference)
}

fn stream(value: &Value) -> Option<Classification> {
    value
        .as_object()
        .filter(|obj| obj.is_stream())
        .map(|_| Classification::Stream)
}

fn mapping(value: &Value) -> Option<Classification> {
    match value {
        Value::Dict(entries) if entries.iter().all(|(k, _)| k.is_scalar()) => {
            Some(Classification::Mapping)
        }
        _ => None,
    }
}

/// Iterable and not text.
fn sequence(value: &Value) -> Option<Classification> {
    let container = match value {
        Value::List(_) => Container::List,
        Value::Tuple(_) => Container::Tuple,
        Value::Set(_) => Container::Set,
        _ => return None,
    };
    Some(Classification::Sequence(container))
}

fn primitive(value: &Value) -> Option<Classification> {
    value.is_scalar().then_some(Classification::Primitive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{FileObject, ModuleObject, OpaqueValue};
    use std::sync::Arc;

    #[test]
    fn test_scalars_are_primitive() {
        for value in [
            Value::None,
            Value::Bool(true),
            Value::Int(3),
            Value::Float(1.5),
            Value::str(""),
        ] {
            assert_eq!(classify(&value), Classification::Primitive);
        }
    }

    #[test]
    fn test_string_is_never_a_sequence() {
        assert_eq!(classify(&Value::str("abc")), Classification::Primitive);
    }

    #[test]
    fn test_containers_keep_their_kind() {
        assert_eq!(
            classify(&Value::List(vec![])),
            Classification::Sequence(Container::List)
        );
        assert_eq!(
            classify(&Value::Tuple(vec![Value::Int(1)])),
            Classification::Sequence(Container::Tuple)
        );
        assert_eq!(
            classify(&Value::Set(vec![])),
            Classification::Sequence(Container::Set)
        );
        assert_eq!(
            classify(&Value::Dict(vec![(Value::str("k"), Value::List(vec![]))])),
            Classification::Mapping
        );
    }

    #[test]
    fn test_dict_with_unsafe_keys_is_a_reference() {
        let dict = Value::Dict(vec![(Value::Tuple(vec![Value::Int(1)]), Value::None)]);
        assert_eq!(classify(&dict), Classification::Reference);
    }

    #[test]
    fn test_objects() {
        let module = Value::Object(ModuleObject::new("m", None).into_ref());
        assert_eq!(classify(&module), Classification::Reference);

        let opaque = Value::Object(OpaqueValue::wrap(Value::Int(1)));
        assert_eq!(classify(&opaque), Classification::Reference);

        let path = std::env::temp_dir().join(format!("guestwire-classify-{}", std::process::id()));
        let file = FileObject::open(&path.to_string_lossy(), "w", 1024).unwrap();
        let file = Value::Object(Arc::new(file));
        assert_eq!(classify(&file), Classification::Stream);
        let _ = std::fs::remove_file(path);
    }
}
