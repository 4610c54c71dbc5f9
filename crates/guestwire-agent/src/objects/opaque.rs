//! Wrapper that lets any value travel by reference.

use crate::value::{GuestObject, ObjectRef, Value};
use std::sync::Arc;

/// A value that cannot be marshalled by value, held so it can be referenced.
///
/// Produced for dicts whose keys are not scalars; the host sees it as an
/// opaque reference and can still ask for its `str`/`repr`.
#[derive(Debug)]
pub struct OpaqueValue {
    type_name: String,
    value: Value,
}

impl OpaqueValue {
    pub fn wrap(value: Value) -> ObjectRef {
        Arc::new(Self {
            type_name: value.type_name(),
            value,
        })
    }
}

impl GuestObject for OpaqueValue {
    fn class_name(&self) -> &str {
        &self.type_name
    }

    fn repr(&self) -> String {
        self.value.to_repr()
    }
}
