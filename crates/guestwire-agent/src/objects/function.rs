//! Native functions and bound methods.

use crate::args::Args;
use crate::error::{GuestError, Result};
use crate::ops;
use crate::value::{GuestObject, Kwargs, ObjectRef, Value};
use std::fmt;
use std::sync::Arc;

/// Signature of a function implemented in Rust.
pub type NativeFn = Arc<dyn Fn(Vec<Value>, Kwargs) -> Result<Value> + Send + Sync>;

/// A function implemented in Rust and exposed to guest code.
pub struct NativeFunction {
    name: String,
    doc: Option<&'static str>,
    func: NativeFn,
}

impl NativeFunction {
    pub fn new<F>(name: impl Into<String>, doc: &'static str, func: F) -> Self
    where
        F: Fn(Vec<Value>, Kwargs) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            doc: (!doc.is_empty()).then_some(doc),
            func: Arc::new(func),
        }
    }

    /// A native function that reads its parameters through [`Args`].
    pub fn with_args<F>(name: &str, doc: &'static str, func: F) -> Self
    where
        F: Fn(&Args<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        let owned = name.to_string();
        Self::new(name, doc, move |positional, kwargs| {
            func(&Args::new(&owned, &positional, &kwargs))
        })
    }

    pub fn into_ref(self) -> ObjectRef {
        Arc::new(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl GuestObject for NativeFunction {
    fn class_name(&self) -> &str {
        "builtin_function_or_method"
    }

    fn attr_names(&self) -> Vec<String> {
        vec!["__name__".into(), "__doc__".into()]
    }

    fn get_attr(&self, name: &str) -> Result<Value> {
        match name {
            "__name__" => Ok(Value::str(&self.name)),
            "__doc__" => Ok(self.doc.map(Value::from).unwrap_or(Value::None)),
            _ => Err(GuestError::attribute_error(self.class_name(), name)),
        }
    }

    fn call(&self, args: Vec<Value>, kwargs: Kwargs) -> Result<Value> {
        (self.func)(args, kwargs)
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn repr(&self) -> String {
        format!("<built-in function {}>", self.name)
    }
}

/// A method looked up on a receiver, invocable later.
#[derive(Debug)]
pub struct BoundMethod {
    receiver: Value,
    name: String,
}

impl BoundMethod {
    pub fn new(receiver: Value, name: impl Into<String>) -> Self {
        Self {
            receiver,
            name: name.into(),
        }
    }

    pub fn into_ref(self) -> ObjectRef {
        Arc::new(self)
    }
}

impl GuestObject for BoundMethod {
    fn class_name(&self) -> &str {
        "method"
    }

    fn attr_names(&self) -> Vec<String> {
        vec!["__name__".into(), "__self__".into()]
    }

    fn get_attr(&self, name: &str) -> Result<Value> {
        match name {
            "__name__" => Ok(Value::str(&self.name)),
            "__self__" => Ok(self.receiver.clone()),
            _ => Err(GuestError::attribute_error(self.class_name(), name)),
        }
    }

    fn call(&self, args: Vec<Value>, kwargs: Kwargs) -> Result<Value> {
        ops::invoke_method(&self.receiver, &self.name, args, kwargs)
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn repr(&self) -> String {
        format!(
            "<bound method {}.{} of {}>",
            self.receiver.type_name(),
            self.name,
            self.receiver.to_repr()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_call() {
        let double = NativeFunction::new("double", "Double a number.", |args, _| {
            match args.first() {
                Some(Value::Int(n)) => Ok(Value::Int(n * 2)),
                _ => Err(GuestError::type_error("expected int")),
            }
        });
        assert_eq!(double.call(vec![Value::Int(4)], vec![]).unwrap(), Value::Int(8));
        assert!(double.call(vec![], vec![]).is_err());
        assert_eq!(
            double.get_attr("__doc__").unwrap(),
            Value::str("Double a number.")
        );
        assert!(double.is_callable());
    }

    #[test]
    fn test_bound_method_on_data() {
        let method = BoundMethod::new(Value::str("hello"), "upper");
        assert_eq!(method.call(vec![], vec![]).unwrap(), Value::str("HELLO"));
        assert_eq!(method.get_attr("__name__").unwrap(), Value::str("upper"));
    }
}
