//! Module objects.

use crate::error::{GuestError, Result};
use crate::value::{GuestObject, Kwargs, ObjectRef, Value};
use guestwire_protocol::{ExceptionKind, MethodDescriptor};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// A namespace of functions, constants and submodules.
///
/// Attributes are mutable: guest code may assign or delete them, and the
/// change is visible to every holder of the module.
#[derive(Debug)]
pub struct ModuleObject {
    name: String,
    doc: Option<String>,
    attrs: Mutex<BTreeMap<String, Value>>,
}

impl ModuleObject {
    pub fn new(name: impl Into<String>, doc: Option<&str>) -> Self {
        Self {
            name: name.into(),
            doc: doc.map(str::to_string),
            attrs: Mutex::new(BTreeMap::new()),
        }
    }

    /// Builder-style attribute insertion used when assembling native modules.
    pub fn with(self, name: &str, value: impl Into<Value>) -> Self {
        self.lock().insert(name.to_string(), value.into());
        self
    }

    pub fn into_ref(self) -> ObjectRef {
        Arc::new(self)
    }

    /// Fully qualified module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up an attribute without raising.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.lock().get(name).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        self.attrs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl GuestObject for ModuleObject {
    fn class_name(&self) -> &str {
        "module"
    }

    /// Callable attributes, which is what a module handle can invoke.
    fn methods(&self) -> Vec<MethodDescriptor> {
        self.lock()
            .iter()
            .filter_map(|(name, value)| match value {
                Value::Object(obj) if obj.is_callable() && !obj.is_module() => {
                    let doc = obj.get_attr("__doc__").ok();
                    Some(MethodDescriptor::new(
                        name.clone(),
                        doc.as_ref().and_then(Value::as_str),
                    ))
                }
                _ => None,
            })
            .collect()
    }

    fn attr_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.extend(["__name__".to_string(), "__doc__".to_string()]);
        names
    }

    fn get_attr(&self, name: &str) -> Result<Value> {
        match name {
            "__name__" => Ok(Value::str(&self.name)),
            "__doc__" => Ok(self.doc.clone().map(Value::Str).unwrap_or(Value::None)),
            _ => self.lookup(name).ok_or_else(|| {
                GuestError::raise(
                    ExceptionKind::AttributeError,
                    format!("module '{}' has no attribute '{name}'", self.name),
                )
            }),
        }
    }

    fn set_attr(&self, name: &str, value: Value) -> Result<()> {
        self.lock().insert(name.to_string(), value);
        Ok(())
    }

    fn del_attr(&self, name: &str) -> Result<()> {
        match self.lock().remove(name) {
            Some(_) => Ok(()),
            None => Err(GuestError::attribute_error("module", name)),
        }
    }

    fn call_method(&self, name: &str, args: Vec<Value>, kwargs: Kwargs) -> Result<Value> {
        match self.get_attr(name)? {
            Value::Object(obj) => obj.call(args, kwargs),
            other => Err(GuestError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn is_module(&self) -> bool {
        true
    }

    fn repr(&self) -> String {
        format!("<module '{}'>", self.name)
    }
}
