//! Functions defined by guest code.

use super::ast::FunctionDef;
use super::eval::{Flow, Frame};
use super::Runtime;
use crate::error::{GuestError, Result};
use crate::value::{GuestObject, Kwargs, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Deepest nesting of guest function calls.
pub const MAX_CALL_DEPTH: usize = 100;

/// A function created by a `def` statement.
///
/// Holds a weak handle to its runtime; the runtime's globals own the
/// function, not the other way round.
#[derive(Debug)]
pub struct UserFunction {
    def: Arc<FunctionDef>,
    defaults: Vec<Option<Value>>,
    runtime: Weak<Runtime>,
}

impl UserFunction {
    pub(crate) fn new(def: Arc<FunctionDef>, defaults: Vec<Option<Value>>, runtime: Weak<Runtime>) -> Self {
        Self {
            def,
            defaults,
            runtime,
        }
    }

    /// Match call arguments to parameters.
    fn bind(&self, args: Vec<Value>, kwargs: Kwargs) -> Result<HashMap<String, Value>> {
        let params = &self.def.params;
        if args.len() > params.len() {
            return Err(GuestError::type_error(format!(
                "{}() takes {} positional arguments but {} were given",
                self.def.name,
                params.len(),
                args.len()
            )));
        }

        let mut slots: Vec<Option<Value>> = args.into_iter().map(Some).collect();
        slots.resize(params.len(), None);

        for (name, value) in kwargs {
            let index = params.iter().position(|p| p.name == name).ok_or_else(|| {
                GuestError::type_error(format!(
                    "{}() got an unexpected keyword argument '{name}'",
                    self.def.name
                ))
            })?;
            if slots[index].is_some() {
                return Err(GuestError::type_error(format!(
                    "{}() got multiple values for argument '{name}'",
                    self.def.name
                )));
            }
            slots[index] = Some(value);
        }

        let mut locals = HashMap::with_capacity(params.len());
        for ((param, slot), default) in params.iter().zip(slots).zip(&self.defaults) {
            let value = slot.or_else(|| default.clone()).ok_or_else(|| {
                GuestError::type_error(format!(
                    "{}() missing required argument: '{}'",
                    self.def.name, param.name
                ))
            })?;
            locals.insert(param.name.clone(), value);
        }
        Ok(locals)
    }
}

struct DepthGuard<'a>(&'a AtomicUsize);

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a AtomicUsize) -> Result<Self> {
        if depth.fetch_add(1, Ordering::SeqCst) >= MAX_CALL_DEPTH {
            depth.fetch_sub(1, Ordering::SeqCst);
            return Err(GuestError::raise_named(
                "RecursionError",
                "maximum recursion depth exceeded",
            ));
        }
        Ok(Self(depth))
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl GuestObject for UserFunction {
    fn class_name(&self) -> &str {
        "function"
    }

    fn module_name(&self) -> &str {
        "__main__"
    }

    fn attr_names(&self) -> Vec<String> {
        vec!["__name__".into(), "__doc__".into()]
    }

    fn get_attr(&self, name: &str) -> Result<Value> {
        match name {
            "__name__" => Ok(Value::str(&self.def.name)),
            "__doc__" => Ok(self.def.doc.clone().map(Value::Str).unwrap_or(Value::None)),
            _ => Err(GuestError::attribute_error("function", name)),
        }
    }

    fn call(&self, args: Vec<Value>, kwargs: Kwargs) -> Result<Value> {
        let runtime = self
            .runtime
            .upgrade()
            .ok_or_else(|| GuestError::runtime_error("interpreter has shut down"))?;
        let _depth = DepthGuard::enter(&runtime.depth)?;

        let locals = self.bind(args, kwargs)?;
        let mut frame = Frame::function(&runtime, locals);
        match frame.exec_block(&self.def.body)? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn repr(&self) -> String {
        format!("<function {}>", self.def.name)
    }
}
