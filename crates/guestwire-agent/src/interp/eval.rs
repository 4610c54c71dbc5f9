//! Tree-walking evaluation.

use super::ast::{Const, Expr, Handler, Stmt, Target};
use super::function::UserFunction;
use super::Runtime;
use crate::error::{GuestError, Result};
use crate::objects::{exception_matches, ExceptionObject};
use crate::ops;
use crate::value::{Kwargs, Value};
use guestwire_protocol::ExceptionKind;
use std::collections::HashMap;
use std::sync::Arc;

/// How a statement finished.
pub(crate) enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// Name resolution scope for one activation.
///
/// Module-level code has no locals and assigns straight into the runtime's
/// globals. A function call gets a fresh local table.
pub(crate) struct Frame<'r> {
    runtime: &'r Arc<Runtime>,
    locals: Option<HashMap<String, Value>>,
    handling: Vec<GuestError>,
}

impl<'r> Frame<'r> {
    pub(crate) fn module(runtime: &'r Arc<Runtime>) -> Self {
        Self {
            runtime,
            locals: None,
            handling: Vec::new(),
        }
    }

    pub(crate) fn function(runtime: &'r Arc<Runtime>, locals: HashMap<String, Value>) -> Self {
        Self {
            runtime,
            locals: Some(locals),
            handling: Vec::new(),
        }
    }

    fn lookup(&self, name: &str) -> Result<Value> {
        if let Some(value) = self.locals.as_ref().and_then(|l| l.get(name)) {
            return Ok(value.clone());
        }
        if let Some(value) = self.runtime.global(name) {
            return Ok(value);
        }
        self.runtime
            .builtin(name)
            .ok_or_else(|| GuestError::name_error(name))
    }

    fn bind(&mut self, name: &str, value: Value) {
        match self.locals.as_mut() {
            Some(locals) => {
                locals.insert(name.to_string(), value);
            }
            None => self.runtime.set_global(name, value),
        }
    }

    fn unbind(&mut self, name: &str) -> Result<()> {
        let removed = match self.locals.as_mut() {
            Some(locals) => locals.remove(name).is_some(),
            None => self.runtime.remove_global(name),
        };
        if removed {
            Ok(())
        } else {
            Err(GuestError::name_error(name))
        }
    }

    // Statements

    pub(crate) fn exec_block(&mut self, stmts: &[Stmt]) -> Result<Flow> {
        for stmt in stmts {
            match self.exec(stmt)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Flow> {
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr)?;
            }
            Stmt::Assign(target, expr) => {
                let value = self.eval(expr)?;
                self.assign(target, value)?;
            }
            Stmt::AugAssign(target, op, expr) => {
                let current = match target {
                    Target::Name(name) => self.lookup(name)?,
                    Target::Attr(obj, name) => ops::get_attribute(&self.eval(obj)?, name)?,
                    Target::Unpack(_) => {
                        return Err(GuestError::syntax_error(
                            0,
                            "illegal expression for augmented assignment",
                        ))
                    }
                };
                let rhs = self.eval(expr)?;
                let value = ops::binary(*op, &current, &rhs)?;
                self.assign(target, value)?;
            }
            Stmt::Del(target) => match target {
                Target::Name(name) => self.unbind(name)?,
                Target::Attr(obj, name) => ops::del_attribute(&self.eval(obj)?, name)?,
                Target::Unpack(names) => {
                    for name in names {
                        self.unbind(name)?;
                    }
                }
            },
            Stmt::Import { module, alias } => {
                let (top, leaf) = self.runtime.modules.import(module)?;
                match alias {
                    Some(alias) => self.bind(alias, Value::Object(leaf)),
                    None => {
                        let top_name = module.split('.').next().unwrap_or(module);
                        self.bind(top_name, Value::Object(top));
                    }
                }
            }
            Stmt::FromImport { module, names } => {
                let (_, leaf) = self.runtime.modules.import(module)?;
                let leaf = Value::Object(leaf);
                for (name, alias) in names {
                    let value = match ops::get_attribute(&leaf, name) {
                        Ok(value) => value,
                        Err(_) => self
                            .runtime
                            .modules
                            .import(&format!("{module}.{name}"))
                            .map(|(_, sub)| Value::Object(sub))
                            .map_err(|_| {
                                GuestError::raise(
                                    ExceptionKind::ImportError,
                                    format!("cannot import name '{name}' from '{module}'"),
                                )
                            })?,
                    };
                    self.bind(alias.as_deref().unwrap_or(name), value);
                }
            }
            Stmt::Def(def) => {
                let defaults = def
                    .params
                    .iter()
                    .map(|p| p.default.as_ref().map(|d| self.eval(d)).transpose())
                    .collect::<Result<Vec<_>>>()?;
                let function =
                    UserFunction::new(def.clone(), defaults, Arc::downgrade(self.runtime));
                self.bind(&def.name, Value::Object(Arc::new(function)));
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::If {
                branches,
                otherwise,
            } => {
                for (cond, body) in branches {
                    if self.eval(cond)?.truthy() {
                        return self.exec_block(body);
                    }
                }
                return self.exec_block(otherwise);
            }
            Stmt::For { target, iter, body } => {
                let items = ops::iterate(&self.eval(iter)?)?;
                for item in items {
                    self.assign(target, item)?;
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            Stmt::While { cond, body } => {
                while self.eval(cond)?.truthy() {
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            Stmt::With {
                context,
                name,
                body,
            } => return self.exec_with(context, name.as_deref(), body),
            Stmt::Try {
                body,
                handlers,
                finally,
            } => return self.exec_try(body, handlers, finally),
            Stmt::Raise(None) => {
                return Err(self
                    .handling
                    .last()
                    .cloned()
                    .unwrap_or_else(|| GuestError::runtime_error("No active exception to reraise")))
            }
            Stmt::Raise(Some((type_name, message))) => {
                let message = match message {
                    Some(expr) => self.eval(expr)?.to_display(),
                    None => String::new(),
                };
                return Err(GuestError::raise_named(type_name.clone(), message));
            }
            Stmt::Suite(stmts) => return self.exec_block(stmts),
            Stmt::Break => return Ok(Flow::Break),
            Stmt::Continue => return Ok(Flow::Continue),
            Stmt::Pass => {}
        }
        Ok(Flow::Normal)
    }

    fn assign(&mut self, target: &Target, value: Value) -> Result<()> {
        match target {
            Target::Name(name) => self.bind(name, value),
            Target::Attr(obj, name) => ops::set_attribute(&self.eval(obj)?, name, value)?,
            Target::Unpack(names) => {
                let items = ops::iterate(&value)?;
                if items.len() < names.len() {
                    return Err(GuestError::value_error(format!(
                        "not enough values to unpack (expected {}, got {})",
                        names.len(),
                        items.len()
                    )));
                }
                if items.len() > names.len() {
                    return Err(GuestError::value_error(format!(
                        "too many values to unpack (expected {})",
                        names.len()
                    )));
                }
                for (name, item) in names.iter().zip(items) {
                    self.bind(name, item);
                }
            }
        }
        Ok(())
    }

    /// `with ctx as name:` calls `__exit__` however the body ends. A truthy
    /// return from `__exit__` swallows the body's exception.
    fn exec_with(&mut self, context: &Expr, name: Option<&str>, body: &[Stmt]) -> Result<Flow> {
        let manager = self.eval(context)?;
        let entered = ops::invoke_method(&manager, "__enter__", Vec::new(), Vec::new())?;
        if let Some(name) = name {
            self.bind(name, entered);
        }

        let outcome = self.exec_block(body);
        let exit_args = match &outcome {
            Err(GuestError::Raised { type_name, message }) => vec![
                Value::str(type_name),
                Value::str(message),
                Value::None,
            ],
            _ => vec![Value::None, Value::None, Value::None],
        };
        let suppress = ops::invoke_method(&manager, "__exit__", exit_args, Vec::new())?.truthy();

        match outcome {
            Err(GuestError::Raised { .. }) if suppress => Ok(Flow::Normal),
            other => other,
        }
    }

    fn exec_try(&mut self, body: &[Stmt], handlers: &[Handler], finally: &[Stmt]) -> Result<Flow> {
        let mut outcome = self.exec_block(body);

        if let Err(GuestError::Raised { type_name, message }) = &outcome {
            let (type_name, message) = (type_name.clone(), message.clone());
            let handler = handlers.iter().find(|h| {
                h.types.is_empty() || h.types.iter().any(|t| exception_matches(t, &type_name))
            });
            if let Some(handler) = handler {
                if let Some(name) = &handler.name {
                    let exc = ExceptionObject::new(type_name.clone(), message.clone());
                    self.bind(name, Value::Object(Arc::new(exc)));
                }
                self.handling.push(GuestError::Raised { type_name, message });
                outcome = self.exec_block(&handler.body);
                self.handling.pop();
            }
        }

        if !finally.is_empty() {
            match self.exec_block(finally)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        outcome
    }

    // Expressions

    pub(crate) fn eval(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Const(c) => Ok(match c {
                Const::None => Value::None,
                Const::Bool(b) => Value::Bool(*b),
                Const::Int(n) => Value::Int(*n),
                Const::Float(f) => Value::Float(*f),
                Const::Str(s) => Value::Str(s.clone()),
            }),
            Expr::Name(name) => self.lookup(name),
            Expr::Tuple(items) => Ok(Value::Tuple(self.eval_all(items)?)),
            Expr::List(items) => Ok(Value::List(self.eval_all(items)?)),
            Expr::Set(items) => Ok(Value::Set(ops::set_from(self.eval_all(items)?)?)),
            Expr::Dict(pairs) => {
                let mut entries = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    let key = self.eval(k)?;
                    let value = self.eval(v)?;
                    ops::dict_insert(&mut entries, key, value)?;
                }
                Ok(Value::Dict(entries))
            }
            Expr::Attr(obj, name) => ops::get_attribute(&self.eval(obj)?, name),
            Expr::Index(target, index) => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                ops::get_item(&target, &index)
            }
            Expr::Slice {
                target,
                start,
                stop,
            } => {
                let target = self.eval(target)?;
                let start = self.eval_bound(start.as_deref())?;
                let stop = self.eval_bound(stop.as_deref())?;
                ops::get_slice(&target, start, stop)
            }
            Expr::Call { func, args, kwargs } => {
                let (args, kwargs) = self.eval_arguments(args, kwargs)?;
                match func.as_ref() {
                    Expr::Attr(receiver, name) => {
                        let receiver = self.eval(receiver)?;
                        ops::invoke_method(&receiver, name, args, kwargs)
                    }
                    other => {
                        let callee = self.eval(other)?;
                        ops::call(&callee, args, kwargs)
                    }
                }
            }
            Expr::Neg(operand) => ops::negate(&self.eval(operand)?),
            Expr::Not(operand) => Ok(Value::Bool(!self.eval(operand)?.truthy())),
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                ops::binary(*op, &left, &right)
            }
            Expr::Compare(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                ops::compare(*op, &left, &right).map(Value::Bool)
            }
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if left.truthy() {
                    self.eval(right)
                } else {
                    Ok(left)
                }
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if left.truthy() {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }
            Expr::IfElse {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond)?.truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
        }
    }

    fn eval_all(&mut self, items: &[Expr]) -> Result<Vec<Value>> {
        items.iter().map(|item| self.eval(item)).collect()
    }

    fn eval_arguments(
        &mut self,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Result<(Vec<Value>, Kwargs)> {
        let args = self.eval_all(args)?;
        let kwargs = kwargs
            .iter()
            .map(|(name, expr)| Ok((name.clone(), self.eval(expr)?)))
            .collect::<Result<Kwargs>>()?;
        Ok((args, kwargs))
    }

    fn eval_bound(&mut self, expr: Option<&Expr>) -> Result<Option<i64>> {
        let Some(expr) = expr else { return Ok(None) };
        match self.eval(expr)? {
            Value::None => Ok(None),
            value => value.as_i64().map(Some).ok_or_else(|| {
                GuestError::type_error("slice indices must be integers or None")
            }),
        }
    }
}
