//! The guest scripting runtime.
//!
//! A small, Python-flavoured interpreter: source is tokenized, parsed into
//! a syntax tree and walked. One [`Interpreter`] backs one guest session and
//! owns everything that session can see: its globals, the builtins and its
//! own table of loaded modules.

mod ast;
mod eval;
mod function;
mod lexer;
mod parser;

pub use function::{UserFunction, MAX_CALL_DEPTH};

use crate::builtins;
use crate::config::Limits;
use crate::error::Result;
use crate::modules::ModuleTable;
use crate::ops;
use crate::value::{ObjectRef, Value};
use eval::Frame;
use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

/// State shared by every frame of one interpreter.
#[derive(Debug)]
pub struct Runtime {
    globals: Mutex<HashMap<String, Value>>,
    builtins: HashMap<String, Value>,
    pub(crate) modules: ModuleTable,
    pub(crate) depth: AtomicUsize,
}

impl Runtime {
    fn globals(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.globals.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn global(&self, name: &str) -> Option<Value> {
        self.globals().get(name).cloned()
    }

    pub(crate) fn set_global(&self, name: &str, value: Value) {
        self.globals().insert(name.to_string(), value);
    }

    pub(crate) fn remove_global(&self, name: &str) -> bool {
        self.globals().remove(name).is_some()
    }

    pub(crate) fn builtin(&self, name: &str) -> Option<Value> {
        self.builtins.get(name).cloned()
    }
}

/// Handle to a guest runtime. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Interpreter {
    runtime: Arc<Runtime>,
}

impl Interpreter {
    /// Create a runtime with empty globals.
    pub fn new(limits: Limits) -> Self {
        Self {
            runtime: Arc::new(Runtime {
                globals: Mutex::new(HashMap::new()),
                builtins: builtins::table(limits),
                modules: ModuleTable::new(limits),
                depth: AtomicUsize::new(0),
            }),
        }
    }

    /// Run statements in the global scope.
    pub fn execute(&self, code: &str) -> Result<()> {
        trace!(code = %code, "execute");
        let program = parser::parse_module(code)?;
        Frame::module(&self.runtime).exec_block(&program)?;
        Ok(())
    }

    /// Evaluate one expression in the global scope.
    pub fn evaluate(&self, expression: &str) -> Result<Value> {
        trace!(expression = %expression, "evaluate");
        let expr = parser::parse_expression(expression)?;
        Frame::module(&self.runtime).eval(&expr)
    }

    /// Import a module and bind its top-level package as a global, like
    /// `import a.b` would. Returns the leaf module.
    pub fn import(&self, dotted: &str) -> Result<ObjectRef> {
        let (top, leaf) = self.runtime.modules.import(dotted)?;
        let top_name = dotted.split('.').next().unwrap_or(dotted);
        self.runtime.set_global(top_name, Value::Object(top));
        Ok(leaf)
    }

    /// Resolve a dotted path such as `os.path.join`.
    ///
    /// The first segment names a global, a builtin or an importable module.
    /// Remaining segments are attribute lookups.
    pub fn resolve(&self, path: &str) -> Result<Value> {
        let mut segments = path.split('.');
        let first = segments.next().unwrap_or_default();
        let mut current = match self
            .runtime
            .global(first)
            .or_else(|| self.runtime.builtin(first))
        {
            Some(value) => value,
            None => Value::Object(self.import(first)?),
        };
        for segment in segments {
            current = ops::get_attribute(&current, segment)?;
        }
        Ok(current)
    }

    /// A builtin by name.
    pub fn builtin(&self, name: &str) -> Option<Value> {
        self.runtime.builtin(name)
    }

    /// A global by name.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.runtime.global(name)
    }

    /// Names of the modules this runtime can import.
    pub fn module_names(&self) -> Vec<String> {
        self.runtime.modules.available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GuestError;
    use guestwire_protocol::ExceptionKind;

    fn interp() -> Interpreter {
        Interpreter::new(Limits::default())
    }

    fn raised(err: GuestError) -> (String, String) {
        match err {
            GuestError::Raised { type_name, message } => (type_name, message),
            other => panic!("expected raised exception, got {other:?}"),
        }
    }

    #[test]
    fn test_evaluate_arithmetic() {
        let i = interp();
        assert_eq!(i.evaluate("1+1").unwrap(), Value::Int(2));
        assert_eq!(i.evaluate("7 // 2").unwrap(), Value::Int(3));
        assert_eq!(i.evaluate("-7 % 3").unwrap(), Value::Int(2));
        assert_eq!(i.evaluate("1 / 2").unwrap(), Value::Float(0.5));
        assert_eq!(i.evaluate("'ab' * 2").unwrap(), Value::str("abab"));
    }

    #[test]
    fn test_execute_binds_globals() {
        let i = interp();
        i.execute("x = 40\nx += 2").unwrap();
        assert_eq!(i.global("x"), Some(Value::Int(42)));
        assert_eq!(i.evaluate("x").unwrap(), Value::Int(42));
    }

    #[test]
    fn test_function_definition_and_call() {
        let i = interp();
        i.execute(
            "def add(a, b=10):\n    \"\"\"Add two numbers.\"\"\"\n    return a + b\n",
        )
        .unwrap();
        assert_eq!(i.evaluate("add(1, 2)").unwrap(), Value::Int(3));
        assert_eq!(i.evaluate("add(5)").unwrap(), Value::Int(15));
        assert_eq!(i.evaluate("add(b=1, a=1)").unwrap(), Value::Int(2));
        assert_eq!(
            i.evaluate("add.__doc__").unwrap(),
            Value::str("Add two numbers.")
        );

        let err = i.evaluate("add()").unwrap_err();
        assert!(err.is(ExceptionKind::TypeError));
    }

    #[test]
    fn test_recursion_and_loops() {
        let i = interp();
        i.execute(
            "def fact(n):\n    if n <= 1:\n        return 1\n    return n * fact(n - 1)\n\
             total = 0\nfor k in range(5):\n    if k == 3:\n        continue\n    total += k\n",
        )
        .unwrap();
        assert_eq!(i.evaluate("fact(10)").unwrap(), Value::Int(3_628_800));
        assert_eq!(i.global("total"), Some(Value::Int(7)));
    }

    #[test]
    fn test_runaway_recursion_is_an_error() {
        let i = interp();
        i.execute("def loop(n):\n    return loop(n + 1)\n").unwrap();
        let (type_name, _) = raised(i.evaluate("loop(0)").unwrap_err());
        assert_eq!(type_name, "RecursionError");
    }

    #[test]
    fn test_try_except_finally() {
        let i = interp();
        i.execute(
            "try:\n    1 / 0\nexcept ZeroDivisionError as e:\n    msg = str(e)\n\
             finally:\n    done = True\n",
        )
        .unwrap();
        assert_eq!(i.global("msg"), Some(Value::str("division by zero")));
        assert_eq!(i.global("done"), Some(Value::Bool(true)));

        i.execute("try:\n    {}['k']\nexcept LookupError:\n    caught = 1\n")
            .unwrap();
        assert_eq!(i.global("caught"), Some(Value::Int(1)));

        let err = i
            .execute("try:\n    1 / 0\nexcept KeyError:\n    pass\n")
            .unwrap_err();
        assert!(err.is(ExceptionKind::ZeroDivisionError));
    }

    #[test]
    fn test_uncaught_exception_carries_type() {
        let i = interp();
        let (type_name, message) = raised(i.execute("raise ValueError('bad input')").unwrap_err());
        assert_eq!(type_name, "ValueError");
        assert_eq!(message, "bad input");

        let err = i.evaluate("undefined_name").unwrap_err();
        assert!(err.is(ExceptionKind::NameError));
    }

    #[test]
    fn test_unpacking() {
        let i = interp();
        i.execute("a, b = (1, 2)").unwrap();
        assert_eq!(i.global("b"), Some(Value::Int(2)));

        let (_, message) = raised(i.execute("a, b = [1]").unwrap_err());
        assert_eq!(message, "not enough values to unpack (expected 2, got 1)");
    }

    #[test]
    fn test_import_and_resolve() {
        let i = interp();
        let path = i.import("os.path").unwrap();
        assert!(path.is_module());
        assert!(i.global("os").is_some());

        let join = i.resolve("os.path.join").unwrap();
        let joined = ops::call(&join, vec![Value::str("a"), Value::str("b")], vec![]).unwrap();
        assert_eq!(joined, Value::str("a/b"));

        let err = i.import("no_such_module").unwrap_err();
        assert!(err.is(ExceptionKind::ImportError));
    }

    #[test]
    fn test_from_import() {
        let i = interp();
        i.execute("from os.path import join as j, basename").unwrap();
        assert_eq!(i.evaluate("j('x', 'y')").unwrap(), Value::str("x/y"));
        assert_eq!(i.evaluate("basename('/a/b.txt')").unwrap(), Value::str("b.txt"));

        let err = i.execute("from os import nothing_here").unwrap_err();
        assert!(err.is(ExceptionKind::ImportError));
    }

    #[test]
    fn test_module_identity_is_stable() {
        let i = interp();
        let a = i.import("os").unwrap();
        let b = i.import("os").unwrap();
        assert!(crate::value::same_object(&a, &b));
    }

    #[test]
    fn test_with_statement_closes_file() {
        let path = std::env::temp_dir().join(format!("guestwire-with-{}.txt", std::process::id()));
        let path_str = path.to_string_lossy().to_string();
        let i = interp();
        i.execute(&format!(
            "with open({p:?}, 'w') as f:\n    f.write('hello')\n\
             with open({p:?}) as f:\n    data = f.read()\nclosed = f.closed\n",
            p = path_str
        ))
        .unwrap();
        assert_eq!(i.global("data"), Some(Value::str("hello")));
        assert_eq!(i.global("closed"), Some(Value::Bool(true)));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_string_methods_and_containers() {
        let i = interp();
        assert_eq!(
            i.evaluate("'a,b,c'.split(',')").unwrap(),
            Value::List(vec![Value::str("a"), Value::str("b"), Value::str("c")])
        );
        assert_eq!(i.evaluate("'-'.join(['x', 'y'])").unwrap(), Value::str("x-y"));
        assert_eq!(i.evaluate("{'k': 1}.get('k')").unwrap(), Value::Int(1));
        assert_eq!(i.evaluate("3 in [1, 2, 3]").unwrap(), Value::Bool(true));
        assert_eq!(i.evaluate("1 < 2 < 3").unwrap(), Value::Bool(true));
    }
}
