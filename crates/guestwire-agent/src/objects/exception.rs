//! Exception values bound by `except ... as name`.

use crate::error::{GuestError, Result};
use crate::value::{GuestObject, Value};
use guestwire_protocol::ExceptionKind;

/// A caught exception.
#[derive(Debug)]
pub struct ExceptionObject {
    type_name: String,
    message: String,
}

impl ExceptionObject {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
        }
    }
}

impl GuestObject for ExceptionObject {
    fn class_name(&self) -> &str {
        &self.type_name
    }

    fn attr_names(&self) -> Vec<String> {
        vec!["args".into()]
    }

    fn get_attr(&self, name: &str) -> Result<Value> {
        match name {
            "args" => Ok(Value::Tuple(vec![Value::str(&self.message)])),
            _ => Err(GuestError::attribute_error(&self.type_name, name)),
        }
    }

    fn repr(&self) -> String {
        format!("{}({})", self.type_name, Value::str(&self.message).to_repr())
    }

    fn str(&self) -> String {
        self.message.clone()
    }
}

/// Whether an `except <handler>` clause catches an exception of type `raised`.
pub fn exception_matches(handler: &str, raised: &str) -> bool {
    if handler == raised || matches!(handler, "Exception" | "BaseException") {
        return true;
    }
    let kind = ExceptionKind::from_type_name(raised);
    match handler {
        "OSError" | "IOError" | "EnvironmentError" => kind.is_os_error(),
        "LookupError" => matches!(kind, ExceptionKind::KeyError | ExceptionKind::IndexError),
        "ArithmeticError" => matches!(
            kind,
            ExceptionKind::ZeroDivisionError | ExceptionKind::OverflowError
        ),
        _ => {
            let wanted = ExceptionKind::from_type_name(handler);
            wanted != ExceptionKind::Other && wanted == kind
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_matching() {
        assert!(exception_matches("ValueError", "ValueError"));
        assert!(exception_matches("Exception", "CalledProcessError"));
        assert!(exception_matches("OSError", "FileNotFoundError"));
        assert!(exception_matches("LookupError", "KeyError"));
        assert!(exception_matches("ImportError", "ModuleNotFoundError"));
        assert!(!exception_matches("KeyError", "ValueError"));
        assert!(!exception_matches("FileNotFoundError", "OSError"));
        assert!(!exception_matches("Custom", "Other"));
    }

    #[test]
    fn test_str_and_repr() {
        let exc = ExceptionObject::new("KeyError", "'missing'");
        assert_eq!(exc.str(), "'missing'");
        assert_eq!(exc.repr(), "KeyError(\"'missing'\")");
    }
}
