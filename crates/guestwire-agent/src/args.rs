//! Argument binding for native functions.

use crate::error::{GuestError, Result};
use crate::value::{Kwargs, Value};

/// Positional and keyword arguments of one native call.
///
/// Each parameter is looked up by position first, then by keyword.
pub struct Args<'a> {
    func: &'a str,
    positional: &'a [Value],
    kwargs: &'a Kwargs,
}

impl<'a> Args<'a> {
    pub fn new(func: &'a str, positional: &'a [Value], kwargs: &'a Kwargs) -> Self {
        Self {
            func,
            positional,
            kwargs,
        }
    }

    /// Reject calls with more than `max` positional arguments or with
    /// keywords outside `known`.
    pub fn check(&self, max: usize, known: &[&str]) -> Result<()> {
        if self.positional.len() > max {
            return Err(GuestError::type_error(format!(
                "{}() takes at most {max} positional arguments but {} were given",
                self.func,
                self.positional.len()
            )));
        }
        if let Some((name, _)) = self.kwargs.iter().find(|(n, _)| !known.contains(&n.as_str())) {
            return Err(GuestError::type_error(format!(
                "{}() got an unexpected keyword argument '{name}'",
                self.func
            )));
        }
        Ok(())
    }

    pub fn positional(&self) -> &'a [Value] {
        self.positional
    }

    pub fn kwargs(&self) -> &'a Kwargs {
        self.kwargs
    }

    pub fn get(&self, index: usize, name: &str) -> Option<&'a Value> {
        self.positional.get(index).or_else(|| {
            self.kwargs
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v)
        })
    }

    pub fn required(&self, index: usize, name: &str) -> Result<&'a Value> {
        self.get(index, name).ok_or_else(|| {
            GuestError::type_error(format!(
                "{}() missing required argument: '{name}'",
                self.func
            ))
        })
    }

    pub fn str(&self, index: usize, name: &str) -> Result<&'a str> {
        let value = self.required(index, name)?;
        value.as_str().ok_or_else(|| self.wrong_type(name, "str", value))
    }

    pub fn opt_str(&self, index: usize, name: &str) -> Result<Option<&'a str>> {
        match self.get(index, name) {
            None | Some(Value::None) => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(self.wrong_type(name, "str", other)),
        }
    }

    pub fn opt_int(&self, index: usize, name: &str) -> Result<Option<i64>> {
        match self.get(index, name) {
            None | Some(Value::None) => Ok(None),
            Some(value) => value
                .as_i64()
                .map(Some)
                .ok_or_else(|| self.wrong_type(name, "int", value)),
        }
    }

    pub fn opt_float(&self, index: usize, name: &str) -> Result<Option<f64>> {
        match self.get(index, name) {
            None | Some(Value::None) => Ok(None),
            Some(value) => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| self.wrong_type(name, "float", value)),
        }
    }

    pub fn flag(&self, index: usize, name: &str) -> bool {
        self.get(index, name).is_some_and(Value::truthy)
    }

    fn wrong_type(&self, name: &str, expected: &str, got: &Value) -> GuestError {
        GuestError::type_error(format!(
            "{}() argument '{name}' must be {expected}, not {}",
            self.func,
            got.type_name()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_then_keyword() {
        let positional = vec![Value::str("/tmp")];
        let kwargs = vec![("exist_ok".to_string(), Value::Bool(true))];
        let args = Args::new("makedirs", &positional, &kwargs);

        assert_eq!(args.str(0, "name").unwrap(), "/tmp");
        assert!(args.flag(1, "exist_ok"));
        assert!(args.check(2, &["name", "exist_ok"]).is_ok());
    }

    #[test]
    fn test_unexpected_keyword() {
        let kwargs = vec![("colour".to_string(), Value::None)];
        let args = Args::new("listdir", &[], &kwargs);
        let err = args.check(1, &["path"]).unwrap_err();
        assert!(err.to_string().contains("unexpected keyword argument 'colour'"));
    }

    #[test]
    fn test_wrong_type() {
        let positional = vec![Value::Int(3)];
        let kwargs = Vec::new();
        let args = Args::new("getenv", &positional, &kwargs);
        let err = args.str(0, "key").unwrap_err();
        assert!(err.to_string().contains("must be str, not int"));
        assert!(args.required(1, "default").is_err());
    }
}
