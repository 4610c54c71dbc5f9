//! Error types for guestwire-agent.

use crate::registry::StaleReferenceError;
use guestwire_protocol::{ExceptionKind, RemoteException};
use std::io;
use thiserror::Error;

/// Result type alias for guest operations.
pub type Result<T> = std::result::Result<T, GuestError>;

/// Failure of a guest operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GuestError {
    /// Guest code raised an exception.
    #[error("{type_name}: {message}")]
    Raised {
        /// Exception type name, e.g. `TypeError`.
        type_name: String,
        /// Exception message.
        message: String,
    },

    /// An object id presented by the host did not resolve.
    #[error(transparent)]
    StaleReference(#[from] StaleReferenceError),
}

impl GuestError {
    /// Raise an exception of the given kind.
    pub fn raise(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Self::Raised {
            type_name: kind.as_str().to_string(),
            message: message.into(),
        }
    }

    /// Raise an exception with a type name outside [`ExceptionKind`].
    pub fn raise_named(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Raised {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::raise(ExceptionKind::TypeError, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::raise(ExceptionKind::ValueError, message)
    }

    pub fn name_error(name: &str) -> Self {
        Self::raise(
            ExceptionKind::NameError,
            format!("name '{name}' is not defined"),
        )
    }

    pub fn attribute_error(type_name: &str, attr: &str) -> Self {
        Self::raise(
            ExceptionKind::AttributeError,
            format!("'{type_name}' object has no attribute '{attr}'"),
        )
    }

    pub fn key_error(message: impl Into<String>) -> Self {
        Self::raise(ExceptionKind::KeyError, message)
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        Self::raise(ExceptionKind::IndexError, message)
    }

    pub fn zero_division(message: impl Into<String>) -> Self {
        Self::raise(ExceptionKind::ZeroDivisionError, message)
    }

    pub fn import_error(module: &str) -> Self {
        Self::raise(
            ExceptionKind::ImportError,
            format!("No module named '{module}'"),
        )
    }

    pub fn syntax_error(line: usize, message: impl Into<String>) -> Self {
        Self::raise(
            ExceptionKind::SyntaxError,
            format!("{} (line {line})", message.into()),
        )
    }

    pub fn runtime_error(message: impl Into<String>) -> Self {
        Self::raise(ExceptionKind::RuntimeError, message)
    }

    /// Map an I/O failure on `path` to the matching `OSError` subclass.
    pub fn os_error(err: &io::Error, path: &str) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => ExceptionKind::FileNotFoundError,
            io::ErrorKind::PermissionDenied => ExceptionKind::PermissionError,
            _ => ExceptionKind::OsError,
        };
        Self::raise(kind, format!("{err}: '{path}'"))
    }

    /// Category of the failure, for raised exceptions.
    pub fn kind(&self) -> Option<ExceptionKind> {
        match self {
            Self::Raised { type_name, .. } => Some(ExceptionKind::from_type_name(type_name)),
            Self::StaleReference(_) => None,
        }
    }

    /// Whether this is a raised exception of the given kind.
    pub fn is(&self, kind: ExceptionKind) -> bool {
        self.kind() == Some(kind)
    }

    /// Wire payload for a raised exception.
    pub fn to_remote_exception(&self) -> Option<RemoteException> {
        match self {
            Self::Raised { type_name, message } => {
                Some(RemoteException::new(type_name.clone(), message.clone()))
            }
            Self::StaleReference(_) => None,
        }
    }
}

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("socket directory not found: {0}")]
    MissingSocketDir(std::path::PathBuf),

    #[error("{name} must be greater than zero")]
    ZeroLimit { name: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raised_display() {
        let err = GuestError::zero_division("division by zero");
        assert_eq!(err.to_string(), "ZeroDivisionError: division by zero");
        assert!(err.is(ExceptionKind::ZeroDivisionError));
    }

    #[test]
    fn test_os_error_mapping() {
        let err = io::Error::new(io::ErrorKind::NotFound, "No such file or directory");
        let mapped = GuestError::os_error(&err, "/nope");
        assert_eq!(mapped.kind(), Some(ExceptionKind::FileNotFoundError));
        assert!(mapped.to_string().contains("/nope"));

        let err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert!(GuestError::os_error(&err, "/root").is(ExceptionKind::PermissionError));
    }

    #[test]
    fn test_named_exception_keeps_type_name() {
        let err = GuestError::raise_named("CalledProcessError", "exit status 1");
        assert_eq!(err.kind(), Some(ExceptionKind::Other));
        let exc = err.to_remote_exception().unwrap();
        assert_eq!(exc.type_name, "CalledProcessError");
    }
}
