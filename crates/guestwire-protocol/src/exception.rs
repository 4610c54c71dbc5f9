//! Failure payloads carried in JSON-RPC error `data`.

use crate::wire::ObjectId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of an exception raised by guest code.
///
/// Parsed from the exception's type name so that host code can branch on
/// the category of a remote failure the same way it would on a local one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    AttributeError,
    TypeError,
    ValueError,
    NameError,
    KeyError,
    IndexError,
    ZeroDivisionError,
    OverflowError,
    MemoryError,
    ImportError,
    SyntaxError,
    OsError,
    FileNotFoundError,
    PermissionError,
    RuntimeError,
    NotImplementedError,
    /// A type name this crate does not know.
    Other,
}

impl ExceptionKind {
    /// Parse a guest exception type name.
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "AttributeError" => Self::AttributeError,
            "TypeError" => Self::TypeError,
            "ValueError" => Self::ValueError,
            "NameError" => Self::NameError,
            "KeyError" => Self::KeyError,
            "IndexError" => Self::IndexError,
            "ZeroDivisionError" => Self::ZeroDivisionError,
            "OverflowError" => Self::OverflowError,
            "MemoryError" => Self::MemoryError,
            "ImportError" | "ModuleNotFoundError" => Self::ImportError,
            "SyntaxError" | "IndentationError" => Self::SyntaxError,
            "OSError" | "IOError" => Self::OsError,
            "FileNotFoundError" => Self::FileNotFoundError,
            "PermissionError" => Self::PermissionError,
            "RuntimeError" => Self::RuntimeError,
            "NotImplementedError" => Self::NotImplementedError,
            _ => Self::Other,
        }
    }

    /// Canonical type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AttributeError => "AttributeError",
            Self::TypeError => "TypeError",
            Self::ValueError => "ValueError",
            Self::NameError => "NameError",
            Self::KeyError => "KeyError",
            Self::IndexError => "IndexError",
            Self::ZeroDivisionError => "ZeroDivisionError",
            Self::OverflowError => "OverflowError",
            Self::MemoryError => "MemoryError",
            Self::ImportError => "ImportError",
            Self::SyntaxError => "SyntaxError",
            Self::OsError => "OSError",
            Self::FileNotFoundError => "FileNotFoundError",
            Self::PermissionError => "PermissionError",
            Self::RuntimeError => "RuntimeError",
            Self::NotImplementedError => "NotImplementedError",
            Self::Other => "Exception",
        }
    }

    /// Whether this kind is a subclass of `OSError` in the guest hierarchy.
    pub fn is_os_error(&self) -> bool {
        matches!(
            self,
            Self::OsError | Self::FileNotFoundError | Self::PermissionError
        )
    }
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An exception raised by guest code, as reported to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteException {
    /// Exception type name, e.g. `ZeroDivisionError`.
    pub type_name: String,
    /// Exception message.
    pub message: String,
}

impl RemoteException {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Category of the exception.
    pub fn kind(&self) -> ExceptionKind {
        ExceptionKind::from_type_name(&self.type_name)
    }
}

impl fmt::Display for RemoteException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}

/// Why an object id failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    /// The id was issued by a different registry instance (e.g. the agent
    /// restarted or the id belongs to another session).
    ForeignRegistry,
    /// The id was issued by this registry and has since been released.
    Released,
    /// This registry never issued the id.
    NeverIssued,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForeignRegistry => write!(f, "issued by another registry"),
            Self::Released => write!(f, "released"),
            Self::NeverIssued => write!(f, "never issued"),
        }
    }
}

/// Payload of a `STALE_REFERENCE` error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleReference {
    pub id: ObjectId,
    pub reason: StaleReason,
}
