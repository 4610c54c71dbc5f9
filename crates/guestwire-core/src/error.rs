//! Error types for guestwire-core.

use guestwire_protocol::{
    error_codes, ExceptionKind, ObjectId, RemoteException, RpcError, StaleReason, StaleReference,
};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for guestwire-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors surfaced by sessions and proxies.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Failed to connect to the guest agent
    #[error("connection failed: {0}")]
    Connection(String),

    /// Connecting, or waiting for a response, took too long
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// JSON-RPC error from the agent that is not a guest exception
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// Error code from the agent
        code: i32,
        /// Error message from the agent
        message: String,
    },

    /// Guest code raised an exception
    #[error("remote {0}")]
    Remote(RemoteException),

    /// The agent no longer holds (or never held) the referenced object
    #[error("stale reference {id}: {reason}")]
    StaleReference {
        /// The id that failed to resolve
        id: ObjectId,
        /// Why it failed
        reason: StaleReason,
    },

    /// The agent sent something this client cannot interpret
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Function source could not be teleported
    #[error("invalid function source: {0}")]
    InvalidSource(String),

    /// Attempt to assign or delete one of the proxy's own fields
    #[error("'{0}' is a proxy field and cannot be changed")]
    ReadOnlyAttribute(String),

    /// No plugin of the requested type is registered
    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    /// Invalid session configuration
    #[error("invalid config: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Convert an RPC error object into the matching variant.
    ///
    /// Guest exceptions and stale references carry their payload in `data`;
    /// if it is missing or malformed the error stays a plain [`CoreError::Rpc`].
    pub fn from_rpc(error: RpcError) -> Self {
        let RpcError {
            code,
            message,
            data,
        } = error;
        match (code, data) {
            (error_codes::REMOTE_EXCEPTION, Some(data)) => {
                match serde_json::from_value::<RemoteException>(data) {
                    Ok(exception) => Self::Remote(exception),
                    Err(_) => Self::Rpc { code, message },
                }
            }
            (error_codes::STALE_REFERENCE, Some(data)) => {
                match serde_json::from_value::<StaleReference>(data) {
                    Ok(stale) => Self::StaleReference {
                        id: stale.id,
                        reason: stale.reason,
                    },
                    Err(_) => Self::Rpc { code, message },
                }
            }
            _ => Self::Rpc { code, message },
        }
    }

    /// Whether retrying on a fresh connection could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_) | Self::Io(_))
    }

    /// Whether the error is a broken reference rather than a missing value.
    pub fn is_stale_reference(&self) -> bool {
        matches!(self, Self::StaleReference { .. })
    }

    /// Category of a guest exception, if this is one.
    pub fn remote_kind(&self) -> Option<ExceptionKind> {
        match self {
            Self::Remote(exception) => Some(exception.kind()),
            _ => None,
        }
    }
}
