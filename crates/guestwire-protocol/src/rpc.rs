//! JSON-RPC 2.0 envelopes and operation parameters.

use crate::wire::{ObjectId, WireKwargs, WireValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version carried in every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC 2.0 error codes.
pub mod error_codes {
    /// Parse error - Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request - The JSON sent is not a valid Request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found - The method does not exist / is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params - Invalid method parameter(s).
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error - Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
    /// The guest code raised. `data` carries a `RemoteException`.
    pub const REMOTE_EXCEPTION: i32 = -32000;
    /// An object id did not resolve. `data` carries a `StaleReference`.
    pub const STALE_REFERENCE: i32 = -32001;
}

/// Operation names.
pub mod methods {
    pub const PING: &str = "ping";
    pub const EXECUTE: &str = "execute";
    pub const EVALUATE: &str = "evaluate";
    pub const IMPORT: &str = "import";
    pub const INSPECT: &str = "inspect";
    pub const MODULES: &str = "modules";
    pub const INVOKE_MODULE: &str = "invoke_module";
    pub const INVOKE_BUILTIN: &str = "invoke_builtin";
    pub const GETATTR: &str = "getattr";
    pub const SETATTR: &str = "setattr";
    pub const DELATTR: &str = "delattr";
    pub const CALL: &str = "call";
    pub const CALLATTR: &str = "callattr";
    pub const DIR: &str = "dir";
    pub const STR: &str = "str";
    pub const REPR: &str = "repr";
    pub const RELEASE: &str = "release";
}

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Protocol version, must be "2.0".
    pub jsonrpc: String,
    /// Request identifier.
    pub id: u64,
    /// Method name to invoke.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Value,
}

impl Request {
    /// Build a request with already-serialized parameters.
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Protocol version, always "2.0".
    pub jsonrpc: String,
    /// Request identifier (matches request).
    pub id: u64,
    /// Result on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    /// Create a success response.
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: u64, code: i32, message: impl Into<String>) -> Self {
        Self::error_with_data(id, code, message, None)
    }

    /// Create an error response carrying structured data.
    pub fn error_with_data(
        id: u64,
        code: i32,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data,
            }),
        }
    }

    /// Whether this response reports a failure.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Error code.
    pub code: i32,
    /// Human-readable error message.
    pub message: String,
    /// Additional error data (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// Parameter types for the operations

/// Parameters for the `execute` method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteParams {
    /// Statements to run.
    pub code: String,
}

/// Parameters for the `evaluate` method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateParams {
    /// Expression to evaluate.
    pub expression: String,
}

/// Parameters for the `import` method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportParams {
    /// Dotted module name.
    pub module: String,
}

/// Parameters for the `inspect` method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectParams {
    /// Dotted attribute path, starting with a module name.
    pub path: String,
}

/// Parameters for `invoke_module` and `invoke_builtin`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeParams {
    /// Dotted path (`invoke_module`) or builtin name (`invoke_builtin`).
    pub name: String,
    /// Packed positional arguments.
    #[serde(default)]
    pub args: Vec<WireValue>,
    /// Packed keyword arguments.
    #[serde(default)]
    pub kwargs: WireKwargs,
}

/// Parameters for `getattr` and `delattr`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttrParams {
    /// Target object.
    pub object: WireValue,
    /// Attribute name.
    pub name: String,
}

/// Parameters for `setattr`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetAttrParams {
    /// Target object.
    pub object: WireValue,
    /// Attribute name.
    pub name: String,
    /// Packed new value.
    pub value: WireValue,
}

/// Parameters for `call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallParams {
    /// A reference to a callable, or a string naming a guest global.
    pub object: WireValue,
    /// Packed positional arguments.
    #[serde(default)]
    pub args: Vec<WireValue>,
    /// Packed keyword arguments.
    #[serde(default)]
    pub kwargs: WireKwargs,
}

/// Parameters for `callattr`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallAttrParams {
    /// Target object.
    pub object: WireValue,
    /// Method name.
    pub name: String,
    /// Packed positional arguments.
    #[serde(default)]
    pub args: Vec<WireValue>,
    /// Packed keyword arguments.
    #[serde(default)]
    pub kwargs: WireKwargs,
}

/// Parameters for `dir`, `str` and `repr`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectParams {
    /// Target object.
    pub object: WireValue,
}

/// Parameters for `release`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseParams {
    /// Ids to release, one reference count each.
    pub ids: Vec<ObjectId>,
}

/// Result of `ping`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResult {
    pub pong: bool,
}

/// Result of `release`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseResult {
    /// Number of registry entries evicted by this call.
    pub released: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_roundtrip() {
        let req = Request::new(3, methods::EVALUATE, json!({"expression": "1+1"}));
        let line = serde_json::to_string(&req).unwrap();
        let back: Request = serde_json::from_str(&line).unwrap();
        assert_eq!(back.jsonrpc, "2.0");
        assert_eq!(back.id, 3);
        assert_eq!(back.method, "evaluate");
        assert_eq!(back.params["expression"], "1+1");
    }

    #[test]
    fn test_request_without_params() {
        let req: Request =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).unwrap();
        assert!(req.params.is_null());
    }

    #[test]
    fn test_success_response_omits_error() {
        let json = serde_json::to_value(Response::success(1, json!(null))).unwrap();
        assert!(json.get("error").is_none());
        assert!(json.get("result").is_some());
    }

    #[test]
    fn test_error_response() {
        let resp = Response::error(9, error_codes::METHOD_NOT_FOUND, "method not found: x");
        assert!(resp.is_error());
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("result").is_none());
        assert_eq!(json["error"]["code"], -32601);
        assert!(json["error"].get("data").is_none());
    }

    #[test]
    fn test_invoke_params_defaults() {
        let params: InvokeParams = serde_json::from_value(json!({"name": "os.getcwd"})).unwrap();
        assert!(params.args.is_empty());
        assert!(params.kwargs.is_empty());
    }

    #[test]
    fn test_kwargs_are_pairs() {
        let params = InvokeParams {
            name: "sorted".into(),
            args: vec![],
            kwargs: vec![("reverse".into(), WireValue::primitive(true))],
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["kwargs"][0][0], "reverse");
        assert_eq!(json["kwargs"][0][1]["value"], true);
    }
}
