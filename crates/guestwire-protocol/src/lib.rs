//! # guestwire-protocol
//!
//! Wire types shared by the guest agent and the host client.
//!
//! Every value that crosses the boundary is a [`WireValue`]: a tagged union
//! that tells the receiver whether it is holding plain data (primitives,
//! sequences, mappings) or a handle to an object that stays alive inside the
//! guest ([`WireValue::Reference`], [`WireValue::Stream`]).
//!
//! Requests and responses follow JSON-RPC 2.0 and are exchanged as
//! newline-delimited JSON.
//!
//! ```text
//! host (guestwire-core)                     guest (guestwire-agent)
//! ─────────────────────                     ───────────────────────
//!  pack(args) ──▶ Request{method, params} ──▶ unpack(args)
//!                                               run operation
//!  unpack(result) ◀── Response{result} ◀──── pack(result)
//! ```

mod exception;
mod rpc;
mod source;
mod wire;

pub use exception::{ExceptionKind, RemoteException, StaleReason, StaleReference};
pub use rpc::{
    error_codes, methods, AttrParams, CallAttrParams, CallParams, EvaluateParams, ExecuteParams,
    ImportParams, InspectParams, InvokeParams, ObjectParams, PingResult, ReleaseParams,
    ReleaseResult, Request, Response, RpcError, SetAttrParams, JSONRPC_VERSION,
};
pub use source::{function_name, normalize_indentation};
pub use wire::{
    AttributeKind, Container, MethodDescriptor, ObjectDescriptor, ObjectId, Primitive, WireKwargs,
    WireValue,
};
