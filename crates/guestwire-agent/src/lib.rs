//! # guestwire-agent
//!
//! Guest side of the guestwire remote object protocol.
//!
//! The agent runs a small scripting runtime and exposes it over JSON-RPC.
//! Values that can travel by value are marshalled as data; everything else
//! is parked in a per-connection [`registry::ObjectRegistry`] and handed to
//! the host as a reference the host can keep calling into.
//!
//! ```text
//! request ──▶ handler ──▶ marshal::unpack ──▶ interp / ops ──▶ marshal::pack ──▶ response
//!                              │                                     │
//!                              └──────── registry (per session) ─────┘
//! ```

pub mod args;
pub mod builtins;
pub mod classify;
pub mod config;
pub mod error;
pub mod handler;
pub mod interp;
pub mod introspect;
pub mod marshal;
pub mod modules;
pub mod objects;
pub mod ops;
pub mod registry;
pub mod server;
pub mod session;
pub mod value;

pub use error::{GuestError, Result};
pub use session::GuestSession;
pub use value::{GuestObject, ObjectRef, Value};
