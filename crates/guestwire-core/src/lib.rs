//! # guestwire-core
//!
//! Host side of the guestwire remote object protocol.
//!
//! A [`RemoteSession`] talks to one guest agent. Values come back as
//! [`RemoteValue`]s: data by value, guest objects as [`RemoteObject`]
//! handles that forward every operation to the guest.
//!
//! ```text
//! ┌───────────────────────── guestwire-core (host) ─────────────────────────┐
//! │                                                                         │
//! │  Guest ──▶ PluginRegistry (filesystem, process)                         │
//! │    │                                                                    │
//! │    ▼                                                                    │
//! │  RemoteSession ──▶ RemoteModule / RemoteCallable / RemoteFunction       │
//! │    │                   │                                                │
//! │    │                   ▼                                                │
//! │    │              RemoteObject ──▶ RemoteMethod                         │
//! │    ▼                                                                    │
//! │  Transport (UnixTransport, optional CONNECT <port> handshake)           │
//! └────┬────────────────────────────────────────────────────────────────────┘
//!      │ newline-delimited JSON-RPC
//!      ▼
//!  guestwire-agent (guest)
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use guestwire_core::{RemoteAttributes, RemoteSession, SessionConfig};
//!
//! # async fn example() -> guestwire_core::Result<()> {
//! let config = SessionConfig::builder()
//!     .socket("/tmp/vm-1/v.sock")
//!     .vsock_port(52)
//!     .build()?;
//! let session = RemoteSession::connect(&config).await?;
//!
//! let two = session.evaluate("1 + 1").await?;
//! assert_eq!(two.as_i64(), Some(2));
//!
//! let cwd = session.import("os").invoke("getcwd", &[], &[]).await?;
//! println!("guest cwd: {cwd}");
//!
//! let file = session
//!     .builtin("open")
//!     .call(&["/etc/hostname".into()], &[])
//!     .await?;
//! let file = file.as_object().expect("open returns a stream");
//! println!("{}", file.invoke("read", &[], &[]).await?);
//! session.release(file).await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod function;
mod guest;
mod marshal;
mod module;
mod plugin;
mod proxy;
mod session;
mod transport;
mod value;

pub mod plugins;

pub use config::{SessionConfig, SessionConfigBuilder};
pub use error::{CoreError, Result};
pub use function::RemoteFunction;
pub use guest::Guest;
pub use marshal::{pack, pack_args, unpack};
pub use module::{ModuleAttr, RemoteCallable, RemoteModule};
pub use plugin::{Plugin, PluginRegistry};
pub use proxy::{RemoteAttributes, RemoteMethod, RemoteObject, LOCAL_ATTRS};
pub use session::RemoteSession;
pub use transport::{into_result, Transport, UnixTransport};
pub use value::RemoteValue;

pub use guestwire_protocol::{ExceptionKind, ObjectId, Primitive, RemoteException, StaleReason};
