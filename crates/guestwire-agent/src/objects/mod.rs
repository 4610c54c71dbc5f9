//! Guest object implementations.

mod exception;
mod file;
mod function;
mod module;
mod opaque;

pub use exception::{exception_matches, ExceptionObject};
pub use file::FileObject;
pub use function::{BoundMethod, NativeFn, NativeFunction};
pub use module::ModuleObject;
pub use opaque::OpaqueValue;
