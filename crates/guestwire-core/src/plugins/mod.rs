//! Built-in plugins.

mod filesystem;
mod process;

pub use filesystem::FilesystemPlugin;
pub use process::{ProcessOutput, ProcessPlugin};
