//! Configuration for the guest agent.
//!
//! Configuration is loaded from environment variables with sensible defaults.

use crate::error::ConfigError;
use std::path::PathBuf;

/// Default socket path for the agent.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/guestwire-agent.sock";

/// Default cap on captured subprocess output per stream (1 MB).
pub const DEFAULT_MAX_OUTPUT: usize = 1024 * 1024;

/// Default cap on a single unsized file read (10 MB).
pub const DEFAULT_MAX_READ: u64 = 10 * 1024 * 1024;

/// Resource limits applied by the native modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum bytes kept from each of a subprocess's stdout and stderr.
    pub max_output: usize,
    /// Maximum bytes returned by `read()` without a size.
    pub max_read: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_output: DEFAULT_MAX_OUTPUT,
            max_read: DEFAULT_MAX_READ,
        }
    }
}

/// Configuration for the guest agent.
#[derive(Debug, Clone, Default)]
pub struct AgentConfig {
    /// Unix socket the agent listens on.
    pub socket_path: PathBuf,

    /// Limits for native modules.
    pub limits: Limits,
}

impl AgentConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `GUESTWIRE_SOCKET` | `/tmp/guestwire-agent.sock` |
    /// | `GUESTWIRE_MAX_OUTPUT` | `1048576` |
    /// | `GUESTWIRE_MAX_READ` | `10485760` |
    ///
    /// Unparseable numbers fall back to the default.
    pub fn from_env() -> Self {
        let socket_path = std::env::var("GUESTWIRE_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SOCKET_PATH));

        let max_output = std::env::var("GUESTWIRE_MAX_OUTPUT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_OUTPUT);

        let max_read = std::env::var("GUESTWIRE_MAX_READ")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_READ);

        Self {
            socket_path,
            limits: Limits {
                max_output,
                max_read,
            },
        }
    }

    /// Create a configuration for `socket_path` with default limits.
    pub fn with_socket(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            limits: Limits::default(),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.socket_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(ConfigError::MissingSocketDir(parent.to_path_buf()));
            }
        }
        if self.limits.max_output == 0 {
            return Err(ConfigError::ZeroLimit { name: "max_output" });
        }
        if self.limits.max_read == 0 {
            return Err(ConfigError::ZeroLimit { name: "max_read" });
        }
        Ok(())
    }
}
