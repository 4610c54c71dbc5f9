//! Session configuration.

use crate::error::CoreError;
use std::path::PathBuf;
use std::time::Duration;

/// How to reach a guest agent.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Unix socket of the agent, or the host side of a vsock-backed socket.
    pub socket_path: PathBuf,
    /// Guest port to request with a `CONNECT <port>` handshake. `None`
    /// talks to the socket directly.
    pub vsock_port: Option<u32>,
    /// Total time to keep retrying the initial connection (default: 10s).
    pub connect_timeout: Duration,
    /// Pause between connection attempts (default: 100ms).
    pub retry_interval: Duration,
    /// Time to wait for any single response (default: 30s).
    pub call_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::new(),
            vsock_port: None,
            connect_timeout: Duration::from_secs(10),
            retry_interval: Duration::from_millis(100),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl SessionConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `GUESTWIRE_SOCKET` | `/tmp/guestwire-agent.sock` |
    /// | `GUESTWIRE_VSOCK_PORT` | unset (no handshake) |
    /// | `GUESTWIRE_CALL_TIMEOUT_SECS` | `30` |
    ///
    /// Unparseable numbers fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let socket_path = std::env::var("GUESTWIRE_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp/guestwire-agent.sock"));

        let vsock_port = std::env::var("GUESTWIRE_VSOCK_PORT")
            .ok()
            .and_then(|v| v.parse().ok());

        let call_timeout = std::env::var("GUESTWIRE_CALL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.call_timeout);

        Self {
            socket_path,
            vsock_port,
            call_timeout,
            ..defaults
        }
    }

    /// Create a new config builder.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.socket_path.as_os_str().is_empty() {
            return Err(CoreError::Config("socket_path is required".into()));
        }
        if self.vsock_port == Some(0) {
            return Err(CoreError::Config("vsock_port must be > 0".into()));
        }
        if self.connect_timeout.is_zero() {
            return Err(CoreError::Config("connect_timeout must be > 0".into()));
        }
        if self.retry_interval.is_zero() || self.retry_interval > self.connect_timeout {
            return Err(CoreError::Config(
                "retry_interval must be > 0 and <= connect_timeout".into(),
            ));
        }
        if self.call_timeout.is_zero() {
            return Err(CoreError::Config("call_timeout must be > 0".into()));
        }
        Ok(())
    }
}

/// Builder for SessionConfig.
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Set the socket path.
    pub fn socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.socket_path = path.into();
        self
    }

    /// Perform a `CONNECT <port>` handshake after connecting.
    pub fn vsock_port(mut self, port: u32) -> Self {
        self.config.vsock_port = Some(port);
        self
    }

    /// Set the total connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the pause between connection attempts.
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.config.retry_interval = interval;
        self
    }

    /// Set the per-call response timeout.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    /// Build the configuration, validating all fields.
    pub fn build(self) -> Result<SessionConfig, CoreError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.retry_interval, Duration::from_millis(100));
        assert_eq!(config.call_timeout, Duration::from_secs(30));
        assert!(config.vsock_port.is_none());
    }

    #[test]
    fn test_builder_validation_missing_socket() {
        let result = SessionConfig::builder().vsock_port(52).build();
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[test]
    fn test_builder_validation_retry_longer_than_timeout() {
        let result = SessionConfig::builder()
            .socket("/tmp/agent.sock")
            .connect_timeout(Duration::from_millis(50))
            .retry_interval(Duration::from_millis(100))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_success() {
        let config = SessionConfig::builder()
            .socket("/tmp/vm-1/v.sock")
            .vsock_port(52)
            .call_timeout(Duration::from_secs(5))
            .build()
            .expect("should build successfully");

        assert_eq!(config.socket_path, PathBuf::from("/tmp/vm-1/v.sock"));
        assert_eq!(config.vsock_port, Some(52));
        assert_eq!(config.call_timeout, Duration::from_secs(5));
    }
}
