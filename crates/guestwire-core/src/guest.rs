//! A connected guest: session plus plugins.

use crate::config::SessionConfig;
use crate::error::Result;
use crate::plugin::{Plugin, PluginRegistry};
use crate::session::RemoteSession;

/// Connection context for one guest.
///
/// Owns the session and the plugins bound to it. Plugins are loaded in
/// [`Guest::start`] and unloaded in [`Guest::close`].
pub struct Guest {
    session: RemoteSession,
    plugins: PluginRegistry,
    os: String,
}

impl Guest {
    /// Connect and load the default plugins.
    pub async fn connect(config: &SessionConfig) -> Result<Self> {
        let session = RemoteSession::connect(config).await?;
        Self::start(session, PluginRegistry::with_defaults()).await
    }

    /// Detect the guest OS and load the plugins that support it.
    pub async fn start(session: RemoteSession, mut plugins: PluginRegistry) -> Result<Self> {
        session.ping().await?;
        let os: String = session
            .invoke("platform.system", &[], &[])
            .await?
            .try_into()?;
        plugins.load_all(&session, &os).await?;
        tracing::info!(os = %os, plugins = ?plugins.names(), "Guest session started");
        Ok(Self {
            session,
            plugins,
            os,
        })
    }

    pub fn session(&self) -> &RemoteSession {
        &self.session
    }

    /// Guest OS as reported by `platform.system()`, e.g. `Linux`.
    pub fn os(&self) -> &str {
        &self.os
    }

    /// A loaded plugin of type `P`.
    pub fn plugin<P: Plugin>(&self) -> Result<&P> {
        self.plugins.get::<P>()
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Unload plugins. The connection closes once the last clone of the
    /// session is dropped.
    pub async fn close(mut self) {
        self.plugins.unload_all().await;
        tracing::info!(os = %self.os, "Guest session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::plugins::{FilesystemPlugin, ProcessPlugin};
    use crate::session::tests::{recording, wire};
    use guestwire_protocol::WireValue;
    use serde_json::json;

    #[tokio::test]
    async fn test_start_loads_plugins_for_guest_os() {
        let (session, sent) = recording(vec![
            Ok(json!({"pong": true})),
            Ok(wire(WireValue::primitive("Linux"))),
        ]);
        let guest = Guest::start(session, PluginRegistry::with_defaults())
            .await
            .unwrap();
        assert_eq!(guest.os(), "Linux");
        assert!(guest.plugin::<FilesystemPlugin>().is_ok());
        assert!(guest.plugin::<ProcessPlugin>().is_ok());
        assert_eq!(sent.lock().unwrap()[1].1["name"], "platform.system");

        guest.close().await;
    }

    #[tokio::test]
    async fn test_unsupported_os_leaves_plugins_unloaded() {
        let (session, _) = recording(vec![
            Ok(json!({"pong": true})),
            Ok(wire(WireValue::primitive("Windows"))),
        ]);
        let guest = Guest::start(session, PluginRegistry::with_defaults())
            .await
            .unwrap();
        assert!(guest.plugins().names().is_empty());
        assert!(matches!(
            guest.plugin::<ProcessPlugin>(),
            Err(CoreError::PluginNotFound(_))
        ));
    }
}
