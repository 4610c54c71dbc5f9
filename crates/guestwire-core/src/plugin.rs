//! Plugins: task-level helpers built on a session.
//!
//! A [`PluginRegistry`] belongs to one [`crate::Guest`]. Plugins are loaded
//! when the guest connection starts and unloaded when it closes; there is
//! no process-wide plugin table.

use crate::error::{CoreError, Result};
use crate::session::RemoteSession;
use async_trait::async_trait;
use std::any::Any;

/// A helper that wraps common guest operations.
#[async_trait]
pub trait Plugin: Any + Send + Sync {
    /// Unique plugin name.
    fn name(&self) -> &'static str;

    /// Guest operating systems the plugin works on, as lower-case
    /// `platform.system()` names (`"linux"`, `"darwin"`).
    fn supported_os(&self) -> &'static [&'static str];

    /// Bind the plugin to a session.
    async fn load(&mut self, session: &RemoteSession) -> Result<()>;

    /// Release whatever the plugin holds in the guest.
    async fn unload(&mut self) -> Result<()>;

    fn as_any(&self) -> &dyn Any;
}

struct Entry {
    plugin: Box<dyn Plugin>,
    loaded: bool,
}

/// The plugins of one guest connection.
#[derive(Default)]
pub struct PluginRegistry {
    entries: Vec<Entry>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the filesystem and process plugins.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(crate::plugins::FilesystemPlugin::new());
        registry.register(crate::plugins::ProcessPlugin::new());
        registry
    }

    /// Add a plugin, replacing any plugin with the same name.
    pub fn register<P: Plugin>(&mut self, plugin: P) {
        let name = plugin.name();
        if let Some(pos) = self.entries.iter().position(|e| e.plugin.name() == name) {
            tracing::warn!(plugin = name, "Replacing registered plugin");
            self.entries.remove(pos);
        }
        self.entries.push(Entry {
            plugin: Box::new(plugin),
            loaded: false,
        });
    }

    /// A loaded plugin of type `P`.
    pub fn get<P: Plugin>(&self) -> Result<&P> {
        self.entries
            .iter()
            .filter(|e| e.loaded)
            .find_map(|e| e.plugin.as_any().downcast_ref::<P>())
            .ok_or_else(|| CoreError::PluginNotFound(std::any::type_name::<P>().to_string()))
    }

    /// Names of the loaded plugins, in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.entries
            .iter()
            .filter(|e| e.loaded)
            .map(|e| e.plugin.name())
            .collect()
    }

    /// Load every plugin that supports `os`. Others stay registered but
    /// unavailable.
    pub async fn load_all(&mut self, session: &RemoteSession, os: &str) -> Result<()> {
        let os = os.to_lowercase();
        for entry in self.entries.iter_mut().filter(|e| !e.loaded) {
            let name = entry.plugin.name();
            if !entry.plugin.supported_os().contains(&os.as_str()) {
                tracing::debug!(plugin = name, os = %os, "Plugin does not support guest OS, skipping");
                continue;
            }
            entry.plugin.load(session).await?;
            entry.loaded = true;
            tracing::debug!(plugin = name, "Plugin loaded");
        }
        Ok(())
    }

    /// Unload every loaded plugin. Failures are logged and do not stop the
    /// remaining plugins from unloading.
    pub async fn unload_all(&mut self) {
        for entry in self.entries.iter_mut().filter(|e| e.loaded) {
            let name = entry.plugin.name();
            if let Err(e) = entry.plugin.unload().await {
                tracing::warn!(plugin = name, error = %e, "Failed to unload plugin");
            }
            entry.loaded = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::scripted;

    #[derive(Default)]
    struct Probe {
        loads: usize,
        unloads: usize,
    }

    #[async_trait]
    impl Plugin for Probe {
        fn name(&self) -> &'static str {
            "probe"
        }

        fn supported_os(&self) -> &'static [&'static str] {
            &["linux"]
        }

        async fn load(&mut self, _session: &RemoteSession) -> Result<()> {
            self.loads += 1;
            Ok(())
        }

        async fn unload(&mut self) -> Result<()> {
            self.unloads += 1;
            Err(CoreError::Connection("gone".into()))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[tokio::test]
    async fn test_load_filters_by_os() {
        let session = scripted(vec![]);
        let mut registry = PluginRegistry::new();
        registry.register(Probe::default());

        registry.load_all(&session, "Darwin").await.unwrap();
        assert!(registry.names().is_empty());
        assert!(matches!(
            registry.get::<Probe>(),
            Err(CoreError::PluginNotFound(_))
        ));

        registry.load_all(&session, "Linux").await.unwrap();
        assert_eq!(registry.names(), vec!["probe"]);
        assert_eq!(registry.get::<Probe>().unwrap().loads, 1);
    }

    #[tokio::test]
    async fn test_unload_continues_past_errors() {
        let session = scripted(vec![]);
        let mut registry = PluginRegistry::new();
        registry.register(Probe::default());
        registry.load_all(&session, "linux").await.unwrap();

        registry.unload_all().await;
        assert!(registry.names().is_empty());
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = PluginRegistry::new();
        registry.register(Probe::default());
        registry.register(Probe::default());
        assert_eq!(registry.entries.len(), 1);
    }
}
