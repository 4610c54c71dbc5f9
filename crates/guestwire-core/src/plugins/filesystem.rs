//! Filesystem operations on the guest.

use crate::error::{CoreError, Result};
use crate::plugin::Plugin;
use crate::proxy::{RemoteAttributes, RemoteObject};
use crate::session::RemoteSession;
use crate::value::RemoteValue;
use async_trait::async_trait;
use std::any::Any;

/// Files and directories on the guest, through its `os`, `shutil` and
/// `open`.
#[derive(Debug, Default)]
pub struct FilesystemPlugin {
    session: Option<RemoteSession>,
}

impl FilesystemPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    fn session(&self) -> Result<&RemoteSession> {
        self.session
            .as_ref()
            .ok_or_else(|| CoreError::PluginNotFound("filesystem (not loaded)".into()))
    }

    async fn os(&self, function: &str, args: &[RemoteValue]) -> Result<RemoteValue> {
        self.session()?.invoke(function, args, &[]).await
    }

    pub async fn exists(&self, path: &str) -> Result<bool> {
        self.os("os.path.exists", &[path.into()]).await?.try_into()
    }

    pub async fn is_file(&self, path: &str) -> Result<bool> {
        self.os("os.path.isfile", &[path.into()]).await?.try_into()
    }

    pub async fn is_directory(&self, path: &str) -> Result<bool> {
        self.os("os.path.isdir", &[path.into()]).await?.try_into()
    }

    /// Create (or truncate) a file with `content`.
    pub async fn create_file(&self, path: &str, content: &str) -> Result<()> {
        let file = self.open(path, "w").await?;
        let written = file.invoke("write", &[content.into()], &[]).await;
        self.close(&file).await?;
        written.map(|_| ())
    }

    /// Read a whole text file.
    pub async fn read_file(&self, path: &str) -> Result<String> {
        let file = self.open(path, "r").await?;
        let content = file.invoke("read", &[], &[]).await;
        self.close(&file).await?;
        content?.try_into()
    }

    /// Remove a file, or a directory with everything under it.
    pub async fn remove(&self, path: &str) -> Result<()> {
        if self.is_file(path).await? {
            self.os("os.remove", &[path.into()]).await?;
        } else {
            self.os("shutil.rmtree", &[path.into()]).await?;
        }
        Ok(())
    }

    /// Create a directory. With `recursive`, missing parents are created too.
    pub async fn create_directory(&self, path: &str, recursive: bool) -> Result<()> {
        let function = if recursive { "os.makedirs" } else { "os.mkdir" };
        self.os(function, &[path.into()]).await?;
        Ok(())
    }

    /// Entry names of a directory, sorted.
    pub async fn list_directory(&self, path: &str) -> Result<Vec<String>> {
        self.os("os.listdir", &[path.into()]).await?.try_into()
    }

    /// Open a guest file. The returned stream keeps its position in the
    /// guest between calls.
    pub async fn open(&self, path: &str, mode: &str) -> Result<RemoteObject> {
        self.session()?
            .invoke_builtin("open", &[path.into(), mode.into()], &[])
            .await?
            .try_into()
    }

    async fn close(&self, file: &RemoteObject) -> Result<()> {
        file.invoke("close", &[], &[]).await?;
        self.session()?.release(file).await?;
        Ok(())
    }
}

#[async_trait]
impl Plugin for FilesystemPlugin {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn supported_os(&self) -> &'static [&'static str] {
        &["linux", "darwin"]
    }

    async fn load(&mut self, session: &RemoteSession) -> Result<()> {
        self.session = Some(session.clone());
        Ok(())
    }

    async fn unload(&mut self) -> Result<()> {
        self.session = None;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{recording, wire};
    use guestwire_protocol::WireValue;
    use serde_json::json;

    #[tokio::test]
    async fn test_unloaded_plugin_refuses_work() {
        let plugin = FilesystemPlugin::new();
        assert!(matches!(
            plugin.exists("/tmp").await,
            Err(CoreError::PluginNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_picks_operation_by_kind() {
        let (session, sent) = recording(vec![
            Ok(wire(WireValue::primitive(false))),
            Ok(wire(WireValue::none())),
        ]);
        let mut plugin = FilesystemPlugin::new();
        plugin.load(&session).await.unwrap();

        plugin.remove("/tmp/dir").await.unwrap();
        let sent = sent.lock().unwrap();
        assert_eq!(sent[0].1["name"], "os.path.isfile");
        assert_eq!(sent[1].1["name"], "shutil.rmtree");
        assert_eq!(sent[1].1["args"], json!([{"kind": "primitive", "value": "/tmp/dir"}]));
    }
}
