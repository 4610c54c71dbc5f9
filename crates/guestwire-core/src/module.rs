//! Handles for guest modules and the callables inside them.

use crate::error::{CoreError, Result};
use crate::marshal;
use crate::proxy::{RemoteAttributes, RemoteObject};
use crate::session::RemoteSession;
use crate::value::RemoteValue;
use async_trait::async_trait;
use guestwire_protocol::{methods, AttributeKind, ImportParams, InspectParams};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// A guest module, imported on first use.
///
/// Creating the handle costs nothing. The first attribute access sends an
/// `import`; later accesses skip it. Clones share the imported state.
#[derive(Debug, Clone)]
pub struct RemoteModule {
    session: RemoteSession,
    name: String,
    imported: Arc<OnceCell<()>>,
}

/// What a module attribute turned out to be.
#[derive(Debug, Clone)]
pub enum ModuleAttr {
    Module(RemoteModule),
    Callable(RemoteCallable),
    Value(RemoteValue),
}

impl ModuleAttr {
    pub fn into_module(self) -> Option<RemoteModule> {
        match self {
            Self::Module(m) => Some(m),
            _ => None,
        }
    }

    pub fn into_callable(self) -> Option<RemoteCallable> {
        match self {
            Self::Callable(c) => Some(c),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<RemoteValue> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl RemoteModule {
    pub(crate) fn new(session: RemoteSession, name: &str) -> Self {
        Self {
            session,
            name: name.to_string(),
            imported: Arc::new(OnceCell::new()),
        }
    }

    /// Submodules are loaded together with their parent.
    fn submodule(session: RemoteSession, name: String) -> Self {
        Self {
            session,
            name,
            imported: Arc::new(OnceCell::new_with(Some(()))),
        }
    }

    /// Dotted module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_imported(&self) -> bool {
        self.imported.initialized()
    }

    /// Import the module in the guest unless that already happened.
    pub async fn ensure_imported(&self) -> Result<()> {
        self.imported
            .get_or_try_init(|| async {
                tracing::debug!(module = %self.name, "Importing guest module");
                let _: serde_json::Value = self
                    .session
                    .request(
                        methods::IMPORT,
                        ImportParams {
                            module: self.name.clone(),
                        },
                    )
                    .await?;
                Ok::<(), CoreError>(())
            })
            .await?;
        Ok(())
    }

    /// Look up an attribute and wrap it in the matching handle.
    pub async fn attr(&self, name: &str) -> Result<ModuleAttr> {
        self.ensure_imported().await?;
        let path = self.path(name);
        let kind: AttributeKind = self
            .session
            .request(methods::INSPECT, InspectParams { path: path.clone() })
            .await?;
        tracing::trace!(path = %path, kind = ?kind, "Inspected module attribute");
        Ok(match kind {
            AttributeKind::Module => ModuleAttr::Module(Self::submodule(self.session.clone(), path)),
            AttributeKind::Callable => {
                ModuleAttr::Callable(RemoteCallable::path(self.session.clone(), path))
            }
            AttributeKind::Value { value } => {
                ModuleAttr::Value(marshal::unpack(&self.session, value))
            }
        })
    }

    /// The module object itself, as a handle.
    pub async fn object(&self) -> Result<RemoteObject> {
        self.ensure_imported().await?;
        self.session.evaluate(&self.name).await?.try_into()
    }

    fn path(&self, attr: &str) -> String {
        format!("{}.{attr}", self.name)
    }
}

#[async_trait]
impl RemoteAttributes for RemoteModule {
    async fn get(&self, name: &str) -> Result<RemoteValue> {
        self.ensure_imported().await?;
        self.session.evaluate(&self.path(name)).await
    }

    async fn set(&self, name: &str, value: RemoteValue) -> Result<()> {
        self.object().await?.set(name, value).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.object().await?.delete(name).await
    }

    async fn invoke(
        &self,
        name: &str,
        args: &[RemoteValue],
        kwargs: &[(&str, RemoteValue)],
    ) -> Result<RemoteValue> {
        self.ensure_imported().await?;
        self.session.invoke(&self.path(name), args, kwargs).await
    }
}

/// A guest callable addressed by name rather than by reference.
#[derive(Debug, Clone)]
pub struct RemoteCallable {
    session: RemoteSession,
    name: String,
    builtin: bool,
}

impl RemoteCallable {
    pub(crate) fn path(session: RemoteSession, path: String) -> Self {
        Self {
            session,
            name: path,
            builtin: false,
        }
    }

    pub(crate) fn builtin(session: RemoteSession, name: &str) -> Self {
        Self {
            session,
            name: name.to_string(),
            builtin: true,
        }
    }

    /// Dotted path, or the builtin's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn call(
        &self,
        args: &[RemoteValue],
        kwargs: &[(&str, RemoteValue)],
    ) -> Result<RemoteValue> {
        if self.builtin {
            self.session.invoke_builtin(&self.name, args, kwargs).await
        } else {
            self.session.invoke(&self.name, args, kwargs).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{recording, wire};
    use guestwire_protocol::WireValue;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_import_happens_once() {
        let (session, sent) = recording(vec![
            Ok(Value::Null),
            Ok(json!({"kind": "callable"})),
            Ok(json!({"kind": "value", "value": {"kind": "primitive", "value": "/"}})),
        ]);
        let os = session.import("os");
        assert!(!os.is_imported());

        let getcwd = os.attr("getcwd").await.unwrap().into_callable().unwrap();
        assert_eq!(getcwd.name(), "os.getcwd");
        assert!(os.is_imported());

        let sep = os.attr("sep").await.unwrap().into_value().unwrap();
        assert_eq!(sep, RemoteValue::from("/"));

        let sent = sent.lock().unwrap();
        let methods: Vec<&str> = sent.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(methods, vec!["import", "inspect", "inspect"]);
        assert_eq!(sent[0].1["module"], "os");
        assert_eq!(sent[2].1["path"], "os.sep");
    }

    #[tokio::test]
    async fn test_submodule_is_already_imported() {
        let (session, sent) = recording(vec![
            Ok(Value::Null),
            Ok(json!({"kind": "module"})),
            Ok(wire(WireValue::primitive("a/b"))),
        ]);
        let path = session
            .import("os")
            .attr("path")
            .await
            .unwrap()
            .into_module()
            .unwrap();
        assert_eq!(path.name(), "os.path");
        assert!(path.is_imported());

        let joined = path
            .invoke("join", &["a".into(), "b".into()], &[])
            .await
            .unwrap();
        assert_eq!(joined, RemoteValue::from("a/b"));

        let sent = sent.lock().unwrap();
        assert_eq!(sent[2].0, "invoke_module");
        assert_eq!(sent[2].1["name"], "os.path.join");
    }

    #[tokio::test]
    async fn test_failed_import_is_retried() {
        let (session, sent) = recording(vec![
            Err(CoreError::Connection("reset".into())),
            Ok(Value::Null),
            Ok(wire(WireValue::primitive(1_i64))),
        ]);
        let sys = session.import("sys");
        assert!(sys.get("maxsize").await.is_err());
        assert!(!sys.is_imported());
        assert_eq!(sys.get("maxsize").await.unwrap(), RemoteValue::Int(1));
        assert_eq!(sent.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_builtin_callable() {
        let (session, sent) = recording(vec![Ok(wire(WireValue::primitive(3_i64)))]);
        let len = session.builtin("len");
        let n = len.call(&["abc".into()], &[]).await.unwrap();
        assert_eq!(n, RemoteValue::Int(3));
        assert_eq!(sent.lock().unwrap()[0].0, "invoke_builtin");
    }
}
