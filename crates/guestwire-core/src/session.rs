//! Remote session: one connection to one guest agent.

use crate::config::SessionConfig;
use crate::error::{CoreError, Result};
use crate::function::RemoteFunction;
use crate::marshal;
use crate::module::{RemoteCallable, RemoteModule};
use crate::proxy::RemoteObject;
use crate::transport::{Transport, UnixTransport};
use crate::value::RemoteValue;
use guestwire_protocol::{
    methods, EvaluateParams, ExecuteParams, InvokeParams, ObjectId, PingResult, ReleaseParams,
    ReleaseResult, WireValue,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// A connection to a guest agent, shared by every handle created from it.
///
/// Cloning is cheap; clones talk over the same connection. Operations from
/// concurrent callers are serialized, one request in flight at a time.
#[derive(Clone)]
pub struct RemoteSession {
    transport: Arc<Mutex<Box<dyn Transport>>>,
}

impl RemoteSession {
    /// Wrap an already-connected transport.
    pub fn new<T: Transport + 'static>(transport: T) -> Self {
        Self {
            transport: Arc::new(Mutex::new(Box::new(transport))),
        }
    }

    /// Connect to the agent described by `config`.
    pub async fn connect(config: &SessionConfig) -> Result<Self> {
        config.validate()?;
        let transport = UnixTransport::connect(config).await?;
        Ok(Self::new(transport))
    }

    /// Whether two handles share a connection.
    pub fn same_session(&self, other: &RemoteSession) -> bool {
        Arc::ptr_eq(&self.transport, &other.transport)
    }

    /// Send one operation and decode its result.
    ///
    /// A result that does not decode as `R` (including an unknown wire tag)
    /// is a [`CoreError::Protocol`] error.
    pub(crate) async fn request<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params)?;
        let started = Instant::now();
        let result = {
            let mut transport = self.transport.lock().await;
            transport.request(method, params).await
        };
        tracing::debug!(
            method = %method,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "remote operation finished"
        );
        serde_json::from_value(result?)
            .map_err(|e| CoreError::Protocol(format!("unexpected {method} result: {e}")))
    }

    /// Send one operation whose result is a marshalled value.
    pub(crate) async fn request_value<P: Serialize>(
        &self,
        method: &str,
        params: P,
    ) -> Result<RemoteValue> {
        let wire: WireValue = self.request(method, params).await?;
        Ok(marshal::unpack(self, wire))
    }

    /// Check that the agent is responsive.
    pub async fn ping(&self) -> Result<()> {
        let _: PingResult = self.request(methods::PING, json!({})).await?;
        Ok(())
    }

    /// Run statements in the guest's global scope.
    pub async fn execute(&self, code: &str) -> Result<()> {
        tracing::debug!(code_len = code.len(), "Executing code in guest");
        let _: serde_json::Value = self
            .request(methods::EXECUTE, ExecuteParams { code: code.into() })
            .await?;
        Ok(())
    }

    /// Evaluate an expression in the guest's global scope.
    pub async fn evaluate(&self, expression: &str) -> Result<RemoteValue> {
        tracing::debug!(expression = %expression, "Evaluating in guest");
        self.request_value(
            methods::EVALUATE,
            EvaluateParams {
                expression: expression.into(),
            },
        )
        .await
    }

    /// Handle for a guest module. Nothing is sent until first use.
    pub fn import(&self, module: &str) -> RemoteModule {
        RemoteModule::new(self.clone(), module)
    }

    /// Names of the modules the guest can import.
    pub async fn modules(&self) -> Result<Vec<String>> {
        let names = self.request_value(methods::MODULES, json!({})).await?;
        names.try_into()
    }

    /// Call the guest callable at a dotted path, e.g. `os.path.join`.
    pub async fn invoke(
        &self,
        path: &str,
        args: &[RemoteValue],
        kwargs: &[(&str, RemoteValue)],
    ) -> Result<RemoteValue> {
        self.invoke_with(methods::INVOKE_MODULE, path, args, kwargs)
            .await
    }

    /// Call a guest builtin such as `len` or `open`.
    pub async fn invoke_builtin(
        &self,
        name: &str,
        args: &[RemoteValue],
        kwargs: &[(&str, RemoteValue)],
    ) -> Result<RemoteValue> {
        self.invoke_with(methods::INVOKE_BUILTIN, name, args, kwargs)
            .await
    }

    async fn invoke_with(
        &self,
        method: &str,
        name: &str,
        args: &[RemoteValue],
        kwargs: &[(&str, RemoteValue)],
    ) -> Result<RemoteValue> {
        let (args, kwargs) = marshal::pack_args(args, kwargs);
        let params = InvokeParams {
            name: name.into(),
            args,
            kwargs,
        };
        self.request_value(method, params).await
    }

    /// Handle for a guest builtin.
    pub fn builtin(&self, name: &str) -> RemoteCallable {
        RemoteCallable::builtin(self.clone(), name)
    }

    /// Define a function in the guest from its source text.
    pub async fn function(&self, source: &str) -> Result<RemoteFunction> {
        RemoteFunction::teleport(self.clone(), source).await
    }

    /// Give back one reference to `object`.
    ///
    /// Returns whether the guest dropped the object as a result. Other
    /// handles to the same object stay valid until they are released too.
    pub async fn release(&self, object: &RemoteObject) -> Result<bool> {
        Ok(self.release_ids(vec![object.id()]).await? > 0)
    }

    /// Give back one reference per id. Returns how many objects the guest
    /// dropped. Ids the guest no longer knows are ignored.
    pub async fn release_ids(&self, ids: Vec<ObjectId>) -> Result<usize> {
        let count = ids.len();
        let result: ReleaseResult = self
            .request(methods::RELEASE, ReleaseParams { ids })
            .await?;
        tracing::debug!(requested = count, released = result.released, "Released references");
        Ok(result.released)
    }
}

impl fmt::Debug for RemoteSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSession")
            .field("connection", &Arc::as_ptr(&self.transport))
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use guestwire_protocol::{error_codes, RpcError};
    use serde_json::Value;
    use std::collections::VecDeque;

    /// Requests seen by a [`ScriptedTransport`], in order.
    pub(crate) type Sent = Arc<std::sync::Mutex<Vec<(String, Value)>>>;

    /// Replays canned results and records what was asked.
    pub(crate) struct ScriptedTransport {
        replies: VecDeque<Result<Value>>,
        sent: Sent,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn request(&mut self, method: &str, params: Value) -> Result<Value> {
            self.sent.lock().unwrap().push((method.to_string(), params));
            self.replies
                .pop_front()
                .unwrap_or_else(|| Err(CoreError::Connection("script exhausted".into())))
        }
    }

    pub(crate) fn recording(replies: Vec<Result<Value>>) -> (RemoteSession, Sent) {
        let sent = Sent::default();
        let transport = ScriptedTransport {
            replies: replies.into(),
            sent: sent.clone(),
        };
        (RemoteSession::new(transport), sent)
    }

    pub(crate) fn scripted(replies: Vec<Value>) -> RemoteSession {
        recording(replies.into_iter().map(Ok).collect()).0
    }

    pub(crate) fn wire(value: WireValue) -> Value {
        serde_json::to_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_evaluate_unpacks_result() {
        let (session, sent) = recording(vec![Ok(wire(WireValue::primitive(2_i64)))]);
        let value = session.evaluate("1 + 1").await.unwrap();
        assert_eq!(value, RemoteValue::Int(2));

        let sent = sent.lock().unwrap();
        assert_eq!(sent[0].0, "evaluate");
        assert_eq!(sent[0].1["expression"], "1 + 1");
    }

    #[tokio::test]
    async fn test_unknown_tag_is_protocol_error() {
        let session = scripted(vec![json!({"kind": "pickled", "data": "..."})]);
        let err = session.evaluate("x").await.unwrap_err();
        assert!(matches!(err, CoreError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_transport_error_propagates_unchanged() {
        let (session, _) = recording(vec![Err(CoreError::from_rpc(RpcError {
            code: error_codes::REMOTE_EXCEPTION,
            message: "NameError: name 'x' is not defined".into(),
            data: Some(json!({"type_name": "NameError", "message": "name 'x' is not defined"})),
        }))]);
        let err = session.evaluate("x").await.unwrap_err();
        assert_eq!(
            err.remote_kind(),
            Some(guestwire_protocol::ExceptionKind::NameError)
        );

        let err = session.ping().await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_modules_and_release() {
        let names = WireValue::Sequence {
            container: guestwire_protocol::Container::List,
            items: vec![WireValue::primitive("os"), WireValue::primitive("sys")],
        };
        let (session, sent) = recording(vec![Ok(wire(names)), Ok(json!({"released": 0}))]);
        assert_eq!(session.modules().await.unwrap(), vec!["os", "sys"]);
        assert_eq!(session.release_ids(vec![]).await.unwrap(), 0);
        assert_eq!(sent.lock().unwrap()[1].0, "release");
    }

    #[test]
    fn test_clones_share_connection() {
        let a = scripted(vec![]);
        let b = a.clone();
        assert!(a.same_session(&b));
        assert!(!a.same_session(&scripted(vec![])));
    }
}
