//! Functions defined on the host and run in the guest.

use crate::error::{CoreError, Result};
use crate::marshal;
use crate::session::RemoteSession;
use crate::value::RemoteValue;
use guestwire_protocol::{function_name, methods, normalize_indentation, CallParams, WireValue};

/// A guest function created from host-side source text.
///
/// The definition is sent once, when the handle is created. Each call then
/// invokes the guest global by name, so it costs one round trip.
#[derive(Debug, Clone)]
pub struct RemoteFunction {
    session: RemoteSession,
    name: String,
    source: String,
}

impl RemoteFunction {
    /// Send the `def` in `source` to the guest.
    ///
    /// `source` may carry the indentation of wherever it was written; it is
    /// normalized before sending. It must start with a `def`.
    pub async fn teleport(session: RemoteSession, source: &str) -> Result<Self> {
        let source = normalize_indentation(source);
        let name = function_name(&source)
            .ok_or_else(|| CoreError::InvalidSource("source does not start with a def".into()))?
            .to_string();

        tracing::debug!(function = %name, source_len = source.len(), "Teleporting function");
        session.execute(&source).await?;
        Ok(Self {
            session,
            name,
            source,
        })
    }

    /// Name the function is bound to in the guest.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The normalized source that was sent.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub async fn call(
        &self,
        args: &[RemoteValue],
        kwargs: &[(&str, RemoteValue)],
    ) -> Result<RemoteValue> {
        let (args, kwargs) = marshal::pack_args(args, kwargs);
        let params = CallParams {
            object: WireValue::primitive(self.name.as_str()),
            args,
            kwargs,
        };
        self.session.request_value(methods::CALL, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{recording, wire};
    use serde_json::Value;

    #[tokio::test]
    async fn test_teleport_sends_normalized_definition() {
        let (session, sent) = recording(vec![Ok(Value::Null), Ok(wire(WireValue::primitive(5_i64)))]);
        let source = concat!(
            "            def add(a, b=1):\n",
            "                return a + b",
        );
        let add = session.function(source).await.unwrap();
        assert_eq!(add.name(), "add");
        assert_eq!(add.source(), "def add(a, b=1):\n    return a + b");

        let result = add.call(&[2.into()], &[("b", 3.into())]).await.unwrap();
        assert_eq!(result, RemoteValue::Int(5));

        let sent = sent.lock().unwrap();
        assert_eq!(sent[0].0, "execute");
        assert_eq!(sent[0].1["code"], "def add(a, b=1):\n    return a + b");
        assert_eq!(sent[1].0, "call");
        assert_eq!(sent[1].1["object"]["value"], "add");
    }

    #[tokio::test]
    async fn test_rejects_non_function_source() {
        let (session, sent) = recording(vec![]);
        let err = session.function("x = 1").await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidSource(_)));
        assert!(sent.lock().unwrap().is_empty());
    }
}
