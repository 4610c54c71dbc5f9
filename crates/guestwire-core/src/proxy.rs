//! Proxies for guest objects.
//!
//! A [`RemoteObject`] holds no guest state of its own: every attribute
//! access, call or display request is one round trip. What it does hold is
//! the descriptor the guest sent with the reference, including the method
//! list used to build [`RemoteMethod`] handles without asking the guest.

use crate::error::{CoreError, Result};
use crate::marshal;
use crate::session::RemoteSession;
use crate::value::RemoteValue;
use async_trait::async_trait;
use guestwire_protocol::{
    methods, AttrParams, CallAttrParams, CallParams, MethodDescriptor, ObjectDescriptor, ObjectId,
    ObjectParams, SetAttrParams, WireValue,
};
use std::fmt;
use std::sync::Arc;

/// Attribute names answered by the proxy itself.
///
/// Reads are served from the descriptor without a round trip; writes and
/// deletes fail with [`CoreError::ReadOnlyAttribute`]. Every other name is
/// forwarded to the guest.
pub const LOCAL_ATTRS: &[&str] = &["__oid__", "__class__", "__module__", "__methods__"];

/// The closed set of dynamic operations a guest-backed handle supports.
#[async_trait]
pub trait RemoteAttributes {
    /// Read an attribute.
    async fn get(&self, name: &str) -> Result<RemoteValue>;

    /// Assign an attribute.
    async fn set(&self, name: &str, value: RemoteValue) -> Result<()>;

    /// Delete an attribute.
    async fn delete(&self, name: &str) -> Result<()>;

    /// Call the attribute `name` with arguments.
    async fn invoke(
        &self,
        name: &str,
        args: &[RemoteValue],
        kwargs: &[(&str, RemoteValue)],
    ) -> Result<RemoteValue>;
}

/// Handle to an object held in the guest's registry.
#[derive(Clone)]
pub struct RemoteObject {
    session: RemoteSession,
    descriptor: Arc<ObjectDescriptor>,
    stream: bool,
}

impl RemoteObject {
    pub(crate) fn new(session: RemoteSession, descriptor: ObjectDescriptor, stream: bool) -> Self {
        tracing::trace!(object_id = %descriptor.id, class = %descriptor.class_name, "new object handle");
        Self {
            session,
            descriptor: Arc::new(descriptor),
            stream,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.descriptor.id
    }

    pub fn class_name(&self) -> &str {
        &self.descriptor.class_name
    }

    pub fn module_name(&self) -> &str {
        &self.descriptor.module_name
    }

    /// Methods the object had when it was packed.
    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.descriptor.methods
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods().iter().any(|m| m.name == name)
    }

    /// Whether the guest marked the object as file-like.
    pub fn is_stream(&self) -> bool {
        self.stream
    }

    pub fn descriptor(&self) -> &ObjectDescriptor {
        &self.descriptor
    }

    pub fn session(&self) -> &RemoteSession {
        &self.session
    }

    /// Handle for one of the object's advertised methods.
    ///
    /// Returns `None` for names the descriptor does not list. Those can
    /// still be reached through [`RemoteAttributes::invoke`].
    pub fn method(&self, name: &str) -> Option<RemoteMethod> {
        let descriptor = self.methods().iter().find(|m| m.name == name)?;
        Some(RemoteMethod {
            object: self.clone(),
            name: descriptor.name.clone(),
            doc: descriptor.doc.clone(),
        })
    }

    /// Call the object itself.
    pub async fn call(
        &self,
        args: &[RemoteValue],
        kwargs: &[(&str, RemoteValue)],
    ) -> Result<RemoteValue> {
        let (args, kwargs) = marshal::pack_args(args, kwargs);
        let params = CallParams {
            object: self.wire(),
            args,
            kwargs,
        };
        self.session.request_value(methods::CALL, params).await
    }

    /// Attribute names, as the guest's `dir()` reports them.
    pub async fn dir(&self) -> Result<Vec<String>> {
        self.object_op(methods::DIR).await?.try_into()
    }

    /// The guest's `str()` of the object.
    pub async fn str(&self) -> Result<String> {
        self.object_op(methods::STR).await?.try_into()
    }

    /// The guest's `repr()` of the object.
    pub async fn repr(&self) -> Result<String> {
        self.object_op(methods::REPR).await?.try_into()
    }

    /// Enter the object's context.
    pub async fn enter(&self) -> Result<RemoteValue> {
        self.invoke("__enter__", &[], &[]).await
    }

    /// Leave the object's context without an exception.
    pub async fn exit(&self) -> Result<RemoteValue> {
        let none = [RemoteValue::None, RemoteValue::None, RemoteValue::None];
        self.invoke("__exit__", &none, &[]).await
    }

    async fn object_op(&self, method: &str) -> Result<RemoteValue> {
        let params = ObjectParams {
            object: self.wire(),
        };
        self.session.request_value(method, params).await
    }

    fn wire(&self) -> WireValue {
        let descriptor = self.descriptor().clone();
        if self.stream {
            WireValue::Stream(descriptor)
        } else {
            WireValue::Reference(descriptor)
        }
    }

    fn local(&self, name: &str) -> Option<RemoteValue> {
        let value = match name {
            "__oid__" => RemoteValue::Str(self.id().to_string()),
            "__class__" => RemoteValue::from(self.class_name()),
            "__module__" => RemoteValue::from(self.module_name()),
            "__methods__" => RemoteValue::List(
                self.methods()
                    .iter()
                    .map(|m| RemoteValue::from(m.name.as_str()))
                    .collect(),
            ),
            _ => return None,
        };
        Some(value)
    }

    fn check_writable(name: &str) -> Result<()> {
        if LOCAL_ATTRS.contains(&name) {
            return Err(CoreError::ReadOnlyAttribute(name.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteAttributes for RemoteObject {
    async fn get(&self, name: &str) -> Result<RemoteValue> {
        if let Some(value) = self.local(name) {
            return Ok(value);
        }
        let params = AttrParams {
            object: self.wire(),
            name: name.into(),
        };
        self.session.request_value(methods::GETATTR, params).await
    }

    async fn set(&self, name: &str, value: RemoteValue) -> Result<()> {
        Self::check_writable(name)?;
        let params = SetAttrParams {
            object: self.wire(),
            name: name.into(),
            value: marshal::pack(&value),
        };
        let _: serde_json::Value = self.session.request(methods::SETATTR, params).await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        Self::check_writable(name)?;
        let params = AttrParams {
            object: self.wire(),
            name: name.into(),
        };
        let _: serde_json::Value = self.session.request(methods::DELATTR, params).await?;
        Ok(())
    }

    async fn invoke(
        &self,
        name: &str,
        args: &[RemoteValue],
        kwargs: &[(&str, RemoteValue)],
    ) -> Result<RemoteValue> {
        tracing::debug!(object_id = %self.id(), method = %name, "Calling guest method");
        let (args, kwargs) = marshal::pack_args(args, kwargs);
        let params = CallAttrParams {
            object: self.wire(),
            name: name.into(),
            args,
            kwargs,
        };
        self.session.request_value(methods::CALLATTR, params).await
    }
}

impl PartialEq for RemoteObject {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id() && self.session.same_session(&other.session)
    }
}

impl fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteObject")
            .field("id", &self.id())
            .field("class_name", &self.class_name())
            .field("module_name", &self.module_name())
            .field("stream", &self.stream)
            .finish()
    }
}

impl fmt::Display for RemoteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<remote {}.{} object {}>",
            self.module_name(),
            self.class_name(),
            self.id()
        )
    }
}

/// One advertised method of a [`RemoteObject`], bound to it.
#[derive(Debug, Clone)]
pub struct RemoteMethod {
    object: RemoteObject,
    name: String,
    doc: Option<String>,
}

impl RemoteMethod {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Docstring captured when the object was packed.
    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    pub async fn call(
        &self,
        args: &[RemoteValue],
        kwargs: &[(&str, RemoteValue)],
    ) -> Result<RemoteValue> {
        self.object.invoke(&self.name, args, kwargs).await
    }
}
