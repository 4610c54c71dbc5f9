//! Per-connection guest state.

use crate::config::Limits;
use crate::interp::Interpreter;
use crate::marshal::Marshaller;
use crate::registry::ObjectRegistry;
use tracing::{debug, info};
use uuid::Uuid;

/// Everything one host connection can see.
///
/// Each connection gets its own interpreter (globals, module table) and its
/// own object registry. Ids handed out on one connection are stale on any
/// other, and every registry entry is dropped when the session ends.
pub struct GuestSession {
    id: Uuid,
    interpreter: Interpreter,
    registry: ObjectRegistry,
}

impl GuestSession {
    pub fn new(limits: Limits) -> Self {
        let session = Self {
            id: Uuid::new_v4(),
            interpreter: Interpreter::new(limits),
            registry: ObjectRegistry::new(),
        };
        info!(session = %session.id, registry = %session.registry.id(), "session opened");
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn marshaller(&self) -> Marshaller<'_> {
        Marshaller::new(&self.registry)
    }
}

impl Drop for GuestSession {
    fn drop(&mut self) {
        let evicted = self.registry.clear();
        debug!(session = %self.id, evicted, "registry cleared");
        info!(session = %self.id, "session closed");
    }
}
