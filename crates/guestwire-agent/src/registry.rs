//! Server object registry.
//!
//! Objects that cannot travel by value are parked here and handed to the
//! host as an [`ObjectId`]. Entries are keyed by object identity: packing the
//! same object twice yields the same id and bumps a reference count. The host
//! drops references with the `release` operation; an entry is evicted once
//! its count reaches zero. Slots are never reused.

use crate::value::{identity, ObjectRef};
use guestwire_protocol::{ObjectId, StaleReason, StaleReference};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use uuid::Uuid;

/// An id that does not resolve to a live entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("stale reference {id}: {reason}")]
pub struct StaleReferenceError {
    pub id: ObjectId,
    pub reason: StaleReason,
}

impl From<StaleReferenceError> for StaleReference {
    fn from(err: StaleReferenceError) -> Self {
        StaleReference {
            id: err.id,
            reason: err.reason,
        }
    }
}

struct Entry {
    object: ObjectRef,
    refs: usize,
}

#[derive(Default)]
struct RegistryState {
    next_slot: u64,
    entries: HashMap<u64, Entry>,
    by_identity: HashMap<usize, u64>,
}

/// Identity-keyed table of objects shared with the host.
pub struct ObjectRegistry {
    id: Uuid,
    state: Mutex<RegistryState>,
}

impl ObjectRegistry {
    /// Create an empty registry with a fresh instance id.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Instance id stamped into every issued [`ObjectId`].
    pub fn id(&self) -> Uuid {
        self.id
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store `object` and return its id.
    ///
    /// Registering an object that is already present returns the existing
    /// id and takes one more reference.
    pub fn register(&self, object: &ObjectRef) -> ObjectId {
        let mut state = self.lock();
        let key = identity(object);

        if let Some(&slot) = state.by_identity.get(&key) {
            if let Some(entry) = state.entries.get_mut(&slot) {
                entry.refs += 1;
                return ObjectId::new(self.id, slot);
            }
        }

        let slot = state.next_slot;
        state.next_slot += 1;
        state.entries.insert(
            slot,
            Entry {
                object: object.clone(),
                refs: 1,
            },
        );
        state.by_identity.insert(key, slot);

        tracing::trace!(slot, class = object.class_name(), "Registered object");
        ObjectId::new(self.id, slot)
    }

    /// Look up the object behind `id`.
    pub fn resolve(&self, id: &ObjectId) -> Result<ObjectRef, StaleReferenceError> {
        let state = self.lock();
        match state.entries.get(&id.slot) {
            Some(entry) if id.registry == self.id => Ok(entry.object.clone()),
            _ => Err(self.stale(&state, id)),
        }
    }

    /// Drop one reference to `id`. Returns `true` if the entry was evicted.
    pub fn release(&self, id: &ObjectId) -> Result<bool, StaleReferenceError> {
        let mut state = self.lock();
        let remaining = if id.registry == self.id {
            state.entries.get_mut(&id.slot).map(|entry| {
                entry.refs = entry.refs.saturating_sub(1);
                entry.refs
            })
        } else {
            None
        };
        let Some(remaining) = remaining else {
            return Err(self.stale(&state, id));
        };
        if remaining > 0 {
            return Ok(false);
        }

        if let Some(entry) = state.entries.remove(&id.slot) {
            state.by_identity.remove(&identity(&entry.object));
        }
        tracing::trace!(slot = id.slot, "Evicted object");
        Ok(true)
    }

    /// Evict every entry, returning how many there were.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let count = state.entries.len();
        state.entries.clear();
        state.by_identity.clear();
        count
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn stale(&self, state: &RegistryState, id: &ObjectId) -> StaleReferenceError {
        let reason = if id.registry != self.id {
            StaleReason::ForeignRegistry
        } else if id.slot < state.next_slot {
            StaleReason::Released
        } else {
            StaleReason::NeverIssued
        };
        StaleReferenceError { id: *id, reason }
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}
