//! Native modules importable by guest code.
//!
//! Each interpreter owns a [`ModuleTable`]; a module is built on first
//! import and cached, so every import of the same name in one session hands
//! out the same object.

mod os;
mod shutil;
mod subprocess;
mod system;

use crate::config::Limits;
use crate::error::{GuestError, Result};
use crate::objects::ModuleObject;
use crate::value::ObjectRef;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Fully qualified names of every importable module.
pub const AVAILABLE: &[&str] = &[
    "os",
    "os.path",
    "platform",
    "shutil",
    "subprocess",
    "sys",
    "time",
];

/// Modules loaded by one interpreter.
#[derive(Debug)]
pub struct ModuleTable {
    limits: Limits,
    loaded: Mutex<HashMap<String, ObjectRef>>,
}

impl ModuleTable {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Names of the importable modules.
    pub fn available(&self) -> Vec<String> {
        AVAILABLE.iter().map(|s| s.to_string()).collect()
    }

    /// Import `a.b.c`, loading each package along the way.
    ///
    /// Returns the top-level package and the leaf module.
    pub fn import(&self, dotted: &str) -> Result<(ObjectRef, ObjectRef)> {
        let mut prefix = String::new();
        let mut chain = Vec::new();
        for segment in dotted.split('.') {
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(segment);
            chain.push(self.load(&prefix)?);
        }
        match (chain.first(), chain.last()) {
            (Some(top), Some(leaf)) => Ok((top.clone(), leaf.clone())),
            _ => Err(GuestError::import_error(dotted)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ObjectRef>> {
        self.loaded.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn load(&self, name: &str) -> Result<ObjectRef> {
        if let Some(module) = self.lock().get(name) {
            return Ok(module.clone());
        }

        let mut module = build(name, self.limits).ok_or_else(|| GuestError::import_error(name))?;
        for child in children(name) {
            let submodule = self.load(child)?;
            module = module.with(&child[name.len() + 1..], submodule);
        }

        debug!(module = %name, "module loaded");
        // A concurrent import may have won; keep the first one.
        let mut loaded = self.lock();
        Ok(loaded
            .entry(name.to_string())
            .or_insert_with(|| module.into_ref())
            .clone())
    }
}

/// Direct submodules of `name`.
fn children(name: &str) -> impl Iterator<Item = &'static str> + '_ {
    AVAILABLE.iter().copied().filter(move |candidate| {
        candidate
            .strip_prefix(name)
            .and_then(|rest| rest.strip_prefix('.'))
            .is_some_and(|rest| !rest.contains('.'))
    })
}

fn build(name: &str, limits: Limits) -> Option<ModuleObject> {
    let module = match name {
        "os" => os::module(),
        "os.path" => os::path_module(),
        "platform" => system::platform_module(),
        "shutil" => shutil::module(),
        "subprocess" => subprocess::module(limits),
        "sys" => system::sys_module(),
        "time" => system::time_module(),
        _ => return None,
    };
    Some(module)
}
