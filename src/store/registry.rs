//! Resolves a [`crate::codec::Value::Ref`] container name to a live handle (spec §9's
//! redesign note: "a global mutable reference registry... re-architected abstractly as
//! an injected registry held by whoever needs cross-container references in scope").
//!
//! A process-wide singleton would leak handles across unrelated [`crate::engine::Environment`]s
//! opened in the same test binary, so this registry is instead owned by whichever caller
//! establishes the scope — today, one per [`crate::mmr::MmrService`], covering that
//! service's per-level internal-node maps. Construction never recurses (a miss always
//! resolves by opening or creating the map directly, never by calling back into the
//! registry), so a plain `Mutex` stands in for the reentrant lock the redesign note
//! anticipates.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::Result;
use crate::store::map::KeyValueMap;

/// A name-keyed cache of open [`KeyValueMap`] handles, with idempotent construction.
pub struct ContainerRegistry {
    maps: Mutex<HashMap<String, Arc<KeyValueMap>>>,
}

impl ContainerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { maps: Mutex::new(HashMap::new()) }
    }

    /// Returns the cached handle for `name` if present, running a fresh lookup under
    /// the lock otherwise so concurrent first-time resolution never opens the same
    /// container twice.
    ///
    /// # Errors
    /// Returns whatever error `make` returns.
    pub fn get_or_open(&self, name: &str, make: impl FnOnce() -> Result<Arc<KeyValueMap>>) -> Result<Arc<KeyValueMap>> {
        if let Some(existing) = self.maps.lock().get(name) {
            return Ok(Arc::clone(existing));
        }
        let handle = make()?;
        let mut guard = self.maps.lock();
        Ok(Arc::clone(guard.entry(name.to_string()).or_insert(handle)))
    }

    /// Registers an already-open handle, e.g. right after creating it, so a later
    /// lookup never reopens it.
    pub fn insert(&self, name: String, handle: Arc<KeyValueMap>) {
        self.maps.lock().insert(name, handle);
    }
}

impl Default for ContainerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Environment;
    use tempfile::tempdir;

    fn env() -> Arc<Environment> {
        let dir = tempdir().unwrap();
        Environment::open(dir.keep(), 0, true, 64).unwrap()
    }

    #[test]
    fn get_or_open_resolves_once() {
        let registry = ContainerRegistry::new();
        let env = env();
        let mut calls = 0;
        let first = registry
            .get_or_open("child", || {
                calls += 1;
                KeyValueMap::create_unbucketed(env.clone(), "child", false)
            })
            .unwrap();
        let second = registry.get_or_open("child", || unreachable!("cached lookup must not call make again")).unwrap();
        assert_eq!(calls, 1);
        assert!(Arc::ptr_eq(&first, &second));
    }
}
