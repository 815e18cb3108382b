use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::DuplicateBindingError;

/// Tracks which storage keys currently have a live binding.
///
/// Owned by the composition root and handed to every store, so two writers
/// can never hold the same persisted record. Cloning shares the same set.
#[derive(Clone, Default)]
pub struct KeyRegistry {
    bound: Arc<Mutex<HashSet<String>>>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`. Fails immediately if it is already claimed; there is no waiting.
    pub fn acquire(&self, key: &str) -> Result<KeyHandle, DuplicateBindingError> {
        let mut bound = self.bound.lock();
        if !bound.insert(key.to_string()) {
            return Err(DuplicateBindingError {
                key: key.to_string(),
            });
        }
        debug!(key, "storage key acquired");

        Ok(KeyHandle {
            key: key.to_string(),
            registry: self.clone(),
        })
    }

    /// Give a key back. Equivalent to dropping the handle.
    pub fn release(&self, handle: KeyHandle) {
        drop(handle);
    }

    pub fn is_bound(&self, key: &str) -> bool {
        self.bound.lock().contains(key)
    }

    fn remove(&self, key: &str) {
        if self.bound.lock().remove(key) {
            debug!(key, "storage key released");
        }
    }
}

impl fmt::Debug for KeyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRegistry")
            .field("bound", &*self.bound.lock())
            .finish()
    }
}

/// Proof of an exclusive claim on a key. Released on drop.
#[derive(Debug)]
pub struct KeyHandle {
    key: String,
    registry: KeyRegistry,
}

impl KeyHandle {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyHandle {
    fn drop(&mut self) {
        self.registry.remove(&self.key);
    }
}
