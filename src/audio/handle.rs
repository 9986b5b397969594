//! Ephemeral, revocable access handles over recorded bytes.
//!
//! A [`HandleRegistry`] hands out [`AccessHandle`]s, each of which grants
//! read access to one immutable byte buffer until it is released.  Playback
//! sinks and the recording store never hold the bytes directly; they resolve
//! the handle each time they need the data, so a released handle cuts off
//! every outstanding reader.
//!
//! ```rust
//! use std::sync::Arc;
//! use voice_capture::audio::HandleRegistry;
//!
//! let registry = HandleRegistry::new();
//! let handle = registry.allocate(Arc::from(&b"pcm"[..]));
//! assert_eq!(handle.resolve().as_deref(), Some(&b"pcm"[..]));
//!
//! handle.release();
//! handle.release(); // no-op
//! assert!(handle.resolve().is_none());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// ---------------------------------------------------------------------------
// HandleRegistry
// ---------------------------------------------------------------------------

struct RegistryInner {
    next_id: AtomicU64,
    slots: Mutex<HashMap<u64, Arc<[u8]>>>,
}

impl RegistryInner {
    fn slots(&self) -> MutexGuard<'_, HashMap<u64, Arc<[u8]>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Allocator for [`AccessHandle`]s.
///
/// Cheap to clone; every clone shares the same table of live handles.
#[derive(Clone)]
pub struct HandleRegistry {
    inner: Arc<RegistryInner>,
}

impl HandleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                next_id: AtomicU64::new(1),
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register `data` and return a fresh handle granting access to it.
    pub fn allocate(&self, data: Arc<[u8]>) -> AccessHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.slots().insert(id, data);
        log::debug!("handle: allocated recording:{id}");
        AccessHandle {
            id,
            registry: Arc::clone(&self.inner),
        }
    }

    /// Number of handles that have been allocated and not yet released.
    pub fn live_count(&self) -> usize {
        self.inner.slots().len()
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("live", &self.live_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// AccessHandle
// ---------------------------------------------------------------------------

/// Revocable locator for one artifact's bytes.
///
/// Clones refer to the same slot: releasing any clone invalidates all of them.
/// Dropping a handle does **not** release it; the holder must call
/// [`release`](Self::release) explicitly.
#[derive(Clone)]
pub struct AccessHandle {
    id: u64,
    registry: Arc<RegistryInner>,
}

impl AccessHandle {
    /// Numeric id, unique within the owning registry.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// String form of the locator, e.g. `recording:7`.
    pub fn locator(&self) -> String {
        format!("recording:{}", self.id)
    }

    /// The bytes behind this handle, or `None` once it has been released.
    pub fn resolve(&self) -> Option<Arc<[u8]>> {
        self.registry.slots().get(&self.id).cloned()
    }

    /// Returns `true` until the handle is released.
    pub fn is_valid(&self) -> bool {
        self.registry.slots().contains_key(&self.id)
    }

    /// Revoke the handle.
    ///
    /// Returns `true` when this call performed the release and `false` when
    /// the handle was already released.
    pub fn release(&self) -> bool {
        let released = self.registry.slots().remove(&self.id).is_some();
        if released {
            log::debug!("handle: released {}", self.locator());
        }
        released
    }
}

impl PartialEq for AccessHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.registry, &other.registry)
    }
}

impl Eq for AccessHandle {}

impl fmt::Debug for AccessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessHandle")
            .field("locator", &self.locator())
            .field("valid", &self.is_valid())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(data: &[u8]) -> Arc<[u8]> {
        Arc::from(data)
    }

    #[test]
    fn allocate_then_resolve() {
        let registry = HandleRegistry::new();
        let handle = registry.allocate(bytes(b"abc"));

        assert!(handle.is_valid());
        assert_eq!(handle.resolve().as_deref(), Some(&b"abc"[..]));
        assert_eq!(registry.live_count(), 1);
    }

    #[test]
    fn release_is_idempotent() {
        let registry = HandleRegistry::new();
        let handle = registry.allocate(bytes(b"abc"));

        assert!(handle.release());
        assert!(!handle.release());
        assert!(!handle.is_valid());
        assert!(handle.resolve().is_none());
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn release_does_not_touch_other_handles() {
        let registry = HandleRegistry::new();
        let first = registry.allocate(bytes(b"one"));
        let second = registry.allocate(bytes(b"two"));

        first.release();
        first.release();

        assert!(second.is_valid());
        assert_eq!(second.resolve().as_deref(), Some(&b"two"[..]));
    }

    #[test]
    fn clones_share_revocation() {
        let registry = HandleRegistry::new();
        let handle = registry.allocate(bytes(b"abc"));
        let clone = handle.clone();

        clone.release();
        assert!(!handle.is_valid());
        assert_eq!(handle, clone);
    }

    #[test]
    fn ids_are_unique() {
        let registry = HandleRegistry::new();
        let a = registry.allocate(bytes(b""));
        let b = registry.allocate(bytes(b""));

        assert_ne!(a.id(), b.id());
        assert_ne!(a.locator(), b.locator());
    }

    #[test]
    fn outstanding_resolved_bytes_survive_release() {
        // A reader that already resolved the bytes keeps its Arc; only new
        // resolutions fail.
        let registry = HandleRegistry::new();
        let handle = registry.allocate(bytes(b"keep"));
        let held = handle.resolve().unwrap();

        handle.release();
        assert_eq!(&held[..], b"keep");
        assert!(handle.resolve().is_none());
    }

    #[test]
    fn handle_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AccessHandle>();
        assert_send_sync::<HandleRegistry>();
    }
}
