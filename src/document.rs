//! Shared documents
//!
//! Projections never own their tree. They hold a [`DocumentRef`]: an `Arc`
//! around the document behind a read/write lock, plus the reentrant call
//! lock used when a projector serializes calls per document.
//!
//! Every write guard handed out bumps the document's generation, so caches
//! keyed on it go stale no matter which projector (or caller) changed the
//! tree. Observers registered on the document are told after each mutation
//! made through a projection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use xbind_tree::Document;

use crate::observer::{ChangeObserver, ObserverRegistry};

/// Reference-counted handle to a shared document
pub type DocumentRef = Arc<SharedDocument>;

/// A tree document shared by every projection bound into it
#[derive(Debug, Default)]
pub struct SharedDocument {
    tree: RwLock<Document>,
    call_lock: ReentrantMutex<()>,
    generation: AtomicU64,
    observers: ObserverRegistry,
}

impl SharedDocument {
    /// Share `document`
    pub fn new(document: Document) -> DocumentRef {
        Arc::new(Self {
            tree: RwLock::new(document),
            ..Self::default()
        })
    }

    /// Shared read access to the tree
    pub fn read(&self) -> RwLockReadGuard<'_, Document> {
        self.tree.read()
    }

    /// Exclusive write access to the tree; counts as a change
    pub fn write(&self) -> RwLockWriteGuard<'_, Document> {
        let guard = self.tree.write();
        // Bumped under the guard: a reader holding the read lock sees a
        // generation that matches the tree it reads
        self.generation.fetch_add(1, Ordering::AcqRel);
        guard
    }

    /// Number of write guards handed out so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Hold the per-document call lock; reentrant on the same thread
    pub fn lock_calls(&self) -> ReentrantMutexGuard<'_, ()> {
        self.call_lock.lock()
    }

    /// Deep copy of the current tree
    pub fn snapshot(&self) -> Document {
        self.tree.read().clone()
    }

    /// Register an observer for mutations of this document, whichever
    /// projector performs them
    pub fn add_change_observer(&self, observer: &Arc<dyn ChangeObserver>) {
        self.observers.add(observer);
    }

    pub(crate) fn notify_changed(&self) {
        self.observers.notify();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_call_lock_is_reentrant() {
        let doc = SharedDocument::new(Document::with_root("a"));
        let outer = doc.lock_calls();
        let inner = doc.lock_calls();
        drop(inner);
        drop(outer);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let doc = SharedDocument::new(Document::with_root("a"));
        let copy = doc.snapshot();
        {
            let mut tree = doc.write();
            let root = tree.document_element().unwrap();
            tree.set_attribute(root, "x", "1").unwrap();
        }
        assert_ne!(copy, doc.snapshot());
    }

    #[test]
    fn test_write_guard_bumps_generation() {
        let doc = SharedDocument::new(Document::with_root("a"));
        let start = doc.generation();
        drop(doc.read());
        assert_eq!(doc.generation(), start);
        drop(doc.write());
        drop(doc.write());
        assert_eq!(doc.generation(), start + 2);
    }
}
