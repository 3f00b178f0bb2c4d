//! Weakly held change observers
//!
//! Projectors and shared documents each keep a registry; both are
//! notified after every successful mutation. The
//! registry holds only `Weak` references: an observer lives exactly as long
//! as its owner keeps the `Arc`, and dead entries are pruned on the next
//! notification.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

/// Receives a signal after the projected tree changed
pub trait ChangeObserver: Send + Sync {
    /// Called once per successful mutation
    fn changed(&self);
}

/// Registry of weakly held observers
#[derive(Default)]
pub struct ObserverRegistry {
    observers: Mutex<Vec<Weak<dyn ChangeObserver>>>,
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("registered", &self.observers.lock().len())
            .finish()
    }
}

impl ObserverRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `observer` without keeping it alive
    pub fn add(&self, observer: &Arc<dyn ChangeObserver>) {
        self.observers.lock().push(Arc::downgrade(observer));
    }

    /// Number of registered observers still alive
    pub fn len(&self) -> usize {
        self.observers
            .lock()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Whether no live observer is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Signal every live observer and drop the dead ones
    pub fn notify(&self) {
        let live: Vec<Arc<dyn ChangeObserver>> = {
            let mut observers = self.observers.lock();
            let before = observers.len();
            observers.retain(|w| w.strong_count() > 0);
            if observers.len() != before {
                trace!(pruned = before - observers.len(), "dropped dead change observers");
            }
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        // Called without the registry lock so observers may register others
        for observer in live {
            observer.changed();
        }
    }
}
