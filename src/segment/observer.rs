//! Stream lifecycle observers
//!
//! The registry holds weak references: an observer stays registered only as
//! long as its owner keeps it alive, and dropped observers are pruned on the
//! next notification.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock, Weak};

/// Error an observer may report from a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverError(pub String);

impl std::fmt::Display for ObserverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Observer failed: {}", self.0)
    }
}

impl std::error::Error for ObserverError {}

/// Receives segment stream lifecycle events
pub trait SegmentStreamObserver: Send + Sync {
    /// A stream was disconnected and its sessions should be torn down
    fn on_stream_disconnected(&self, app_name: &str, stream_name: &str)
        -> Result<(), ObserverError>;
}

/// Ordered set of observers
#[derive(Default)]
pub struct ObserverRegistry {
    observers: RwLock<Vec<Weak<dyn SegmentStreamObserver>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. Returns false if it is already registered.
    pub fn add(&self, observer: &Arc<dyn SegmentStreamObserver>) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(|e| e.into_inner());

        if observers.iter().any(|w| same_observer(w, observer)) {
            return false;
        }

        observers.push(Arc::downgrade(observer));
        true
    }

    /// Unregister an observer. Returns false if it was not registered.
    pub fn remove(&self, observer: &Arc<dyn SegmentStreamObserver>) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(|e| e.into_inner());
        let before = observers.len();
        observers.retain(|w| !same_observer(w, observer));
        before != observers.len()
    }

    /// Number of live registered observers
    pub fn len(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every registration
    pub fn clear(&self) {
        self.observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Notify every observer, in registration order, that a stream went away.
    ///
    /// A failing or panicking observer is logged and skipped. Returns the
    /// number of observers that handled the event successfully.
    pub fn notify_disconnected(&self, app_name: &str, stream_name: &str) -> usize {
        // Snapshot so observers may add/remove registrations from the callback
        let snapshot: Vec<Arc<dyn SegmentStreamObserver>> = {
            let mut observers = self.observers.write().unwrap_or_else(|e| e.into_inner());
            observers.retain(|w| w.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };

        let mut delivered = 0;
        for (index, observer) in snapshot.iter().enumerate() {
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                observer.on_stream_disconnected(app_name, stream_name)
            }));

            match result {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    tracing::warn!(
                        observer = index,
                        app = app_name,
                        stream = stream_name,
                        error = %e,
                        "Observer failed to handle disconnect"
                    );
                }
                Err(_) => {
                    tracing::error!(
                        observer = index,
                        app = app_name,
                        stream = stream_name,
                        "Observer panicked while handling disconnect"
                    );
                }
            }
        }

        delivered
    }
}

fn same_observer(weak: &Weak<dyn SegmentStreamObserver>, observer: &Arc<dyn SegmentStreamObserver>) -> bool {
    // Compare data pointers only; vtable pointers may differ across codegen units
    weak.upgrade()
        .map(|registered| Arc::as_ptr(&registered) as *const () == Arc::as_ptr(observer) as *const ())
        .unwrap_or(false)
}
