//! `TaskTracker` — a scope-local value that fires a completion callback
//! once its scope and every descendant holding a clone have dropped
//! (spec §4.9). Used by [`crate::task_operation::TaskOperation`]'s
//! `track_unstructured_tasks` flag to know when a launched closure's
//! unstructured descendants have *all* finished, not just the closure
//! itself.
//!
//! # Grounding
//! Mirrors the ownership-transfer discipline of `spark-core`'s
//! `JoinHandle`/`TaskHandle` (single consumption, cleanup driven by
//! `Drop`), generalized here to "cleanup fires when the *last* clone
//! drops" via `Arc`'s strong-count semantics rather than a single-owner
//! handle.

use std::sync::Arc;

/// A cloneable token; the wrapped callback fires exactly once, when the
/// last clone (including the original) is dropped.
#[derive(Clone)]
pub struct TaskTracker {
    inner: Arc<Inner>,
}

struct Inner {
    on_complete: parking_lot::Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl TaskTracker {
    /// Creates a tracker that invokes `on_complete` once every clone has
    /// dropped.
    pub fn new(on_complete: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                on_complete: parking_lot::Mutex::new(Some(Box::new(on_complete))),
            }),
        }
    }

    /// Number of live clones (including `self`), for diagnostics/tests.
    pub fn live_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(callback) = self.on_complete.lock().take() {
            callback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn fires_only_after_last_clone_drops() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired_for_callback = fired.clone();
        let tracker = TaskTracker::new(move || {
            fired_for_callback.store(true, Ordering::SeqCst);
        });
        let clone = tracker.clone();
        assert_eq!(tracker.live_count(), 2);
        drop(clone);
        assert!(!fired.load(Ordering::SeqCst), "one clone remains");
        drop(tracker);
        assert!(fired.load(Ordering::SeqCst));
    }
}
