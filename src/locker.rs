//! `Locker<T>` — the platform mutex every primitive's critical section
//! mutates its state through (spec §4.1).
//!
//! Several primitives call back into their own mutator from inside a
//! callback that already holds the lock: `AsyncCountdownEvent::signal`
//! re-entering its admission drain, a `TaskQueue` barrier release chaining
//! straight into the next entry's resume, or `CancellationSource::cancel`
//! triggering a registered child that itself registers a new cancellable
//! on the same source. A plain mutex would deadlock there (the spec calls
//! re-entrance detection "mandatory: a simple mutex will deadlock" — see
//! `SPEC_FULL.md` §9). `Locker` is built on [`parking_lot::ReentrantMutex`],
//! which tracks the owning OS thread and lets that thread re-enter without
//! blocking on itself; the protected state sits behind a `RefCell` inside
//! it, so nested access is checked at runtime rather than requiring
//! `unsafe` aliasing.

use std::cell::RefCell;
use std::sync::Arc;

use parking_lot::ReentrantMutex;

/// A re-entrant-aware critical section guarding state `T`.
///
/// Two `Locker`s compare equal iff they wrap the same underlying OS
/// primitive.
pub struct Locker<T> {
    inner: Arc<ReentrantMutex<RefCell<T>>>,
}

impl<T> Locker<T> {
    /// Creates a new, independent critical section protecting `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(ReentrantMutex::new(RefCell::new(value))),
        }
    }

    /// Runs `critical` with exclusive (or re-entrant) access to the
    /// protected state.
    ///
    /// If the calling thread already holds this `Locker` higher up the
    /// call stack, the nested call does not block — it borrows the same
    /// `RefCell` again. Nested code must still avoid holding a live
    /// `&mut T` borrow across the point where it re-enters (the usual
    /// `RefCell` discipline); this crate's primitives always drop their
    /// borrow before invoking anything that might call back in, so this
    /// never panics in practice.
    pub fn with_locked<R>(&self, critical: impl FnOnce(&mut T) -> R) -> R {
        let guard = self.inner.lock();
        let mut data = guard.borrow_mut();
        critical(&mut data)
    }
}

impl<T> Clone for Locker<T> {
    /// Cloning a `Locker` shares the same underlying critical section.
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for Locker<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
impl<T> Eq for Locker<T> {}

impl<T> std::fmt::Debug for Locker<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Locker").finish_non_exhaustive()
    }
}
