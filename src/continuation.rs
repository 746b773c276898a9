//! The hard part: a one-shot resumable handle that remembers whether it has
//! been resumed ([`TrackedContinuation`]), and the insertion-ordered
//! registry of such handles every primitive suspends its waiters in
//! ([`WaiterRegistry`]). Spec §3/§4.2.
//!
//! # Design note on locking
//! The spec describes the registry as "guarded by one mutex (L0)", shared
//! with the owning primitive's [`crate::locker::Locker`]. This port gives
//! [`WaiterRegistry`] its own internal `parking_lot::Mutex` instead of
//! sharing the primitive's `Locker` object: registry mutation
//! (`insert`/`remove`/`pop_front`/`for_each`) never calls back into user
//! code, so there is no re-entrancy hazard to guard against here, and a
//! dedicated lock keeps the registry usable standalone (e.g. from a
//! primitive's `Drop` impl, which may run without the primitive's own
//! `Locker` held). The spec explicitly licenses "equivalent but simpler"
//! implementations of the shared substrate; this is one.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::Waker;

#[cfg(not(loom))]
use parking_lot::Mutex as RawMutex;
#[cfg(loom)]
use loom::sync::Mutex as RawMutex;

use crate::error::AsyncError;

/// The mutex guarding [`ContState`]/[`WaiterRegistry`]'s queue. Swapped for
/// `loom`'s model-checked `Mutex` under the `loom-model` feature's `cfg(loom)`
/// so `cargo test --features loom-model` can exhaustively explore the
/// interleavings of `install`/`resume`/`take` this module's doc comment
/// warns past revisions got wrong (double-resume, lost-cancellation,
/// deinit races) — see `tests/loom_concurrency.rs`. `parking_lot::Mutex`
/// remains the default: it is not `cfg(loom)`-aware and loom does not
/// instrument it.
struct Mx<T>(RawMutex<T>);

impl<T> Mx<T> {
    fn new(value: T) -> Self {
        Mx(RawMutex::new(value))
    }

    #[cfg(not(loom))]
    fn lock(&self) -> parking_lot::MutexGuard<'_, T> {
        self.0.lock()
    }

    #[cfg(loom)]
    fn lock(&self) -> loom::sync::MutexGuard<'_, T> {
        self.0.lock().expect("Mx mutex poisoned")
    }
}

/// An opaque, globally unique, insertion-ordered key. Equality is identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaiterId(u64);

static NEXT_WAITER_ID: AtomicU64 = AtomicU64::new(1);

impl WaiterId {
    /// Allocates a fresh, process-wide unique id.
    pub fn next() -> Self {
        WaiterId(NEXT_WAITER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for WaiterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WaiterId({})", self.0)
    }
}

/// Internal state machine backing [`TrackedContinuation`]:
/// `Pending` (no resume requested, no handle installed) → `Armed(Waker)`
/// (a real suspension handle has been installed) → `Resumed` (a result has
/// been delivered, waiting to be taken exactly once) → `Taken` (terminal).
enum ContState<T> {
    Pending,
    Armed(Waker),
    Resumed(Result<T, AsyncError>),
    Taken,
}

/// A one-shot resume slot. Exactly one of `resume(Ok(_))` /
/// `resume(Err(_))` takes effect; later attempts are no-ops. `resumed()`
/// becomes observable — under this type's internal lock — strictly before
/// the underlying waker is actually woken, so a registry racing to cancel
/// an already-resumed entry can tell not to.
pub struct TrackedContinuation<T> {
    state: Mx<ContState<T>>,
}

impl<T> TrackedContinuation<T> {
    pub fn new() -> Self {
        Self {
            state: Mx::new(ContState::Pending),
        }
    }

    /// Installs (or re-installs, on a later poll with a changed waker) the
    /// suspension handle. If a resume was already requested before this
    /// call (the producer raced ahead of the first poll), the handle is
    /// never stored — the caller should immediately re-check
    /// [`TrackedContinuation::take`].
    pub fn install(&self, waker: &Waker) {
        let mut guard = self.state.lock();
        match &mut *guard {
            ContState::Pending => {
                *guard = ContState::Armed(waker.clone());
            }
            ContState::Armed(existing) => {
                if !existing.will_wake(waker) {
                    *existing = waker.clone();
                }
            }
            ContState::Resumed(_) | ContState::Taken => {
                // Already resumed (possibly before we ever armed); the
                // caller's next `take()` will observe it. Nothing to do.
            }
        }
    }

    /// Resumes with `result`. No-op if already resumed. Returns `true` if
    /// this call was the one that took effect.
    pub fn resume(&self, result: Result<T, AsyncError>) -> bool {
        let waker = {
            let mut guard = self.state.lock();
            match &*guard {
                ContState::Resumed(_) | ContState::Taken => return false,
                ContState::Pending => {
                    *guard = ContState::Resumed(result);
                    None
                }
                ContState::Armed(_) => {
                    let prev = std::mem::replace(&mut *guard, ContState::Resumed(result));
                    match prev {
                        ContState::Armed(w) => Some(w),
                        _ => unreachable!(),
                    }
                }
            }
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    /// `resume(Err(Cancelled))`, per spec §4.2.
    pub fn cancel(&self) -> bool {
        self.resume(Err(AsyncError::Cancelled))
    }

    /// `true` once a resume has taken effect (whether or not the value has
    /// been taken yet).
    pub fn resumed(&self) -> bool {
        matches!(
            &*self.state.lock(),
            ContState::Resumed(_) | ContState::Taken
        )
    }

    /// Takes the delivered result exactly once. Returns `None` if no
    /// resume has landed yet.
    pub fn take(&self) -> Option<Result<T, AsyncError>> {
        let mut guard = self.state.lock();
        if matches!(&*guard, ContState::Resumed(_)) {
            match std::mem::replace(&mut *guard, ContState::Taken) {
                ContState::Resumed(result) => Some(result),
                _ => unreachable!(),
            }
        } else {
            None
        }
    }
}

impl<T> Default for TrackedContinuation<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Insertion-ordered `WaiterId -> TrackedContinuation` map, FIFO by
/// construction. Cheap to clone: clones share the same backing queue.
pub struct WaiterRegistry<T> {
    queue: Arc<Mx<VecDeque<(WaiterId, Arc<TrackedContinuation<T>>)>>>,
}

impl<T> WaiterRegistry<T> {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mx::new(VecDeque::new())),
        }
    }

    /// Inserts a new waiter at the back (most-recently registered).
    pub fn insert(&self, id: WaiterId, continuation: Arc<TrackedContinuation<T>>) {
        self.queue.lock().push_back((id, continuation));
    }

    /// Removes a waiter by id, if present. Used on cancellation and on
    /// settle-then-remove paths.
    pub fn remove(&self, id: WaiterId) -> Option<Arc<TrackedContinuation<T>>> {
        let mut queue = self.queue.lock();
        let position = queue.iter().position(|(existing, _)| *existing == id)?;
        queue.remove(position).map(|(_, cont)| cont)
    }

    /// Pops the earliest-registered waiter, if any.
    pub fn pop_front(&self) -> Option<(WaiterId, Arc<TrackedContinuation<T>>)> {
        self.queue.lock().pop_front()
    }

    /// `true` if no waiters are currently registered.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Drains every waiter in FIFO order, resuming each with `AsyncError::Cancelled`.
    /// Used by a primitive's `Drop` impl (spec §3 "Resource cleanup").
    pub fn cancel_all(&self) {
        let drained: Vec<_> = self.queue.lock().drain(..).collect();
        for (_, cont) in drained {
            cont.cancel();
        }
    }
}

impl<T> Clone for WaiterRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<T> Default for WaiterRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The `Future` every primitive's `wait()` returns once it has decided it
/// must suspend: poll the shared continuation, and if the caller drops this
/// future before it resolves, unregister from the registry so the entry
/// doesn't linger (and so a later `signal()` doesn't hand a permit to a
/// waiter that already walked away).
pub struct Suspended<T> {
    id: WaiterId,
    continuation: Arc<TrackedContinuation<T>>,
    registry: WaiterRegistry<T>,
}

impl<T> Suspended<T> {
    pub fn new(
        id: WaiterId,
        continuation: Arc<TrackedContinuation<T>>,
        registry: WaiterRegistry<T>,
    ) -> Self {
        Self {
            id,
            continuation,
            registry,
        }
    }
}

impl<T> std::future::Future for Suspended<T> {
    type Output = Result<T, AsyncError>;

    fn poll(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        if let Some(result) = self.continuation.take() {
            return std::task::Poll::Ready(result);
        }
        self.continuation.install(cx.waker());
        match self.continuation.take() {
            Some(result) => std::task::Poll::Ready(result),
            None => std::task::Poll::Pending,
        }
    }
}

impl<T> Drop for Suspended<T> {
    fn drop(&mut self) {
        if !self.continuation.resumed() {
            self.registry.remove(self.id);
        }
    }
}

/// The concrete future every primitive's `wait()` returns.
///
/// Deliberately *not* an `async fn`: an `async fn wait(&self)` ties its
/// returned future's type to the lifetime of `&self` even though, after
/// the initial synchronous fast-path check, nothing in this future
/// actually borrows the primitive again — [`Suspended`] only shares the
/// primitive's [`WaiterRegistry`] by its own `Arc` clone. Returning this
/// plain, ordinary-function value instead keeps the future fully owned,
/// so a primitive can be destroyed (running its `Drop` impl, which
/// resumes outstanding waiters with `Cancelled`) while one of its own
/// `wait()` futures is still suspended elsewhere — exactly the "safe
/// deinit" property spec §5/§8 require.
pub enum WaitFuture<T> {
    Ready(Option<Result<T, AsyncError>>),
    Suspended(Suspended<T>),
}

impl<T> WaitFuture<T> {
    pub fn ready(result: Result<T, AsyncError>) -> Self {
        WaitFuture::Ready(Some(result))
    }

    pub fn suspended(suspended: Suspended<T>) -> Self {
        WaitFuture::Suspended(suspended)
    }
}

impl<T> std::future::Future for WaitFuture<T> {
    type Output = Result<T, AsyncError>;

    fn poll(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        match self.get_mut() {
            WaitFuture::Ready(slot) => std::task::Poll::Ready(
                slot.take().expect("WaitFuture polled again after completion"),
            ),
            WaitFuture::Suspended(inner) => std::pin::Pin::new(inner).poll(cx),
        }
    }
}

/// Races a [`Suspended`] wait against a deadline timer, yielding
/// `TimedOut` if the timer wins. Dropping the losing branch is enough to
/// unregister it ([`Suspended::drop`]) — no permit or waiter is leaked
/// (spec §4.3/§5 "no permit leak on timeout").
pub async fn with_deadline<T>(
    wait: Suspended<T>,
    deadline: crate::future::BoxFuture<'static, ()>,
) -> Result<T, AsyncError> {
    futures_util::pin_mut!(deadline);
    match futures_util::future::select(wait, deadline).await {
        futures_util::future::Either::Left((result, _)) => result,
        futures_util::future::Either::Right((_, _wait)) => Err(AsyncError::TimedOut),
    }
}

/// A boxed `'static` timed-wait future, for the same reason [`WaitFuture`]
/// exists: a timed `wait()` must not tie its future to `&self`, or the
/// primitive could never be dropped out from under a pending timed wait.
pub type TimedWait<T> = std::pin::Pin<Box<dyn std::future::Future<Output = Result<T, AsyncError>> + Send>>;

pub fn timed_wait_ready<T: Send + 'static>(result: Result<T, AsyncError>) -> TimedWait<T> {
    Box::pin(std::future::ready(result))
}

pub fn timed_wait_suspended<T: Send + 'static>(
    wait: Suspended<T>,
    deadline: crate::future::BoxFuture<'static, ()>,
) -> TimedWait<T> {
    Box::pin(with_deadline(wait, deadline))
}
