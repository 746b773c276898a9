//! `AsyncSemaphore` — counting semaphore over the continuation substrate
//! (spec §4.3).
//!
//! The source models this as a producer/consumer pipeline with an internal
//! driver task; §4.3 explicitly licenses the simpler counter-plus-registry
//! model instead, since "the FIFO guarantee and no-permit-leak invariants
//! are the contract, not the queue implementation." That is what this file
//! builds: a `count` mutated only under the primitive's [`Locker`], and a
//! [`WaiterRegistry`] standing in for the permit channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::continuation::{
    timed_wait_ready, timed_wait_suspended, Suspended, TimedWait, TrackedContinuation, WaiterId,
    WaiterRegistry, WaitFuture,
};
use crate::locker::Locker;
use crate::observability::{default_logger, LogLevel, LogRecord, Logger};
use crate::runtime::AsyncRuntime;

static NEXT_SEMAPHORE_ID: AtomicU64 = AtomicU64::new(1);

/// A counting semaphore: `signal()` produces a permit, `wait()` consumes
/// one or suspends until one is produced.
pub struct AsyncSemaphore {
    id: u64,
    count: Locker<u32>,
    waiters: WaiterRegistry<()>,
    logger: Arc<dyn Logger>,
}

impl AsyncSemaphore {
    /// Creates a semaphore pre-loaded with `value` permits.
    pub fn new(value: u32) -> Self {
        Self::with_logger(value, default_logger())
    }

    /// Creates a semaphore that emits [`LogRecord`]s to `logger`.
    pub fn with_logger(value: u32, logger: Arc<dyn Logger>) -> Self {
        Self {
            id: NEXT_SEMAPHORE_ID.fetch_add(1, Ordering::Relaxed),
            count: Locker::new(value),
            waiters: WaiterRegistry::new(),
            logger,
        }
    }

    fn log(&self, op: &'static str) {
        self.logger.log(LogRecord {
            obj: "AsyncSemaphore",
            op,
            id: Some(self.id),
            level: LogLevel::Debug,
            fields: &[],
        });
    }

    /// Produces one permit: hands it directly to the earliest-registered
    /// waiter if any are suspended, otherwise increments the counter.
    pub fn signal(&self) {
        self.log("signal");
        let woken = self.count.with_locked(|count| {
            if let Some((_, continuation)) = self.waiters.pop_front() {
                Some(continuation)
            } else {
                *count += 1;
                None
            }
        });
        if let Some(continuation) = woken {
            continuation.resume(Ok(()));
        }
    }

    /// Consumes a permit if one is available, else suspends until
    /// [`AsyncSemaphore::signal`] produces one. Resolves with `Cancelled`
    /// if the awaiting task is cancelled first.
    ///
    /// A plain (non-`async`) function: see [`WaitFuture`] for why the
    /// returned future must not borrow `&self`.
    pub fn wait(&self) -> WaitFuture<()> {
        self.log("wait");
        match self.acquire_or_register() {
            Ok(()) => WaitFuture::ready(Ok(())),
            Err((id, continuation)) => {
                WaitFuture::suspended(Suspended::new(id, continuation, self.waiters.clone()))
            }
        }
    }

    /// Same as [`AsyncSemaphore::wait`], bounded by `timeout`. Resolves
    /// `Err(TimedOut)` if the deadline passes before a permit arrives; the
    /// registration is removed so no permit is later delivered to a
    /// waiter that has already given up.
    pub fn wait_timeout(&self, timeout: Duration, runtime: &dyn AsyncRuntime) -> TimedWait<()> {
        self.log("wait_timeout");
        match self.acquire_or_register() {
            Ok(()) => timed_wait_ready(Ok(())),
            Err((id, continuation)) => timed_wait_suspended(
                Suspended::new(id, continuation, self.waiters.clone()),
                runtime.sleep(timeout),
            ),
        }
    }

    /// Checking the counter and, on miss, registering the waiter both
    /// happen while the same `Locker` section is held, so a concurrent
    /// `signal()` can never observe "no permit, no waiter" in between.
    fn acquire_or_register(&self) -> Result<(), (WaiterId, Arc<TrackedContinuation<()>>)> {
        self.count.with_locked(|count| {
            if *count > 0 {
                *count -= 1;
                Ok(())
            } else {
                let id = WaiterId::next();
                let continuation = Arc::new(TrackedContinuation::new());
                self.waiters.insert(id, continuation.clone());
                Err((id, continuation))
            }
        })
    }
}

impl Drop for AsyncSemaphore {
    fn drop(&mut self) {
        self.waiters.cancel_all();
    }
}
