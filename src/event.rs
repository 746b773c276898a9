//! `AsyncEvent` — manual-reset event (spec §4.4).

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

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

/// A level-triggered signal: once `signal()`-ed, every `wait()` (past and
/// future, until the next `reset()`) returns immediately.
pub struct AsyncEvent {
    id: u64,
    signalled: Locker<bool>,
    waiters: WaiterRegistry<()>,
    logger: Arc<dyn Logger>,
}

impl AsyncEvent {
    pub fn new(signalled_initially: bool) -> Self {
        Self::with_logger(signalled_initially, default_logger())
    }

    pub fn with_logger(signalled_initially: bool, logger: Arc<dyn Logger>) -> Self {
        Self {
            id: NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed),
            signalled: Locker::new(signalled_initially),
            waiters: WaiterRegistry::new(),
            logger,
        }
    }

    fn log(&self, op: &'static str) {
        self.logger.log(LogRecord {
            obj: "AsyncEvent",
            op,
            id: Some(self.id),
            level: LogLevel::Debug,
            fields: &[],
        });
    }

    /// `true` if the event is currently signalled.
    pub fn is_signalled(&self) -> bool {
        self.signalled.with_locked(|signalled| *signalled)
    }

    /// Sets the signalled flag and resumes every waiter in registration
    /// order. Idempotent: repeated `signal()` with no intervening `reset()`
    /// is a no-op beyond the flag already being set.
    pub fn signal(&self) {
        self.log("signal");
        let drained = self.signalled.with_locked(|signalled| {
            *signalled = true;
            self.drain_waiters()
        });
        for continuation in drained {
            continuation.resume(Ok(()));
        }
    }

    fn drain_waiters(&self) -> Vec<Arc<TrackedContinuation<()>>> {
        let mut drained = Vec::new();
        while let Some((_, continuation)) = self.waiters.pop_front() {
            drained.push(continuation);
        }
        drained
    }

    /// Clears the signalled flag. Does not affect waiters already resumed
    /// by a prior `signal()`.
    pub fn reset(&self) {
        self.log("reset");
        self.signalled.with_locked(|signalled| *signalled = false);
    }

    /// Returns immediately if signalled, otherwise suspends until
    /// `signal()`. Resolves `Cancelled` if the waiting task is cancelled.
    pub fn wait(&self) -> WaitFuture<()> {
        self.log("wait");
        match self.wait_or_register() {
            Ok(()) => WaitFuture::ready(Ok(())),
            Err((id, continuation)) => {
                WaitFuture::suspended(Suspended::new(id, continuation, self.waiters.clone()))
            }
        }
    }

    /// Same as [`AsyncEvent::wait`], bounded by `timeout`.
    pub fn wait_timeout(&self, timeout: Duration, runtime: &dyn AsyncRuntime) -> TimedWait<()> {
        self.log("wait_timeout");
        match self.wait_or_register() {
            Ok(()) => timed_wait_ready(Ok(())),
            Err((id, continuation)) => timed_wait_suspended(
                Suspended::new(id, continuation, self.waiters.clone()),
                runtime.sleep(timeout),
            ),
        }
    }

    fn wait_or_register(&self) -> Result<(), (WaiterId, Arc<TrackedContinuation<()>>)> {
        self.signalled.with_locked(|signalled| {
            if *signalled {
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

impl Drop for AsyncEvent {
    fn drop(&mut self) {
        self.waiters.cancel_all();
    }
}
