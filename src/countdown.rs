//! `AsyncCountdownEvent` — the inverse of a semaphore: admits waiters while
//! `currentCount <= limit`, suspends them once that threshold is exceeded
//! (spec §4.5).

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

static NEXT_COUNTDOWN_ID: AtomicU64 = AtomicU64::new(1);

struct State {
    limit: u32,
    initial_count: u32,
    current_count: u32,
}

impl State {
    fn is_set(&self) -> bool {
        self.current_count <= self.limit
    }
}

/// Blocks `wait()` callers while `currentCount` exceeds `limit`; every
/// `signal()` that brings the count back down to the limit admits waiters
/// in FIFO order, each admission nudging `currentCount` back up by one.
pub struct AsyncCountdownEvent {
    id: u64,
    state: Locker<State>,
    waiters: WaiterRegistry<()>,
    logger: Arc<dyn Logger>,
}

impl AsyncCountdownEvent {
    pub fn new(limit: u32, initial: u32) -> Self {
        Self::with_logger(limit, initial, default_logger())
    }

    pub fn with_logger(limit: u32, initial: u32, logger: Arc<dyn Logger>) -> Self {
        Self {
            id: NEXT_COUNTDOWN_ID.fetch_add(1, Ordering::Relaxed),
            state: Locker::new(State {
                limit,
                initial_count: initial,
                current_count: initial,
            }),
            waiters: WaiterRegistry::new(),
            logger,
        }
    }

    fn log(&self, op: &'static str) {
        self.logger.log(LogRecord {
            obj: "AsyncCountdownEvent",
            op,
            id: Some(self.id),
            level: LogLevel::Debug,
            fields: &[],
        });
    }

    pub fn limit(&self) -> u32 {
        self.state.with_locked(|state| state.limit)
    }

    pub fn initial_count(&self) -> u32 {
        self.state.with_locked(|state| state.initial_count)
    }

    pub fn current_count(&self) -> u32 {
        self.state.with_locked(|state| state.current_count)
    }

    pub fn is_set(&self) -> bool {
        self.state.with_locked(|state| state.is_set())
    }

    /// Pure mutation: raises `currentCount` by `by` without attempting an
    /// admission drain. Used to register new high-priority demand before
    /// any waiter is admitted against it.
    pub fn increment(&self, by: u32) {
        self.log("increment");
        self.state.with_locked(|state| {
            state.current_count = state.current_count.saturating_add(by);
        });
    }

    /// `signal(1)`.
    pub fn signal(&self) {
        self.signal_repeat(1);
    }

    /// Decrements `currentCount` by `n`, saturating at zero, then drains
    /// every waiter admissible under the new count.
    pub fn signal_repeat(&self, n: u32) {
        self.log("signal");
        let drained = self.state.with_locked(|state| {
            state.current_count = state.current_count.saturating_sub(n);
            self.drain_admissible(state)
        });
        for continuation in drained {
            continuation.resume(Ok(()));
        }
    }

    /// Restores `currentCount` to `initialCount`, then re-evaluates admission.
    pub fn reset(&self) {
        self.log("reset");
        let drained = self.state.with_locked(|state| {
            state.current_count = state.initial_count;
            self.drain_admissible(state)
        });
        for continuation in drained {
            continuation.resume(Ok(()));
        }
    }

    /// Sets both `initialCount` and `currentCount` to `n`, then
    /// re-evaluates admission.
    pub fn reset_to(&self, n: u32) {
        self.log("reset_to");
        let drained = self.state.with_locked(|state| {
            state.initial_count = n;
            state.current_count = n;
            self.drain_admissible(state)
        });
        for continuation in drained {
            continuation.resume(Ok(()));
        }
    }

    /// Pops and resumes waiters while `isSet` holds and the registry is
    /// nonempty; each admission post-increments `currentCount` by one, so
    /// the drain stops as soon as that pushes the count back over `limit`.
    fn drain_admissible(&self, state: &mut State) -> Vec<Arc<TrackedContinuation<()>>> {
        let mut drained = Vec::new();
        while state.is_set() {
            match self.waiters.pop_front() {
                Some((_, continuation)) => {
                    state.current_count = state.current_count.saturating_add(1);
                    drained.push(continuation);
                }
                None => break,
            }
        }
        drained
    }

    /// Admits immediately (post-incrementing `currentCount`) if `isSet`
    /// and no other waiter is queued ahead; otherwise suspends.
    pub fn wait(&self) -> WaitFuture<()> {
        self.log("wait");
        match self.wait_or_register() {
            Ok(()) => WaitFuture::ready(Ok(())),
            Err((id, continuation)) => {
                WaitFuture::suspended(Suspended::new(id, continuation, self.waiters.clone()))
            }
        }
    }

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
        self.state.with_locked(|state| {
            if state.is_set() && self.waiters.is_empty() {
                state.current_count = state.current_count.saturating_add(1);
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

impl Drop for AsyncCountdownEvent {
    fn drop(&mut self) {
        self.waiters.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn until_zero_initial_zero_admits_first_then_suspends_second() {
        let countdown = Arc::new(AsyncCountdownEvent::new(0, 0));
        countdown.wait().await.unwrap();
        let second = {
            let countdown = countdown.clone();
            tokio::spawn(async move { countdown.wait().await })
        };
        tokio::task::yield_now().await;
        assert!(!second.is_finished());
        countdown.signal();
        second.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn limit_three_initial_two_admits_two_then_suspends() {
        let countdown = AsyncCountdownEvent::new(3, 2);
        countdown.wait().await.unwrap();
        countdown.wait().await.unwrap();
        assert_eq!(countdown.current_count(), 4);
        assert!(!countdown.is_set());
    }

    #[tokio::test]
    async fn reset_reopens_admission() {
        let countdown = Arc::new(AsyncCountdownEvent::new(0, 0));
        countdown.increment(5);
        let waiter = {
            let countdown = countdown.clone();
            tokio::spawn(async move { countdown.wait().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        countdown.reset();
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn increment_does_not_wake_waiters() {
        let countdown = Arc::new(AsyncCountdownEvent::new(0, 0));
        countdown.wait().await.unwrap();
        let waiter = {
            let countdown = countdown.clone();
            tokio::spawn(async move { countdown.wait().await })
        };
        tokio::task::yield_now().await;
        countdown.increment(3);
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        countdown.signal_repeat(4);
        waiter.await.unwrap().unwrap();
    }
}
