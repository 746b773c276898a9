//! `TaskQueue` — serializes **barrier** submissions against each other and
//! against concurrent submissions, while letting non-barrier submissions
//! run in parallel whenever the queue isn't barriered (spec §4.8).
//!
//! # Grounding `wait()`
//! The external-interface table gives `TaskQueue` a bare `wait()` with no
//! argument and no further description. This port reads it the way every
//! other primitive's `wait()` reads: "resolves once a condition holds" —
//! here, "not barriered and nothing queued", i.e. the queue is idle. It
//! does not track in-flight non-barrier executions dispatched via the fast
//! path (those never touch the waiting queue at all), so `wait()` can
//! resolve while such a task is still running; that is the same trade the
//! fast path itself already makes.
//!
//! # Grounding barrier exclusivity against concurrently-running non-barriers
//! The glossary's "a barrier task runs only when no other queue tasks are
//! executing" is a stronger condition than "the waiting queue is empty" —
//! a batch of non-barrier submissions admitted via the fast path never
//! touches the waiting queue, so a naive `!barriered && queue.is_empty()`
//! fast-path check for an arriving barrier would race it directly against
//! still-running fast-pathed non-barriers instead of blocking behind them.
//! `State` therefore also tracks `active_non_barriers`, incremented by
//! every non-barrier grant (fast-path or drained from the queue) and
//! decremented by its `Turn`'s `Drop`; a barrier may only fast-path (or be
//! drained off the queue head) when that count is zero. Non-barrier
//! admission itself is unaffected — it still only checks `!barriered &&
//! queue.is_empty()`, so non-barriers keep overlapping each other freely.
//!
//! # Grounding barrier release under cancellation
//! "Cancellation of an enqueued task removes its entry and resumes the
//! cancelled continuation with `Cancelled`; if that task was itself the
//! holding barrier, `releaseBarrier()` is run" covers two distinct
//! moments: a submission still waiting for its turn is removed from the
//! queue outright (handled by [`QueuedAdmission::drop`]); a submission
//! that already became the barrier holder and is cancelled *while
//! running* must still unblock the queue behind it even though its own
//! action never returns normally — handled by [`Turn`], whose `Drop`
//! releases its grant (decrementing `active_non_barriers` or clearing
//! `barriered`) and re-drains the queue unconditionally, so dropping the
//! future `exec()` returns (the ordinary way to cancel an `async`
//! operation in Rust) unblocks whatever was waiting behind it exactly
//! once, regardless of which path was taken.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::continuation::{Suspended, TrackedContinuation, WaiterId, WaiterRegistry, WaitFuture};
use crate::error::{AsyncError, AsyncResult, BoxError};
use crate::future::BoxFuture;
use crate::locker::Locker;
use crate::observability::{default_logger, LogLevel, LogRecord, Logger};
use crate::task_operation::TaskPriority;

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

struct Entry {
    id: WaiterId,
    barrier: bool,
    continuation: Arc<TrackedContinuation<()>>,
}

struct State {
    barriered: bool,
    /// Count of currently-granted non-barrier turns (fast-pathed or
    /// drained off the queue head), so an arriving barrier can tell a
    /// merely-empty waiting queue apart from a queue with no concurrent
    /// work still running.
    active_non_barriers: usize,
    queue: VecDeque<Entry>,
}

/// A cooperative single-queue scheduler distinguishing barrier submissions
/// (which run alone) from ordinary ones (which may overlap).
pub struct TaskQueue {
    id: u64,
    state: Locker<State>,
    idle_waiters: WaiterRegistry<()>,
    priority: TaskPriority,
    logger: Arc<dyn Logger>,
}

impl TaskQueue {
    pub fn new(priority: TaskPriority) -> Self {
        Self::with_logger(priority, default_logger())
    }

    pub fn with_logger(priority: TaskPriority, logger: Arc<dyn Logger>) -> Self {
        Self {
            id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
            state: Locker::new(State {
                barriered: false,
                active_non_barriers: 0,
                queue: VecDeque::new(),
            }),
            idle_waiters: WaiterRegistry::new(),
            priority,
            logger,
        }
    }

    fn log(&self, op: &'static str) {
        self.logger.log(LogRecord {
            obj: "TaskQueue",
            op,
            id: Some(self.id),
            level: LogLevel::Debug,
            fields: &[],
        });
    }

    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    /// Runs `action` serialized per `barrier`: fast-pathed immediately if
    /// the queue is idle (and, for a barrier, not already held by another
    /// barrier submission), otherwise queued until admitted. Resolves with
    /// the closure's own outcome, or `Cancelled` if the returned future is
    /// dropped before the action finishes.
    pub fn exec<T: Send + 'static>(
        &self,
        barrier: bool,
        action: impl std::future::Future<Output = Result<T, BoxError>> + Send + 'static,
    ) -> BoxFuture<'static, AsyncResult<T>> {
        self.log("exec");
        let admission = self.admit_or_enqueue(barrier);
        Box::pin(async move {
            let _turn = admission.await?;
            action.await.map_err(AsyncError::Failed)
        })
    }

    /// Grants (or queues) a turn. The fast path builds its [`Turn`]
    /// eagerly, right here, rather than inside the returned future's body:
    /// an `async move { admission.await?; let _turn = Turn{..}; .. }`
    /// block only runs that line once actually polled, so a future
    /// dropped before its first poll would never construct (and thus
    /// never drop, and thus never release) a barrier it had already
    /// synchronously claimed. Building the grant as `Admission::Ready`
    /// already holding a `Turn` means that guard is part of the returned
    /// future's captured environment from the moment it's constructed, so
    /// it drops correctly even if the future is never polled at all.
    ///
    /// A barrier additionally requires `active_non_barriers == 0`: an
    /// empty waiting queue alone doesn't mean the queue is quiescent, since
    /// fast-pathed non-barrier turns never touch it.
    fn admit_or_enqueue(&self, barrier: bool) -> Admission {
        self.state.with_locked(|state| {
            let eligible =
                !state.barriered && state.queue.is_empty() && (!barrier || state.active_non_barriers == 0);
            if eligible {
                if barrier {
                    state.barriered = true;
                } else {
                    state.active_non_barriers += 1;
                }
                let turn = Turn {
                    state: self.state.clone(),
                    idle_waiters: self.idle_waiters.clone(),
                    barrier,
                };
                Admission::Ready(Some(Ok(turn)))
            } else {
                let id = WaiterId::next();
                let continuation = Arc::new(TrackedContinuation::new());
                state.queue.push_back(Entry {
                    id,
                    barrier,
                    continuation: continuation.clone(),
                });
                Admission::Queued(QueuedAdmission {
                    id,
                    continuation,
                    state: self.state.clone(),
                    idle_waiters: self.idle_waiters.clone(),
                    barrier,
                })
            }
        })
    }

    /// Resolves once the queue is idle — not barriered and nothing
    /// enqueued.
    pub fn wait(&self) -> WaitFuture<()> {
        self.log("wait");
        match self.wait_or_register() {
            Ok(()) => WaitFuture::ready(Ok(())),
            Err((id, continuation)) => {
                WaitFuture::suspended(Suspended::new(id, continuation, self.idle_waiters.clone()))
            }
        }
    }

    fn wait_or_register(&self) -> Result<(), (WaiterId, Arc<TrackedContinuation<()>>)> {
        self.state.with_locked(|state| {
            if !state.barriered && state.queue.is_empty() {
                Ok(())
            } else {
                let id = WaiterId::next();
                let continuation = Arc::new(TrackedContinuation::new());
                self.idle_waiters.insert(id, continuation.clone());
                Err((id, continuation))
            }
        })
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        let leftover: Vec<_> = {
            let mut queue = self.state.with_locked(|state| std::mem::take(&mut state.queue));
            queue.drain(..).map(|entry| entry.continuation).collect()
        };
        for continuation in leftover {
            continuation.cancel();
        }
        self.idle_waiters.cancel_all();
    }
}

/// Admission ticket: either already granted (fast path), or queued behind
/// a [`QueuedAdmission`]. Resolves to the [`Turn`] the caller now holds.
enum Admission {
    Ready(Option<Result<Turn, AsyncError>>),
    Queued(QueuedAdmission),
}

impl std::future::Future for Admission {
    type Output = Result<Turn, AsyncError>;

    fn poll(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        match self.get_mut() {
            Admission::Ready(slot) => {
                std::task::Poll::Ready(slot.take().expect("Admission polled again after completion"))
            }
            Admission::Queued(inner) => std::pin::Pin::new(inner).poll(cx),
        }
    }
}

/// The suspended half of [`Admission`]. Unlike [`Suspended`], which
/// removes itself from a generic [`WaiterRegistry`], this removes its own
/// entry from the queue's `VecDeque` directly, since `Entry` carries an
/// extra `barrier` tag `WaiterRegistry` has no room for.
struct QueuedAdmission {
    id: WaiterId,
    continuation: Arc<TrackedContinuation<()>>,
    state: Locker<State>,
    idle_waiters: WaiterRegistry<()>,
    barrier: bool,
}

impl QueuedAdmission {
    fn turn(&self) -> Turn {
        Turn {
            state: self.state.clone(),
            idle_waiters: self.idle_waiters.clone(),
            barrier: self.barrier,
        }
    }
}

impl std::future::Future for QueuedAdmission {
    type Output = Result<Turn, AsyncError>;

    fn poll(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        if let Some(result) = self.continuation.take() {
            return std::task::Poll::Ready(result.map(|()| self.turn()));
        }
        self.continuation.install(cx.waker());
        match self.continuation.take() {
            Some(result) => std::task::Poll::Ready(result.map(|()| self.turn())),
            None => std::task::Poll::Pending,
        }
    }
}

impl Drop for QueuedAdmission {
    fn drop(&mut self) {
        if !self.continuation.resumed() {
            self.state.with_locked(|state| {
                if let Some(pos) = state.queue.iter().position(|entry| entry.id == self.id) {
                    state.queue.remove(pos);
                }
            });
        }
    }
}

/// Held for the duration of an admitted submission's action. Its `Drop`
/// releases the barrier exactly once, whether the action finished
/// normally or this future was cancelled mid-run.
struct Turn {
    state: Locker<State>,
    idle_waiters: WaiterRegistry<()>,
    barrier: bool,
}

impl Drop for Turn {
    fn drop(&mut self) {
        self.state.with_locked(|state| {
            if self.barrier {
                state.barriered = false;
            } else {
                state.active_non_barriers -= 1;
            }
        });
        release(&self.state, &self.idle_waiters);
    }
}

/// Drains the queue as far as the gating rules allow: every contiguous
/// non-barrier head is admitted (incrementing `active_non_barriers`); a
/// barrier head is admitted — and draining stops, since only one barrier
/// may run at a time — only once `active_non_barriers` has reached zero,
/// i.e. every non-barrier turn the barrier must wait behind has actually
/// finished. Called after every [`Turn`] release, whether that turn was
/// itself the barrier or one of the non-barriers it may have been
/// queued behind.
fn release(state: &Locker<State>, idle_waiters: &WaiterRegistry<()>) {
    let drained = state.with_locked(|state| {
        let mut drained = Vec::new();
        loop {
            if state.barriered {
                break;
            }
            match state.queue.front() {
                None => break,
                Some(entry) if entry.barrier && state.active_non_barriers > 0 => break,
                Some(_) => {}
            }
            let entry = state.queue.pop_front().expect("front() just confirmed an entry");
            let barrier = entry.barrier;
            drained.push(entry.continuation);
            if barrier {
                state.barriered = true;
                break;
            } else {
                state.active_non_barriers += 1;
            }
        }
        drained
    });
    for continuation in drained {
        continuation.resume(Ok(()));
    }
    notify_if_idle(state, idle_waiters);
}

fn notify_if_idle(state: &Locker<State>, idle_waiters: &WaiterRegistry<()>) {
    let idle = state.with_locked(|state| !state.barriered && state.queue.is_empty());
    if idle {
        while let Some((_, continuation)) = idle_waiters.pop_front() {
            continuation.resume(Ok(()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn box_ok<T: Send + 'static>(
        value: T,
    ) -> impl std::future::Future<Output = Result<T, BoxError>> {
        async move { Ok(value) }
    }

    #[tokio::test]
    async fn non_barrier_submissions_run_concurrently() {
        let queue = Arc::new(TaskQueue::new(TaskPriority::Normal));
        let a = queue.exec(false, box_ok(1));
        let b = queue.exec(false, box_ok(2));
        assert_eq!(a.await.unwrap(), 1);
        assert_eq!(b.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn barrier_runs_alone() {
        let queue = Arc::new(TaskQueue::new(TaskPriority::Normal));
        let result = queue.exec(true, box_ok(7)).await.unwrap();
        assert_eq!(result, 7);
        queue.wait().await.unwrap();
    }

    #[tokio::test]
    async fn queued_submission_waits_behind_barrier() {
        let queue = Arc::new(TaskQueue::new(TaskPriority::Normal));
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let order_a = order.clone();
        let order_b = order.clone();
        let queue_a = queue.clone();
        let queue_b = queue.clone();
        let barrier = tokio::spawn(async move {
            queue_a
                .exec(true, async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    order_a.lock().push("barrier");
                    Ok::<_, BoxError>(())
                })
                .await
                .unwrap();
        });
        tokio::task::yield_now().await;
        let follower = tokio::spawn(async move {
            queue_b
                .exec(false, async move {
                    order_b.lock().push("follower");
                    Ok::<_, BoxError>(())
                })
                .await
                .unwrap();
        });
        barrier.await.unwrap();
        follower.await.unwrap();
        assert_eq!(*order.lock(), vec!["barrier", "follower"]);
    }

    #[tokio::test(start_paused = true)]
    async fn barrier_waits_for_concurrently_running_non_barriers() {
        let queue = Arc::new(TaskQueue::new(TaskPriority::Normal));
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut non_barriers = Vec::new();
        for label in ["n1", "n2", "n3"] {
            let queue = queue.clone();
            let order = order.clone();
            non_barriers.push(tokio::spawn(async move {
                queue
                    .exec(false, async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        order.lock().push(label);
                        Ok::<_, BoxError>(())
                    })
                    .await
                    .unwrap();
            }));
        }
        tokio::task::yield_now().await;

        let barrier_order = order.clone();
        let queue_b = queue.clone();
        let barrier = tokio::spawn(async move {
            queue_b
                .exec(true, async move {
                    barrier_order.lock().push("barrier");
                    Ok::<_, BoxError>(())
                })
                .await
                .unwrap();
        });

        tokio::time::advance(Duration::from_millis(50)).await;
        for handle in non_barriers {
            handle.await.unwrap();
        }
        barrier.await.unwrap();

        let order = order.lock();
        assert_eq!(order.len(), 4);
        assert_eq!(order[3], "barrier", "barrier must not run until every concurrent non-barrier has finished");
    }

    #[tokio::test]
    async fn cancelling_a_queued_submission_resumes_cancelled() {
        let queue = Arc::new(TaskQueue::new(TaskPriority::Normal));
        let holder = queue.clone();
        let hold = tokio::spawn(async move {
            holder
                .exec(true, async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, BoxError>(())
                })
                .await
        });
        tokio::task::yield_now().await;
        let waiting = queue.exec(false, box_ok(1));
        drop(waiting);
        hold.await.unwrap().unwrap();
        queue.wait().await.unwrap();
    }

    #[tokio::test]
    async fn dropping_a_running_barrier_releases_the_queue() {
        let queue = Arc::new(TaskQueue::new(TaskPriority::Normal));
        let ran = Arc::new(AtomicU32::new(0));
        let running = queue.exec(true, async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, BoxError>(())
        });
        drop(running);
        let ran_inner = ran.clone();
        queue
            .exec(false, async move {
                ran_inner.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(())
            })
            .await
            .unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
