//! `TaskOperation<Output>` — a one-shot cooperative-task handle: started at
//! most once, awaitable, cancellable, with a result that settles exactly
//! once (spec §4.7).
//!
//! # State machine
//! `created -> executing [-> executing,cancelled] -> finished [,cancelled]`.
//! The observable booleans are written in a fixed order so a waiter woken
//! by the finish transition never observes a torn state: `isExecuting`
//! flips to `false`, then `isFinished` to `true`, then the registry is
//! drained. `cancel()` on an already-executing operation only flips
//! `isCancelled` and signals the operation's own [`CancellationSource`] —
//! the finish sequence still runs once the closure actually returns.
//!
//! # Grounding the cooperative-cancel signal
//! The external-interface table gives `TaskOperation` a bare `cancel()`
//! with no parameter for how a running closure observes it. This port
//! hands every closure this operation's own `Arc<CancellationSource>` (the
//! primitive built in `cancellation.rs`) so a closure that wants to
//! cooperate can `select!` against `token.wait()` or poll
//! `token.is_cancelled()`; one that doesn't is still forcibly finished as
//! `Cancelled` once it returns, because the stored outcome prefers the
//! cancellation flag over whatever the closure produced. This is the same
//! "a Task is a Cancellable" relationship spec §4.6 alludes to, made
//! concrete instead of left as a dangling cross-reference.
//!
//! # Grounding `trackUnstructuredTasks`
//! Every closure also receives a [`TaskTracker`] clone. Handing it out
//! unconditionally costs nothing when the closure never clones it further
//! (the tracker's callback then fires the instant the closure's own
//! spawned wrapper task drops its clone, i.e. exactly at closure
//! completion) and is what makes `trackUnstructuredTasks` actually mean
//! something when the closure spawns descendants and hands them clones of
//! its own. The stored flag is kept for API parity with the external
//! table but does not gate this — there is nothing unsafe about handing
//! out a tracker a closure chooses not to use.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::cancellation::{Cancellable, CancellationSource};
use crate::continuation::{Suspended, TrackedContinuation, WaiterId, WaiterRegistry, WaitFuture};
use crate::error::{AsyncError, AsyncResult, BoxError};
use crate::future::BoxFuture;
use crate::locker::Locker;
use crate::observability::{default_logger, LogLevel, LogRecord, Logger};
use crate::runtime::AsyncRuntime;
use crate::task_tracker::TaskTracker;

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

/// A scheduling hint carried alongside an operation. Stored for API parity
/// with the source's `priority?` constructor parameter; this port has no
/// underlying scheduler that honors task priority (`tokio`'s executor does
/// not expose one), so it is observable but inert.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
}

/// `detached` / `trackUnstructuredTasks`, per spec §4.7.
#[derive(Clone, Copy, Debug, Default)]
pub struct TaskFlags {
    /// Stored for API parity. Every operation in this port always runs via
    /// the supplied [`AsyncRuntime`]'s `spawn`, independent of the
    /// starter's task — there is no structured-task-tree concept in this
    /// crate's runtime contract to "inherit" or opt out of, so this flag
    /// has no behavioral effect here.
    pub detached: bool,
    /// See the module's "Grounding `trackUnstructuredTasks`" note.
    pub track_unstructured_tasks: bool,
}

type BoxAction<Output> =
    Box<dyn FnOnce(Arc<CancellationSource>, TaskTracker) -> BoxFuture<'static, Result<Output, BoxError>> + Send>;

struct Inner<Output> {
    started: bool,
    executing: bool,
    finished: bool,
    cancelled: bool,
    action: Option<BoxAction<Output>>,
    result: Option<AsyncResult<Output>>,
}

/// A one-shot handle for a computation that can be started, awaited, and
/// cancelled.
pub struct TaskOperation<Output> {
    id: u64,
    external_lock: Locker<()>,
    state: Locker<Inner<Output>>,
    waiters: WaiterRegistry<()>,
    cancellation: Arc<CancellationSource>,
    flags: TaskFlags,
    priority: TaskPriority,
    logger: Arc<dyn Logger>,
}

impl<Output: Clone + Send + Sync + 'static> TaskOperation<Output> {
    /// Builds an unstarted operation. `lock`, if supplied, is shared with
    /// other operations so their `start()`/`cancel()` critical sections
    /// serialize against each other; a fresh one is allocated otherwise.
    pub fn new(
        lock: Option<Locker<()>>,
        priority: TaskPriority,
        flags: TaskFlags,
        action: impl FnOnce(Arc<CancellationSource>, TaskTracker) -> BoxFuture<'static, Result<Output, BoxError>>
            + Send
            + 'static,
    ) -> Arc<Self> {
        Self::with_logger(lock, priority, flags, action, default_logger())
    }

    pub fn with_logger(
        lock: Option<Locker<()>>,
        priority: TaskPriority,
        flags: TaskFlags,
        action: impl FnOnce(Arc<CancellationSource>, TaskTracker) -> BoxFuture<'static, Result<Output, BoxError>>
            + Send
            + 'static,
        logger: Arc<dyn Logger>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed),
            external_lock: lock.unwrap_or_else(|| Locker::new(())),
            state: Locker::new(Inner {
                started: false,
                executing: false,
                finished: false,
                cancelled: false,
                action: Some(Box::new(action)),
                result: None,
            }),
            waiters: WaiterRegistry::new(),
            cancellation: CancellationSource::with_logger(Arc::clone(&logger)),
            flags,
            priority,
            logger,
        })
    }

    fn log(&self, op: &'static str) {
        self.logger.log(LogRecord {
            obj: "TaskOperation",
            op,
            id: Some(self.id),
            level: LogLevel::Debug,
            fields: &[],
        });
    }

    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    pub fn flags(&self) -> TaskFlags {
        self.flags
    }

    pub fn is_executing(&self) -> bool {
        self.state.with_locked(|inner| inner.executing)
    }

    pub fn is_finished(&self) -> bool {
        self.state.with_locked(|inner| inner.finished)
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.with_locked(|inner| inner.cancelled)
    }

    /// Runs the action exactly once, via `runtime`. A second call is a
    /// no-op (whether the first call already finished or is still
    /// executing).
    pub fn start(self: &Arc<Self>, runtime: &dyn AsyncRuntime) {
        self.external_lock.with_locked(|_| {
            let action = self.state.with_locked(|inner| {
                if inner.started {
                    None
                } else {
                    inner.started = true;
                    inner.executing = true;
                    inner.action.take()
                }
            });
            let Some(action) = action else {
                return;
            };
            self.log("start");
            let op = Arc::clone(self);
            let token = Arc::clone(&self.cancellation);
            let op_for_tracker = Arc::clone(self);
            let tracker = TaskTracker::new(move || op_for_tracker.finish_if_drained());
            let body = action(Arc::clone(&token), tracker.clone());
            runtime.spawn(Box::pin(async move {
                let outcome = body.await;
                op.closure_settled(outcome);
                drop(tracker);
            }));
        });
    }

    /// Alias for [`TaskOperation::start`], per the external-interface table
    /// (`start() = signal()`).
    pub fn signal(self: &Arc<Self>, runtime: &dyn AsyncRuntime) {
        self.start(runtime);
    }

    /// Requests cancellation. If the operation never started, it finishes
    /// immediately as `Cancelled` without ever running the closure. If
    /// already executing, this only flags the operation and signals its
    /// [`CancellationSource`]; the finish sequence still waits for the
    /// closure (and any tracked descendants) to actually return.
    pub fn cancel(self: &Arc<Self>) {
        self.log("cancel");
        self.external_lock.with_locked(|_| {
            let finished_without_running = self.state.with_locked(|inner| {
                if inner.finished || inner.cancelled {
                    return false;
                }
                inner.cancelled = true;
                if !inner.started {
                    inner.started = true;
                    inner.executing = false;
                    inner.finished = true;
                    inner.result = Some(Err(AsyncError::Cancelled));
                    true
                } else {
                    false
                }
            });
            self.cancellation.cancel();
            if finished_without_running {
                self.drain_waiters();
            }
        });
    }

    /// Called once the closure (and, via the matching [`TaskTracker`]
    /// clone drop, every tracked descendant) has finished. Stores the
    /// outcome — `Cancelled` taking precedence over whatever the closure
    /// returned, mirroring `TrackedContinuation`'s rule that cancellation
    /// and a successful resume never both land — and drains waiters.
    fn closure_settled(&self, outcome: Result<Output, BoxError>) {
        self.state.with_locked(|inner| {
            inner.result = Some(outcome.map_err(AsyncError::Failed));
        });
    }

    /// Invoked when the last [`TaskTracker`] clone for this operation
    /// drops. Finalizes the finish sequence: `isExecuting <- false`, then
    /// `isFinished <- true`, then waiters are woken.
    fn finish_if_drained(self: Arc<Self>) {
        self.state.with_locked(|inner| {
            if inner.cancelled {
                inner.result = Some(Err(AsyncError::Cancelled));
            }
            inner.executing = false;
            inner.finished = true;
        });
        self.log("finish");
        self.drain_waiters();
    }

    fn drain_waiters(&self) {
        while let Some((_, continuation)) = self.waiters.pop_front() {
            continuation.resume(Ok(()));
        }
    }

    /// Resolves once this operation has finished, however it got there.
    /// Does not surface the closure's own result — see
    /// [`TaskOperation::result`] for that.
    pub fn wait(&self) -> WaitFuture<()> {
        self.log("wait");
        match self.wait_or_register() {
            Ok(()) => WaitFuture::ready(Ok(())),
            Err((id, continuation)) => {
                WaitFuture::suspended(Suspended::new(id, continuation, self.waiters.clone()))
            }
        }
    }

    fn wait_or_register(&self) -> Result<(), (WaiterId, Arc<TrackedContinuation<()>>)> {
        self.state.with_locked(|inner| {
            if inner.finished {
                Ok(())
            } else {
                let id = WaiterId::next();
                let continuation = Arc::new(TrackedContinuation::new());
                self.waiters.insert(id, continuation.clone());
                Err((id, continuation))
            }
        })
    }

    /// Resolves with the closure's own `Result`, `Cancelled` if the
    /// operation was cancelled, or `EarlyInvoke` immediately if `start()`
    /// was never called.
    pub fn result(&self) -> TaskResult<Output> {
        self.log("result");
        let started = self.state.with_locked(|inner| inner.started);
        if !started {
            return TaskResult::ready(Err(AsyncError::EarlyInvoke));
        }
        match self.wait_or_register() {
            Ok(()) => TaskResult::ready(self.take_result()),
            Err((id, continuation)) => TaskResult::waiting(
                Suspended::new(id, continuation, self.waiters.clone()),
                self.state.clone(),
            ),
        }
    }

    fn take_result(&self) -> AsyncResult<Output> {
        self.state
            .with_locked(|inner| inner.result.clone())
            .expect("finished implies a stored result")
    }
}

impl<Output> Drop for TaskOperation<Output> {
    fn drop(&mut self) {
        self.waiters.cancel_all();
    }
}

/// The future [`TaskOperation::result`] returns: either already-settled, or
/// riding the same [`Suspended`] wait `wait()` uses, reading the stored
/// result only once that resolves (the `state` `Locker` is cloned rather
/// than borrowed, so this future does not tie itself to `&self` either —
/// same reasoning as [`WaitFuture`]).
pub enum TaskResult<Output> {
    Ready(Option<AsyncResult<Output>>),
    Waiting {
        inner: Suspended<()>,
        state: Locker<Inner<Output>>,
    },
}

impl<Output> TaskResult<Output> {
    fn ready(result: AsyncResult<Output>) -> Self {
        TaskResult::Ready(Some(result))
    }

    fn waiting(inner: Suspended<()>, state: Locker<Inner<Output>>) -> Self {
        TaskResult::Waiting { inner, state }
    }
}

impl<Output: Clone> std::future::Future for TaskResult<Output> {
    type Output = AsyncResult<Output>;

    fn poll(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        match self.get_mut() {
            TaskResult::Ready(slot) => {
                std::task::Poll::Ready(slot.take().expect("TaskResult polled again after completion"))
            }
            TaskResult::Waiting { inner, state } => {
                match std::pin::Pin::new(inner).poll(cx) {
                    std::task::Poll::Pending => std::task::Poll::Pending,
                    std::task::Poll::Ready(Ok(())) => std::task::Poll::Ready(
                        state
                            .with_locked(|inner| inner.result.clone())
                            .expect("finished implies a stored result"),
                    ),
                    std::task::Poll::Ready(Err(err)) => std::task::Poll::Ready(Err(err)),
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl<Output: Clone + Send + Sync + 'static> Cancellable for TaskOperation<Output> {
    fn cancel(&self) {
        // `Cancellable::cancel` takes `&self`, not `&Arc<Self>`, so this
        // can only signal the token and flag the state — it cannot finish
        // a not-yet-started operation the way the inherent
        // `TaskOperation::cancel` does. Callers holding the `Arc` should
        // prefer the inherent method; this exists so a `TaskOperation` can
        // be registered as a plain `Cancellable` (e.g. on a
        // `CancellationSource`) without the registrant needing to know its
        // concrete type.
        self.cancellation.cancel();
        self.state.with_locked(|inner| inner.cancelled = true);
    }

    async fn wait(&self) {
        let _ = TaskOperation::wait(self).await;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    fn box_future<T: Send + 'static>(
        fut: impl std::future::Future<Output = Result<T, BoxError>> + Send + 'static,
    ) -> BoxFuture<'static, Result<T, BoxError>> {
        Box::pin(fut)
    }

    #[tokio::test]
    async fn result_before_start_is_early_invoke() {
        let op: Arc<TaskOperation<u32>> =
            TaskOperation::new(None, TaskPriority::Normal, TaskFlags::default(), |_token, _tracker| {
                box_future(async { Ok(7) })
            });
        let result = op.result().await;
        assert!(matches!(result, Err(AsyncError::EarlyInvoke)));
    }

    #[tokio::test]
    async fn start_then_result_returns_closure_output() {
        let op: Arc<TaskOperation<u32>> =
            TaskOperation::new(None, TaskPriority::Normal, TaskFlags::default(), |_token, _tracker| {
                box_future(async { Ok(42) })
            });
        let runtime = crate::runtime::TokioRuntime;
        op.start(&runtime);
        assert_eq!(op.result().await.unwrap(), 42);
        assert!(op.is_finished());
        assert!(!op.is_executing());
    }

    #[tokio::test]
    async fn cancel_before_start_finishes_without_running() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_inner = ran.clone();
        let op: Arc<TaskOperation<u32>> =
            TaskOperation::new(None, TaskPriority::Normal, TaskFlags::default(), move |_token, _tracker| {
                ran_inner.store(true, Ordering::SeqCst);
                box_future(async { Ok(1) })
            });
        op.cancel();
        let runtime = crate::runtime::TokioRuntime;
        op.start(&runtime);
        let result = op.result().await;
        assert!(matches!(result, Err(AsyncError::Cancelled)));
        assert!(!ran.load(Ordering::SeqCst));
        assert!(op.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_while_executing_overrides_closure_success() {
        let op: Arc<TaskOperation<u32>> = TaskOperation::new(
            None,
            TaskPriority::Normal,
            TaskFlags::default(),
            |token, _tracker| {
                box_future(async move {
                    token.wait().await.ok();
                    Ok(99)
                })
            },
        );
        let runtime = crate::runtime::TokioRuntime;
        op.start(&runtime);
        tokio::task::yield_now().await;
        op.cancel();
        let result = op.result().await;
        assert!(matches!(result, Err(AsyncError::Cancelled)));
    }

    #[tokio::test]
    async fn wait_resolves_without_reading_the_result() {
        let op: Arc<TaskOperation<u32>> =
            TaskOperation::new(None, TaskPriority::Normal, TaskFlags::default(), |_token, _tracker| {
                box_future(async { Ok(5) })
            });
        let runtime = crate::runtime::TokioRuntime;
        op.start(&runtime);
        op.wait().await.unwrap();
        assert!(op.is_finished());
    }

    #[tokio::test]
    async fn tracked_descendant_delays_finish_until_it_drops() {
        let op: Arc<TaskOperation<u32>> = TaskOperation::new(
            None,
            TaskPriority::Normal,
            TaskFlags {
                detached: false,
                track_unstructured_tasks: true,
            },
            |_token, tracker| {
                box_future(async move {
                    let descendant = tracker.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        drop(descendant);
                    });
                    Ok(7)
                })
            },
        );
        let runtime = crate::runtime::TokioRuntime;
        op.start(&runtime);
        tokio::task::yield_now().await;
        // The closure itself has returned, but the spawned descendant
        // still holds a tracker clone.
        assert!(!op.is_finished());
        op.wait().await.unwrap();
        assert!(op.is_finished());
        assert_eq!(op.result().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn second_start_is_a_noop() {
        let runs = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let runs_inner = runs.clone();
        let op: Arc<TaskOperation<u32>> =
            TaskOperation::new(None, TaskPriority::Normal, TaskFlags::default(), move |_token, _tracker| {
                runs_inner.fetch_add(1, Ordering::SeqCst);
                box_future(async { Ok(1) })
            });
        let runtime = crate::runtime::TokioRuntime;
        op.start(&runtime);
        op.start(&runtime);
        op.result().await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
