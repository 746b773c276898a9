#![deny(unsafe_code)]
//! Cooperative, non-blocking synchronization primitives for async Rust:
//! a counting semaphore, a manual-reset event, a countdown event, a
//! cancellation tree, a one-shot task handle with a cooperative-cancel
//! token, a barrier-aware task queue, and a settled-once promise with
//! `all`/`all_settled`/`race`/`any` combinators.
//!
//! Every primitive shares the same substrate: a [`locker::Locker`]
//! (reentrant critical section), a [`continuation::WaiterRegistry`] of
//! [`continuation::TrackedContinuation`]s (FIFO, one-shot resume slots),
//! and a [`continuation::WaitFuture`]/[`continuation::TimedWait`] pair so
//! `wait()` never ties its returned future to `&self`'s lifetime — a
//! primitive can always be dropped (resuming its outstanding waiters with
//! [`error::AsyncError::Cancelled`]) even while one of its own waits is
//! still suspended elsewhere.
//!
//! Task spawning and timers are abstracted behind [`runtime::AsyncRuntime`]
//! so the crate isn't tied to a specific executor; a [`runtime::TokioRuntime`]
//! adapter is bundled by default (`tokio-runtime` feature).

mod cancellation;
mod combinators;
mod continuation;
mod countdown;
mod error;
mod event;
mod future;
mod locker;
mod observability;
mod promise;
pub mod runtime;
mod sealed;
mod semaphore;
mod task_operation;
mod task_queue;
mod task_tracker;

/// Exposes the continuation substrate's private types to
/// `tests/loom_concurrency.rs`. Only compiled with `--cfg loom` (paired
/// with the `loom-model` feature), so it never appears in an ordinary
/// build's public surface.
#[cfg(loom)]
pub mod internal_testing {
    pub use crate::continuation::TrackedContinuation;
}

pub mod prelude;

pub use cancellation::{Cancellable, CancellationSource};
pub use combinators::{wait_for_all, wait_for_any, wait_for_task_completion};
pub use continuation::{TimedWait, WaitFuture};
pub use countdown::AsyncCountdownEvent;
pub use error::{AsyncError, AsyncResult, BoxError};
pub use event::AsyncEvent;
pub use future::{BoxFuture, LocalBoxFuture};
pub use locker::Locker;
pub use observability::{default_logger, min_level, set_min_level, LogLevel, LogRecord, Logger, NoopLogger};
pub use promise::{all, all_settled, any, race, GetFuture, Promise, PromiseError};
pub use semaphore::AsyncSemaphore;
pub use task_operation::{TaskFlags, TaskOperation, TaskPriority, TaskResult};
pub use task_queue::TaskQueue;
pub use task_tracker::TaskTracker;

#[cfg(feature = "tracing-log")]
pub use observability::TracingLogger;
