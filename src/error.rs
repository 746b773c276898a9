//! Error taxonomy shared by every primitive in this crate.
//!
//! Three *structural* outcomes — [`AsyncError::Cancelled`],
//! [`AsyncError::TimedOut`], [`AsyncError::EarlyInvoke`] — plus one
//! passthrough variant, [`AsyncError::Failed`], that carries a user
//! closure's own error without flattening it into one of the three tags.
//! Nothing here is swallowed: a `Cancelled` observed on a dependent wait
//! always bubbles to the enclosing wait unless that wait already completed.

/// A shared, type-erased user error, used only by [`AsyncError::Failed`].
///
/// `Arc` rather than `Box`: every settled `TaskOperation::result()` /
/// `Future::get()` must hand the *same* outcome to every caller that reads
/// it, not just the first, and `AsyncError` is cloned into each — a boxed
/// `dyn Error` can't be cloned, an `Arc`-wrapped one can.
pub type BoxError = std::sync::Arc<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by every `wait()` / `get()` / `exec()` /
/// `result()` in this crate.
///
/// # Contract
/// - `Cancelled` is surfaced whenever the calling task's cancellation is
///   observed while suspended in a primitive's wait path.
/// - `TimedOut` is surfaced only by timed wrappers (`wait(timeout)`,
///   [`crate::combinators::wait_for_task_completion`]); it is never
///   conflated with `Cancelled` because callers routinely branch on
///   "did my deadline expire" vs. "was I shut down".
/// - `EarlyInvoke` is surfaced only by [`crate::task_operation::TaskOperation::result`]
///   when the operation was never started.
/// - `Failed` carries a user closure's own error unchanged.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AsyncError {
    /// The waiting task's cancellation was observed before the primitive
    /// could satisfy the wait.
    #[error("operation cancelled")]
    Cancelled,

    /// A timed wait's deadline elapsed before the primitive was satisfied.
    #[error("operation timed out")]
    TimedOut,

    /// `TaskOperation::result()` was called before `start()`/`signal()`.
    #[error("result queried before the operation was started")]
    EarlyInvoke,

    /// A user-supplied closure (inside `TaskOperation`, `TaskQueue::exec`,
    /// or `Future::new(attempt)`) returned its own error, propagated
    /// unchanged.
    #[error("operation closure failed: {0}")]
    Failed(#[source] BoxError),
}

impl AsyncError {
    /// Wraps an arbitrary error as [`AsyncError::Failed`].
    pub fn failed(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        AsyncError::Failed(std::sync::Arc::new(err))
    }

    /// `true` for [`AsyncError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AsyncError::Cancelled)
    }

    /// `true` for [`AsyncError::TimedOut`].
    pub fn is_timed_out(&self) -> bool {
        matches!(self, AsyncError::TimedOut)
    }
}

/// Convenience alias matching the crate-wide `Result<T, AsyncError>` shape.
pub type AsyncResult<T> = Result<T, AsyncError>;
