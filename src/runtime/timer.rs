//! `TimeDriver` — the timer half of [`super::AsyncRuntime`], used by every
//! `wait(timeout)` variant and by [`crate::combinators::wait_for_task_completion`].

use std::time::Duration;

use crate::future::BoxFuture;
use crate::sealed::Sealed;

/// Drives a single deadline. Implementations race this against the
/// primitive's own wait and return whichever settles first.
pub trait TimeDriver: Send + Sync + Sealed {
    /// Returns a future that resolves after `duration` elapses.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}
