//! Free-function wait combinators (spec §6): `wait_for_all`, `wait_for_any`,
//! `wait_for_task_completion`. Every primitive's `wait()` returns a
//! [`WaitFuture<()>`](crate::continuation::WaitFuture), so these combinators
//! accept that common shape directly rather than requiring a trait object.

use std::future::Future;
use std::time::Duration;

use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;

use crate::continuation::WaitFuture;
use crate::error::{AsyncError, AsyncResult, BoxError};
use crate::runtime::AsyncRuntime;

/// Waits for every entry in `waits` to resume, concurrently. Returns the
/// first error observed (per §7, a `Cancelled` from a dependent wait
/// bubbles to the enclosing wait); the remaining entries are dropped at
/// that point, which deregisters each from its own primitive.
pub async fn wait_for_all(waits: Vec<WaitFuture<()>>) -> AsyncResult<()> {
    let mut pending: FuturesUnordered<_> = waits.into_iter().collect();
    while let Some(result) = pending.next().await {
        result?;
    }
    Ok(())
}

/// Resumes once exactly `count` of `waits` have resumed, returning the
/// outcome of whichever one was the `count`-th to complete. `count = 0`
/// resolves immediately with `Ok(())`.
pub async fn wait_for_any(waits: Vec<WaitFuture<()>>, count: usize) -> AsyncResult<()> {
    if count == 0 {
        return Ok(());
    }
    let mut pending: FuturesUnordered<_> = waits.into_iter().collect();
    let mut seen = 0usize;
    while let Some(result) = pending.next().await {
        seen += 1;
        if seen == count {
            return result;
        }
    }
    Ok(())
}

/// Races `action` against a `timeout` driven by `runtime`. Surfaces
/// `action`'s own result (mapping its error through [`AsyncError::Failed`])
/// if it finishes first, or `AsyncError::TimedOut` if the deadline wins.
pub async fn wait_for_task_completion<T: Send + 'static>(
    runtime: &dyn AsyncRuntime,
    timeout: Duration,
    action: impl Future<Output = Result<T, BoxError>> + Send + 'static,
) -> AsyncResult<T> {
    let deadline = runtime.sleep(timeout);
    futures_util::pin_mut!(deadline);
    let action = Box::pin(action);
    match futures_util::future::select(action, deadline).await {
        futures_util::future::Either::Left((result, _)) => result.map_err(AsyncError::Failed),
        futures_util::future::Either::Right((_, _)) => Err(AsyncError::TimedOut),
    }
}
