//! Default [`super::AsyncRuntime`] implementation on top of Tokio, behind
//! the `tokio-runtime` feature (default-on). Matches the pattern of the
//! teacher workspace's `adapters/runtime-tokio` crate: a thin adapter, not
//! a reimplementation of the executor.

use std::time::Duration;

use crate::future::BoxFuture;
use crate::sealed::Sealed;

use super::executor::{JoinHandle, TaskExecutor};
use super::timer::TimeDriver;

/// An [`super::AsyncRuntime`] backed by the ambient Tokio runtime (i.e.
/// whichever Tokio runtime is current when `spawn`/`sleep` are called).
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioRuntime;

impl Sealed for TokioRuntime {}

impl TaskExecutor for TokioRuntime {
    fn spawn(&self, future: BoxFuture<'static, ()>) -> JoinHandle {
        let handle = tokio::spawn(future);
        JoinHandle::new(move || handle.abort())
    }
}

impl TimeDriver for TokioRuntime {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}
