//! `TaskExecutor` — the task-spawning half of [`super::AsyncRuntime`].

use crate::future::BoxFuture;
use crate::sealed::Sealed;

/// A handle to a spawned task. Dropping it detaches the task (it keeps
/// running); call [`JoinHandle::cancel`] to request cooperative
/// cancellation, matching the rest of this crate's cancellation model.
pub struct JoinHandle {
    cancel: Box<dyn FnOnce() + Send>,
}

impl JoinHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Box::new(cancel),
        }
    }

    /// Requests cancellation of the spawned task. Best-effort and
    /// cooperative, like every other cancellation surface in this crate.
    pub fn cancel(self) {
        (self.cancel)();
    }
}

/// Spawns `'static` futures onto the host executor.
///
/// # Contract
/// - Spawned futures must be polled to completion independently of the
///   caller; `spawn` returns immediately.
/// - Implementations must not assume a specific scheduler beyond "this
///   future will eventually be polled".
pub trait TaskExecutor: Send + Sync + Sealed {
    fn spawn(&self, future: BoxFuture<'static, ()>) -> JoinHandle;
}
