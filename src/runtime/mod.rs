//! Minimal runtime contract: `TaskExecutor` + `TimeDriver`, aggregated as
//! `AsyncRuntime`. Spec §4.11 (`SPEC_FULL.md`).
//!
//! # Why this exists
//! Only two primitives in this crate need "something outside the Locker"
//! to drive them: [`crate::task_operation::TaskOperation`] (which may
//! spawn a detached task) and [`crate::task_queue::TaskQueue`] /
//! the timed-wait wrappers (which need a timer). Every other primitive
//! (`AsyncSemaphore`, `AsyncEvent`, `AsyncCountdownEvent`,
//! `CancellationSource`, `Future`) is driven purely by the ambient
//! executor's `Waker` and needs no runtime handle at all.
//!
//! # Grounding
//! Mirrors `spark-core::runtime::{executor, task}`'s `TaskExecutor`/
//! `JoinHandle` split, trimmed of the `CallContext` propagation machinery
//! (no counterpart in this spec — there is no multi-tenant call context
//! here) and of the `spawn_dyn`/`downcast` object-safety dance (not needed
//! without the contract-test harness that motivated it upstream).

mod executor;
mod timer;

#[cfg(feature = "tokio-runtime")]
mod tokio_impl;

pub use executor::{JoinHandle, TaskExecutor};
pub use timer::TimeDriver;

#[cfg(feature = "tokio-runtime")]
pub use tokio_impl::TokioRuntime;

use crate::sealed::Sealed;

/// The aggregate capability [`crate::task_operation::TaskOperation`] and
/// [`crate::task_queue::TaskQueue`] need from their host.
pub trait AsyncRuntime: TaskExecutor + TimeDriver + Send + Sync + 'static + Sealed {}

impl<T> AsyncRuntime for T where T: TaskExecutor + TimeDriver + Send + Sync + 'static {}
