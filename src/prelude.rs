//! Shallow re-export of the types most call sites need, so `use
//! spark_sync::prelude::*;` covers the common case without naming every
//! module.

pub use crate::cancellation::{Cancellable, CancellationSource};
pub use crate::combinators::{wait_for_all, wait_for_any, wait_for_task_completion};
pub use crate::continuation::{TimedWait, WaitFuture};
pub use crate::countdown::AsyncCountdownEvent;
pub use crate::error::{AsyncError, AsyncResult};
pub use crate::event::AsyncEvent;
pub use crate::future::BoxFuture;
pub use crate::promise::{all, all_settled, any, race, Promise, PromiseError};
pub use crate::runtime::AsyncRuntime;
pub use crate::semaphore::AsyncSemaphore;
pub use crate::task_operation::{TaskFlags, TaskOperation, TaskPriority};
pub use crate::task_queue::TaskQueue;

#[cfg(feature = "tokio-runtime")]
pub use crate::runtime::TokioRuntime;
