//! `CancellationSource` — a cooperative-cancellation tree node, itself an
//! async object (spec §4.6).
//!
//! # Grounding the "natural completion" branch
//! The distilled spec says `wait()` completes "either cancelled or because
//! every registered cancellable has completed naturally with the pipe
//! closed" — but the only operation that closes the pipe is `cancel()`
//! itself (the external-interface table lists no separate `close()`). So
//! in this port the two branches collapse into one: `wait()` resolves
//! `Ok(())` exactly when `cancel()` fires, and `Err(Cancelled)` only if the
//! source is torn down (`Drop`) with waiters still pending — the "safe
//! deinit" universal property, not a second completion path.
//!
//! # Grounding the cycle guard
//! §9's open question adopts weak child references plus epoch-based cycle
//! detection. `linked()` stamps a freshly constructed child's epoch as one
//! past the highest epoch among its parents; `register()` refuses (and
//! immediately cancels) any registered `CancellationSource` whose epoch is
//! strictly less than the registering source's own — such a candidate can
//! only have gotten an older epoch by already being an ancestor.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::continuation::{Suspended, TrackedContinuation, WaiterId, WaiterRegistry, WaitFuture};
use crate::locker::Locker;
use crate::observability::{default_logger, LogLevel, LogRecord, Logger};
use crate::runtime::AsyncRuntime;

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Anything that can be asked to stop and awaited until it has. Task
/// handles and other `CancellationSource`s both satisfy this.
#[async_trait::async_trait]
pub trait Cancellable: Send + Sync + 'static {
    /// Requests cancellation. Must not block.
    fn cancel(&self);
    /// Resolves once this cancellable has finished, however it got there.
    async fn wait(&self);
    /// Escape hatch for the epoch cycle guard in [`CancellationSource::register`].
    fn as_any(&self) -> &dyn Any;
}

/// A node in a cooperative cancellation tree.
pub struct CancellationSource {
    id: u64,
    epoch: u64,
    cancelled: Locker<bool>,
    children: Mutex<Vec<Weak<dyn Cancellable>>>,
    waiters: WaiterRegistry<()>,
    logger: Arc<dyn Logger>,
}

impl CancellationSource {
    pub fn new() -> Arc<Self> {
        Self::at_epoch(0, default_logger())
    }

    pub fn with_logger(logger: Arc<dyn Logger>) -> Arc<Self> {
        Self::at_epoch(0, logger)
    }

    fn at_epoch(epoch: u64, logger: Arc<dyn Logger>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed),
            epoch,
            cancelled: Locker::new(false),
            children: Mutex::new(Vec::new()),
            waiters: WaiterRegistry::new(),
            logger,
        })
    }

    /// Constructs a new source and registers it as a cancellable child of
    /// every source in `parents`: cancelling any parent cancels this one.
    pub fn linked(parents: &[Arc<CancellationSource>]) -> Arc<Self> {
        let epoch = parents.iter().map(|parent| parent.epoch).max().map_or(1, |max| max + 1);
        let child = Self::at_epoch(epoch, default_logger());
        for parent in parents {
            parent.register(child.clone() as Arc<dyn Cancellable>);
        }
        child
    }

    fn log(&self, op: &'static str) {
        self.logger.log(LogRecord {
            obj: "CancellationSource",
            op,
            id: Some(self.id),
            level: LogLevel::Debug,
            fields: &[],
        });
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.with_locked(|flag| *flag)
    }

    /// Registers `cancellable` for cancellation propagation. If this
    /// source is already cancelled, `cancellable` is cancelled immediately
    /// instead of being stored.
    pub fn register(&self, cancellable: Arc<dyn Cancellable>) {
        self.log("register");
        if let Some(candidate) = cancellable.as_any().downcast_ref::<CancellationSource>() {
            if candidate.epoch < self.epoch {
                // `candidate` predates `self` in the linking chain — it can
                // only get there by already being an ancestor (`linked()`
                // stamps every child strictly past its parents' epochs), so
                // registering it back here would close a cycle. Two
                // unrelated roots both sit at epoch 0 and are unaffected:
                // this only fires for genuine back-edges.
                cancellable.cancel();
                return;
            }
        }
        let rejected = self.cancelled.with_locked(|cancelled| {
            if *cancelled {
                true
            } else {
                self.children.lock().push(Arc::downgrade(&cancellable));
                false
            }
        });
        if rejected {
            cancellable.cancel();
        }
    }

    /// Closes the registration pipe and cancels every live registered
    /// child, then resumes every `wait()` caller with `Ok(())`.
    /// Idempotent: a second `cancel()` is a no-op.
    pub fn cancel(&self) {
        let transitioned = self.cancelled.with_locked(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        });
        if !transitioned {
            return;
        }
        self.log("cancel");
        let children = std::mem::take(&mut *self.children.lock());
        for weak_child in children {
            if let Some(child) = weak_child.upgrade() {
                child.cancel();
            }
        }
        while let Some((_, continuation)) = self.waiters.pop_front() {
            continuation.resume(Ok(()));
        }
    }

    /// Schedules `cancel()` after `duration`, via `runtime`. The returned
    /// handle cancels the pending timer (not the source) if dropped early
    /// via [`crate::runtime::JoinHandle::cancel`].
    pub fn cancel_after(
        self: &Arc<Self>,
        duration: Duration,
        runtime: Arc<dyn AsyncRuntime>,
    ) -> crate::runtime::JoinHandle {
        let source = Arc::clone(self);
        let sleeper = Arc::clone(&runtime);
        runtime.spawn(Box::pin(async move {
            sleeper.sleep(duration).await;
            source.cancel();
        }))
    }

    /// Resolves once this source is cancelled. `Err(Cancelled)` only if
    /// the source itself is dropped first (see module docs).
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
        self.cancelled.with_locked(|cancelled| {
            if *cancelled {
                Ok(())
            } else {
                let id = WaiterId::next();
                let continuation = Arc::new(TrackedContinuation::new());
                self.waiters.insert(id, continuation.clone());
                Err((id, continuation))
            }
        })
    }
}

impl Drop for CancellationSource {
    fn drop(&mut self) {
        self.waiters.cancel_all();
    }
}

#[async_trait::async_trait]
impl Cancellable for CancellationSource {
    fn cancel(&self) {
        CancellationSource::cancel(self);
    }

    async fn wait(&self) {
        let _ = CancellationSource::wait(self).await;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
