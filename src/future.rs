//! Object-safe future/stream vocabulary used by the runtime contract and
//! the combinators. Adapted from `spark-core::future`'s `BoxFuture`
//! aliases; this crate targets `std`, so the aliases drop the `no_std`
//! `core`/`alloc` plumbing the original needed.

use std::future::Future;
use std::pin::Pin;

/// A boxed, `Send` future — the common currency for spawning and for
/// object-safe runtime contracts ([`crate::runtime::TaskExecutor`],
/// [`crate::runtime::TimeDriver`]).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A boxed future without a `Send` requirement, for single-threaded
/// executors.
pub type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;
