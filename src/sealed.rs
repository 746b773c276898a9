//! Internal sealing boundary for traits this crate exposes but does not
//! (yet) want third parties implementing.
//!
//! # Why
//! A handful of traits here (`Logger`, `AsyncRuntime`) are consumed as
//! `dyn` objects throughout the primitives. Sealing them keeps room to
//! add methods in a minor release without breaking downstream
//! implementors, the same trade-off `spark-core` makes for its own
//! contract traits. `Cancellable` is deliberately left unsealed: spec
//! §4.6 requires `CancellationSource::register` to accept "any value
//! implementing the Cancellable capability", so third-party types must be
//! able to implement it.
//!
//! # How
//! A private marker trait with no blanket impl. Public traits require
//! `: sealed::Sealed` as a supertrait; nothing outside this crate can name
//! `Sealed`, and only the concrete types this crate ships implement it, so
//! nothing outside this crate can implement the sealed traits.
pub(crate) trait Sealed {}
