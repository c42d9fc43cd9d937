//! Scheduling contexts.
//!
//! A [`Context`] names a logical thread of control. Every suspension point
//! captures the current context and later resumes the computation through
//! it, either synchronously (when the scheduler says the call is
//! continuable from where we are) or by handing a callback to the
//! context's [`Scheduler`].
//!
//! Two schedulers ship with the crate:
//!
//! - [`DefaultScheduler`]: cooperative, runs submitted callbacks inline
//! - [`StaticThreadPool`]: a fixed set of worker threads, optionally
//!   pinned to CPUs

mod context;
mod default;
pub mod pool;

pub use context::Context;
pub use default::DefaultScheduler;
pub use pool::{PoolBuilder, PoolError, Pinned, Requirements, StaticThreadPool};

pub(crate) use context::CURRENT_WORKER;

/// A unit of deferred work.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Decides where and when callbacks of a [`Context`] run.
pub trait Scheduler: Send + Sync + 'static {
    /// Returns `true` if a callback for `context` may run synchronously
    /// on the calling thread.
    fn continuable(&self, context: &Context) -> bool;

    /// Arranges for `callback` to run inside `context`.
    fn submit(&self, callback: Callback, context: &Context);
}
