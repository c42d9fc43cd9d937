use super::{Callback, DefaultScheduler, Scheduler};

use tracing::trace;

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

thread_local! {
    /// Thread-local handle to the context currently owning execution.
    ///
    /// Lazily initialized with a per-thread default context the first
    /// time [`Context::get`] is called outside of any entered context.
    static CURRENT: RefCell<Option<Context>> = const { RefCell::new(None) };

    /// Thread-local identity of the pool worker running on this thread,
    /// as `(pool id, worker index)`.
    pub(crate) static CURRENT_WORKER: RefCell<Option<(u64, usize)>> =
        const { RefCell::new(None) };
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A named logical execution context.
///
/// Contexts are cheap handles; clones refer to the same context. A context
/// stays alive for as long as any callback scheduled against it.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    id: u64,
    name: String,
    scheduler: Arc<dyn Scheduler>,
    worker: Option<usize>,
}

impl Context {
    /// Creates a context on the [`DefaultScheduler`].
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_scheduler(name, DefaultScheduler::get())
    }

    /// Creates a context driven by `scheduler`.
    pub fn with_scheduler(name: impl Into<String>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self::build(name.into(), scheduler, None)
    }

    pub(crate) fn on_worker(
        name: impl Into<String>,
        scheduler: Arc<dyn Scheduler>,
        worker: usize,
    ) -> Self {
        Self::build(name.into(), scheduler, Some(worker))
    }

    fn build(name: String, scheduler: Arc<dyn Scheduler>, worker: Option<usize>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                name,
                scheduler,
                worker,
            }),
        }
    }

    /// Returns the context currently owning execution on this thread.
    ///
    /// Outside of any entered context this is the thread's default
    /// context, named after the thread (`"[main]"` on the main thread).
    pub fn get() -> Context {
        CURRENT.with(|current| {
            current
                .borrow_mut()
                .get_or_insert_with(|| {
                    let name = std::thread::current()
                        .name()
                        .map(|name| format!("[{name}]"))
                        .unwrap_or_else(|| "[thread]".to_string());
                    Context::new(name)
                })
                .clone()
        })
    }

    /// Runs `f` with `self` installed as the current context, restoring
    /// the previous context afterwards.
    pub fn enter<R>(&self, f: impl FnOnce() -> R) -> R {
        let previous = CURRENT.with(|current| current.borrow_mut().replace(self.clone()));

        let out = f();

        CURRENT.with(|current| *current.borrow_mut() = previous);

        out
    }

    /// Creates a new context named `name` on the same scheduler (and the
    /// same pool worker, if any). Used to delimit a new logical caller.
    pub fn fork(&self, name: impl Into<String>) -> Context {
        Self::build(name.into(), self.inner.scheduler.clone(), self.inner.worker)
    }

    /// Unique identifier of this context.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Human readable name of this context.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Scheduler driving this context.
    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.inner.scheduler
    }

    /// Pool worker this context is placed on, if any.
    pub fn worker(&self) -> Option<usize> {
        self.inner.worker
    }

    /// Returns `true` if a callback for this context may run right here.
    pub fn continuable(&self) -> bool {
        self.inner.scheduler.continuable(self)
    }

    /// Resumes `callback` within this context.
    ///
    /// Runs synchronously (inside this context) when continuable from the
    /// calling thread, otherwise submits it to the scheduler.
    pub fn continue_with<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.continuable() {
            trace!(context = %self.name(), "continuing");
            self.enter(callback);
        } else {
            trace!(context = %self.name(), "submitting");
            self.inner.scheduler.submit(Box::new(callback), self);
        }
    }

    /// Resumes a parked callback within this context.
    ///
    /// Unlike [`continue_with`](Self::continue_with) the callback is always
    /// handed to the scheduler.
    pub fn unblock<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        trace!(context = %self.name(), "unblocking");
        self.submit(Box::new(callback));
    }

    pub(crate) fn submit(&self, callback: Callback) {
        self.inner.scheduler.submit(callback, self);
    }

    pub(crate) fn same_scheduler(&self, scheduler: &Arc<dyn Scheduler>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.inner.scheduler), Arc::as_ptr(scheduler))
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Context {}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("worker", &self.inner.worker)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_restores_previous_context() {
        let outer = Context::get();
        let inner = Context::new("inner");

        let seen = inner.enter(Context::get);

        assert_eq!(seen, inner);
        assert_eq!(Context::get(), outer);
    }

    #[test]
    fn test_fork_keeps_scheduler() {
        let parent = Context::new("parent");
        let child = parent.fork("child");

        assert_ne!(parent, child);
        assert_eq!(child.name(), "child");
        assert!(child.same_scheduler(parent.scheduler()));
    }
}
