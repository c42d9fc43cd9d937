use super::{Callback, Context, Scheduler};

use std::sync::{Arc, OnceLock};

/// The cooperative scheduler used by contexts created with
/// [`Context::new`].
///
/// Submitting a callback enters its context and runs it inline on the
/// submitting thread. Any context of this scheduler is continuable from
/// any other context of this scheduler, so resuming never hops threads.
pub struct DefaultScheduler {
    _private: (),
}

impl DefaultScheduler {
    /// Returns the process-wide default scheduler.
    pub fn get() -> Arc<dyn Scheduler> {
        static SCHEDULER: OnceLock<Arc<DefaultScheduler>> = OnceLock::new();

        SCHEDULER
            .get_or_init(|| Arc::new(DefaultScheduler { _private: () }))
            .clone()
    }
}

impl Scheduler for DefaultScheduler {
    fn continuable(&self, _context: &Context) -> bool {
        let current = Context::get();
        std::ptr::addr_eq(
            Arc::as_ptr(current.scheduler()),
            self as *const DefaultScheduler,
        )
    }

    fn submit(&self, callback: Callback, context: &Context) {
        context.enter(callback);
    }
}
