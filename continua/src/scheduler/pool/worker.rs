use super::affinity;
use super::queue::RunQueue;
use crate::scheduler::CURRENT_WORKER;

use tracing::{debug, warn};

use std::sync::Arc;

/// A pool worker thread.
///
/// Each worker drains its own run queue in order. Contexts are placed on a
/// single worker, so callbacks of one context never run in parallel.
pub(crate) struct Worker {
    /// Identifier of the owning pool.
    pool: u64,

    /// Index of this worker within the pool.
    index: usize,

    /// CPU to pin the thread to, if pinning is enabled.
    cpu: Option<usize>,

    /// Queue of jobs placed on this worker.
    queue: Arc<RunQueue>,
}

impl Worker {
    pub(crate) fn new(pool: u64, index: usize, cpu: Option<usize>, queue: Arc<RunQueue>) -> Self {
        Self {
            pool,
            index,
            cpu,
            queue,
        }
    }

    /// Runs the worker loop until the queue is shut down.
    ///
    /// # Execution loop
    ///
    /// - Run the oldest job inside its context
    /// - Otherwise, park until a job is pushed
    pub(crate) fn run(self) {
        CURRENT_WORKER.with(|worker| *worker.borrow_mut() = Some((self.pool, self.index)));

        if let Some(cpu) = self.cpu {
            match affinity::pin_current_thread(cpu) {
                Ok(()) => debug!(worker = self.index, cpu, "pinned pool worker"),
                Err(error) => {
                    warn!(worker = self.index, cpu, %error, "failed to pin pool worker")
                }
            }
        }

        loop {
            if self.queue.is_shutdown() {
                break;
            }

            if let Some(job) = self.queue.pop() {
                job.context.enter(job.callback);
                continue;
            }

            self.queue.park();
        }

        let dropped = self.queue.clear();
        if dropped > 0 {
            debug!(worker = self.index, dropped, "pool worker exited with pending jobs");
        }

        CURRENT_WORKER.with(|worker| *worker.borrow_mut() = None);
    }
}
