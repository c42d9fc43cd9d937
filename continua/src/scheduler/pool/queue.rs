use crate::scheduler::{Callback, Context};

use parking_lot::{Condvar, Mutex};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// A callback waiting to run inside its context.
pub(crate) struct Job {
    pub(crate) callback: Callback,
    pub(crate) context: Context,
}

/// Run queue owned by a single pool worker.
///
/// Jobs are executed in submission order. A parked worker sleeps until a
/// push or a shutdown wakes it; both notify while holding the job lock, so
/// a wakeup cannot slip in between the emptiness check and the wait.
pub(crate) struct RunQueue {
    /// Jobs waiting for the worker.
    jobs: Mutex<VecDeque<Job>>,

    /// Condition variable used to wake the parked worker.
    condvar: Condvar,

    /// Indicates whether the pool is shutting down.
    shutdown: AtomicBool,
}

impl RunQueue {
    pub(crate) fn new() -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Signals shutdown and wakes the worker.
    pub(crate) fn shutdown(&self) {
        let _jobs = self.jobs.lock();
        self.shutdown.store(true, Ordering::Release);
        self.condvar.notify_all();
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Enqueues a job and wakes the worker.
    pub(crate) fn push(&self, job: Job) {
        let mut jobs = self.jobs.lock();
        jobs.push_back(job);
        self.condvar.notify_one();
    }

    /// Takes the oldest job, if any.
    pub(crate) fn pop(&self) -> Option<Job> {
        self.jobs.lock().pop_front()
    }

    /// Parks the worker until a job arrives or shutdown is signaled.
    pub(crate) fn park(&self) {
        let mut jobs = self.jobs.lock();

        while jobs.is_empty() && !self.is_shutdown() {
            self.condvar.wait(&mut jobs);
        }
    }

    /// Drops every pending job, returning how many there were.
    pub(crate) fn clear(&self) -> usize {
        let mut jobs = self.jobs.lock();
        let pending = jobs.len();
        jobs.clear();
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_jobs_pop_in_submission_order() {
        let queue = RunQueue::new();
        let context = Context::new("queue");
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = order.clone();
            queue.push(Job {
                callback: Box::new(move || order.lock().push(i)),
                context: context.clone(),
            });
        }

        while let Some(job) = queue.pop() {
            (job.callback)();
        }

        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_clear_drops_pending_jobs() {
        let queue = RunQueue::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let counter = ran.clone();
        queue.push(Job {
            callback: Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            context: Context::new("queue"),
        });

        assert_eq!(queue.clear(), 1);
        assert!(queue.pop().is_none());
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_parked_worker_wakes_on_push_and_shutdown() {
        let queue = Arc::new(RunQueue::new());
        let popped = Arc::new(AtomicUsize::new(0));

        let worker = {
            let queue = queue.clone();
            let popped = popped.clone();
            std::thread::spawn(move || {
                loop {
                    queue.park();
                    if queue.is_shutdown() {
                        return;
                    }
                    while let Some(job) = queue.pop() {
                        (job.callback)();
                        popped.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        };

        let (tx, rx) = std::sync::mpsc::channel();
        queue.push(Job {
            callback: Box::new(move || tx.send(()).unwrap()),
            context: Context::new("queue"),
        });

        rx.recv_timeout(std::time::Duration::from_secs(1)).unwrap();

        queue.shutdown();
        worker.join().unwrap();

        assert_eq!(popped.load(Ordering::SeqCst), 1);
    }
}
