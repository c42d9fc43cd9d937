//! A fixed pool of worker threads.
//!
//! The pool is the one place where callbacks run in parallel. A context is
//! placed on exactly one worker when it is created (see [`Requirements`]),
//! and every callback of that context runs on that worker, in submission
//! order. Workers can be pinned to CPUs.

mod affinity;
mod builder;
mod queue;
mod worker;

pub use builder::PoolBuilder;

use crate::scheduler::{CURRENT_WORKER, Callback, Context, Scheduler};
use crate::stages::reschedule::{Preempt, Target};
use queue::{Job, RunQueue};
use worker::Worker;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, warn};

use std::io;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Errors produced while building or placing work on a pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("cpu {cpu} is out of range, the pool has {workers} workers")]
    CpuOutOfRange { cpu: usize, workers: usize },

    #[error("failed to spawn pool worker: {0}")]
    Spawn(#[from] io::Error),
}

/// Which worker a context should be placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pinned {
    /// Any worker; the pool picks one round-robin.
    #[default]
    Any,
    /// Exactly this worker (CPU) index.
    ExactCpu(usize),
    /// The given index modulo the number of workers.
    ModuloTotalCpus(usize),
}

/// Placement requirements for a pool context.
#[derive(Debug, Clone)]
pub struct Requirements {
    name: String,
    pinned: Pinned,
}

impl Requirements {
    /// Requirements for a context named `name`, placed on any worker.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pinned: Pinned::Any,
        }
    }

    /// Sets the worker placement.
    pub fn pinned(mut self, pinned: Pinned) -> Self {
        self.pinned = pinned;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pinning(&self) -> Pinned {
        self.pinned
    }
}

/// A pool of worker threads acting as a [`Scheduler`].
pub struct StaticThreadPool {
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

struct Shared {
    id: u64,
    queues: Vec<Arc<RunQueue>>,
    next: AtomicUsize,
}

impl StaticThreadPool {
    pub(crate) fn new(
        worker_threads: usize,
        pin_threads: bool,
        thread_name: &str,
    ) -> Result<Self, PoolError> {
        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);

        let queues: Vec<_> = (0..worker_threads)
            .map(|_| Arc::new(RunQueue::new()))
            .collect();

        let shared = Arc::new(Shared {
            id,
            queues,
            next: AtomicUsize::new(0),
        });

        let pool = Self {
            shared,
            handles: Mutex::new(Vec::with_capacity(worker_threads)),
        };

        for index in 0..worker_threads {
            let worker = Worker::new(
                id,
                index,
                pin_threads.then_some(index),
                pool.shared.queues[index].clone(),
            );

            let handle = thread::Builder::new()
                .name(format!("{thread_name}-{index}"))
                .spawn(move || worker.run())?;

            pool.handles.lock().push(handle);
        }

        debug!(pool = id, workers = worker_threads, pinned = pin_threads, "started static thread pool");

        Ok(pool)
    }

    /// Returns the process-wide pool, building it with
    /// [`PoolBuilder::default`] on first use.
    ///
    /// # Panics
    ///
    /// Panics if the worker threads cannot be spawned.
    pub fn global() -> &'static StaticThreadPool {
        static POOL: OnceLock<StaticThreadPool> = OnceLock::new();

        POOL.get_or_init(|| match PoolBuilder::default().build() {
            Ok(pool) => pool,
            Err(error) => panic!("failed to start the global static thread pool: {error}"),
        })
    }

    /// Number of worker threads.
    pub fn concurrency(&self) -> usize {
        self.shared.queues.len()
    }

    /// The pool as a [`Scheduler`].
    pub fn scheduler(&self) -> Arc<dyn Scheduler> {
        self.shared.clone()
    }

    /// Creates a context placed on a worker according to `requirements`.
    pub fn context(&self, requirements: &Requirements) -> Result<Context, PoolError> {
        let workers = self.concurrency();

        let worker = match requirements.pinned {
            Pinned::Any => self.shared.next.fetch_add(1, Ordering::Relaxed) % workers,
            Pinned::ExactCpu(cpu) if cpu < workers => cpu,
            Pinned::ExactCpu(cpu) => return Err(PoolError::CpuOutOfRange { cpu, workers }),
            Pinned::ModuloTotalCpus(cpu) => cpu % workers,
        };

        Ok(Context::on_worker(
            requirements.name.clone(),
            self.scheduler(),
            worker,
        ))
    }

    /// Wraps `stage` so it runs on a pool context created from
    /// `requirements`, resuming the downstream back in the context that
    /// started it.
    pub fn schedule<S>(&self, requirements: &Requirements, stage: S) -> Result<Preempt<S>, PoolError> {
        let context = self.context(requirements)?;
        Ok(Preempt::new(Target::Context(context), stage))
    }

    /// Stops every worker. Pending callbacks are dropped.
    pub fn shutdown(&self) {
        for queue in &self.shared.queues {
            queue.shutdown();
        }
    }
}

impl Drop for StaticThreadPool {
    fn drop(&mut self) {
        self.shutdown();

        let on_worker =
            CURRENT_WORKER.with(|worker| matches!(*worker.borrow(), Some((pool, _)) if pool == self.shared.id));

        if on_worker {
            return;
        }

        for handle in self.handles.lock().drain(..) {
            let name = handle.thread().name().unwrap_or_default().to_string();

            if handle.join().is_err() {
                error!(worker = %name, "pool worker panicked");
            }
        }
    }
}

impl Scheduler for Shared {
    fn continuable(&self, context: &Context) -> bool {
        CURRENT_WORKER.with(|worker| {
            matches!(
                (*worker.borrow(), context.worker()),
                (Some((pool, current)), Some(target)) if pool == self.id && current == target
            )
        })
    }

    fn submit(&self, callback: Callback, context: &Context) {
        let index = context
            .worker()
            .unwrap_or(context.id() as usize)
            % self.queues.len();

        let queue = &self.queues[index];

        if queue.is_shutdown() {
            warn!(context = %context.name(), "dropping callback submitted after pool shutdown");
            return;
        }

        queue.push(Job {
            callback,
            context: context.clone(),
        });
    }
}
