use super::{PoolError, StaticThreadPool};

use std::thread;

/// Builder for configuring and creating a [`StaticThreadPool`].
///
/// # Examples
///
/// ```rust,ignore
/// let pool = PoolBuilder::new()
///     .worker_threads(4)
///     .pin_threads(false)
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct PoolBuilder {
    /// Number of worker threads in the pool.
    worker_threads: usize,

    /// Whether worker `i` is pinned to CPU `i`.
    pin_threads: bool,

    /// Prefix of the worker thread names.
    thread_name: String,
}

impl PoolBuilder {
    /// Creates a new `PoolBuilder` with default configuration.
    ///
    /// By default there is one worker per available logical CPU (falling
    /// back to `1`), workers are pinned, and threads are named
    /// `"static-thread-pool-<i>"`.
    pub fn new() -> Self {
        let worker_threads = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            worker_threads,
            pin_threads: true,
            thread_name: "static-thread-pool".to_string(),
        }
    }

    /// Sets the number of worker threads.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn worker_threads(mut self, n: usize) -> Self {
        assert!(n > 0, "worker_threads must be > 0");

        self.worker_threads = n;
        self
    }

    /// Enables or disables pinning worker `i` to CPU `i`.
    pub fn pin_threads(mut self, pin: bool) -> Self {
        self.pin_threads = pin;
        self
    }

    /// Sets the prefix used to name worker threads.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Spawns the workers and returns the pool.
    ///
    /// Fails if a worker thread cannot be spawned.
    pub fn build(self) -> Result<StaticThreadPool, PoolError> {
        StaticThreadPool::new(self.worker_threads, self.pin_threads, &self.thread_name)
    }
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}
