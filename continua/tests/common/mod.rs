#![allow(dead_code)]

use continua::{PoolBuilder, StaticThreadPool};
use tracing_subscriber::EnvFilter;

use std::sync::Once;

/// Installs a `tracing` subscriber honoring `RUST_LOG`, once per test
/// binary.
pub fn init_tracing() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A small unpinned pool for tests.
pub fn pool(workers: usize) -> StaticThreadPool {
    match PoolBuilder::new()
        .worker_threads(workers)
        .pin_threads(false)
        .thread_name("test-pool")
        .build()
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to build test pool: {error}"),
    }
}
