//! Sinks and entry points: where a pipeline ends and how it is started.

use crate::compose::{Attach, Continuation, Single};
use crate::error::{Error, Nil};
use crate::interrupt::Interrupt;
use crate::promise::{Future, Promise};

use tracing::{trace, warn};

type OnStart<T> = Box<dyn FnOnce(T) + Send>;
type OnFail<E> = Box<dyn FnOnce(E) + Send>;
type OnStop = Box<dyn FnOnce() + Send>;

/// A continuation ending a pipeline with callbacks.
///
/// Outcomes without a callback are not silently dropped: a failure or
/// a stop nobody asked for is logged.
pub struct Terminal<T, E> {
    on_start: Option<OnStart<T>>,
    on_fail: Option<OnFail<E>>,
    on_stop: Option<OnStop>,
}

pub fn terminal<T, E>() -> Terminal<T, E> {
    Terminal {
        on_start: None,
        on_fail: None,
        on_stop: None,
    }
}

impl<T, E> Terminal<T, E> {
    pub fn on_start<F>(mut self, f: F) -> Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.on_start = Some(Box::new(f));
        self
    }

    pub fn on_fail<F>(mut self, f: F) -> Self
    where
        F: FnOnce(E) + Send + 'static,
    {
        self.on_fail = Some(Box::new(f));
        self
    }

    pub fn on_stop<F>(mut self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_stop = Some(Box::new(f));
        self
    }
}

impl<T, E> Continuation<T, E> for Terminal<T, E>
where
    T: 'static,
    E: 'static,
{
    fn start(self, value: T) {
        match self.on_start {
            Some(f) => f(value),
            None => trace!("pipeline succeeded"),
        }
    }

    fn fail(self, error: E) {
        match self.on_fail {
            Some(f) => f(error),
            None => warn!("pipeline failed and nobody handled it"),
        }
    }

    fn stop(self) {
        match self.on_stop {
            Some(f) => f(),
            None => warn!("pipeline stopped and nobody handled it"),
        }
    }

    fn register(&mut self, _: &Interrupt) {}
}

/// Attaches `stage` to `k` and starts it, registering `interrupt` first.
pub fn start<S, K>(stage: S, k: K, interrupt: &Interrupt)
where
    S: Attach<Single<(), Nil>, K>,
    S::Kont: Continuation<(), Nil>,
{
    let mut kont = stage.attach(k);
    kont.register(interrupt);
    kont.start(());
}

/// Starts `stage` and returns a [`Future`] for its outcome.
///
/// [`Future::interrupt`] interrupts the pipeline.
pub fn spawn<S, T, E>(stage: S) -> Future<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
    S: Attach<Single<(), Nil>, Promise<T, E>, Out = Single<T, E>>,
    S::Kont: Continuation<(), Nil>,
{
    let (promise, future) = Promise::new();
    let interrupt = future.interrupter();
    start(stage, promise, &interrupt);
    future
}

/// Starts `stage` and blocks the calling thread until it completes.
///
/// The pipeline must be able to complete without the calling thread:
/// blocking a pool worker on a pipeline scheduled onto that same worker
/// never returns.
pub fn run<S, T, E>(stage: S) -> Result<T, Error<E>>
where
    T: Send + 'static,
    E: Send + 'static,
    S: Attach<Single<(), Nil>, Promise<T, E>, Out = Single<T, E>>,
    S::Kont: Continuation<(), Nil>,
{
    spawn(stage).get()
}
