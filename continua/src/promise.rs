//! One-shot completion handles bridging pipelines and blocking or `async`
//! code.
//!
//! A [`Promise`] is the writing end and a [`Future`] the reading end. The
//! promise is itself a [`Continuation`], so it can terminate a pipeline
//! directly (see [`spawn`](crate::spawn) and [`run`](crate::run)).

use crate::compose::Continuation;
use crate::error::Error;
use crate::interrupt::Interrupt;

use parking_lot::{Condvar, Mutex};
use tracing::warn;

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{self, Poll, Waker};

struct Shared<T, E> {
    state: Mutex<State<T, E>>,
    ready: Condvar,
    interrupt: Interrupt,
}

struct State<T, E> {
    outcome: Option<Result<T, Error<E>>>,
    complete: bool,
    wakers: Vec<Waker>,
}

impl<T, E> Shared<T, E> {
    fn complete(&self, outcome: Result<T, Error<E>>) {
        let wakers = {
            let mut state = self.state.lock();
            state.outcome = Some(outcome);
            state.complete = true;
            std::mem::take(&mut state.wakers)
        };

        self.ready.notify_all();

        for waker in wakers {
            waker.wake();
        }
    }
}

/// The writing end of a one-shot result.
///
/// Dropping a promise that was never completed stops its future.
pub struct Promise<T, E> {
    shared: Option<Arc<Shared<T, E>>>,
}

impl<T, E> Promise<T, E> {
    /// Creates a connected promise and future.
    pub fn new() -> (Promise<T, E>, Future<T, E>) {
        Self::with_interrupt(Interrupt::new())
    }

    /// Like [`new`](Self::new), with [`Future::interrupt`] triggering
    /// `interrupt`.
    pub(crate) fn with_interrupt(interrupt: Interrupt) -> (Promise<T, E>, Future<T, E>) {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                outcome: None,
                complete: false,
                wakers: Vec::new(),
            }),
            ready: Condvar::new(),
            interrupt,
        });

        (
            Promise {
                shared: Some(shared.clone()),
            },
            Future { shared },
        )
    }

    fn complete(mut self, outcome: Result<T, Error<E>>) {
        if let Some(shared) = self.shared.take() {
            shared.complete(outcome);
        }
    }

    pub fn set_value(self, value: T) {
        self.complete(Ok(value));
    }

    pub fn fail(self, error: E) {
        self.complete(Err(Error::Failed(error)));
    }

    pub fn stop(self) {
        self.complete(Err(Error::Stopped));
    }
}

impl<T, E> Drop for Promise<T, E> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            warn!("promise dropped without a result");
            shared.complete(Err(Error::Stopped));
        }
    }
}

impl<T, E> Continuation<T, E> for Promise<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn start(self, value: T) {
        self.set_value(value);
    }

    fn fail(self, error: E) {
        Promise::fail(self, error);
    }

    fn stop(self) {
        Promise::stop(self);
    }

    fn register(&mut self, _: &Interrupt) {}
}

/// The reading end of a one-shot result.
///
/// Besides the blocking accessors, a `Future` implements
/// [`std::future::Future`] and can be awaited from any executor.
pub struct Future<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Future<T, E> {
    /// Blocks until the result is available.
    pub fn wait(&self) {
        let mut state = self.shared.state.lock();

        while !state.complete {
            self.shared.ready.wait(&mut state);
        }
    }

    /// Blocks until the result is available and returns it.
    ///
    /// # Panics
    ///
    /// Panics if the result was already taken by polling.
    pub fn get(self) -> Result<T, Error<E>> {
        let mut state = self.shared.state.lock();

        while !state.complete {
            self.shared.ready.wait(&mut state);
        }

        match state.outcome.take() {
            Some(outcome) => outcome,
            None => panic!("future result already taken"),
        }
    }

    /// Returns `true` once the result is available.
    pub fn is_ready(&self) -> bool {
        self.shared.state.lock().complete
    }

    /// Interrupts the computation producing the result.
    pub fn interrupt(&self) {
        self.shared.interrupt.trigger();
    }

    pub(crate) fn interrupter(&self) -> Interrupt {
        self.shared.interrupt.clone()
    }
}

impl<T, E> std::future::Future for Future<T, E> {
    type Output = Result<T, Error<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<Self::Output> {
        let mut state = self.shared.state.lock();

        if let Some(outcome) = state.outcome.take() {
            return Poll::Ready(outcome);
        }

        if !state.wakers.iter().any(|waker| waker.will_wake(cx.waker())) {
            state.wakers.push(cx.waker().clone());
        }

        Poll::Pending
    }
}

impl<T, E> fmt::Debug for Future<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("ready", &self.is_ready())
            .finish()
    }
}
