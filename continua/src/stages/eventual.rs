//! Stages completed from the outside.
//!
//! [`eventual`] hands its input and a [`Completer`] to a callback. The
//! callback may complete right away or keep the completer and complete
//! later, from any thread. This is how a pipeline waits on something
//! that is not itself a pipeline: a timer, a socket, another runtime.

use crate::compose::{Attach, Continuation, Single, Stage, composable};
use crate::erased::Resume;
use crate::error::{Inject, Nil, Union};
use crate::interrupt::{Handler, Interrupt};
use crate::stages::then::Widen;

use parking_lot::Mutex;
use tracing::trace;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Completes an [`eventual`] stage with a `U` or an error of `X`.
///
/// Clones share the same completion: the first call to
/// [`succeed`](Self::succeed), [`fail`](Self::fail) or
/// [`stop`](Self::stop) wins and later calls are ignored.
pub struct Completer<U, X = Nil> {
    shared: Arc<Shared<U, X>>,
}

struct Shared<U, X> {
    resume: Mutex<Option<Box<dyn Resume<U, X>>>>,
    interrupt: Option<Interrupt>,
    handler: Mutex<Option<Handler>>,
}

impl<U, X> Clone for Completer<U, X> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<U, X> Completer<U, X> {
    fn new(resume: Box<dyn Resume<U, X>>, interrupt: Option<Interrupt>) -> Self {
        Self {
            shared: Arc::new(Shared {
                resume: Mutex::new(Some(resume)),
                interrupt,
                handler: Mutex::new(None),
            }),
        }
    }

    fn take(&self) -> Option<Box<dyn Resume<U, X>>> {
        let resume = self.shared.resume.lock().take();

        if resume.is_some() {
            drop(self.shared.handler.lock().take());
        } else {
            trace!("eventual already completed");
        }

        resume
    }

    /// Completes with `value`.
    pub fn succeed(&self, value: U) {
        if let Some(resume) = self.take() {
            resume.start(value);
        }
    }

    /// Completes with `error`, one of the types of `X`.
    pub fn fail<Y, I>(&self, error: Y)
    where
        X: Inject<Y, I>,
    {
        if let Some(resume) = self.take() {
            resume.fail(X::inject(error));
        }
    }

    /// Completes by stopping.
    pub fn stop(&self) {
        if let Some(resume) = self.take() {
            resume.stop();
        }
    }

    /// Returns `true` once the stage completed.
    pub fn completed(&self) -> bool {
        self.shared.resume.lock().is_none()
    }

    /// The interrupt registered with the pipeline, if any.
    pub fn interrupt(&self) -> Option<&Interrupt> {
        self.shared.interrupt.as_ref()
    }

    /// Runs `callback` when the pipeline is interrupted, or right away if
    /// it already was. The handler is uninstalled on completion.
    ///
    /// Returns `false` if no interrupt was registered; `callback` is then
    /// dropped.
    pub fn on_interrupt<F>(&self, callback: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(interrupt) = &self.shared.interrupt else {
            return false;
        };

        let mut handler = Handler::new(interrupt);
        handler.install_or_execute(callback);

        if !self.completed() {
            *self.shared.handler.lock() = Some(handler);
        }

        true
    }
}

impl<U, X> fmt::Debug for Completer<U, X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completer")
            .field("completed", &self.completed())
            .finish()
    }
}

/// A stage completed through a [`Completer`].
pub struct Eventual<F, T, U, X> {
    f: F,
    _marker: PhantomData<fn(T) -> (U, X)>,
}

/// Builds a stage completed through the [`Completer`] handed to `f`.
///
/// ```rust,ignore
/// let stage = eventual(|(), done: Completer<i32>| {
///     thread::spawn(move || done.succeed(42));
/// });
/// ```
pub fn eventual<T, U, X, F>(f: F) -> Eventual<F, T, U, X>
where
    F: FnOnce(T, Completer<U, X>) + Send + 'static,
{
    Eventual {
        f,
        _marker: PhantomData,
    }
}

composable!(Eventual<F, T, U, X>);

impl<T, E, U, X, F> Stage<Single<T, E>> for Eventual<F, T, U, X>
where
    E: Union<X>,
{
    type Out = Single<U, <E as Union<X>>::Output>;
}

impl<T, E, U, X, F, K> Attach<Single<T, E>, K> for Eventual<F, T, U, X>
where
    T: 'static,
    U: 'static,
    X: 'static,
    E: Union<X> + 'static,
    F: FnOnce(T, Completer<U, X>) + Send + 'static,
    K: Continuation<U, <E as Union<X>>::Output>,
{
    type Kont = EventualK<F, K, T, U, X>;

    fn attach(self, k: K) -> Self::Kont {
        EventualK {
            f: self.f,
            k,
            interrupt: None,
            _marker: PhantomData,
        }
    }
}

pub struct EventualK<F, K, T, U, X> {
    f: F,
    k: K,
    interrupt: Option<Interrupt>,
    _marker: PhantomData<fn(T) -> (U, X)>,
}

impl<T, E, U, X, F, K> Continuation<T, E> for EventualK<F, K, T, U, X>
where
    T: 'static,
    U: 'static,
    X: 'static,
    E: Union<X> + 'static,
    F: FnOnce(T, Completer<U, X>) + Send + 'static,
    K: Continuation<U, <E as Union<X>>::Output>,
{
    fn start(self, value: T) {
        let widened: Widen<K, E> = Widen::new(self.k);
        let completer = Completer::new(Box::new(widened), self.interrupt);
        (self.f)(value, completer);
    }

    fn fail(self, error: E) {
        self.k.fail(error.left());
    }

    fn stop(self) {
        self.k.stop();
    }

    fn register(&mut self, interrupt: &Interrupt) {
        self.interrupt = Some(interrupt.clone());
        self.k.register(interrupt);
    }
}
