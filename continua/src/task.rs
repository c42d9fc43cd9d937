//! Heap-resident pipelines.
//!
//! A [`Task`] forgets the concrete type of the pipeline it runs, so it can
//! be stored, returned from functions and started later. It owns an
//! [`Interrupt`] of its own and can be started in a context of its own
//! (see [`Task::start`]), spawned into a [`Future`], or composed into a
//! larger pipeline like any other stage.

use crate::compose::{Attach, Continuation, Single, Stage, composable};
use crate::erased::Boxed;
use crate::error::{Error, Inject, Nil, Union};
use crate::interrupt::Interrupt;
use crate::promise::{Future, Promise};
use crate::scheduler::Context;
use crate::stages::terminal::{self, terminal};
use crate::stages::then::Widen;

use tracing::debug;

use std::fmt;
use std::marker::PhantomData;

type Launch<T, E> = Box<dyn FnOnce(Boxed<T, E>, &Interrupt) + Send>;

/// A type-erased pipeline producing `T` or an error of the set `E`.
pub struct Task<T, E = Nil> {
    launch: Option<Launch<T, E>>,
    interrupt: Interrupt,
}

impl<T, E> Task<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Creates a task running the pipeline built by `factory`.
    ///
    /// The factory is called when the task starts.
    pub fn new<F, S>(factory: F) -> Self
    where
        F: FnOnce() -> S + Send + 'static,
        S: Attach<Single<(), Nil>, Boxed<T, E>, Out = Single<T, E>>,
        S::Kont: Continuation<(), Nil>,
    {
        Self::with_launch(Box::new(move |k: Boxed<T, E>, interrupt: &Interrupt| {
            terminal::start(factory(), k, interrupt);
        }))
    }

    /// A task that succeeds with `value`.
    pub fn success(value: T) -> Self {
        Self::with_launch(Box::new(move |k: Boxed<T, E>, _: &Interrupt| {
            k.start(value)
        }))
    }

    /// A task that fails with `error`.
    pub fn failure<X, I>(error: X) -> Self
    where
        X: Send + 'static,
        E: Inject<X, I>,
    {
        Self::with_launch(Box::new(move |k: Boxed<T, E>, _: &Interrupt| {
            k.fail(E::inject(error))
        }))
    }

    fn with_launch(launch: Launch<T, E>) -> Self {
        Self {
            launch: Some(launch),
            interrupt: Interrupt::new(),
        }
    }

    /// Starts the task in a new context named `name`.
    ///
    /// # Panics
    ///
    /// Panics if the task was already started.
    pub fn start<A, B, C>(&mut self, name: impl Into<String>, on_start: A, on_fail: B, on_stop: C)
    where
        A: FnOnce(T) + Send + 'static,
        B: FnOnce(E) + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        let k = terminal()
            .on_start(on_start)
            .on_fail(on_fail)
            .on_stop(on_stop);

        self.launch_in(name.into(), Boxed::new(k));
    }

    /// Starts the task in a new context named `name` and returns a
    /// [`Future`] for its outcome. Interrupting the future interrupts the
    /// task.
    ///
    /// # Panics
    ///
    /// Panics if the task was already started.
    pub fn spawn(mut self, name: impl Into<String>) -> Future<T, E> {
        let (promise, future) = Promise::with_interrupt(self.interrupt.clone());
        self.launch_in(name.into(), Boxed::new(promise));
        future
    }

    /// Runs the task and blocks the calling thread until it completes.
    pub fn get(self) -> Result<T, Error<E>> {
        self.spawn("[task]").get()
    }

    fn launch_in(&mut self, name: String, k: Boxed<T, E>) {
        let Some(launch) = self.launch.take() else {
            panic!("task already started");
        };

        let context = Context::get().fork(name);
        let interrupt = self.interrupt.clone();

        debug!(context = %context.name(), "starting task");

        context.continue_with(move || launch(k, &interrupt));
    }

    /// Returns `true` once the task was started or composed.
    pub fn started(&self) -> bool {
        self.launch.is_none()
    }
}

impl<T, E> Task<T, E> {
    /// Interrupts the task.
    pub fn interrupt(&self) {
        self.interrupt.trigger();
    }
}

impl<T, E> fmt::Debug for Task<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("started", &self.launch.is_none())
            .field("interrupt", &self.interrupt)
            .finish()
    }
}

composable!(Task<T, E>);

impl<T, E, L> Stage<Single<(), L>> for Task<T, E>
where
    L: Union<E>,
{
    type Out = Single<T, <L as Union<E>>::Output>;
}

impl<T, E, L, K> Attach<Single<(), L>, K> for Task<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
    L: Union<E> + 'static,
    K: Continuation<T, <L as Union<E>>::Output>,
{
    type Kont = TaskK<T, E, L, K>;

    fn attach(mut self, k: K) -> Self::Kont {
        TaskK {
            launch: self.launch.take(),
            interrupt: self.interrupt.clone(),
            k,
            _errors: PhantomData,
        }
    }
}

/// Runs a [`Task`] inline, with the interrupt of the enclosing pipeline.
pub struct TaskK<T, E, L, K> {
    launch: Option<Launch<T, E>>,
    interrupt: Interrupt,
    k: K,
    _errors: PhantomData<fn() -> L>,
}

impl<T, E, L, K> Continuation<(), L> for TaskK<T, E, L, K>
where
    T: Send + 'static,
    E: Send + 'static,
    L: Union<E> + 'static,
    K: Continuation<T, <L as Union<E>>::Output>,
{
    fn start(self, _: ()) {
        let Some(launch) = self.launch else {
            panic!("task already started");
        };

        let widened: Widen<K, L> = Widen::new(self.k);
        launch(Boxed::new(widened), &self.interrupt);
    }

    fn fail(self, error: L) {
        self.k.fail(error.left());
    }

    fn stop(self) {
        self.k.stop();
    }

    fn register(&mut self, interrupt: &Interrupt) {
        self.interrupt = interrupt.clone();
        self.k.register(interrupt);
    }
}
