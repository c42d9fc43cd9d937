//! Loops: stages that drain a stream into a single value.

use crate::compose::{Attach, Continuation, Listener, Many, Single, Stage, composable};
use crate::interrupt::Interrupt;
use crate::stream::Stream;

use std::marker::PhantomData;

/// Folds every value of a stream into an accumulator.
pub struct Reduce<A, F> {
    init: A,
    f: F,
}

/// Folds a stream with `f`, starting from `init`.
pub fn reduce<A, F>(init: A, f: F) -> Reduce<A, F> {
    Reduce { init, f }
}

/// Collects a stream into `C`.
pub fn collect<C>() -> Reduce<C, Extender>
where
    C: Default,
{
    Reduce {
        init: C::default(),
        f: Extender,
    }
}

/// Runs `f` for every value of a stream.
pub fn for_each<F>(f: F) -> Reduce<(), Each<F>> {
    Reduce {
        init: (),
        f: Each(f),
    }
}

composable!(Reduce<A, F>);

/// How a [`Reduce`] folds one value.
pub trait Fold<A, T>: Send + 'static {
    fn fold(&mut self, acc: A, value: T) -> A;
}

impl<A, T, F> Fold<A, T> for F
where
    F: FnMut(A, T) -> A + Send + 'static,
{
    fn fold(&mut self, acc: A, value: T) -> A {
        self(acc, value)
    }
}

/// Folds by extending a collection.
pub struct Extender;

impl<C, T> Fold<C, T> for Extender
where
    C: Extend<T>,
{
    fn fold(&mut self, mut acc: C, value: T) -> C {
        acc.extend(Some(value));
        acc
    }
}

/// Folds by running a callback and discarding the value.
pub struct Each<F>(F);

impl<T, F> Fold<(), T> for Each<F>
where
    F: FnMut(T) + Send + 'static,
{
    fn fold(&mut self, _: (), value: T) {
        (self.0)(value)
    }
}

impl<T, E, A, F> Stage<Many<T, E>> for Reduce<A, F>
where
    F: Fold<A, T>,
{
    type Out = Single<A, E>;
}

impl<T, E, A, F, K> Attach<Many<T, E>, K> for Reduce<A, F>
where
    T: 'static,
    A: Send + 'static,
    F: Fold<A, T>,
    K: Continuation<A, E>,
{
    type Kont = ReduceK<A, F, K, T>;

    fn attach(self, k: K) -> Self::Kont {
        ReduceK {
            acc: Some(self.init),
            f: self.f,
            k,
            stream: None,
            _item: PhantomData,
        }
    }
}

pub struct ReduceK<A, F, K, T> {
    acc: Option<A>,
    f: F,
    k: K,
    stream: Option<Stream>,
    _item: PhantomData<fn(T)>,
}

impl<T, E, A, F, K> Listener<T, E> for ReduceK<A, F, K, T>
where
    T: 'static,
    A: Send + 'static,
    F: Fold<A, T>,
    K: Continuation<A, E>,
{
    fn begin(&mut self, stream: Stream) {
        stream.next();
        self.stream = Some(stream);
    }

    fn body(&mut self, value: T) {
        if let Some(acc) = self.acc.take() {
            self.acc = Some(self.f.fold(acc, value));
        }

        if let Some(stream) = &self.stream {
            stream.next();
        }
    }

    fn ended(self) {
        if let Some(acc) = self.acc {
            self.k.start(acc);
        }
    }

    fn fail(self, error: E) {
        self.k.fail(error);
    }

    fn stop(self) {
        self.k.stop();
    }

    fn register(&mut self, interrupt: &Interrupt) {
        self.k.register(interrupt);
    }
}
