use crate::compose::{Attach, Continuation, Listener, Many, Single, Stage, composable};
use crate::interrupt::Interrupt;
use crate::stream::Stream;

/// Transforms values with `f`.
///
/// On a single value `f` runs once; on a stream it runs for every body.
pub struct Map<F> {
    f: F,
}

pub fn map<F>(f: F) -> Map<F> {
    Map { f }
}

composable!(Map<F>);

impl<T, E, U, F> Stage<Single<T, E>> for Map<F>
where
    F: FnOnce(T) -> U,
{
    type Out = Single<U, E>;
}

impl<T, E, U, F> Stage<Many<T, E>> for Map<F>
where
    F: FnMut(T) -> U,
{
    type Out = Many<U, E>;
}

impl<T, E, U, F, K> Attach<Single<T, E>, K> for Map<F>
where
    F: FnOnce(T) -> U + Send + 'static,
    K: Continuation<U, E>,
{
    type Kont = MapK<F, K>;

    fn attach(self, k: K) -> Self::Kont {
        MapK { f: self.f, k }
    }
}

impl<T, E, U, F, K> Attach<Many<T, E>, K> for Map<F>
where
    F: FnMut(T) -> U + Send + 'static,
    K: Listener<U, E>,
{
    type Kont = MapK<F, K>;

    fn attach(self, k: K) -> Self::Kont {
        MapK { f: self.f, k }
    }
}

pub struct MapK<F, K> {
    f: F,
    k: K,
}

impl<T, E, U, F, K> Continuation<T, E> for MapK<F, K>
where
    F: FnOnce(T) -> U + Send + 'static,
    K: Continuation<U, E>,
{
    fn start(self, value: T) {
        self.k.start((self.f)(value));
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

impl<T, E, U, F, K> Listener<T, E> for MapK<F, K>
where
    F: FnMut(T) -> U + Send + 'static,
    K: Listener<U, E>,
{
    fn begin(&mut self, stream: Stream) {
        self.k.begin(stream);
    }

    fn body(&mut self, value: T) {
        let value = (self.f)(value);
        self.k.body(value);
    }

    fn ended(self) {
        self.k.ended();
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
