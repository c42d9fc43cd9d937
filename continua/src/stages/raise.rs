use crate::compose::{Attach, Continuation, Listener, Many, Single, Stage, composable};
use crate::error::Cons;
use crate::interrupt::Interrupt;
use crate::stream::Stream;

/// Fails with `error` whatever the input is.
///
/// The value type is kept so the stage can sit anywhere in a pipeline;
/// `X` is added in front of the upstream error set.
pub struct Raise<X> {
    error: X,
}

pub fn raise<X>(error: X) -> Raise<X> {
    Raise { error }
}

composable!(Raise<X>);

impl<T, E, X> Stage<Single<T, E>> for Raise<X> {
    type Out = Single<T, Cons<X, E>>;
}

impl<T, E, X, K> Attach<Single<T, E>, K> for Raise<X>
where
    X: Send + 'static,
    K: Continuation<T, Cons<X, E>>,
{
    type Kont = RaiseK<X, K>;

    fn attach(self, k: K) -> Self::Kont {
        RaiseK {
            error: self.error,
            k,
        }
    }
}

pub struct RaiseK<X, K> {
    error: X,
    k: K,
}

impl<T, E, X, K> Continuation<T, E> for RaiseK<X, K>
where
    X: Send + 'static,
    K: Continuation<T, Cons<X, E>>,
{
    fn start(self, _: T) {
        self.k.fail(Cons::Head(self.error));
    }

    fn fail(self, error: E) {
        self.k.fail(Cons::Tail(error));
    }

    fn stop(self) {
        self.k.stop();
    }

    fn register(&mut self, interrupt: &Interrupt) {
        self.k.register(interrupt);
    }
}

/// Transforms values with a fallible `f`; an `Err(x)` fails the pipeline
/// with `x`.
///
/// On a stream the first failure asks the upstream to end and is
/// delivered once it did.
pub struct TryMap<F> {
    f: F,
}

pub fn try_map<F>(f: F) -> TryMap<F> {
    TryMap { f }
}

composable!(TryMap<F>);

impl<T, E, U, X, F> Stage<Single<T, E>> for TryMap<F>
where
    F: FnOnce(T) -> Result<U, X>,
{
    type Out = Single<U, Cons<X, E>>;
}

impl<T, E, U, X, F> Stage<Many<T, E>> for TryMap<F>
where
    F: FnMut(T) -> Result<U, X>,
{
    type Out = Many<U, Cons<X, E>>;
}

impl<T, E, U, X, F, K> Attach<Single<T, E>, K> for TryMap<F>
where
    X: Send + 'static,
    F: FnOnce(T) -> Result<U, X> + Send + 'static,
    K: Continuation<U, Cons<X, E>>,
{
    type Kont = TryMapK<F, K, X>;

    fn attach(self, k: K) -> Self::Kont {
        TryMapK::new(self.f, k)
    }
}

impl<T, E, U, X, F, K> Attach<Many<T, E>, K> for TryMap<F>
where
    X: Send + 'static,
    F: FnMut(T) -> Result<U, X> + Send + 'static,
    K: Listener<U, Cons<X, E>>,
{
    type Kont = TryMapK<F, K, X>;

    fn attach(self, k: K) -> Self::Kont {
        TryMapK::new(self.f, k)
    }
}

pub struct TryMapK<F, K, X> {
    f: F,
    k: K,
    stream: Option<Stream>,
    failure: Option<X>,
}

impl<F, K, X> TryMapK<F, K, X> {
    fn new(f: F, k: K) -> Self {
        Self {
            f,
            k,
            stream: None,
            failure: None,
        }
    }
}

impl<T, E, U, X, F, K> Continuation<T, E> for TryMapK<F, K, X>
where
    X: Send + 'static,
    F: FnOnce(T) -> Result<U, X> + Send + 'static,
    K: Continuation<U, Cons<X, E>>,
{
    fn start(self, value: T) {
        match (self.f)(value) {
            Ok(value) => self.k.start(value),
            Err(error) => self.k.fail(Cons::Head(error)),
        }
    }

    fn fail(self, error: E) {
        self.k.fail(Cons::Tail(error));
    }

    fn stop(self) {
        self.k.stop();
    }

    fn register(&mut self, interrupt: &Interrupt) {
        self.k.register(interrupt);
    }
}

impl<T, E, U, X, F, K> Listener<T, E> for TryMapK<F, K, X>
where
    X: Send + 'static,
    F: FnMut(T) -> Result<U, X> + Send + 'static,
    K: Listener<U, Cons<X, E>>,
{
    fn begin(&mut self, stream: Stream) {
        self.stream = Some(stream.clone());
        self.k.begin(stream);
    }

    fn body(&mut self, value: T) {
        if self.failure.is_some() {
            return;
        }

        match (self.f)(value) {
            Ok(value) => self.k.body(value),
            Err(error) => {
                self.failure = Some(error);
                if let Some(stream) = &self.stream {
                    stream.done();
                }
            }
        }
    }

    fn ended(self) {
        match self.failure {
            Some(error) => self.k.fail(Cons::Head(error)),
            None => self.k.ended(),
        }
    }

    fn fail(self, error: E) {
        match self.failure {
            Some(error) => self.k.fail(Cons::Head(error)),
            None => self.k.fail(Cons::Tail(error)),
        }
    }

    fn stop(self) {
        match self.failure {
            Some(error) => self.k.fail(Cons::Head(error)),
            None => self.k.stop(),
        }
    }

    fn register(&mut self, interrupt: &Interrupt) {
        self.k.register(interrupt);
    }
}
