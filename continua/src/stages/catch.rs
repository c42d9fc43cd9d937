//! Recovery from typed failures.
//!
//! [`catch`] starts an empty handler chain. Each handler removes one error
//! type from the set it sees:
//!
//! - [`Catch::raised`] turns an `X` back into a value,
//! - [`Catch::reraise`] replaces an `X` with another error type,
//! - [`Catch::all`] handles whatever is left, emptying the set.
//!
//! Handlers are tried in the order they were added. Errors nobody handles
//! are forwarded, as are stops and successes.

use crate::compose::{Attach, Continuation, Single, Stage, composable};
use crate::error::{Cons, Nil, Take};
use crate::interrupt::Interrupt;

use std::marker::PhantomData;

/// A chain of error handlers for a pipeline producing `T`.
pub trait Handlers<T, E>: Send + 'static {
    /// Errors that are still raised once the chain ran.
    type Remainder;

    fn handle(self, error: E) -> Result<T, Self::Remainder>;
}

/// The empty chain.
pub struct Unhandled;

impl<T, E> Handlers<T, E> for Unhandled {
    type Remainder = E;

    fn handle(self, error: E) -> Result<T, E> {
        Err(error)
    }
}

/// Recovers from an `X` with `f`.
pub struct Raised<X, I, F, H> {
    f: F,
    previous: H,
    _marker: PhantomData<fn() -> (X, I)>,
}

impl<T, E, X, I, F, H> Handlers<T, E> for Raised<X, I, F, H>
where
    X: 'static,
    I: 'static,
    H: Handlers<T, E>,
    H::Remainder: Take<X, I>,
    F: FnOnce(X) -> T + Send + 'static,
{
    type Remainder = <H::Remainder as Take<X, I>>::Remainder;

    fn handle(self, error: E) -> Result<T, Self::Remainder> {
        match self.previous.handle(error) {
            Ok(value) => Ok(value),
            Err(rest) => rest.take().map(self.f),
        }
    }
}

/// Replaces an `X` with the error returned by `f`.
pub struct Reraise<X, I, F, H> {
    f: F,
    previous: H,
    _marker: PhantomData<fn() -> (X, I)>,
}

impl<T, E, X, I, Y, F, H> Handlers<T, E> for Reraise<X, I, F, H>
where
    X: 'static,
    I: 'static,
    H: Handlers<T, E>,
    H::Remainder: Take<X, I>,
    F: FnOnce(X) -> Y + Send + 'static,
{
    type Remainder = Cons<Y, <H::Remainder as Take<X, I>>::Remainder>;

    fn handle(self, error: E) -> Result<T, Self::Remainder> {
        match self.previous.handle(error) {
            Ok(value) => Ok(value),
            Err(rest) => match rest.take() {
                Ok(error) => Err(Cons::Head((self.f)(error))),
                Err(rest) => Err(Cons::Tail(rest)),
            },
        }
    }
}

/// Recovers from anything left with `f`.
pub struct All<F, H> {
    f: F,
    previous: H,
}

impl<T, E, F, H> Handlers<T, E> for All<F, H>
where
    H: Handlers<T, E>,
    F: FnOnce(H::Remainder) -> T + Send + 'static,
{
    type Remainder = Nil;

    fn handle(self, error: E) -> Result<T, Nil> {
        match self.previous.handle(error) {
            Ok(value) => Ok(value),
            Err(rest) => Ok((self.f)(rest)),
        }
    }
}

/// A stage recovering from failures with a chain of handlers.
pub struct Catch<H> {
    handlers: H,
}

pub fn catch() -> Catch<Unhandled> {
    Catch {
        handlers: Unhandled,
    }
}

composable!(Catch<H>);

impl<H> Catch<H> {
    /// Handles errors of type `X` by producing a value.
    pub fn raised<X, I, F, R>(self, f: F) -> Catch<Raised<X, I, F, H>>
    where
        F: FnOnce(X) -> R,
    {
        Catch {
            handlers: Raised {
                f,
                previous: self.handlers,
                _marker: PhantomData,
            },
        }
    }

    /// Handles errors of type `X` by raising the error `f` returns.
    pub fn reraise<X, I, F, Y>(self, f: F) -> Catch<Reraise<X, I, F, H>>
    where
        F: FnOnce(X) -> Y,
    {
        Catch {
            handlers: Reraise {
                f,
                previous: self.handlers,
                _marker: PhantomData,
            },
        }
    }

    /// Handles every error not handled so far.
    pub fn all<F>(self, f: F) -> Catch<All<F, H>> {
        Catch {
            handlers: All {
                f,
                previous: self.handlers,
            },
        }
    }
}

impl<T, E, H> Stage<Single<T, E>> for Catch<H>
where
    H: Handlers<T, E>,
{
    type Out = Single<T, H::Remainder>;
}

impl<T, E, H, K> Attach<Single<T, E>, K> for Catch<H>
where
    H: Handlers<T, E>,
    K: Continuation<T, H::Remainder>,
{
    type Kont = CatchK<H, K>;

    fn attach(self, k: K) -> Self::Kont {
        CatchK {
            handlers: self.handlers,
            k,
        }
    }
}

pub struct CatchK<H, K> {
    handlers: H,
    k: K,
}

impl<T, E, H, K> Continuation<T, E> for CatchK<H, K>
where
    H: Handlers<T, E>,
    K: Continuation<T, H::Remainder>,
{
    fn start(self, value: T) {
        self.k.start(value);
    }

    fn fail(self, error: E) {
        match self.handlers.handle(error) {
            Ok(value) => self.k.start(value),
            Err(rest) => self.k.fail(rest),
        }
    }

    fn stop(self) {
        self.k.stop();
    }

    fn register(&mut self, interrupt: &Interrupt) {
        self.k.register(interrupt);
    }
}
