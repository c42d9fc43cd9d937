//! Typed error sets.
//!
//! Every pipeline knows, at compile time, which errors it can fail with.
//! The set is a type-level list:
//!
//! - [`Nil`] is the empty set and is uninhabited, so a pipeline whose
//!   error set is `Nil` cannot fail.
//! - [`Cons<H, T>`] is either an `H` or one of the errors in `T`.
//!
//! Stages grow the set with [`Union`] and shrink it with [`Take`]. The
//! index parameters (`Here`, `There<I>`) are always inferred; user code
//! never names them.
//!
//! ```rust,ignore
//! type Set = continua::Errors![Timeout, Refused];
//!
//! let error = Set::inject(Refused);
//! match error {
//!     Cons::Head(timeout) => {}
//!     Cons::Tail(Cons::Head(refused)) => {}
//!     Cons::Tail(Cons::Tail(nil)) => match nil {},
//! }
//! ```

use std::fmt;
use std::marker::PhantomData;

use thiserror::Error;

/// The empty error set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nil {}

/// An error set holding either a `H` or one of the errors of `T`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cons<H, T> {
    Head(H),
    Tail(T),
}

/// Index marker: the error is the head of the list.
pub enum Here {}

/// Index marker: the error is somewhere in the tail of the list.
pub struct There<I>(PhantomData<I>);

/// Builds the error-set type for a list of error types.
///
/// `Errors![A, B]` is `Cons<A, Cons<B, Nil>>` and `Errors![]` is `Nil`.
#[macro_export]
macro_rules! Errors {
    () => { $crate::error::Nil };
    ($head:ty $(, $tail:ty)* $(,)?) => {
        $crate::error::Cons<$head, $crate::Errors![$($tail),*]>
    };
}

/// Embeds a single error of type `X` into an error set.
pub trait Inject<X, I> {
    fn inject(error: X) -> Self;
}

impl<X, T> Inject<X, Here> for Cons<X, T> {
    fn inject(error: X) -> Self {
        Cons::Head(error)
    }
}

impl<X, H, T, I> Inject<X, There<I>> for Cons<H, T>
where
    T: Inject<X, I>,
{
    fn inject(error: X) -> Self {
        Cons::Tail(T::inject(error))
    }
}

/// Removes the error type `X` from an error set.
///
/// `take` yields the `X` if that is what the set holds, otherwise the
/// same error re-expressed in the smaller set [`Take::Remainder`].
pub trait Take<X, I>: Sized {
    type Remainder;

    fn take(self) -> Result<X, Self::Remainder>;
}

impl<X, T> Take<X, Here> for Cons<X, T> {
    type Remainder = T;

    fn take(self) -> Result<X, T> {
        match self {
            Cons::Head(error) => Ok(error),
            Cons::Tail(rest) => Err(rest),
        }
    }
}

impl<X, H, T, I> Take<X, There<I>> for Cons<H, T>
where
    T: Take<X, I>,
{
    type Remainder = Cons<H, T::Remainder>;

    fn take(self) -> Result<X, Self::Remainder> {
        match self {
            Cons::Head(head) => Err(Cons::Head(head)),
            Cons::Tail(rest) => rest.take().map_err(Cons::Tail),
        }
    }
}

/// Concatenates two error sets.
///
/// Errors of the left set are lifted with [`Union::left`], errors of the
/// right set with [`Union::right`]. Duplicated types are kept; a handler
/// for such a type catches the first occurrence.
pub trait Union<R> {
    type Output;

    fn left(self) -> Self::Output;

    fn right(other: R) -> Self::Output;
}

impl<R> Union<R> for Nil {
    type Output = R;

    fn left(self) -> R {
        match self {}
    }

    fn right(other: R) -> R {
        other
    }
}

impl<H, T, R> Union<R> for Cons<H, T>
where
    T: Union<R>,
{
    type Output = Cons<H, T::Output>;

    fn left(self) -> Self::Output {
        match self {
            Cons::Head(head) => Cons::Head(head),
            Cons::Tail(rest) => Cons::Tail(rest.left()),
        }
    }

    fn right(other: R) -> Self::Output {
        Cons::Tail(T::right(other))
    }
}

impl<H> Cons<H, Nil> {
    /// Unwraps a single-member error set.
    pub fn into_inner(self) -> H {
        match self {
            Cons::Head(error) => error,
            Cons::Tail(nil) => match nil {},
        }
    }
}

impl<H, T> Cons<H, T> {
    /// Returns the head error, if that is what this set holds.
    pub fn head(&self) -> Option<&H> {
        match self {
            Cons::Head(error) => Some(error),
            Cons::Tail(_) => None,
        }
    }
}

impl fmt::Display for Nil {
    fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {}
    }
}

impl std::error::Error for Nil {}

impl<H: fmt::Display, T: fmt::Display> fmt::Display for Cons<H, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cons::Head(error) => fmt::Display::fmt(error, f),
            Cons::Tail(rest) => fmt::Display::fmt(rest, f),
        }
    }
}

impl<H, T> std::error::Error for Cons<H, T>
where
    H: std::error::Error + 'static,
    T: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Cons::Head(error) => error.source(),
            Cons::Tail(rest) => rest.source(),
        }
    }
}

/// The outcome of a pipeline that did not succeed.
///
/// A pipeline either raised one of the errors in `E` or was stopped.
/// Stopping is never reported as a failure and vice versa.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error<E> {
    #[error("eventual computation stopped (cancelled)")]
    Stopped,

    #[error("eventual computation failed: {0}")]
    Failed(E),
}

impl<E> Error<E> {
    /// Returns `true` if the computation was stopped.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Error::Stopped)
    }

    /// Returns the raised error set, if the computation failed.
    pub fn failed(self) -> Option<E> {
        match self {
            Error::Failed(error) => Some(error),
            Error::Stopped => None,
        }
    }

    /// Maps the raised error set, keeping `Stopped` as is.
    pub fn map<F, U>(self, f: F) -> Error<U>
    where
        F: FnOnce(E) -> U,
    {
        match self {
            Error::Failed(error) => Error::Failed(f(error)),
            Error::Stopped => Error::Stopped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct A;

    #[derive(Debug, PartialEq)]
    struct B;

    #[derive(Debug, PartialEq)]
    struct C;

    type Set = Errors![A, B, C];

    #[test]
    fn test_inject_and_take() {
        let error = <Set as Inject<B, _>>::inject(B);
        assert!(error.head().is_none());
        assert_eq!(Take::<B, _>::take(error).ok(), Some(B));
    }

    #[test]
    fn test_take_keeps_other_errors() {
        let error = <Set as Inject<C, _>>::inject(C);
        let rest = Take::<A, _>::take(error).err().unwrap();
        assert_eq!(rest, Cons::Tail(Cons::Head(C)));
    }

    #[test]
    fn test_union_preserves_sides() {
        type Left = Errors![A];
        type Right = Errors![B, C];

        let left = <Left as Union<Right>>::left(Cons::Head(A));
        assert_eq!(left, Cons::Head(A));

        let right = <Left as Union<Right>>::right(Cons::Tail(Cons::Head(C)));
        assert_eq!(right, Cons::Tail(Cons::Tail(Cons::Head(C))));
    }

    #[test]
    fn test_error_display() {
        let stopped: Error<Nil> = Error::Stopped;
        assert_eq!(
            stopped.to_string(),
            "eventual computation stopped (cancelled)"
        );
        assert!(stopped.is_stopped());
    }
}
