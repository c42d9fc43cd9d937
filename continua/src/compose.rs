//! The continuation protocol and the composition operator.
//!
//! A pipeline is built from *stages*. A stage is inert until it is
//! attached to the continuation that should receive its output;
//! attaching yields a new continuation that accepts the stage's input.
//! Two stages compose with `>>`: `a >> b` attaches `b` to the downstream
//! first and `a` to the result.
//!
//! What a stage accepts and produces is described by a [`Flow`]: either a
//! [`Single`] value or [`Many`] values, each with a value type and an
//! error set. A stage implements [`Stage`] only for the flows it
//! supports, so feeding a stream into a single-value stage (or the other
//! way around) does not compile.

use crate::interrupt::Interrupt;
use crate::stream::Stream;

use std::marker::PhantomData;
use std::ops::Shr;

/// Receives the single outcome of an activation.
///
/// Exactly one of [`start`](Self::start), [`fail`](Self::fail) and
/// [`stop`](Self::stop) is called, exactly once. Each of them consumes the
/// continuation. [`register`](Self::register), if called, is called once
/// and before any of them.
pub trait Continuation<T, E>: Send + 'static {
    /// The computation succeeded with `value`.
    fn start(self, value: T);

    /// The computation raised `error`.
    fn fail(self, error: E);

    /// The computation was stopped.
    fn stop(self);

    /// Hands the continuation the interrupt of the activation.
    fn register(&mut self, interrupt: &Interrupt);
}

/// Receives the values of a stream.
///
/// [`begin`](Self::begin) hands over the [`Stream`] used to request values.
/// Every [`Stream::next`] is answered by exactly one `body` or by the
/// stream ending. A listener must not request another value before the
/// previous `body` returned. After `ended`, `fail` or `stop` nothing else
/// is delivered.
pub trait Listener<T, E>: Send + 'static {
    /// The stream is ready; request values through `stream`.
    fn begin(&mut self, stream: Stream);

    /// One value of the stream.
    fn body(&mut self, value: T);

    /// No more values.
    fn ended(self);

    /// The stream raised `error`.
    fn fail(self, error: E);

    /// The stream was stopped.
    fn stop(self);

    /// Hands the listener the interrupt of the activation.
    fn register(&mut self, interrupt: &Interrupt);
}

/// The shape of what flows between two stages.
pub trait Flow {
    /// Type of the value(s).
    type Item;

    /// Error set that may be raised instead.
    type Errors;
}

/// A single value of type `T`, or one error of the set `E`.
pub struct Single<T, E>(PhantomData<fn() -> (T, E)>);

/// A stream of values of type `T`, possibly cut short by an error of `E`.
pub struct Many<T, E>(PhantomData<fn() -> (T, E)>);

impl<T, E> Flow for Single<T, E> {
    type Item = T;
    type Errors = E;
}

impl<T, E> Flow for Many<T, E> {
    type Item = T;
    type Errors = E;
}

/// A pipeline step accepting the flow `In`.
pub trait Stage<In: Flow> {
    /// What the step produces for that input.
    type Out: Flow;
}

/// Attaching a stage to a downstream continuation `K`.
///
/// `Kont` is a [`Continuation`] (for [`Single`] inputs) or a [`Listener`]
/// (for [`Many`] inputs) accepting `In`.
pub trait Attach<In: Flow, K>: Stage<In> {
    type Kont;

    fn attach(self, k: K) -> Self::Kont;
}

/// Two stages run one after the other; built by `>>`.
pub struct Seq<A, B> {
    first: A,
    second: B,
}

impl<A, B> Seq<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<In, A, B> Stage<In> for Seq<A, B>
where
    In: Flow,
    A: Stage<In>,
    B: Stage<A::Out>,
{
    type Out = B::Out;
}

impl<In, A, B, K> Attach<In, K> for Seq<A, B>
where
    In: Flow,
    A: Stage<In>,
    B: Attach<A::Out, K>,
    A: Attach<In, <B as Attach<<A as Stage<In>>::Out, K>>::Kont>,
{
    type Kont = <A as Attach<In, <B as Attach<<A as Stage<In>>::Out, K>>::Kont>>::Kont;

    fn attach(self, k: K) -> Self::Kont {
        self.first.attach(self.second.attach(k))
    }
}

/// Implements `>>` for stage types.
macro_rules! composable {
    ($($name:ident $(<$($param:ident),*>)?),* $(,)?) => {$(
        impl<$($($param,)*)? Rhs> ::std::ops::Shr<Rhs> for $name$(<$($param),*>)? {
            type Output = $crate::compose::Seq<Self, Rhs>;

            fn shr(self, rhs: Rhs) -> Self::Output {
                $crate::compose::Seq::new(self, rhs)
            }
        }
    )*};
}

pub(crate) use composable;

impl<A, B, Rhs> Shr<Rhs> for Seq<A, B> {
    type Output = Seq<Self, Rhs>;

    fn shr(self, rhs: Rhs) -> Self::Output {
        Seq::new(self, rhs)
    }
}

/// Attaches `stage` to `k`, yielding the continuation that starts the
/// pipeline.
pub fn build<S, K>(stage: S, k: K) -> S::Kont
where
    S: Attach<Single<(), crate::error::Nil>, K>,
{
    stage.attach(k)
}
