//! Fan-out and fan-in over streams.
//!
//! [`concurrent`] runs a sub-pipeline for every value of a stream, each
//! in its own *fiber* (a context of its own), and merges what the fibers
//! produce into one stream in completion order. [`concurrent_ordered`]
//! does the same but emits in upstream order, and [`parallel`] places the
//! fibers on the [`StaticThreadPool`](crate::StaticThreadPool).
//!
//! The sub-pipeline comes from a factory called once per value; it is a
//! stream stage that receives a single-value stream.
//!
//! ```rust,ignore
//! let squares = iterate(0..10)
//!     >> concurrent(|| map(|x: u64| x * x))
//!     >> collect::<Vec<_>>();
//! ```
//!
//! The first failure or stop, of the upstream or of any fiber, is
//! recorded and every running fiber is interrupted. It is delivered once
//! the upstream ended and every fiber finished. An upstream that is stuck
//! inside a `next` it was asked for cannot be forced to return; interrupt
//! it directly in that case.

mod core;
mod fiber;
mod ordered;

pub use self::core::{ConcurrentK, FiberSink};
pub use ordered::{EnumerateK, ReorderK, TagK};

use self::core::{Core, Launch, Starter};
use crate::compose::{Attach, Continuation, Listener, Many, Single, Stage, composable};
use crate::error::{Nil, Union};
use crate::interrupt::Interrupt;
use crate::stages::iterate::{Iterate, iterate};

use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placement {
    /// Fibers run on the default scheduler.
    Inline,
    /// Fibers run on the global static thread pool.
    Pool,
}

/// Runs a sub-pipeline per value in its own fiber, merging the outputs
/// in completion order.
pub struct Concurrent<F> {
    factory: F,
    placement: Placement,
}

/// Fans a stream out into one fiber per value.
///
/// Fibers are forked contexts of the default scheduler, so a sub-pipeline
/// that completes synchronously runs inline. Their error sets are added
/// to the upstream's.
///
/// # Arguments
///
/// * `factory` - Called once per value to build that value's
///   sub-pipeline, a stream stage receiving a single-value stream
///
/// # Returns
///
/// A stream stage emitting every output of every fiber in completion
/// order.
pub fn concurrent<F>(factory: F) -> Concurrent<F> {
    Concurrent {
        factory,
        placement: Placement::Inline,
    }
}

/// Like [`concurrent`], with every fiber placed on the global
/// [`StaticThreadPool`](crate::StaticThreadPool).
///
/// # Arguments
///
/// * `factory` - Called once per value to build that value's
///   sub-pipeline
pub fn parallel<F>(factory: F) -> Concurrent<F> {
    Concurrent {
        factory,
        placement: Placement::Pool,
    }
}

/// Like [`concurrent`], but emits in upstream order.
pub struct ConcurrentOrdered<F> {
    factory: F,
}

/// Fans a stream out like [`concurrent`], emitting the outputs in
/// upstream order.
///
/// Every output of the fiber for the n-th value is emitted before any
/// output of the fiber for the (n+1)-th; outputs that arrive early are
/// buffered.
///
/// # Arguments
///
/// * `factory` - Called once per value to build that value's
///   sub-pipeline
pub fn concurrent_ordered<F>(factory: F) -> ConcurrentOrdered<F> {
    ConcurrentOrdered { factory }
}

composable!(Concurrent<F>, ConcurrentOrdered<F>);

fn start_fiber<T, L>(value: T, fiber: L) -> Starter
where
    T: Send + 'static,
    L: Listener<T, Nil>,
{
    let kont = <Iterate<Option<T>> as Attach<Single<(), Nil>, L>>::attach(iterate(Some(value)), fiber);

    Box::new(move |interrupt: &Interrupt| {
        let mut kont = kont;
        Continuation::<(), Nil>::register(&mut kont, interrupt);
        Continuation::<(), Nil>::start(kont, ());
    })
}

impl<T, E, F, S, U, X> Stage<Many<T, E>> for Concurrent<F>
where
    F: FnMut() -> S,
    S: Stage<Many<T, Nil>, Out = Many<U, X>>,
    E: Union<X>,
{
    type Out = Many<U, <E as Union<X>>::Output>;
}

impl<T, E, F, S, U, X, K> Attach<Many<T, E>, K> for Concurrent<F>
where
    T: Send + 'static,
    U: Send + 'static,
    X: 'static,
    E: Union<X> + 'static,
    <E as Union<X>>::Output: Send + 'static,
    F: FnMut() -> S + Send + 'static,
    S: Attach<Many<T, Nil>, FiberSink<T, U, <E as Union<X>>::Output, X>, Out = Many<U, X>>,
    S::Kont: Listener<T, Nil>,
    K: Listener<U, <E as Union<X>>::Output>,
{
    type Kont = ConcurrentK<T, U, E, <E as Union<X>>::Output, K>;

    fn attach(self, k: K) -> Self::Kont {
        let mut factory = self.factory;

        let launch: Launch<T, U, <E as Union<X>>::Output> = Box::new(
            move |value: T, core: Arc<Core<T, U, <E as Union<X>>::Output>>, index: usize| {
                let sink = FiberSink::new(core, index, <E as Union<X>>::right);
                start_fiber(value, factory().attach(sink))
            },
        );

        ConcurrentK::new(
            Core::new(self.placement, launch),
            k,
            <E as Union<X>>::left,
        )
    }
}

impl<T, E, F, S, U, X> Stage<Many<T, E>> for ConcurrentOrdered<F>
where
    F: FnMut() -> S,
    S: Stage<Many<T, Nil>, Out = Many<U, X>>,
    E: Union<X>,
{
    type Out = Many<U, <E as Union<X>>::Output>;
}

type Tagged<T, U, Err, X> = TagK<FiberSink<(usize, T), (usize, Option<U>), Err, X>>;

impl<T, E, F, S, U, X, K> Attach<Many<T, E>, K> for ConcurrentOrdered<F>
where
    T: Send + 'static,
    U: Send + 'static,
    X: 'static,
    E: Union<X> + 'static,
    <E as Union<X>>::Output: Send + 'static,
    F: FnMut() -> S + Send + 'static,
    S: Attach<Many<T, Nil>, Tagged<T, U, <E as Union<X>>::Output, X>, Out = Many<U, X>>,
    S::Kont: Listener<T, Nil>,
    K: Listener<U, <E as Union<X>>::Output>,
{
    type Kont = EnumerateK<
        ConcurrentK<
            (usize, T),
            (usize, Option<U>),
            E,
            <E as Union<X>>::Output,
            ReorderK<U, <E as Union<X>>::Output, K>,
        >,
    >;

    fn attach(self, k: K) -> Self::Kont {
        let mut factory = self.factory;

        let launch: Launch<(usize, T), (usize, Option<U>), <E as Union<X>>::Output> = Box::new(
            move |(slot, value): (usize, T),
                  core: Arc<Core<(usize, T), (usize, Option<U>), <E as Union<X>>::Output>>,
                  index: usize| {
                let sink = FiberSink::new(core, index, <E as Union<X>>::right);
                start_fiber(value, factory().attach(TagK::new(slot, sink)))
            },
        );

        EnumerateK::new(ConcurrentK::new(
            Core::new(Placement::Inline, launch),
            ReorderK::new(k),
            <E as Union<X>>::left,
        ))
    }
}
