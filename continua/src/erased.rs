//! Boxed continuations, for the places where a pipeline's concrete type
//! has to be forgotten.

use crate::compose::{Continuation, Listener};
use crate::interrupt::Interrupt;
use crate::stream::Stream;

use std::fmt;

pub(crate) trait Resume<T, E>: Send {
    fn start(self: Box<Self>, value: T);

    fn fail(self: Box<Self>, error: E);

    fn stop(self: Box<Self>);
}

impl<T, E, K> Resume<T, E> for K
where
    K: Continuation<T, E>,
{
    fn start(self: Box<Self>, value: T) {
        Continuation::<T, E>::start(*self, value);
    }

    fn fail(self: Box<Self>, error: E) {
        Continuation::<T, E>::fail(*self, error);
    }

    fn stop(self: Box<Self>) {
        Continuation::<T, E>::stop(*self);
    }
}

pub(crate) trait ResumeStream<T, E>: Send {
    fn begin(&mut self, stream: Stream);

    fn body(&mut self, value: T);

    fn ended(self: Box<Self>);

    fn fail(self: Box<Self>, error: E);

    fn stop(self: Box<Self>);
}

impl<T, E, K> ResumeStream<T, E> for K
where
    K: Listener<T, E>,
{
    fn begin(&mut self, stream: Stream) {
        Listener::<T, E>::begin(self, stream);
    }

    fn body(&mut self, value: T) {
        Listener::<T, E>::body(self, value);
    }

    fn ended(self: Box<Self>) {
        Listener::<T, E>::ended(*self);
    }

    fn fail(self: Box<Self>, error: E) {
        Listener::<T, E>::fail(*self, error);
    }

    fn stop(self: Box<Self>) {
        Listener::<T, E>::stop(*self);
    }
}

/// A heap-allocated [`Continuation`] of unknown concrete type.
///
/// Registration is not forwarded; the boxed continuation is expected to
/// be registered before it is boxed.
pub struct Boxed<T, E> {
    inner: Box<dyn Resume<T, E>>,
}

impl<T, E> Boxed<T, E> {
    pub fn new<K>(k: K) -> Self
    where
        K: Continuation<T, E>,
    {
        Self { inner: Box::new(k) }
    }
}

impl<T, E> Continuation<T, E> for Boxed<T, E>
where
    T: 'static,
    E: 'static,
{
    fn start(self, value: T) {
        self.inner.start(value);
    }

    fn fail(self, error: E) {
        self.inner.fail(error);
    }

    fn stop(self) {
        self.inner.stop();
    }

    fn register(&mut self, _: &Interrupt) {}
}

impl<T, E> fmt::Debug for Boxed<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Boxed").finish_non_exhaustive()
    }
}

/// A heap-allocated [`Listener`] of unknown concrete type.
pub struct BoxedListener<T, E> {
    inner: Box<dyn ResumeStream<T, E>>,
}

impl<T, E> BoxedListener<T, E> {
    pub fn new<K>(k: K) -> Self
    where
        K: Listener<T, E>,
    {
        Self { inner: Box::new(k) }
    }
}

impl<T, E> Listener<T, E> for BoxedListener<T, E>
where
    T: 'static,
    E: 'static,
{
    fn begin(&mut self, stream: Stream) {
        self.inner.begin(stream);
    }

    fn body(&mut self, value: T) {
        self.inner.body(value);
    }

    fn ended(self) {
        self.inner.ended();
    }

    fn fail(self, error: E) {
        self.inner.fail(error);
    }

    fn stop(self) {
        self.inner.stop();
    }

    fn register(&mut self, _: &Interrupt) {}
}

impl<T, E> fmt::Debug for BoxedListener<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedListener").finish_non_exhaustive()
    }
}
