//! Order preservation for [`concurrent_ordered`](super::concurrent_ordered).
//!
//! Upstream values are numbered from 1 before they fan out. Every fiber
//! tags what it produces with the number of its value and closes its slot
//! with a terminator when its sub-stream ends. The resequencer releases
//! values slot by slot, moving to the next slot only after the current
//! one was closed.

use crate::compose::Listener;
use crate::interrupt::Interrupt;
use crate::stream::{Machine, Request, Serial, Stream};

use std::collections::{BTreeMap, VecDeque};
use std::marker::PhantomData;
use std::sync::Arc;

/// Numbers the values of a stream, starting at 1.
pub struct EnumerateK<K> {
    next: usize,
    k: K,
}

impl<K> EnumerateK<K> {
    pub(crate) fn new(k: K) -> Self {
        Self { next: 1, k }
    }
}

impl<T, E, K> Listener<T, E> for EnumerateK<K>
where
    K: Listener<(usize, T), E>,
{
    fn begin(&mut self, stream: Stream) {
        self.k.begin(stream);
    }

    fn body(&mut self, value: T) {
        let index = self.next;
        self.next += 1;
        self.k.body((index, value));
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

/// Tags the output of one fiber with the number of its input value.
pub struct TagK<K> {
    index: usize,
    k: K,
}

impl<K> TagK<K> {
    pub(crate) fn new(index: usize, k: K) -> Self {
        Self { index, k }
    }
}

impl<U, X, K> Listener<U, X> for TagK<K>
where
    K: Listener<(usize, Option<U>), X>,
{
    fn begin(&mut self, stream: Stream) {
        self.k.begin(stream);
    }

    fn body(&mut self, value: U) {
        self.k.body((self.index, Some(value)));
    }

    fn ended(mut self) {
        self.k.body((self.index, None));
        self.k.ended();
    }

    fn fail(self, error: X) {
        self.k.fail(error);
    }

    fn stop(self) {
        self.k.stop();
    }

    fn register(&mut self, interrupt: &Interrupt) {
        self.k.register(interrupt);
    }
}

/// Buffers tagged values and releases them in slot order.
pub(crate) struct Resequencer<U> {
    slots: BTreeMap<usize, VecDeque<Option<U>>>,
    current: usize,
}

impl<U> Resequencer<U> {
    pub(crate) fn new() -> Self {
        Self {
            slots: BTreeMap::new(),
            current: 1,
        }
    }

    /// Buffers a value (`Some`) or the terminator (`None`) of `slot`.
    pub(crate) fn push(&mut self, slot: usize, value: Option<U>) {
        self.slots.entry(slot).or_default().push_back(value);
    }

    /// Returns the next value in slot order, if it arrived.
    pub(crate) fn pop(&mut self) -> Option<U> {
        loop {
            let queue = self.slots.get_mut(&self.current)?;

            match queue.pop_front()? {
                Some(value) => return Some(value),
                None => {
                    self.slots.remove(&self.current);
                    self.current += 1;
                }
            }
        }
    }
}

enum Event<U, Err> {
    Begin(Stream),
    Register(Interrupt),
    Request(Request),
    Body(usize, Option<U>),
    Ended,
    Fail(Err),
    Stop,
}

impl<U, Err> From<Request> for Event<U, Err> {
    fn from(request: Request) -> Self {
        Event::Request(request)
    }
}

struct Reorder<U, Err, K> {
    k: Option<K>,
    upstream: Option<Stream>,
    sequencer: Resequencer<U>,
    requested: bool,
    /// The downstream asked for an early end.
    finishing: bool,
    upstream_ended: bool,
    _errors: PhantomData<fn(Err)>,
}

impl<U, Err, K> Reorder<U, Err, K>
where
    U: Send + 'static,
    Err: Send + 'static,
    K: Listener<U, Err>,
{
    fn advance(&mut self) {
        if !self.requested {
            return;
        }

        if let Some(value) = self.sequencer.pop() {
            self.requested = false;
            if let Some(k) = self.k.as_mut() {
                k.body(value);
            }
            return;
        }

        if self.upstream_ended {
            if let Some(k) = self.k.take() {
                k.ended();
            }
        } else if let Some(upstream) = &self.upstream {
            upstream.next();
        }
    }
}

impl<U, Err, K> Machine for Reorder<U, Err, K>
where
    U: Send + 'static,
    Err: Send + 'static,
    K: Listener<U, Err>,
{
    type Event = Event<U, Err>;

    fn handle(&mut self, event: Self::Event, serial: &Arc<Serial<Self>>) {
        if self.k.is_none() {
            return;
        }

        match event {
            Event::Begin(upstream) => {
                self.upstream = Some(upstream);
                if let Some(k) = self.k.as_mut() {
                    k.begin(serial.stream());
                }
            }
            Event::Register(interrupt) => {
                if let Some(k) = self.k.as_mut() {
                    k.register(&interrupt);
                }
            }
            Event::Request(Request::Next) => {
                self.requested = true;
                self.advance();
            }
            Event::Request(Request::Done) => {
                self.finishing = true;
                if let Some(upstream) = &self.upstream {
                    upstream.done();
                }
            }
            Event::Body(slot, value) => {
                self.sequencer.push(slot, value);
                self.advance();
            }
            Event::Ended if self.finishing => {
                if let Some(k) = self.k.take() {
                    k.ended();
                }
            }
            Event::Ended => {
                self.upstream_ended = true;
                self.advance();
            }
            Event::Fail(error) => {
                if let Some(k) = self.k.take() {
                    k.fail(error);
                }
            }
            Event::Stop => {
                if let Some(k) = self.k.take() {
                    k.stop();
                }
            }
        }

        if self.k.is_none() {
            self.upstream = None;
        }
    }
}

/// Listens to tagged values and hands them downstream in order.
pub struct ReorderK<U, Err, K>
where
    U: Send + 'static,
    Err: Send + 'static,
    K: Listener<U, Err>,
{
    serial: Arc<Serial<Reorder<U, Err, K>>>,
}

impl<U, Err, K> ReorderK<U, Err, K>
where
    U: Send + 'static,
    Err: Send + 'static,
    K: Listener<U, Err>,
{
    pub(crate) fn new(k: K) -> Self {
        Self {
            serial: Serial::new(Reorder {
                k: Some(k),
                upstream: None,
                sequencer: Resequencer::new(),
                requested: false,
                finishing: false,
                upstream_ended: false,
                _errors: PhantomData,
            }),
        }
    }
}

impl<U, Err, K> Listener<(usize, Option<U>), Err> for ReorderK<U, Err, K>
where
    U: Send + 'static,
    Err: Send + 'static,
    K: Listener<U, Err>,
{
    fn begin(&mut self, stream: Stream) {
        self.serial.send(Event::Begin(stream));
    }

    fn body(&mut self, (slot, value): (usize, Option<U>)) {
        self.serial.send(Event::Body(slot, value));
    }

    fn ended(self) {
        self.serial.send(Event::Ended);
    }

    fn fail(self, error: Err) {
        self.serial.send(Event::Fail(error));
    }

    fn stop(self) {
        self.serial.send(Event::Stop);
    }

    fn register(&mut self, interrupt: &Interrupt) {
        self.serial.send(Event::Register(interrupt.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_released_in_slot_order() {
        let mut sequencer = Resequencer::new();

        sequencer.push(2, Some("b1"));
        sequencer.push(2, None);
        assert_eq!(sequencer.pop(), None);

        sequencer.push(1, Some("a1"));
        assert_eq!(sequencer.pop(), Some("a1"));
        assert_eq!(sequencer.pop(), None);

        sequencer.push(1, Some("a2"));
        sequencer.push(1, None);
        assert_eq!(sequencer.pop(), Some("a2"));
        assert_eq!(sequencer.pop(), Some("b1"));
        assert_eq!(sequencer.pop(), None);
    }

    #[test]
    fn test_empty_slot_is_skipped() {
        let mut sequencer = Resequencer::new();

        sequencer.push(1, None);
        sequencer.push(2, Some(20));

        assert_eq!(sequencer.pop(), Some(20));
    }
}
