use crate::compose::{Attach, Continuation, Listener, Many, Single, Stage, composable};
use crate::interrupt::{Handler, Interrupt};
use crate::stream::{Machine, Request, Serial};

use tracing::trace;

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Streams the items of a collection.
///
/// Once the pipeline is interrupted the next request stops the stream
/// instead of producing another item.
pub struct Iterate<I> {
    items: I,
}

pub fn iterate<I>(items: I) -> Iterate<I>
where
    I: IntoIterator,
{
    Iterate { items }
}

composable!(Iterate<I>);

impl<T, E, I> Stage<Single<T, E>> for Iterate<I>
where
    I: IntoIterator,
{
    type Out = Many<I::Item, E>;
}

impl<T, E, I, K> Attach<Single<T, E>, K> for Iterate<I>
where
    E: 'static,
    I: IntoIterator + Send + 'static,
    I::IntoIter: Send + 'static,
    K: Listener<I::Item, E>,
{
    type Kont = IterateK<I, K>;

    fn attach(self, k: K) -> Self::Kont {
        IterateK {
            items: self.items,
            k,
            interrupt: None,
        }
    }
}

pub struct IterateK<I, K> {
    items: I,
    k: K,
    interrupt: Option<Interrupt>,
}

impl<T, E, I, K> Continuation<T, E> for IterateK<I, K>
where
    E: 'static,
    I: IntoIterator + Send + 'static,
    I::IntoIter: Send + 'static,
    K: Listener<I::Item, E>,
{
    fn start(self, _: T) {
        let interrupted = Arc::new(AtomicBool::new(false));

        let handler = self.interrupt.as_ref().map(|interrupt| {
            let flag = interrupted.clone();
            let mut handler = Handler::new(interrupt);
            handler.install_or_execute(move || flag.store(true, Ordering::Release));
            handler
        });

        let serial = Serial::new(Producer {
            items: self.items.into_iter(),
            k: Some(self.k),
            interrupted,
            _handler: handler,
            _errors: PhantomData,
        });

        serial.send(Event::Begin);
    }

    fn fail(self, error: E) {
        self.k.fail(error);
    }

    fn stop(self) {
        self.k.stop();
    }

    fn register(&mut self, interrupt: &Interrupt) {
        self.interrupt = Some(interrupt.clone());
        self.k.register(interrupt);
    }
}

enum Event {
    Begin,
    Request(Request),
}

impl From<Request> for Event {
    fn from(request: Request) -> Self {
        Event::Request(request)
    }
}

struct Producer<It, K, E> {
    items: It,
    k: Option<K>,
    interrupted: Arc<AtomicBool>,
    _handler: Option<Handler>,
    _errors: PhantomData<fn() -> E>,
}

impl<It, K, E> Machine for Producer<It, K, E>
where
    E: 'static,
    It: Iterator + Send + 'static,
    K: Listener<It::Item, E>,
{
    type Event = Event;

    fn handle(&mut self, event: Event, serial: &Arc<Serial<Self>>) {
        let Some(k) = self.k.as_mut() else {
            return;
        };

        match event {
            Event::Begin => k.begin(serial.stream()),
            Event::Request(Request::Next) if self.interrupted.load(Ordering::Acquire) => {
                trace!("iterate interrupted");
                if let Some(k) = self.k.take() {
                    k.stop();
                }
            }
            Event::Request(Request::Next) => match self.items.next() {
                Some(item) => k.body(item),
                None => {
                    if let Some(k) = self.k.take() {
                        k.ended();
                    }
                }
            },
            Event::Request(Request::Done) => {
                if let Some(k) = self.k.take() {
                    k.ended();
                }
            }
        }
    }
}
