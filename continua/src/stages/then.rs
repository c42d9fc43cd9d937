use crate::compose::{Attach, Continuation, Listener, Many, Single, Stage, composable};
use crate::error::{Nil, Union};
use crate::interrupt::Interrupt;
use crate::stream::{Machine, Serial, Stream};

use std::marker::PhantomData;
use std::sync::Arc;

/// Continues with the stage returned by `f`.
///
/// The produced stage is attached when the value arrives and runs with
/// the same interrupt. Its errors are added to the upstream error set.
///
/// On a stream `f` runs for every value and the stage it returns may
/// complete later, from anywhere; its result becomes the next value of
/// the stream. A failure or stop of one of those stages ends the upstream
/// and is delivered once it ended.
pub struct Then<F> {
    f: F,
}

pub fn then<F>(f: F) -> Then<F> {
    Then { f }
}

composable!(Then<F>);

impl<T, E, F, S, U, X> Stage<Single<T, E>> for Then<F>
where
    F: FnOnce(T) -> S,
    S: Stage<Single<(), Nil>, Out = Single<U, X>>,
    E: Union<X>,
{
    type Out = Single<U, <E as Union<X>>::Output>;
}

impl<T, E, F, S, U, X, K> Attach<Single<T, E>, K> for Then<F>
where
    T: 'static,
    F: FnOnce(T) -> S + Send + 'static,
    S: Attach<Single<(), Nil>, Widen<K, E>, Out = Single<U, X>>,
    S::Kont: Continuation<(), Nil>,
    E: Union<X> + 'static,
    K: Continuation<U, <E as Union<X>>::Output>,
{
    type Kont = ThenK<F, K>;

    fn attach(self, k: K) -> Self::Kont {
        ThenK {
            f: self.f,
            k,
            interrupt: None,
        }
    }
}

pub struct ThenK<F, K> {
    f: F,
    k: K,
    interrupt: Option<Interrupt>,
}

impl<T, E, F, S, U, X, K> Continuation<T, E> for ThenK<F, K>
where
    T: 'static,
    F: FnOnce(T) -> S + Send + 'static,
    S: Attach<Single<(), Nil>, Widen<K, E>, Out = Single<U, X>>,
    S::Kont: Continuation<(), Nil>,
    E: Union<X> + 'static,
    K: Continuation<U, <E as Union<X>>::Output>,
{
    fn start(self, value: T) {
        let stage = (self.f)(value);
        let mut kont = stage.attach(Widen::new(self.k));

        if let Some(interrupt) = &self.interrupt {
            kont.register(interrupt);
        }

        kont.start(());
    }

    fn fail(self, error: E) {
        self.k.fail(error.left());
    }

    fn stop(self) {
        self.k.stop();
    }

    fn register(&mut self, interrupt: &Interrupt) {
        self.interrupt = Some(interrupt.clone());
        self.k.register(interrupt);
    }
}

/// Lifts the errors of an inner pipeline (or stream) into the right-hand
/// side of `L ∪ X`.
///
/// Registration is not forwarded: the wrapped continuation was already
/// registered by whoever owns it.
pub struct Widen<K, L> {
    k: K,
    _left: PhantomData<fn() -> L>,
}

impl<K, L> Widen<K, L> {
    pub(crate) fn new(k: K) -> Self {
        Self {
            k,
            _left: PhantomData,
        }
    }
}

impl<U, X, L, K> Continuation<U, X> for Widen<K, L>
where
    L: Union<X> + 'static,
    K: Continuation<U, <L as Union<X>>::Output>,
{
    fn start(self, value: U) {
        self.k.start(value);
    }

    fn fail(self, error: X) {
        self.k.fail(L::right(error));
    }

    fn stop(self) {
        self.k.stop();
    }

    fn register(&mut self, _: &Interrupt) {}
}

impl<U, X, L, K> Listener<U, X> for Widen<K, L>
where
    L: Union<X> + 'static,
    K: Listener<U, <L as Union<X>>::Output>,
{
    fn begin(&mut self, stream: Stream) {
        self.k.begin(stream);
    }

    fn body(&mut self, value: U) {
        self.k.body(value);
    }

    fn ended(self) {
        self.k.ended();
    }

    fn fail(self, error: X) {
        self.k.fail(L::right(error));
    }

    fn stop(self) {
        self.k.stop();
    }

    fn register(&mut self, _: &Interrupt) {}
}

impl<T, E, F, S, U, X> Stage<Many<T, E>> for Then<F>
where
    F: FnMut(T) -> S,
    S: Stage<Single<(), Nil>, Out = Single<U, X>>,
    E: Union<X>,
{
    type Out = Many<U, <E as Union<X>>::Output>;
}

impl<T, E, F, S, U, X, K> Attach<Many<T, E>, K> for Then<F>
where
    T: 'static,
    U: Send + 'static,
    X: 'static,
    E: Union<X> + 'static,
    <E as Union<X>>::Output: Send + 'static,
    F: FnMut(T) -> S + Send + 'static,
    S: Attach<Single<(), Nil>, Emit<U, <E as Union<X>>::Output, X, K>, Out = Single<U, X>>,
    S::Kont: Continuation<(), Nil>,
    K: Listener<U, <E as Union<X>>::Output>,
{
    type Kont = ThenEachK<F, K, U, E, X, <E as Union<X>>::Output>;

    fn attach(self, k: K) -> Self::Kont {
        ThenEachK {
            f: self.f,
            k: Some(k),
            serial: None,
            interrupt: None,
            lift: <E as Union<X>>::left,
            lift_inner: <E as Union<X>>::right,
        }
    }
}

enum Event<U, Err> {
    Begin(Stream),
    Value(U),
    Failed(Err),
    Stopped,
    Ended,
    UpstreamFailed(Err),
    UpstreamStopped,
}

enum Cut<Err> {
    Failed(Err),
    Stopped,
}

/// Owns the downstream of a stream `then`.
struct Flat<U, Err, K> {
    k: Option<K>,
    upstream: Option<Stream>,
    cut: Option<Cut<Err>>,
    _value: PhantomData<fn(U)>,
}

impl<U, Err, K> Flat<U, Err, K> {
    fn cut(&mut self, cut: Cut<Err>) {
        if self.cut.is_some() {
            return;
        }

        self.cut = Some(cut);

        if let Some(upstream) = &self.upstream {
            upstream.done();
        }
    }
}

impl<U, Err, K> Machine for Flat<U, Err, K>
where
    U: Send + 'static,
    Err: Send + 'static,
    K: Listener<U, Err>,
{
    type Event = Event<U, Err>;

    fn handle(&mut self, event: Event<U, Err>, _: &Arc<Serial<Self>>) {
        match event {
            Event::Begin(stream) => {
                self.upstream = Some(stream.clone());

                if let Some(k) = self.k.as_mut() {
                    k.begin(stream);
                }
            }
            Event::Value(value) => {
                if let (Some(k), None) = (self.k.as_mut(), &self.cut) {
                    k.body(value);
                }
            }
            Event::Failed(error) => self.cut(Cut::Failed(error)),
            Event::Stopped => self.cut(Cut::Stopped),
            Event::Ended => {
                let Some(k) = self.k.take() else {
                    return;
                };

                self.upstream = None;

                match self.cut.take() {
                    Some(Cut::Failed(error)) => k.fail(error),
                    Some(Cut::Stopped) => k.stop(),
                    None => k.ended(),
                }
            }
            Event::UpstreamFailed(error) => {
                self.upstream = None;

                if let Some(k) = self.k.take() {
                    k.fail(error);
                }
            }
            Event::UpstreamStopped => {
                self.upstream = None;

                if let Some(k) = self.k.take() {
                    k.stop();
                }
            }
        }
    }
}

/// Receives the outcome of the stage produced for one value.
pub struct Emit<U, Err, X, K>
where
    U: Send + 'static,
    Err: Send + 'static,
    K: Listener<U, Err>,
{
    serial: Arc<Serial<Flat<U, Err, K>>>,
    lift: fn(X) -> Err,
}

impl<U, Err, X, K> Continuation<U, X> for Emit<U, Err, X, K>
where
    U: Send + 'static,
    Err: Send + 'static,
    X: 'static,
    K: Listener<U, Err>,
{
    fn start(self, value: U) {
        self.serial.send(Event::Value(value));
    }

    fn fail(self, error: X) {
        self.serial.send(Event::Failed((self.lift)(error)));
    }

    fn stop(self) {
        self.serial.send(Event::Stopped);
    }

    fn register(&mut self, _: &Interrupt) {}
}

pub struct ThenEachK<F, K, U, E, X, Err>
where
    U: Send + 'static,
    Err: Send + 'static,
    K: Listener<U, Err>,
{
    f: F,
    k: Option<K>,
    serial: Option<Arc<Serial<Flat<U, Err, K>>>>,
    interrupt: Option<Interrupt>,
    lift: fn(E) -> Err,
    lift_inner: fn(X) -> Err,
}

impl<F, K, U, E, X, Err> ThenEachK<F, K, U, E, X, Err>
where
    U: Send + 'static,
    Err: Send + 'static,
    K: Listener<U, Err>,
{
    fn send(&self, event: Event<U, Err>) {
        if let Some(serial) = &self.serial {
            serial.send(event);
        }
    }
}

impl<T, E, F, S, U, X, Err, K> Listener<T, E> for ThenEachK<F, K, U, E, X, Err>
where
    T: 'static,
    U: Send + 'static,
    X: 'static,
    E: 'static,
    Err: Send + 'static,
    F: FnMut(T) -> S + Send + 'static,
    S: Attach<Single<(), Nil>, Emit<U, Err, X, K>, Out = Single<U, X>>,
    S::Kont: Continuation<(), Nil>,
    K: Listener<U, Err>,
{
    fn begin(&mut self, stream: Stream) {
        let Some(k) = self.k.take() else {
            return;
        };

        let serial = Serial::new(Flat {
            k: Some(k),
            upstream: None,
            cut: None,
            _value: PhantomData,
        });

        self.serial = Some(serial.clone());
        serial.send(Event::Begin(stream));
    }

    fn body(&mut self, value: T) {
        let Some(serial) = &self.serial else {
            return;
        };

        let emit = Emit {
            serial: serial.clone(),
            lift: self.lift_inner,
        };

        let mut kont = (self.f)(value).attach(emit);

        if let Some(interrupt) = &self.interrupt {
            kont.register(interrupt);
        }

        kont.start(());
    }

    fn ended(self) {
        self.send(Event::Ended);
    }

    fn fail(self, error: E) {
        match &self.serial {
            Some(_) => self.send(Event::UpstreamFailed((self.lift)(error))),
            None => {
                if let Some(k) = self.k {
                    k.fail((self.lift)(error));
                }
            }
        }
    }

    fn stop(self) {
        match &self.serial {
            Some(_) => self.send(Event::UpstreamStopped),
            None => {
                if let Some(k) = self.k {
                    k.stop();
                }
            }
        }
    }

    fn register(&mut self, interrupt: &Interrupt) {
        self.interrupt = Some(interrupt.clone());

        if let Some(k) = self.k.as_mut() {
            k.register(interrupt);
        }
    }
}
