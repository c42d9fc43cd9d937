//! State shared by the ingress, the egress and the fibers of a
//! concurrent stage.
//!
//! Every decision is taken under the stage's [`Guarded`] lock and turned
//! into an action that runs after the lock is released: launching a
//! fiber, pulling upstream, triggering interrupts or handing a delivery
//! to the egress. Deliveries go through the egress [`Serial`], which owns
//! the downstream listener.

use super::Placement;
use super::fiber::FiberPool;
use crate::compose::Listener;
use crate::erased::ResumeStream;
use crate::error::Error;
use crate::interrupt::{Handler, Interrupt};
use crate::lock::Guarded;
use crate::scheduler::Context;
use crate::scheduler::pool::{Requirements, StaticThreadPool};
use crate::stream::{Machine, Request, Serial, Stream};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use std::collections::VecDeque;
use std::sync::{Arc, OnceLock, Weak};

/// Starts a fiber's sub-pipeline once its interrupt is known.
pub(crate) type Starter = Box<dyn FnOnce(&Interrupt) + Send>;

/// Builds the sub-pipeline of a fiber for one upstream value.
pub(crate) type Launch<T, U, Err> =
    Box<dyn FnMut(T, Arc<Core<T, U, Err>>, usize) -> Starter + Send>;

type After = Box<dyn FnOnce()>;

pub(crate) enum Delivery<U, Err> {
    Body(U),
    Ended,
    Fail(Err),
    Stop,
}

struct State<T, U, Err>
where
    T: Send + 'static,
    U: Send + 'static,
    Err: Send + 'static,
{
    launch: Launch<T, U, Err>,
    fibers: FiberPool,
    values: VecDeque<U>,
    /// First failure or stop, from upstream or from a fiber.
    outcome: Option<Error<Err>>,
    upstream: Option<Stream>,
    started: bool,
    upstream_done: bool,
    downstream_done: bool,
    interrupted: bool,
    /// The downstream asked for a value that was not delivered yet.
    egress_waiting: bool,
    finished: bool,
}

impl<T, U, Err> State<T, U, Err>
where
    T: Send + 'static,
    U: Send + 'static,
    Err: Send + 'static,
{
    fn try_deliver(&mut self) -> Option<Delivery<U, Err>> {
        if !self.egress_waiting || self.finished {
            return None;
        }

        if !self.downstream_done {
            if let Some(value) = self.values.pop_front() {
                self.egress_waiting = false;
                return Some(Delivery::Body(value));
            }
        }

        if !self.upstream_done || !self.fibers.all_done() {
            return None;
        }

        self.egress_waiting = false;
        self.finished = true;

        if self.downstream_done {
            return Some(Delivery::Ended);
        }

        Some(match self.outcome.take() {
            None => Delivery::Ended,
            Some(Error::Failed(error)) => Delivery::Fail(error),
            Some(Error::Stopped) => Delivery::Stop,
        })
    }

    fn record(&mut self, outcome: Error<Err>) -> Vec<Interrupt> {
        if self.outcome.is_none() {
            self.outcome = Some(outcome);
        }

        // Results still buffered are dropped, only the outcome goes on.
        self.values.clear();
        self.fibers.running()
    }

    fn upstream_to_stop(&self) -> Option<Stream> {
        if self.upstream_done {
            None
        } else {
            self.upstream.clone()
        }
    }
}

pub(crate) struct Core<T, U, Err>
where
    T: Send + 'static,
    U: Send + 'static,
    Err: Send + 'static,
{
    name: String,
    placement: Placement,
    state: Arc<Guarded<State<T, U, Err>>>,
    egress: OnceLock<Weak<Serial<Egress<T, U, Err>>>>,
    handler: Mutex<Option<Handler>>,
}

impl<T, U, Err> Core<T, U, Err>
where
    T: Send + 'static,
    U: Send + 'static,
    Err: Send + 'static,
{
    pub(crate) fn new(placement: Placement, launch: Launch<T, U, Err>) -> Arc<Self> {
        Arc::new(Self {
            name: Context::get().name().to_string(),
            placement,
            state: Guarded::new(State {
                launch,
                fibers: FiberPool::new(),
                values: VecDeque::new(),
                outcome: None,
                upstream: None,
                started: false,
                upstream_done: false,
                downstream_done: false,
                interrupted: false,
                egress_waiting: false,
                finished: false,
            }),
            egress: OnceLock::new(),
            handler: Mutex::new(None),
        })
    }

    fn synchronized<F>(self: &Arc<Self>, f: F)
    where
        F: FnOnce(&Arc<Self>, &mut State<T, U, Err>) -> After + Send + 'static,
    {
        let core = self.clone();
        self.state.synchronized(move |state| f(&core, state));
    }

    fn fiber_context(&self, index: usize) -> Context {
        let name = format!("{} [concurrent fiber {index}]", self.name);

        match self.placement {
            Placement::Inline => Context::new(name),
            Placement::Pool => match StaticThreadPool::global().context(&Requirements::new(&name)) {
                Ok(context) => context,
                Err(error) => {
                    warn!(%error, "placing fiber on the default scheduler");
                    Context::new(name)
                }
            },
        }
    }

    fn deliver(&self, delivery: Option<Delivery<U, Err>>) {
        let Some(delivery) = delivery else {
            return;
        };

        if let Some(egress) = self.egress.get().and_then(Weak::upgrade) {
            egress.send(EgressEvent::Deliver(delivery));
        }
    }

    fn begin(self: &Arc<Self>, upstream: Stream, k: Box<dyn ResumeStream<U, Err>>) {
        self.synchronized(move |_, state| {
            state.upstream = Some(upstream);
            Box::new(|| {})
        });

        let egress = Serial::new(Egress {
            core: self.clone(),
            k: Some(k),
        });

        if self.egress.set(Arc::downgrade(&egress)).is_err() {
            warn!("concurrent stage began twice");
            return;
        }

        egress.send(EgressEvent::Begin);
    }

    fn ingress(self: &Arc<Self>, value: T) {
        self.synchronized(move |core, state| {
            let upstream = state.upstream.clone();

            if state.downstream_done || state.interrupted || state.outcome.is_some() {
                trace!("ingress stopping");
                return Box::new(move || {
                    if let Some(upstream) = upstream {
                        upstream.done();
                    }
                });
            }

            let (index, interrupt, context) = state.fibers.acquire(|i| core.fiber_context(i));
            let starter = (state.launch)(value, core.clone(), index);

            Box::new(move || {
                context.continue_with(move || starter(&interrupt));

                if let Some(upstream) = upstream {
                    upstream.next();
                }
            })
        });
    }

    fn upstream_finished(self: &Arc<Self>, outcome: Option<Error<Err>>) {
        self.synchronized(move |core, state| {
            state.upstream_done = true;

            let interrupts = match outcome {
                Some(outcome) => state.record(outcome),
                None => Vec::new(),
            };

            let delivery = state.try_deliver();
            let core = core.clone();

            Box::new(move || {
                interrupts.iter().for_each(Interrupt::trigger);
                core.deliver(delivery);
            })
        });
    }

    pub(crate) fn fiber_body(self: &Arc<Self>, value: U) {
        self.synchronized(move |core, state| {
            if !state.downstream_done && state.outcome.is_none() {
                state.values.push_back(value);
            }

            let delivery = state.try_deliver();
            let core = core.clone();

            Box::new(move || core.deliver(delivery))
        });
    }

    pub(crate) fn fiber_finished(self: &Arc<Self>, index: usize, outcome: Option<Error<Err>>) {
        self.synchronized(move |core, state| {
            state.fibers.finish(index);

            let interrupts = match outcome {
                Some(outcome) => {
                    debug!(fiber = index, "fiber failed or stopped, interrupting the others");
                    state.record(outcome)
                }
                None => Vec::new(),
            };

            let delivery = state.try_deliver();
            let core = core.clone();

            Box::new(move || {
                interrupts.iter().for_each(Interrupt::trigger);
                core.deliver(delivery);
            })
        });
    }

    fn request_next(self: &Arc<Self>) {
        self.synchronized(|core, state| {
            let start = !state.started;
            state.started = true;
            state.egress_waiting = true;

            let upstream = state.upstream.clone();
            let delivery = state.try_deliver();
            let core = core.clone();

            Box::new(move || {
                core.deliver(delivery);

                if start {
                    if let Some(upstream) = upstream {
                        upstream.next();
                    }
                }
            })
        });
    }

    fn request_done(self: &Arc<Self>) {
        self.synchronized(|core, state| {
            state.downstream_done = true;
            state.egress_waiting = true;
            state.values.clear();

            let interrupts = state.fibers.running();
            let upstream = state.upstream_to_stop();
            let delivery = state.try_deliver();
            let core = core.clone();

            Box::new(move || {
                interrupts.iter().for_each(Interrupt::trigger);

                if let Some(upstream) = upstream {
                    upstream.done();
                }

                core.deliver(delivery);
            })
        });
    }

    fn interrupted(self: &Arc<Self>) {
        self.synchronized(|_, state| {
            state.interrupted = true;

            let interrupts = state.fibers.running();
            let upstream = state.upstream_to_stop();

            Box::new(move || {
                interrupts.iter().for_each(Interrupt::trigger);

                if let Some(upstream) = upstream {
                    upstream.done();
                }
            })
        });
    }

    fn watch(self: &Arc<Self>, interrupt: &Interrupt) {
        let core = Arc::downgrade(self);

        let mut handler = Handler::new(interrupt);
        handler.install_or_execute(move || {
            if let Some(core) = core.upgrade() {
                debug!("concurrent stage interrupted");
                core.interrupted();
            }
        });

        *self.handler.lock() = Some(handler);
    }
}

enum EgressEvent<U, Err> {
    Begin,
    Request(Request),
    Deliver(Delivery<U, Err>),
}

impl<U, Err> From<Request> for EgressEvent<U, Err> {
    fn from(request: Request) -> Self {
        EgressEvent::Request(request)
    }
}

/// Owns the downstream listener and serializes everything it receives.
struct Egress<T, U, Err>
where
    T: Send + 'static,
    U: Send + 'static,
    Err: Send + 'static,
{
    core: Arc<Core<T, U, Err>>,
    k: Option<Box<dyn ResumeStream<U, Err>>>,
}

impl<T, U, Err> Machine for Egress<T, U, Err>
where
    T: Send + 'static,
    U: Send + 'static,
    Err: Send + 'static,
{
    type Event = EgressEvent<U, Err>;

    fn handle(&mut self, event: Self::Event, serial: &Arc<Serial<Self>>) {
        let Some(k) = self.k.as_mut() else {
            return;
        };

        match event {
            EgressEvent::Begin => k.begin(serial.stream()),
            EgressEvent::Request(Request::Next) => self.core.request_next(),
            EgressEvent::Request(Request::Done) => self.core.request_done(),
            EgressEvent::Deliver(Delivery::Body(value)) => k.body(value),
            EgressEvent::Deliver(Delivery::Ended) => {
                if let Some(k) = self.k.take() {
                    k.ended();
                }
            }
            EgressEvent::Deliver(Delivery::Fail(error)) => {
                if let Some(k) = self.k.take() {
                    k.fail(error);
                }
            }
            EgressEvent::Deliver(Delivery::Stop) => {
                if let Some(k) = self.k.take() {
                    k.stop();
                }
            }
        }
    }
}

/// The listener a concurrent stage presents to its upstream.
///
/// Values go to the ingress. The downstream is handed to the egress on
/// `begin`; an outcome arriving before that goes straight to it.
pub struct ConcurrentK<T, U, E, Err, K>
where
    T: Send + 'static,
    U: Send + 'static,
    Err: Send + 'static,
{
    core: Arc<Core<T, U, Err>>,
    k: Option<K>,
    lift: fn(E) -> Err,
}

impl<T, U, E, Err, K> ConcurrentK<T, U, E, Err, K>
where
    T: Send + 'static,
    U: Send + 'static,
    Err: Send + 'static,
{
    pub(crate) fn new(core: Arc<Core<T, U, Err>>, k: K, lift: fn(E) -> Err) -> Self {
        Self {
            core,
            k: Some(k),
            lift,
        }
    }
}

impl<T, U, E, Err, K> Listener<T, E> for ConcurrentK<T, U, E, Err, K>
where
    T: Send + 'static,
    U: Send + 'static,
    E: 'static,
    Err: Send + 'static,
    K: Listener<U, Err>,
{
    fn begin(&mut self, stream: Stream) {
        if let Some(k) = self.k.take() {
            self.core.begin(stream, Box::new(k));
        }
    }

    fn body(&mut self, value: T) {
        self.core.ingress(value);
    }

    fn ended(mut self) {
        match self.k.take() {
            Some(k) => k.ended(),
            None => self.core.upstream_finished(None),
        }
    }

    fn fail(mut self, error: E) {
        let error = (self.lift)(error);

        // No `begin` yet, so no egress owns the downstream.
        match self.k.take() {
            Some(k) => k.fail(error),
            None => self.core.upstream_finished(Some(Error::Failed(error))),
        }
    }

    fn stop(mut self) {
        match self.k.take() {
            Some(k) => k.stop(),
            None => self.core.upstream_finished(Some(Error::Stopped)),
        }
    }

    fn register(&mut self, interrupt: &Interrupt) {
        if let Some(k) = self.k.as_mut() {
            k.register(interrupt);
        }

        self.core.watch(interrupt);
    }
}

/// The listener at the end of each fiber's sub-pipeline.
///
/// Pulls its sub-stream as fast as it produces and reports every value
/// and the final outcome back to the stage.
pub struct FiberSink<T, U, Err, X>
where
    T: Send + 'static,
    U: Send + 'static,
    Err: Send + 'static,
{
    core: Arc<Core<T, U, Err>>,
    index: usize,
    lift: fn(X) -> Err,
    stream: Option<Stream>,
}

impl<T, U, Err, X> FiberSink<T, U, Err, X>
where
    T: Send + 'static,
    U: Send + 'static,
    Err: Send + 'static,
{
    pub(crate) fn new(core: Arc<Core<T, U, Err>>, index: usize, lift: fn(X) -> Err) -> Self {
        Self {
            core,
            index,
            lift,
            stream: None,
        }
    }
}

impl<T, U, Err, X> Listener<U, X> for FiberSink<T, U, Err, X>
where
    T: Send + 'static,
    U: Send + 'static,
    Err: Send + 'static,
    X: 'static,
{
    fn begin(&mut self, stream: Stream) {
        self.stream = Some(stream.clone());
        stream.next();
    }

    fn body(&mut self, value: U) {
        self.core.fiber_body(value);

        if let Some(stream) = &self.stream {
            stream.next();
        }
    }

    fn ended(self) {
        self.core.fiber_finished(self.index, None);
    }

    fn fail(self, error: X) {
        let error = (self.lift)(error);
        self.core.fiber_finished(self.index, Some(Error::Failed(error)));
    }

    fn stop(self) {
        self.core.fiber_finished(self.index, Some(Error::Stopped));
    }

    fn register(&mut self, _: &Interrupt) {}
}
