//! Moving a pipeline between contexts.

use crate::compose::{Attach, Continuation, Single, Stage, composable};
use crate::interrupt::Interrupt;
use crate::scheduler::Context;

use tracing::trace;

/// Continues the downstream inside `context`.
pub struct Reschedule {
    context: Context,
}

pub fn reschedule(context: Context) -> Reschedule {
    Reschedule { context }
}

composable!(Reschedule);

impl<T, E> Stage<Single<T, E>> for Reschedule {
    type Out = Single<T, E>;
}

impl<T, E, K> Attach<Single<T, E>, K> for Reschedule
where
    T: Send + 'static,
    E: Send + 'static,
    K: Continuation<T, E>,
{
    type Kont = RescheduleK<K>;

    fn attach(self, k: K) -> Self::Kont {
        RescheduleK::new(self.context, k)
    }
}

pub struct RescheduleK<K> {
    context: Context,
    k: K,
}

impl<K> RescheduleK<K> {
    fn new(context: Context, k: K) -> Self {
        Self { context, k }
    }
}

impl<T, E, K> Continuation<T, E> for RescheduleK<K>
where
    T: Send + 'static,
    E: Send + 'static,
    K: Continuation<T, E>,
{
    fn start(self, value: T) {
        let k = self.k;
        self.context.continue_with(move || k.start(value));
    }

    fn fail(self, error: E) {
        let k = self.k;
        self.context.continue_with(move || k.fail(error));
    }

    fn stop(self) {
        let k = self.k;
        self.context.continue_with(move || k.stop());
    }

    fn register(&mut self, interrupt: &Interrupt) {
        self.k.register(interrupt);
    }
}

/// Where a [`Preempt`] runs its stage.
#[derive(Debug, Clone)]
pub(crate) enum Target {
    /// The context that started the stage.
    Current,
    /// A fresh context forked from the one that started the stage.
    Fork(String),
    /// A given context.
    Context(Context),
}

/// Runs a stage in another context and comes back.
///
/// The context that started the stage is captured on activation; whatever
/// the stage produces is delivered to the downstream in that context.
pub struct Preempt<S> {
    target: Target,
    stage: S,
}

impl<S> Preempt<S> {
    pub(crate) fn new(target: Target, stage: S) -> Self {
        Self { target, stage }
    }
}

/// Runs `stage`, then returns to the context that started it.
pub fn reschedule_after<S>(stage: S) -> Preempt<S> {
    Preempt::new(Target::Current, stage)
}

/// Runs `stage` in a new context named `name`, then returns to the
/// context that started it.
pub fn preempt<S>(name: impl Into<String>, stage: S) -> Preempt<S> {
    Preempt::new(Target::Fork(name.into()), stage)
}

composable!(Preempt<S>);

impl<T, E, S> Stage<Single<T, E>> for Preempt<S>
where
    S: Stage<Single<T, E>>,
{
    type Out = S::Out;
}

impl<T, E, S, U, X, K> Attach<Single<T, E>, K> for Preempt<S>
where
    T: Send + 'static,
    E: Send + 'static,
    U: Send + 'static,
    X: Send + 'static,
    S: Attach<Single<T, E>, RescheduleK<K>, Out = Single<U, X>> + Send + 'static,
    S::Kont: Continuation<T, E>,
    K: Continuation<U, X>,
{
    type Kont = PreemptK<S, K>;

    fn attach(self, k: K) -> Self::Kont {
        PreemptK {
            target: self.target,
            stage: self.stage,
            k,
            interrupt: None,
        }
    }
}

pub struct PreemptK<S, K> {
    target: Target,
    stage: S,
    k: K,
    interrupt: Option<Interrupt>,
}

enum Outcome<T, E> {
    Start(T),
    Fail(E),
    Stop,
}

impl<S, K> PreemptK<S, K> {
    fn run<T, E, U, X>(self, outcome: Outcome<T, E>)
    where
        T: Send + 'static,
        E: Send + 'static,
        U: Send + 'static,
        X: Send + 'static,
        S: Attach<Single<T, E>, RescheduleK<K>, Out = Single<U, X>>,
        S::Kont: Continuation<T, E>,
        K: Continuation<U, X>,
    {
        let caller = Context::get();

        let target = match self.target {
            Target::Current => caller.clone(),
            Target::Fork(name) => caller.fork(name),
            Target::Context(context) => context,
        };

        trace!(from = %caller.name(), to = %target.name(), "preempting");

        let mut kont = self.stage.attach(RescheduleK::new(caller, self.k));

        if let Some(interrupt) = &self.interrupt {
            kont.register(interrupt);
        }

        target.continue_with(move || match outcome {
            Outcome::Start(value) => kont.start(value),
            Outcome::Fail(error) => kont.fail(error),
            Outcome::Stop => kont.stop(),
        });
    }
}

impl<T, E, S, U, X, K> Continuation<T, E> for PreemptK<S, K>
where
    T: Send + 'static,
    E: Send + 'static,
    U: Send + 'static,
    X: Send + 'static,
    S: Attach<Single<T, E>, RescheduleK<K>, Out = Single<U, X>> + Send + 'static,
    S::Kont: Continuation<T, E>,
    K: Continuation<U, X>,
{
    fn start(self, value: T) {
        self.run(Outcome::Start(value));
    }

    fn fail(self, error: E) {
        self.run(Outcome::Fail(error));
    }

    fn stop(self) {
        self.run(Outcome::Stop);
    }

    fn register(&mut self, interrupt: &Interrupt) {
        self.interrupt = Some(interrupt.clone());
    }
}
