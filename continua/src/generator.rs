//! Type-erased stream stages.

use crate::compose::{Attach, Continuation, Listener, Many, Single, Stage, composable};
use crate::erased::BoxedListener;
use crate::error::{Nil, Union};
use crate::interrupt::Interrupt;
use crate::stages::terminal;
use crate::stages::then::Widen;

use parking_lot::Mutex;
use tracing::trace;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

type Starter<T, E> = Box<dyn FnOnce(BoxedListener<T, E>, &Interrupt) + Send>;

type Launch<T, E> = dyn FnMut() -> Starter<T, E> + Send;

/// A stream of `T` (or an error of `E`) whose producing pipeline is
/// hidden behind a factory.
///
/// Every activation calls the factory again, so a generator restarts
/// from the beginning each time it is started. Clones share the factory.
///
/// ```rust,ignore
/// let evens: Generator<u32> = Generator::new(|| iterate(0..10) >> until(|x| *x > 6));
/// let sum = run(evens >> reduce(0, |a, x| a + x));
/// ```
pub struct Generator<T, E = Nil> {
    launch: Arc<Mutex<Box<Launch<T, E>>>>,
}

impl<T, E> Generator<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new<F, S>(mut factory: F) -> Self
    where
        F: FnMut() -> S + Send + 'static,
        S: Attach<Single<(), Nil>, BoxedListener<T, E>, Out = Many<T, E>> + Send + 'static,
        S::Kont: Continuation<(), Nil>,
    {
        let launch = move || -> Starter<T, E> {
            let stage = factory();
            Box::new(move |k: BoxedListener<T, E>, interrupt: &Interrupt| {
                terminal::start(stage, k, interrupt);
            })
        };

        Self {
            launch: Arc::new(Mutex::new(Box::new(launch))),
        }
    }
}

impl<T, E> Clone for Generator<T, E> {
    fn clone(&self) -> Self {
        Self {
            launch: self.launch.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Generator<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generator").finish_non_exhaustive()
    }
}

composable!(Generator<T, E>);

impl<X, L, T, E> Stage<Single<X, L>> for Generator<T, E>
where
    L: Union<E>,
{
    type Out = Many<T, <L as Union<E>>::Output>;
}

impl<X, L, T, E, K> Attach<Single<X, L>, K> for Generator<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
    L: Union<E> + 'static,
    K: Listener<T, <L as Union<E>>::Output>,
{
    type Kont = GeneratorK<T, E, L, K>;

    fn attach(self, k: K) -> Self::Kont {
        GeneratorK {
            launch: self.launch,
            interrupt: None,
            k,
            _errors: PhantomData,
        }
    }
}

pub struct GeneratorK<T, E, L, K> {
    launch: Arc<Mutex<Box<Launch<T, E>>>>,
    interrupt: Option<Interrupt>,
    k: K,
    _errors: PhantomData<fn() -> L>,
}

impl<X, L, T, E, K> Continuation<X, L> for GeneratorK<T, E, L, K>
where
    T: Send + 'static,
    E: Send + 'static,
    L: Union<E> + 'static,
    K: Listener<T, <L as Union<E>>::Output>,
{
    fn start(self, _: X) {
        trace!("starting generator");

        let widened: Widen<K, L> = Widen::new(self.k);
        let interrupt = self.interrupt.unwrap_or_default();

        let starter = {
            let mut launch = self.launch.lock();
            (*launch)()
        };

        starter(BoxedListener::new(widened), &interrupt);
    }

    fn fail(self, error: L) {
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
