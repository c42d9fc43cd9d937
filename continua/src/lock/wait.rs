//! Waiting on a predicate while holding a [`Lock`].
//!
//! [`wait`] is meant to run under [`synchronized`](super::synchronized).
//! It builds its condition once, handing it a [`Notify`]. The condition
//! is checked on activation and again after every notification; while it
//! says "keep waiting" the lock is released and the pipeline parks. When
//! it says otherwise the pipeline continues, holding the lock again.

use super::Lock;
use crate::compose::{Attach, Continuation, Single, Stage, composable};
use crate::interrupt::Interrupt;
use crate::scheduler::Context;

use parking_lot::Mutex;
use tracing::trace;

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

/// Decides whether a waiting pipeline should keep waiting.
pub trait Condition<T>: Send + 'static {
    /// Returns `true` to keep waiting.
    fn waiting(&mut self, value: &T) -> bool;
}

impl<T, F> Condition<T> for F
where
    F: FnMut(&T) -> bool + Send + 'static,
{
    fn waiting(&mut self, value: &T) -> bool {
        self(value)
    }
}

/// Builds a [`Condition`] once the pipeline is activated.
pub trait Factory<T>: Send + 'static {
    type Condition: Condition<T>;

    fn build(self, notify: Notify) -> Self::Condition;
}

impl<T, F, C> Factory<T> for F
where
    F: FnOnce(Notify) -> C + Send + 'static,
    C: Condition<T>,
{
    type Condition = C;

    fn build(self, notify: Notify) -> C {
        self(notify)
    }
}

pub(crate) trait Notifiable: Send + Sync + 'static {
    fn notify(&self) -> bool;
}

/// Wakes a waiting pipeline up to check its condition again.
#[derive(Clone)]
pub struct Notify {
    target: Arc<dyn Notifiable>,
}

impl Notify {
    /// Re-checks the condition once the lock can be taken.
    ///
    /// Returns `false`, doing nothing, unless the pipeline is currently
    /// parked.
    pub fn notify(&self) -> bool {
        self.target.notify()
    }
}

impl fmt::Debug for Notify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notify").finish_non_exhaustive()
    }
}

/// A stage waiting on a condition built by a [`Factory`].
pub struct Wait<F> {
    lock: Lock,
    factory: F,
}

/// Waits, under `lock`, until the condition built by `factory` says to
/// proceed.
///
/// # Arguments
///
/// * `lock` - A lock the pipeline holds when it reaches the stage
/// * `factory` - Builds the condition once, given a [`Notify`] handle
///
/// # Panics
///
/// The stage panics on activation if `lock` is not held.
pub fn wait<F>(lock: &Lock, factory: F) -> Wait<F> {
    Wait {
        lock: lock.clone(),
        factory,
    }
}

composable!(Wait<F>);

impl<T, E, F> Stage<Single<T, E>> for Wait<F>
where
    F: Factory<T>,
{
    type Out = Single<T, E>;
}

impl<T, E, F, K> Attach<Single<T, E>, K> for Wait<F>
where
    T: Send + 'static,
    E: 'static,
    F: Factory<T>,
    K: Continuation<T, E>,
{
    type Kont = WaitK<F, K, T>;

    fn attach(self, k: K) -> Self::Kont {
        WaitK {
            lock: self.lock,
            factory: self.factory,
            k,
            _value: PhantomData,
        }
    }
}

/// The continuation of a [`Wait`] stage.
pub struct WaitK<F, K, T> {
    lock: Lock,
    factory: F,
    k: K,
    _value: PhantomData<fn(T)>,
}

impl<T, E, F, K> Continuation<T, E> for WaitK<F, K, T>
where
    T: Send + 'static,
    E: 'static,
    F: Factory<T>,
    K: Continuation<T, E>,
{
    fn start(self, value: T) {
        assert!(!self.lock.available(), "waiting without holding the lock");

        let core: Arc<Core<F::Condition, K, T, E>> = Arc::new_cyclic(|this| Core {
            this: this.clone(),
            lock: self.lock,
            context: Context::get(),
            state: Mutex::new(Parked {
                condition: None,
                k: Some(self.k),
                value: Some(value),
                notifiable: false,
                _errors: PhantomData,
            }),
        });

        let condition = self.factory.build(Notify {
            target: core.clone(),
        });

        core.state.lock().condition = Some(condition);
        Core::check(&core);
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

struct Core<C, K, T, E> {
    this: Weak<Self>,
    lock: Lock,
    context: Context,
    state: Mutex<Parked<C, K, T, E>>,
}

struct Parked<C, K, T, E> {
    condition: Option<C>,
    k: Option<K>,
    value: Option<T>,
    /// Set while parked with the lock released.
    notifiable: bool,
    _errors: PhantomData<fn(E)>,
}

impl<C, K, T, E> Core<C, K, T, E>
where
    C: Condition<T>,
    K: Continuation<T, E>,
    T: Send + 'static,
{
    fn check(core: &Arc<Self>) {
        let mut guard = core.state.lock();
        let state = &mut *guard;

        let waiting = match (&mut state.condition, &state.value) {
            (Some(condition), Some(value)) => condition.waiting(value),
            _ => return,
        };

        if waiting {
            state.notifiable = true;
            drop(guard);

            trace!(context = %core.context.name(), "waiting, releasing lock");
            core.lock.release();
            return;
        }

        let condition = state.condition.take();
        let k = state.k.take();
        let value = state.value.take();
        drop(guard);

        // Breaks the cycle through the condition's `Notify`.
        drop(condition);

        if let (Some(k), Some(value)) = (k, value) {
            k.start(value);
        }
    }
}

impl<C, K, T, E> Notifiable for Core<C, K, T, E>
where
    C: Condition<T>,
    K: Continuation<T, E>,
    T: Send + 'static,
    E: 'static,
{
    fn notify(&self) -> bool {
        {
            let mut state = self.state.lock();
            if !state.notifiable {
                return false;
            }
            state.notifiable = false;
        }

        let Some(core) = self.this.upgrade() else {
            return false;
        };

        trace!(context = %self.context.name(), "notified, reacquiring lock");

        let callback = Box::new(move || Core::check(&core));

        if let Some(callback) = self.lock.acquire_slow(&self.context, callback) {
            callback();
        }

        true
    }
}
