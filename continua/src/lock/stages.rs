use super::Lock;
use crate::compose::{Attach, Continuation, Seq, Single, Stage, composable};
use crate::interrupt::Interrupt;
use crate::scheduler::Context;

/// Acquires a [`Lock`] before passing the outcome on.
///
/// Failures and stops acquire too, so a [`Release`] further down can
/// release unconditionally.
pub struct Acquire {
    lock: Lock,
}

impl Acquire {
    /// Creates a stage acquiring `lock`.
    pub fn new(lock: &Lock) -> Self {
        Self { lock: lock.clone() }
    }
}

composable!(Acquire);

impl<T, E> Stage<Single<T, E>> for Acquire {
    type Out = Single<T, E>;
}

impl<T, E, K> Attach<Single<T, E>, K> for Acquire
where
    T: Send + 'static,
    E: Send + 'static,
    K: Continuation<T, E>,
{
    type Kont = AcquireK<K>;

    fn attach(self, k: K) -> Self::Kont {
        AcquireK { lock: self.lock, k }
    }
}

/// The continuation of an [`Acquire`] stage.
pub struct AcquireK<K> {
    lock: Lock,
    k: K,
}

impl<K> AcquireK<K> {
    fn then<F>(self, f: F)
    where
        F: FnOnce(K) + Send + 'static,
        K: Send + 'static,
    {
        let context = Context::get();
        let k = self.k;

        if self.lock.acquire_fast(&context) {
            f(k);
        } else if let Some(callback) = self.lock.acquire_slow(&context, Box::new(move || f(k))) {
            callback();
        }
    }
}

impl<T, E, K> Continuation<T, E> for AcquireK<K>
where
    T: Send + 'static,
    E: Send + 'static,
    K: Continuation<T, E>,
{
    fn start(self, value: T) {
        self.then(move |k| k.start(value));
    }

    fn fail(self, error: E) {
        self.then(move |k| k.fail(error));
    }

    fn stop(self) {
        self.then(|k| k.stop());
    }

    fn register(&mut self, interrupt: &Interrupt) {
        self.k.register(interrupt);
    }
}

/// Releases a [`Lock`] before passing the outcome on.
pub struct Release {
    lock: Lock,
}

impl Release {
    /// Creates a stage releasing `lock`.
    ///
    /// The lock must be held when an outcome reaches the stage.
    pub fn new(lock: &Lock) -> Self {
        Self { lock: lock.clone() }
    }
}

composable!(Release);

impl<T, E> Stage<Single<T, E>> for Release {
    type Out = Single<T, E>;
}

impl<T, E, K> Attach<Single<T, E>, K> for Release
where
    K: Continuation<T, E>,
{
    type Kont = ReleaseK<K>;

    fn attach(self, k: K) -> Self::Kont {
        ReleaseK { lock: self.lock, k }
    }
}

/// The continuation of a [`Release`] stage.
pub struct ReleaseK<K> {
    lock: Lock,
    k: K,
}

impl<T, E, K> Continuation<T, E> for ReleaseK<K>
where
    K: Continuation<T, E>,
{
    fn start(self, value: T) {
        self.lock.release();
        self.k.start(value);
    }

    fn fail(self, error: E) {
        self.lock.release();
        self.k.fail(error);
    }

    fn stop(self) {
        self.lock.release();
        self.k.stop();
    }

    fn register(&mut self, interrupt: &Interrupt) {
        self.k.register(interrupt);
    }
}

/// Runs `stage` holding `lock`.
///
/// The lock is taken for every outcome reaching the stage and released
/// for every outcome leaving it, so failures and stops never leave it
/// held.
///
/// # Arguments
///
/// * `lock` - The lock guarding `stage`
/// * `stage` - A single-value stage
///
/// # Returns
///
/// `Acquire >> stage >> Release`.
pub fn synchronized<S>(lock: &Lock, stage: S) -> Seq<Seq<Acquire, S>, Release> {
    Seq::new(Seq::new(Acquire::new(lock), stage), Release::new(lock))
}
