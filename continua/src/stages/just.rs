use crate::compose::{Attach, Continuation, Single, Stage, composable};
use crate::interrupt::Interrupt;

/// A stage that ignores its input and succeeds with `value`.
///
/// Failures and stops of the upstream are forwarded unchanged.
pub struct Just<T> {
    value: T,
}

pub fn just<T>(value: T) -> Just<T> {
    Just { value }
}

composable!(Just<T>);

impl<In, E, T> Stage<Single<In, E>> for Just<T> {
    type Out = Single<T, E>;
}

impl<In, E, T, K> Attach<Single<In, E>, K> for Just<T>
where
    T: Send + 'static,
    K: Continuation<T, E>,
{
    type Kont = JustK<T, K>;

    fn attach(self, k: K) -> Self::Kont {
        JustK { value: self.value, k }
    }
}

pub struct JustK<T, K> {
    value: T,
    k: K,
}

impl<In, E, T, K> Continuation<In, E> for JustK<T, K>
where
    T: Send + 'static,
    K: Continuation<T, E>,
{
    fn start(self, _: In) {
        self.k.start(self.value);
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
