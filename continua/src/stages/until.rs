use crate::compose::{Attach, Listener, Many, Stage, composable};
use crate::interrupt::Interrupt;
use crate::stream::Stream;

/// Ends a stream at the first value for which `f` returns `true`.
///
/// That value is not forwarded; the upstream is asked to finish and the
/// stream ends once it did.
pub struct Until<F> {
    f: F,
}

pub fn until<F>(f: F) -> Until<F> {
    Until { f }
}

composable!(Until<F>);

impl<T, E, F> Stage<Many<T, E>> for Until<F>
where
    F: FnMut(&T) -> bool,
{
    type Out = Many<T, E>;
}

impl<T, E, F, K> Attach<Many<T, E>, K> for Until<F>
where
    F: FnMut(&T) -> bool + Send + 'static,
    K: Listener<T, E>,
{
    type Kont = UntilK<F, K>;

    fn attach(self, k: K) -> Self::Kont {
        UntilK {
            f: self.f,
            k,
            stream: None,
        }
    }
}

pub struct UntilK<F, K> {
    f: F,
    k: K,
    stream: Option<Stream>,
}

impl<T, E, F, K> Listener<T, E> for UntilK<F, K>
where
    F: FnMut(&T) -> bool + Send + 'static,
    K: Listener<T, E>,
{
    fn begin(&mut self, stream: Stream) {
        self.stream = Some(stream.clone());
        self.k.begin(stream);
    }

    fn body(&mut self, value: T) {
        if !(self.f)(&value) {
            self.k.body(value);
        } else if let Some(stream) = &self.stream {
            stream.done();
        }
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
