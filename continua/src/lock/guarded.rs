use super::Lock;

use std::cell::UnsafeCell;
use std::sync::Arc;

/// State only touched while holding a [`Lock`].
pub(crate) struct Guarded<T> {
    lock: Lock,
    value: UnsafeCell<T>,
}

// Safety: the value is only reached through `synchronized`, which holds
// the lock for the duration of the access.
unsafe impl<T: Send> Send for Guarded<T> {}
unsafe impl<T: Send> Sync for Guarded<T> {}

impl<T: Send + 'static> Guarded<T> {
    pub(crate) fn new(value: T) -> Arc<Self> {
        Arc::new(Self {
            lock: Lock::new(),
            value: UnsafeCell::new(value),
        })
    }

    /// Runs `f` on the value holding the lock, now or once the lock is
    /// handed over. The closure `f` returns runs after the lock has been
    /// released.
    pub(crate) fn synchronized<F, A>(self: &Arc<Self>, f: F)
    where
        F: FnOnce(&mut T) -> A + Send + 'static,
        A: FnOnce(),
    {
        let this = self.clone();

        self.lock.acquire(move || {
            // SAFETY: the lock is held until `release` below.
            let after = f(unsafe { &mut *this.value.get() });
            this.lock.release();
            after();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_synchronized_from_many_threads() {
        let guarded = Guarded::new(0usize);
        let done = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let guarded = guarded.clone();
                let done = done.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        let done = done.clone();
                        guarded.synchronized(move |count| {
                            *count += 1;
                            move || {
                                done.fetch_add(1, Ordering::SeqCst);
                            }
                        });
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(done.load(Ordering::SeqCst), 4000);

        let seen = Arc::new(AtomicUsize::new(0));
        let out = seen.clone();
        guarded.synchronized(move |count| {
            out.store(*count, Ordering::SeqCst);
            || {}
        });
        assert_eq!(seen.load(Ordering::SeqCst), 4000);
    }
}
