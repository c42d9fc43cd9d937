//! Cooperative mutual exclusion.
//!
//! A [`Lock`] never blocks a thread. Acquiring a held lock parks a
//! callback instead, and releasing the lock hands it to the earliest
//! parked callback, which is resumed through its context's
//! [`Context::unblock`].
//!
//! Waiters are kept on a lock-free stack:
//!
//! - `null` means the lock is free,
//! - `HELD` means it is held by an acquirer that took the fast path and
//!   allocated nothing,
//! - otherwise `head` is the most recent waiter. The bottom of the stack
//!   is the holder: either the `HELD` marker or a node whose `next` is
//!   null.
//!
//! Only the holder walks or unlinks nodes, so pushing waiters is the only
//! concurrent mutation and it touches nothing but `head`.

mod condition;
mod guarded;
mod stages;
mod wait;

pub use condition::ConditionVariable;
pub(crate) use guarded::Guarded;
pub use stages::{Acquire, Release, synchronized};
pub use wait::{Condition, Factory, Notify, Wait, wait};

use crate::scheduler::{Callback, Context};

use tracing::trace;

use std::fmt;
use std::ptr::{self, NonNull};
use std::sync::Arc;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

struct Waiter {
    next: *mut Waiter,
    callback: Option<Callback>,
    context: Context,
}

fn held() -> *mut Waiter {
    NonNull::<Waiter>::dangling().as_ptr()
}

/// A mutual-exclusion primitive for pipelines.
///
/// Cloning yields another handle to the same lock.
#[derive(Clone, Default)]
pub struct Lock {
    inner: Arc<Inner>,
}

struct Inner {
    head: AtomicPtr<Waiter>,
    /// Id of the context owning the lock, 0 when unknown or free.
    owner: AtomicU64,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            owner: AtomicU64::new(0),
        }
    }
}

impl Lock {
    /// Creates a free lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the lock if it is free. Allocates nothing.
    ///
    /// # Arguments
    ///
    /// * `context` - The context that becomes the owner
    ///
    /// # Returns
    ///
    /// `true` if the lock was free and is now held.
    pub fn acquire_fast(&self, context: &Context) -> bool {
        let acquired = self
            .inner
            .head
            .compare_exchange(ptr::null_mut(), held(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if acquired {
            trace!(context = %context.name(), "lock acquired (fast)");
            self.inner.owner.store(context.id(), Ordering::Release);
        }

        acquired
    }

    /// Queues `callback` to run in `context` once the lock is handed over.
    ///
    /// If the lock was free it is taken right away and `callback` is
    /// returned for the caller to run.
    ///
    /// # Arguments
    ///
    /// * `context` - The context `callback` is resumed in
    /// * `callback` - What to run once the lock is held
    ///
    /// # Returns
    ///
    /// `Some(callback)` if the lock was acquired immediately, `None` if
    /// the callback was queued behind the holder.
    pub fn acquire_slow(&self, context: &Context, callback: Callback) -> Option<Callback> {
        let node = Box::into_raw(Box::new(Waiter {
            next: ptr::null_mut(),
            callback: Some(callback),
            context: context.clone(),
        }));

        let mut head = self.inner.head.load(Ordering::Acquire);

        loop {
            // SAFETY: `node` is not published yet.
            unsafe { (*node).next = head };

            match self.inner.head.compare_exchange_weak(
                head,
                node,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(current) => head = current,
            }
        }

        if head.is_null() {
            trace!(context = %context.name(), "lock acquired (slow)");
            self.inner.owner.store(context.id(), Ordering::Release);
            // SAFETY: the node is the holder; only the holder touches it.
            return unsafe { (*node).callback.take() };
        }

        trace!(context = %context.name(), "lock contended, waiting");
        None
    }

    /// Runs `callback` holding the lock, now or once it is handed over.
    ///
    /// The current context (see [`Context::get`]) becomes the owner. The
    /// callback is responsible for calling [`release`](Self::release).
    pub fn acquire<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let context = Context::get();

        if self.acquire_fast(&context) {
            callback();
        } else if let Some(callback) = self.acquire_slow(&context, Box::new(callback)) {
            callback();
        }
    }

    /// Releases the lock, handing it to the earliest waiter if any.
    ///
    /// The waiter is resumed through [`Context::unblock`] of the context
    /// it queued from, never inline.
    ///
    /// # Panics
    ///
    /// Panics if the lock is not held.
    pub fn release(&self) {
        self.inner.owner.store(0, Ordering::Release);

        loop {
            let head = self.inner.head.load(Ordering::Acquire);
            assert!(!head.is_null(), "released a lock that is not held");

            if head == held() {
                if self.release_to_free(head) {
                    return;
                }
                continue;
            }

            // SAFETY: nodes below `head` are only unlinked by the holder,
            // which is the caller.
            unsafe {
                if (*head).next.is_null() {
                    if self.release_to_free(head) {
                        drop(Box::from_raw(head));
                        return;
                    }
                    continue;
                }

                let mut waiter = head;

                loop {
                    let next = (*waiter).next;
                    if next == held() || (*next).next.is_null() {
                        break;
                    }
                    waiter = next;
                }

                let holder = (*waiter).next;
                (*waiter).next = ptr::null_mut();

                if holder != held() {
                    drop(Box::from_raw(holder));
                }

                let context = (*waiter).context.clone();
                let callback = (*waiter).callback.take();

                self.inner.owner.store(context.id(), Ordering::Release);
                trace!(context = %context.name(), "lock handed over");

                if let Some(callback) = callback {
                    context.unblock(callback);
                }

                return;
            }
        }
    }

    fn release_to_free(&self, head: *mut Waiter) -> bool {
        self.inner
            .head
            .compare_exchange(head, ptr::null_mut(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns `true` if nobody holds the lock.
    pub fn available(&self) -> bool {
        self.inner.head.load(Ordering::Acquire).is_null()
    }

    /// Returns `true` if the lock is held by the current context.
    pub fn owned_by_current_context(&self) -> bool {
        !self.available() && self.inner.owner.load(Ordering::Acquire) == Context::get().id()
    }

    pub(crate) fn ptr_eq(&self, other: &Lock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let mut node = *self.head.get_mut();

        while !node.is_null() && node != held() {
            // SAFETY: nobody else can reach the stack anymore.
            let waiter = unsafe { Box::from_raw(node) };
            node = waiter.next;
        }
    }
}

impl fmt::Debug for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("available", &self.available())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    fn push(order: &Arc<Mutex<Vec<u32>>>, value: u32) -> Callback {
        let order = order.clone();
        Box::new(move || order.lock().push(value))
    }

    #[test]
    fn test_fast_path() {
        let lock = Lock::new();
        let context = Context::new("fast");

        assert!(lock.acquire_fast(&context));
        assert!(!lock.acquire_fast(&context));
        assert!(!lock.available());

        lock.release();
        assert!(lock.available());
    }

    #[test]
    fn test_slow_path_on_free_lock_returns_callback() {
        let lock = Lock::new();
        let context = Context::new("slow");

        let callback = lock.acquire_slow(&context, Box::new(|| {}));
        assert!(callback.is_some());
        assert!(!lock.available());

        lock.release();
        assert!(lock.available());
    }

    #[test]
    fn test_release_is_fifo() {
        let lock = Lock::new();
        let context = Context::new("fifo");
        let order = Arc::new(Mutex::new(Vec::new()));

        assert!(lock.acquire_fast(&context));

        for value in 1..=3 {
            assert!(lock.acquire_slow(&context, push(&order, value)).is_none());
        }

        for expected in 1..=3 {
            lock.release();
            assert_eq!(order.lock().last(), Some(&expected));
        }

        lock.release();
        assert!(lock.available());
    }

    #[test]
    #[should_panic(expected = "not held")]
    fn test_release_unheld_panics() {
        Lock::new().release();
    }
}
