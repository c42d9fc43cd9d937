use super::wait::{Condition, Factory, Notify, Wait, wait};
use super::Lock;

use parking_lot::Mutex;
use tracing::trace;

use std::collections::VecDeque;
use std::sync::Arc;

/// Parks pipelines holding a [`Lock`] until another context notifies
/// them.
///
/// The variable owns no data; it only queues the parked pipelines in the
/// order they started waiting.
pub struct ConditionVariable {
    lock: Lock,
    parked: Arc<Mutex<VecDeque<Notify>>>,
}

impl ConditionVariable {
    /// Creates a condition variable whose waiters park under `lock`.
    ///
    /// # Arguments
    ///
    /// * `lock` - The lock every waiter and notifier holds
    pub fn new(lock: &Lock) -> Self {
        Self {
            lock: lock.clone(),
            parked: Arc::default(),
        }
    }

    /// Waits for one notification.
    ///
    /// # Returns
    ///
    /// A stage to run under [`synchronized`](super::synchronized). It
    /// releases the lock while parked and holds it again when it
    /// continues.
    pub fn wait<T>(&self) -> Wait<Parking<impl FnMut(&T) -> bool + Send + 'static>> {
        let mut notified = false;
        self.wait_until(move |_: &T| std::mem::replace(&mut notified, true))
    }

    /// Waits until `ready` returns `true`, checking it on activation and
    /// after each notification.
    ///
    /// # Arguments
    ///
    /// * `ready` - Called with the value flowing through the stage
    pub fn wait_until<T, P>(&self, ready: P) -> Wait<Parking<P>>
    where
        P: FnMut(&T) -> bool + Send + 'static,
    {
        wait(
            &self.lock,
            Parking {
                parked: self.parked.clone(),
                ready,
            },
        )
    }

    /// Wakes the pipeline that has been waiting the longest.
    ///
    /// # Panics
    ///
    /// Panics unless the lock is owned by the current context.
    pub fn notify(&self) {
        assert!(
            self.lock.owned_by_current_context(),
            "notify requires owning the lock"
        );

        loop {
            let Some(notify) = self.parked.lock().pop_front() else {
                return;
            };

            if notify.notify() {
                trace!("condition variable notified one");
                return;
            }
        }
    }

    /// Wakes every waiting pipeline.
    ///
    /// # Panics
    ///
    /// Panics unless the lock is owned by the current context.
    pub fn notify_all(&self) {
        assert!(
            self.lock.owned_by_current_context(),
            "notify requires owning the lock"
        );

        let parked = std::mem::take(&mut *self.parked.lock());
        trace!(waiters = parked.len(), "condition variable notified all");

        for notify in parked {
            notify.notify();
        }
    }
}

/// Builds the condition of a pipeline waiting on a [`ConditionVariable`].
pub struct Parking<P> {
    parked: Arc<Mutex<VecDeque<Notify>>>,
    ready: P,
}

impl<T, P> Factory<T> for Parking<P>
where
    P: FnMut(&T) -> bool + Send + 'static,
{
    type Condition = Parked<P>;

    fn build(self, notify: Notify) -> Parked<P> {
        Parked {
            parked: self.parked,
            ready: self.ready,
            notify,
        }
    }
}

/// The condition of one waiting pipeline.
///
/// Every check that says "keep waiting" queues the pipeline on its
/// variable again.
pub struct Parked<P> {
    parked: Arc<Mutex<VecDeque<Notify>>>,
    ready: P,
    notify: Notify,
}

impl<T, P> Condition<T> for Parked<P>
where
    P: FnMut(&T) -> bool + Send + 'static,
{
    fn waiting(&mut self, value: &T) -> bool {
        if (self.ready)(value) {
            return false;
        }

        self.parked.lock().push_back(self.notify.clone());
        true
    }
}
