//! Pull handles and the serializing trampoline behind every stream.
//!
//! A stream producer is written as a [`Machine`]: a value that reacts to
//! one event at a time. Events are fed through a [`Serial`], which makes
//! sure that at most one event is handled at any moment and that an
//! event raised while another one is being handled (a consumer calling
//! [`Stream::next`] from inside its `body`) is queued instead of
//! recursing. A stream of a million values therefore runs in constant
//! stack depth.
//!
//! The queue/drain protocol follows the classic task state machine: the
//! first sender to bump `pending` from zero becomes the drainer and keeps
//! handling events until it brings the counter back to zero.

use parking_lot::Mutex;

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// The producer side of a [`Stream`].
pub trait Pull: Send + Sync + 'static {
    /// Requests the next value.
    fn next(&self);

    /// Asks the producer to stop producing and end the stream.
    fn done(&self);
}

/// Handle a listener uses to request values from its producer.
///
/// Cloning yields another handle to the same producer.
#[derive(Clone)]
pub struct Stream {
    pull: Arc<dyn Pull>,
}

impl Stream {
    pub fn new(pull: Arc<dyn Pull>) -> Self {
        Self { pull }
    }

    /// Requests the next value. Answered by one `body`, or by the end of
    /// the stream.
    pub fn next(&self) {
        self.pull.next();
    }

    /// Requests an early end of the stream.
    pub fn done(&self) {
        self.pull.done();
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream").finish_non_exhaustive()
    }
}

/// A request made through a [`Stream`] handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Next,
    Done,
}

/// A state machine driven by a [`Serial`].
pub trait Machine: Send + Sized + 'static {
    type Event: Send + 'static;

    /// Handles one event. `serial` is the driver itself, so the machine
    /// can hand out [`Stream`] handles or queue follow-up events.
    fn handle(&mut self, event: Self::Event, serial: &Arc<Serial<Self>>);
}

/// Serializes the events of a [`Machine`].
pub struct Serial<M: Machine> {
    /// Number of events sent and not yet handled.
    pending: AtomicUsize,
    events: Mutex<VecDeque<M::Event>>,
    machine: Mutex<M>,
    this: Weak<Self>,
}

impl<M: Machine> Serial<M> {
    pub fn new(machine: M) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            pending: AtomicUsize::new(0),
            events: Mutex::new(VecDeque::new()),
            machine: Mutex::new(machine),
            this: this.clone(),
        })
    }

    /// Queues `event`, handling it (and anything queued meanwhile) right
    /// away unless another call is already draining.
    pub fn send(&self, event: M::Event) {
        self.events.lock().push_back(event);

        if self.pending.fetch_add(1, Ordering::AcqRel) == 0 {
            self.drain();
        }
    }

    fn drain(&self) {
        let Some(this) = self.this.upgrade() else {
            return;
        };

        let mut machine = self.machine.lock();

        loop {
            let event = self.events.lock().pop_front();

            if let Some(event) = event {
                machine.handle(event, &this);
            }

            if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                break;
            }
        }
    }
}

impl<M> Serial<M>
where
    M: Machine,
    M::Event: From<Request>,
{
    /// Returns a [`Stream`] whose requests become events of this machine.
    pub fn stream(self: &Arc<Self>) -> Stream {
        Stream::new(self.clone())
    }
}

impl<M> Pull for Serial<M>
where
    M: Machine,
    M::Event: From<Request>,
{
    fn next(&self) {
        self.send(Request::Next.into());
    }

    fn done(&self) {
        self.send(Request::Done.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        seen: Vec<u32>,
        limit: u32,
    }

    impl Machine for Counter {
        type Event = u32;

        fn handle(&mut self, event: u32, serial: &Arc<Serial<Self>>) {
            self.seen.push(event);
            if event < self.limit {
                serial.send(event + 1);
            }
        }
    }

    #[test]
    fn test_reentrant_send_is_queued() {
        let serial = Serial::new(Counter {
            seen: Vec::new(),
            limit: 100_000,
        });

        serial.send(0);

        let machine = serial.machine.lock();
        assert_eq!(machine.seen.len(), 100_001);
        assert_eq!(machine.seen.last(), Some(&100_000));
        assert_eq!(serial.pending.load(Ordering::Acquire), 0);
    }
}
