//! Cancellation tokens.
//!
//! An [`Interrupt`] is registered with a pipeline before it starts. Stages
//! that can abandon their work early install a [`Handler`] on it; stages
//! that can't simply ignore it and run to completion. Triggering is
//! advisory: it never replaces the pipeline's single terminal outcome, it
//! only asks the interested stages to produce a `stop` sooner.

use crate::scheduler::Callback;

use parking_lot::Mutex;
use tracing::trace;

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

const UNINSTALLED: u8 = 0;
const INSTALLED: u8 = 1;
const UNINSTALLING: u8 = 2;

/// Lifecycle of a [`Handler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    /// Not registered with its interrupt.
    Uninstalled,
    /// Registered; will run when the interrupt triggers.
    Installed,
    /// Being taken off the list by a concurrent trigger.
    Uninstalling,
}

/// A shareable cancellation token.
///
/// Cloning an `Interrupt` yields another handle to the same token.
#[derive(Clone, Default)]
pub struct Interrupt {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    registry: Mutex<Registry>,
}

#[derive(Default)]
struct Registry {
    triggered: bool,
    handlers: Vec<Weak<Slot>>,
}

struct Slot {
    state: AtomicU8,
    callback: Mutex<Option<Callback>>,
}

impl Interrupt {
    /// Creates a token that has not been triggered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `callback` and returns the handler that owns it.
    ///
    /// Returns `None` if the interrupt was already triggered, in which
    /// case `callback` is dropped without being invoked.
    pub fn install<F>(&self, callback: F) -> Option<Handler>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut handler = Handler::new(self);
        handler.install(callback).then_some(handler)
    }

    /// Fires the interrupt.
    ///
    /// Only the first call has an effect: it takes the list of installed
    /// handlers and invokes each of them exactly once. Handlers installed
    /// afterwards are rejected.
    pub fn trigger(&self) {
        let handlers = {
            let mut registry = self.inner.registry.lock();

            if registry.triggered {
                return;
            }

            registry.triggered = true;
            std::mem::take(&mut registry.handlers)
        };

        trace!(handlers = handlers.len(), "interrupt triggered");

        for slot in handlers.iter().filter_map(Weak::upgrade) {
            if slot
                .state
                .compare_exchange(INSTALLED, UNINSTALLING, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                continue;
            }

            let callback = slot.callback.lock().take();
            slot.state.store(UNINSTALLED, Ordering::Release);

            if let Some(callback) = callback {
                callback();
            }
        }
    }

    /// Returns `true` once [`trigger`](Self::trigger) has been called.
    pub fn triggered(&self) -> bool {
        self.inner.registry.lock().triggered
    }

    fn remove(&self, slot: &Arc<Slot>) {
        let target = Arc::as_ptr(slot);

        self.inner
            .registry
            .lock()
            .handlers
            .retain(|weak| weak.strong_count() > 0 && weak.as_ptr() != target);
    }
}

impl fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interrupt")
            .field("triggered", &self.triggered())
            .finish()
    }
}

/// A callback registered against an [`Interrupt`].
///
/// The handler is owned by whoever installed it. The interrupt only keeps
/// a weak reference, so dropping an installed handler uninstalls it. If a
/// trigger is uninstalling the handler at that moment, the drop waits for
/// the trigger to finish taking the callback.
pub struct Handler {
    interrupt: Interrupt,
    slot: Arc<Slot>,
}

impl Handler {
    /// Creates an uninstalled handler bound to `interrupt`.
    pub fn new(interrupt: &Interrupt) -> Self {
        Self {
            interrupt: interrupt.clone(),
            slot: Arc::new(Slot {
                state: AtomicU8::new(UNINSTALLED),
                callback: Mutex::new(None),
            }),
        }
    }

    /// Registers `callback` with the interrupt.
    ///
    /// Returns `false`, without ever invoking `callback`, if the
    /// interrupt has already been triggered.
    ///
    /// # Panics
    ///
    /// Panics if the handler is already installed.
    pub fn install<F>(&mut self, callback: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        assert_eq!(
            self.state(),
            HandlerState::Uninstalled,
            "handler is already installed"
        );

        let mut registry = self.interrupt.inner.registry.lock();

        if registry.triggered {
            return false;
        }

        *self.slot.callback.lock() = Some(Box::new(callback));
        self.slot.state.store(INSTALLED, Ordering::Release);
        registry.handlers.push(Arc::downgrade(&self.slot));

        true
    }

    /// Installs `callback`, or runs it right away if the interrupt has
    /// already been triggered.
    ///
    /// Returns `true` if the callback was executed immediately.
    pub fn install_or_execute<F>(&mut self, callback: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let callback: Callback = Box::new(callback);
        let slot = Arc::new(Mutex::new(Some(callback)));
        let deferred = slot.clone();

        if self.install(move || {
            if let Some(callback) = deferred.lock().take() {
                callback();
            }
        }) {
            return false;
        }

        if let Some(callback) = slot.lock().take() {
            callback();
        }

        true
    }

    /// Returns the current state of the handler.
    pub fn state(&self) -> HandlerState {
        match self.slot.state.load(Ordering::Acquire) {
            INSTALLED => HandlerState::Installed,
            UNINSTALLING => HandlerState::Uninstalling,
            _ => HandlerState::Uninstalled,
        }
    }

    /// Returns the interrupt this handler is bound to.
    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }
}

impl Drop for Handler {
    fn drop(&mut self) {
        match self.slot.state.compare_exchange(
            INSTALLED,
            UNINSTALLED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                self.interrupt.remove(&self.slot);
                drop(self.slot.callback.lock().take());
            }
            Err(UNINSTALLING) => {
                while self.slot.state.load(Ordering::Acquire) == UNINSTALLING {
                    std::hint::spin_loop();
                }
            }
            Err(_) => {}
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_dropped_handler_is_not_invoked() {
        let interrupt = Interrupt::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let handler = interrupt.install(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(handler.as_ref().map(Handler::state), Some(HandlerState::Installed));

        drop(handler);
        interrupt.trigger();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(interrupt.inner.registry.lock().handlers.is_empty());
    }

    #[test]
    fn test_install_or_execute_after_trigger() {
        let interrupt = Interrupt::new();
        interrupt.trigger();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut handler = Handler::new(&interrupt);
        let executed = handler.install_or_execute(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(executed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(handler.state(), HandlerState::Uninstalled);
    }

    #[test]
    fn test_handler_state_after_trigger() {
        let interrupt = Interrupt::new();
        let handler = interrupt.install(|| {});
        interrupt.trigger();

        assert_eq!(handler.map(|h| h.state()), Some(HandlerState::Uninstalled));
    }
}
