mod common;

use continua::error::Error;
use continua::interrupt::{Handler, HandlerState};
use continua::{Completer, Interrupt, Listener, Stream, collect, eventual, iterate, map, spawn};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

#[test]
fn test_trigger_is_idempotent() {
    common::init_tracing();

    let interrupt = Interrupt::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = calls.clone();
    let _handler = interrupt.install(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    interrupt.trigger();
    interrupt.trigger();
    interrupt.trigger();

    assert!(interrupt.triggered());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_install_after_trigger_never_runs() {
    let interrupt = Interrupt::new();
    interrupt.trigger();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let mut handler = Handler::new(&interrupt);
    let installed = handler.install(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(!installed);
    assert_eq!(handler.state(), HandlerState::Uninstalled);

    interrupt.trigger();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_concurrent_triggers_run_each_handler_once() {
    let interrupt = Interrupt::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let handlers: Vec<_> = (0..16)
        .filter_map(|_| {
            let counter = calls.clone();
            interrupt.install(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    let threads: Vec<_> = (0..4)
        .map(|_| {
            let interrupt = interrupt.clone();
            thread::spawn(move || interrupt.trigger())
        })
        .collect();

    for thread in threads {
        thread.join().unwrap();
    }

    assert_eq!(handlers.len(), 16);
    assert_eq!(calls.load(Ordering::SeqCst), 16);
}

#[test]
fn test_interrupting_an_eventual_stops_it() {
    let future = spawn(eventual(|(), done: Completer<i32>| {
        let stopper = done.clone();
        let registered = done.on_interrupt(move || stopper.stop());
        assert!(registered);
    }));

    assert!(!future.is_ready());

    future.interrupt();

    assert_eq!(future.get(), Err(Error::Stopped));
}

/// Pulls values by hand so the test decides when to interrupt.
struct Manual {
    stream: Arc<Mutex<Option<Stream>>>,
    seen: Arc<Mutex<Vec<u32>>>,
    outcome: Arc<Mutex<Option<&'static str>>>,
}

impl Listener<u32, continua::Nil> for Manual {
    fn begin(&mut self, stream: Stream) {
        *self.stream.lock().unwrap() = Some(stream);
    }

    fn body(&mut self, value: u32) {
        self.seen.lock().unwrap().push(value);
    }

    fn ended(self) {
        *self.outcome.lock().unwrap() = Some("ended");
    }

    fn fail(self, error: continua::Nil) {
        match error {}
    }

    fn stop(self) {
        *self.outcome.lock().unwrap() = Some("stopped");
    }

    fn register(&mut self, _: &Interrupt) {}
}

#[test]
fn test_iterate_stops_on_next_after_interrupt() {
    let stream = Arc::new(Mutex::new(None));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let outcome = Arc::new(Mutex::new(None));

    let interrupt = Interrupt::new();

    continua::start(
        iterate(1..=10u32) >> map(|x: u32| x),
        Manual {
            stream: stream.clone(),
            seen: seen.clone(),
            outcome: outcome.clone(),
        },
        &interrupt,
    );

    let handle = stream.lock().unwrap().clone().unwrap();

    handle.next();
    handle.next();
    assert_eq!(*seen.lock().unwrap(), vec![1, 2]);

    interrupt.trigger();
    handle.next();

    assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    assert_eq!(*outcome.lock().unwrap(), Some("stopped"));
}

#[test]
fn test_uninterrupted_stream_collects_everything() {
    let future = spawn(iterate(0..100) >> collect::<Vec<i32>>());

    future.interrupt();

    // The stream ran to completion before the interrupt could be observed.
    assert_eq!(future.get().map(|v| v.len()), Ok(100));
}
