mod common;

use continua::error::{Cons, Error};
use continua::{
    Completer, Errors, Future, Generator, Promise, Task, collect, eventual, iterate, just, map,
    reduce, run, until,
};

use std::future::Future as _;
use std::pin::pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::task::{Context as TaskContext, Poll, Wake, Waker};
use std::thread::{self, Thread};

#[derive(Debug, Clone, PartialEq)]
struct Oops;

struct Unpark(Thread);

impl Wake for Unpark {
    fn wake(self: Arc<Self>) {
        self.0.unpark();
    }
}

/// Polls `future` to completion on the calling thread.
fn block_on<T, E>(future: Future<T, E>) -> Result<T, Error<E>> {
    let waker = Waker::from(Arc::new(Unpark(thread::current())));
    let mut cx = TaskContext::from_waker(&waker);
    let mut future = pin!(future);

    loop {
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(outcome) => return outcome,
            Poll::Pending => thread::park(),
        }
    }
}

#[test]
fn test_task_runs_its_pipeline() {
    common::init_tracing();

    let task: Task<i32> = Task::new(|| just(2) >> map(|x: i32| x * 3));
    assert!(!task.started());

    assert_eq!(task.get(), Ok(6));
}

#[test]
fn test_task_success_and_failure() {
    assert_eq!(Task::<&str>::success("done").get(), Ok("done"));

    let failed: Task<i32, Errors![Oops]> = Task::failure(Oops);
    assert_eq!(failed.get(), Err(Error::Failed(Cons::Head(Oops))));
}

#[test]
fn test_task_start_calls_one_callback() {
    let (tx, rx) = mpsc::channel();
    let (fail_tx, stop_tx) = (tx.clone(), tx.clone());

    let mut task: Task<i32> = Task::new(|| just(41) >> map(|x: i32| x + 1));

    task.start(
        "answer",
        move |value: i32| tx.send(format!("value {value}")).unwrap(),
        move |_: continua::Nil| fail_tx.send("failed".to_string()).unwrap(),
        move || stop_tx.send("stopped".to_string()).unwrap(),
    );

    assert!(task.started());
    assert_eq!(rx.recv().unwrap(), "value 42");
    assert!(rx.try_recv().is_err());
}

#[test]
#[should_panic(expected = "task already started")]
fn test_task_cannot_start_twice() {
    let mut task = Task::success(1);

    task.start("first", |_: i32| {}, |_: continua::Nil| {}, || {});
    task.start("second", |_: i32| {}, |_: continua::Nil| {}, || {});
}

#[test]
fn test_interrupting_a_spawned_task() {
    let task: Task<i32> = Task::new(|| {
        eventual(|(), done: Completer<i32>| {
            let stopper = done.clone();
            done.on_interrupt(move || stopper.stop());
        })
    });

    let future = task.spawn("parked");
    assert!(!future.is_ready());

    future.interrupt();

    assert_eq!(future.get(), Err(Error::Stopped));
}

#[test]
fn test_task_composes_as_a_stage() {
    let out = run(Task::<i32>::success(4) >> map(|x: i32| x + 1));
    assert_eq!(out, Ok(5));

    let failing: Task<i32, Errors![Oops]> = Task::failure(Oops);
    let out = run(failing >> map(|x: i32| x + 1));
    assert_eq!(out, Err(Error::Failed(Cons::Head(Oops))));
}

#[test]
fn test_promise_delivers_once() {
    let (promise, future) = Promise::<i32, continua::Nil>::new();

    assert!(!future.is_ready());
    promise.set_value(3);
    assert!(future.is_ready());

    assert_eq!(future.get(), Ok(3));
}

#[test]
fn test_dropped_promise_stops_the_future() {
    let (promise, future) = Promise::<i32, continua::Nil>::new();

    drop(promise);

    assert_eq!(future.get(), Err(Error::Stopped));
}

#[test]
fn test_future_can_be_polled() {
    let (promise, future) = Promise::<u32, Errors![Oops]>::new();

    thread::spawn(move || {
        thread::sleep(std::time::Duration::from_millis(20));
        promise.fail(Cons::Head(Oops));
    });

    assert_eq!(block_on(future), Err(Error::Failed(Cons::Head(Oops))));
}

#[test]
fn test_generator_restarts_on_every_activation() {
    common::init_tracing();

    let activations = Arc::new(AtomicUsize::new(0));
    let counter = activations.clone();

    let numbers: Generator<u32> = Generator::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        iterate(0..5u32)
    });

    assert_eq!(run(numbers.clone() >> collect::<Vec<u32>>()), Ok(vec![0, 1, 2, 3, 4]));
    assert_eq!(run(numbers >> reduce(0, |acc: u32, x: u32| acc + x)), Ok(10));

    assert_eq!(activations.load(Ordering::SeqCst), 2);
}

#[test]
fn test_generator_feeds_a_stream_pipeline() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    let evens: Generator<u32> =
        Generator::new(|| iterate((0u32..).step_by(2)) >> until(|x: &u32| *x > 6));

    let out = run(
        just(())
            >> evens
            >> map(move |x: u32| {
                sink.lock().unwrap().push(x);
                x
            })
            >> collect::<Vec<u32>>(),
    );

    assert_eq!(out, Ok(vec![0, 2, 4, 6]));
    assert_eq!(*seen.lock().unwrap(), vec![0, 2, 4, 6]);
}
