mod common;

use continua::error::{Cons, Error};
use continua::{
    Completer, Errors, Interrupt, collect, concurrent, concurrent_ordered, eventual, for_each,
    iterate, just, map, parallel, raise, run, spawn, start, terminal, then, until,
};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
struct Boom(u32);

/// Completes `value` from a helper thread after `delay_ms`.
fn later(value: u32, delay_ms: u64) -> impl FnOnce((), Completer<u32>) + Send + 'static {
    move |(), done: Completer<u32>| {
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(delay_ms));
            done.succeed(value);
        });
    }
}

#[test]
fn test_concurrent_yields_a_permutation() {
    common::init_tracing();

    let mut out = run(
        iterate(1..=20u32) >> concurrent(|| map(|x: u32| x * 2)) >> collect::<Vec<u32>>(),
    )
    .unwrap();

    out.sort_unstable();
    assert_eq!(out, (1..=20).map(|x| x * 2).collect::<Vec<u32>>());
}

#[test]
fn test_concurrent_emits_in_completion_order() {
    common::init_tracing();

    let out = run(
        iterate(vec![3u32, 1, 2])
            >> concurrent(|| then(|x: u32| eventual(later(x, u64::from(x) * 40))))
            >> collect::<Vec<u32>>(),
    );

    assert_eq!(out, Ok(vec![1, 2, 3]));
}

#[test]
fn test_concurrent_ordered_keeps_upstream_order() {
    common::init_tracing();

    let out = run(
        iterate(vec![3u32, 1, 2])
            >> concurrent_ordered(|| then(|x: u32| eventual(later(x, u64::from(x) * 40))))
            >> collect::<Vec<u32>>(),
    );

    assert_eq!(out, Ok(vec![3, 1, 2]));
}

#[test]
fn test_concurrent_ordered_sub_streams_stay_grouped() {
    let out = run(
        iterate(vec![2u32, 1])
            >> concurrent_ordered(|| then(|x: u32| eventual(later(x, u64::from(x) * 30))) >> map(|x: u32| x * 10))
            >> collect::<Vec<u32>>(),
    );

    assert_eq!(out, Ok(vec![20, 10]));
}

#[test]
fn test_fiber_failure_waits_for_the_others() {
    common::init_tracing();

    let finished = Arc::new(AtomicUsize::new(0));
    let counter = finished.clone();

    let out = run(
        iterate(vec![1u32, 2, 3])
            >> concurrent(move || {
                let counter = counter.clone();
                then(move |x: u32| {
                    let counter = counter.clone();
                    eventual(move |(), done: Completer<u32, Errors![Boom]>| {
                        thread::spawn(move || {
                            if x == 1 {
                                done.fail(Boom(x));
                            } else {
                                thread::sleep(Duration::from_millis(50));
                                counter.fetch_add(1, Ordering::SeqCst);
                                done.succeed(x);
                            }
                        });
                    })
                })
            })
            >> collect::<Vec<u32>>(),
    );

    assert_eq!(out, Err(Error::Failed(Cons::Head(Boom(1)))));
    assert_eq!(finished.load(Ordering::SeqCst), 2);
}

#[test]
fn test_fiber_errors_join_the_set() {
    let out = run(
        iterate(vec![1u32, 2])
            >> concurrent(|| then(|x: u32| just(x) >> raise(Boom(x))))
            >> collect::<Vec<u32>>(),
    );

    match out {
        Err(Error::Failed(Cons::Head(Boom(x)))) => assert!(x == 1 || x == 2),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn test_downstream_done_ends_the_stream() {
    let launched = Arc::new(AtomicUsize::new(0));
    let counter = launched.clone();

    let out = run(
        iterate(1u32..)
            >> concurrent(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                map(|x: u32| x)
            })
            >> until(|x: &u32| *x > 3)
            >> collect::<Vec<u32>>(),
    );

    let mut values = out.unwrap();
    values.sort_unstable();

    assert!(values.iter().all(|x| *x <= 3));
    assert!(launched.load(Ordering::SeqCst) >= 3);
}

#[test]
fn test_interrupt_stops_every_fiber() {
    let parked: Arc<Mutex<Vec<Completer<u32>>>> = Arc::new(Mutex::new(Vec::new()));
    let handles = parked.clone();

    let future = spawn(
        iterate(vec![1u32, 2, 3])
            >> concurrent(move || {
                let handles = handles.clone();
                then(move |_: u32| {
                    let handles = handles.clone();
                    eventual(move |(), done: Completer<u32>| {
                        let stopper = done.clone();
                        done.on_interrupt(move || stopper.stop());
                        handles.lock().unwrap().push(done);
                    })
                })
            })
            >> collect::<Vec<u32>>(),
    );

    assert_eq!(parked.lock().unwrap().len(), 3);
    assert!(!future.is_ready());

    future.interrupt();

    assert_eq!(future.get(), Err(Error::Stopped));
}

#[test]
fn test_parallel_runs_on_the_pool() {
    common::init_tracing();

    let threads = Arc::new(Mutex::new(Vec::new()));
    let seen = threads.clone();

    let mut out = run(
        iterate(0..32u32)
            >> parallel(move || {
                let seen = seen.clone();
                map(move |x: u32| {
                    let name = thread::current().name().map(str::to_string);
                    seen.lock().unwrap().push(name);
                    x + 1
                })
            })
            >> collect::<Vec<u32>>(),
    )
    .unwrap();

    out.sort_unstable();
    assert_eq!(out, (1..=32).collect::<Vec<u32>>());

    let threads = threads.lock().unwrap();
    assert_eq!(threads.len(), 32);
    assert!(
        threads
            .iter()
            .all(|name| name.as_deref().is_some_and(|name| name.starts_with("static-thread-pool")))
    );
}

#[test]
fn test_upstream_failure_before_begin_reaches_the_sink() {
    common::init_tracing();

    let out = run(
        just(())
            >> raise(Boom(7))
            >> iterate(vec![1u32, 2])
            >> concurrent(|| map(|x: u32| x))
            >> collect::<Vec<u32>>(),
    );
    assert_eq!(out, Err(Error::Failed(Cons::Head(Boom(7)))));

    let out = run(
        just(())
            >> raise(Boom(8))
            >> iterate(vec![1u32, 2])
            >> concurrent_ordered(|| map(|x: u32| x))
            >> collect::<Vec<u32>>(),
    );
    assert_eq!(out, Err(Error::Failed(Cons::Head(Boom(8)))));

    let out = run(
        just(())
            >> raise(Boom(9))
            >> iterate(vec![1u32, 2])
            >> parallel(|| map(|x: u32| x))
            >> collect::<Vec<u32>>(),
    );
    assert_eq!(out, Err(Error::Failed(Cons::Head(Boom(9)))));
}

#[test]
fn test_upstream_stop_before_begin_reaches_the_sink() {
    let stopped = || eventual(|(), done: Completer<()>| done.stop());

    let out = run(
        stopped() >> iterate(vec![1u32]) >> concurrent(|| map(|x: u32| x)) >> collect::<Vec<u32>>(),
    );
    assert_eq!(out, Err(Error::Stopped));

    let out = run(
        stopped()
            >> iterate(vec![1u32])
            >> concurrent_ordered(|| map(|x: u32| x))
            >> collect::<Vec<u32>>(),
    );
    assert_eq!(out, Err(Error::Stopped));

    let out = run(
        stopped() >> iterate(vec![1u32]) >> parallel(|| map(|x: u32| x)) >> collect::<Vec<u32>>(),
    );
    assert_eq!(out, Err(Error::Stopped));
}

#[test]
fn test_upstream_failure_before_begin_calls_on_fail() {
    let (tx, rx) = mpsc::channel();
    let (fail_tx, stop_tx) = (tx.clone(), tx.clone());

    start(
        just(())
            >> raise(Boom(3))
            >> iterate(vec![1u32])
            >> concurrent(|| map(|x: u32| x))
            >> collect::<Vec<u32>>(),
        terminal()
            .on_start(move |_: Vec<u32>| tx.send("start".to_string()).unwrap())
            .on_fail(move |error: Errors![Boom]| {
                fail_tx.send(format!("fail {}", error.into_inner().0)).unwrap()
            })
            .on_stop(move || stop_tx.send("stop".to_string()).unwrap()),
        &Interrupt::new(),
    );

    assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "fail 3");
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_results_after_a_failure_are_dropped() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    let out = run(
        iterate(vec![1u32, 2, 3])
            >> concurrent(|| {
                then(|x: u32| {
                    eventual(move |(), done: Completer<u32, Errors![Boom]>| {
                        thread::spawn(move || {
                            if x == 1 {
                                done.fail(Boom(x));
                            } else {
                                thread::sleep(Duration::from_millis(50));
                                done.succeed(x);
                            }
                        });
                    })
                })
            })
            >> for_each(move |x: u32| sink.lock().unwrap().push(x)),
    );

    assert_eq!(out, Err(Error::Failed(Cons::Head(Boom(1)))));
    assert!(seen.lock().unwrap().is_empty());
}
