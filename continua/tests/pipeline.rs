mod common;

use continua::error::Error;
use continua::{
    Completer, Errors, Interrupt, catch, collect, eventual, for_each, iterate, just, map, raise,
    reduce, run, start, terminal, then, try_map, until,
};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Debug, Clone, PartialEq)]
struct Oops;

#[derive(Debug, Clone, PartialEq)]
struct Timeout(u32);

#[derive(Debug, Clone, PartialEq)]
struct Wrapped(String);

#[test]
fn test_iterate_map_collect() {
    common::init_tracing();

    let out = run(iterate(vec![1, 2, 3]) >> map(|x: i32| x + 1) >> collect::<Vec<i32>>());

    assert_eq!(out, Ok(vec![2, 3, 4]));
}

#[test]
fn test_just_then_map() {
    let out = run(just(2) >> then(|x: i32| just(x * 10)) >> map(|x: i32| x + 1));

    assert_eq!(out, Ok(21));
}

#[test]
fn test_raise_then_catch_recovers() {
    let handled = Arc::new(AtomicUsize::new(0));
    let counter = handled.clone();

    let out = run(
        just(1)
            >> raise(Oops)
            >> catch().raised(move |_: Oops| {
                counter.fetch_add(1, Ordering::SeqCst);
                42
            }),
    );

    // The error set is empty after the handler, so this can only be Ok.
    let value: Result<i32, Error<continua::Nil>> = out;
    assert_eq!(value, Ok(42));
    assert_eq!(handled.load(Ordering::SeqCst), 1);
}

#[test]
fn test_uncaught_failure_reaches_the_sink() {
    let out = run(just(1) >> raise(Oops) >> map(|x: i32| x + 1));

    assert_eq!(out, Err(Error::Failed(continua::Cons::Head(Oops))));
}

#[test]
fn test_catch_finds_error_deeper_in_set() {
    let out = run(just(1) >> raise(Oops) >> raise(Timeout(3)) >> catch().raised(|_: Oops| 0));

    assert_eq!(out, Ok(0));
}

#[test]
fn test_catch_forwards_unhandled_types() {
    let out = run(
        just(1)
            >> try_map(|x: i32| if x < 0 { Err(Oops) } else { Ok(x) })
            >> raise(Timeout(3))
            >> catch().raised(|_: Oops| 0),
    );

    match out {
        Err(Error::Failed(set)) => assert_eq!(set.into_inner(), Timeout(3)),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn test_reraise_and_all() {
    let reraised = run(
        just(1) >> raise(Timeout(5)) >> catch().reraise(|t: Timeout| Wrapped(format!("after {}", t.0))),
    );

    assert_eq!(
        reraised,
        Err(Error::Failed(continua::Cons::Head(Wrapped("after 5".into()))))
    );

    let recovered = run(
        just(1)
            >> raise(Oops)
            >> raise(Timeout(1))
            >> catch().all(|_: Errors![Timeout, Oops]| -1),
    );

    assert_eq!(recovered, Ok(-1));
}

#[test]
fn test_try_map_single() {
    let parse = |s: &'static str| s.parse::<i32>().map_err(|_| Oops);

    assert_eq!(run(just("12") >> try_map(parse)), Ok(12));
    assert_eq!(
        run(just("twelve") >> try_map(parse)),
        Err(Error::Failed(continua::Cons::Head(Oops)))
    );
}

#[test]
fn test_try_map_stream_ends_upstream_then_fails() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    let out = run(
        iterate(1..)
            >> try_map(|x: u32| if x < 4 { Ok(x) } else { Err(Oops) })
            >> for_each(move |x: u32| sink.lock().unwrap().push(x)),
    );

    assert_eq!(out, Err(Error::Failed(continua::Cons::Head(Oops))));
    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
}

#[test]
fn test_until_ends_infinite_stream() {
    let out = run(iterate(1u32..) >> until(|x: &u32| *x > 5) >> collect::<Vec<u32>>());

    assert_eq!(out, Ok(vec![1, 2, 3, 4, 5]));
}

#[test]
fn test_reduce_sums() {
    let out = run(iterate(1..=4) >> reduce(0, |acc: i32, x: i32| acc + x));

    assert_eq!(out, Ok(10));
}

#[test]
fn test_long_stream_does_not_grow_the_stack() {
    let out = run(iterate(0..1_000_000u64) >> reduce(0u64, |acc: u64, x: u64| acc + x));

    assert_eq!(out, Ok(499_999_500_000));
}

#[test]
fn test_eventual_completed_from_another_thread() {
    let out = run(
        just(())
            >> eventual(|(), done: Completer<i32>| {
                thread::spawn(move || done.succeed(7));
            })
            >> map(|x: i32| x * 6),
    );

    assert_eq!(out, Ok(42));
}

#[test]
fn test_eventual_failure_joins_the_error_set() {
    let out = run(eventual(|(), done: Completer<i32, Errors![Timeout]>| {
        done.fail(Timeout(9));
    }));

    assert_eq!(out, Err(Error::Failed(continua::Cons::Head(Timeout(9)))));
}

#[test]
fn test_terminal_runs_exactly_one_callback() {
    common::init_tracing();

    let starts = Arc::new(AtomicUsize::new(0));
    let fails = Arc::new(AtomicUsize::new(0));
    let stops = Arc::new(AtomicUsize::new(0));

    let sink = |value_check: Option<i32>| {
        let (a, b, c) = (starts.clone(), fails.clone(), stops.clone());
        terminal()
            .on_start(move |value: i32| {
                assert_eq!(Some(value), value_check);
                a.fetch_add(1, Ordering::SeqCst);
            })
            .on_fail(move |_: Errors![Oops]| {
                b.fetch_add(1, Ordering::SeqCst);
            })
            .on_stop(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
    };

    start(just(5) >> try_map(|x: i32| Ok::<_, Oops>(x)), sink(Some(5)), &Interrupt::new());
    start(just(5) >> raise(Oops), sink(None), &Interrupt::new());

    assert_eq!(starts.load(Ordering::SeqCst), 1);
    assert_eq!(fails.load(Ordering::SeqCst), 1);
    assert_eq!(stops.load(Ordering::SeqCst), 0);
}
