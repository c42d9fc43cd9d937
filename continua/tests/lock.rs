mod common;

use continua::lock::Notify;
use continua::{
    ConditionVariable, Context, Lock, Requirements, just, map, run, spawn, synchronized, wait,
};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[test]
fn test_synchronized_runs_and_releases() {
    common::init_tracing();

    let lock = Lock::new();
    let held = lock.clone();

    let out = run(synchronized(
        &lock,
        just(3) >> map(move |x: i32| {
            assert!(held.owned_by_current_context());
            x * 2
        }),
    ));

    assert_eq!(out, Ok(6));
    assert!(lock.available());
}

#[test]
fn test_waiters_resume_in_arrival_order() {
    let lock = Lock::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    assert!(lock.acquire_fast(&Context::new("holder")));

    for i in 0..5 {
        let order = order.clone();
        let releaser = lock.clone();

        Context::new(format!("waiter-{i}")).enter(|| {
            lock.acquire(move || {
                order.lock().unwrap().push(i);
                releaser.release();
            });
        });
    }

    assert!(order.lock().unwrap().is_empty());

    lock.release();

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    assert!(lock.available());
}

#[test]
fn test_mutual_exclusion_across_pool_workers() {
    common::init_tracing();

    let pool = common::pool(4);
    let lock = Lock::new();
    let inside = Arc::new(AtomicBool::new(false));
    let total = Arc::new(AtomicUsize::new(0));

    let futures: Vec<_> = (0..64)
        .map(|i| {
            let inside = inside.clone();
            let total = total.clone();

            let critical = map(move |()| {
                assert!(!inside.swap(true, Ordering::SeqCst), "two holders at once");
                total.fetch_add(1, Ordering::SeqCst);
                inside.store(false, Ordering::SeqCst);
            });

            let stage = pool
                .schedule(&Requirements::new(format!("job-{i}")), synchronized(&lock, critical))
                .unwrap();

            spawn(stage)
        })
        .collect();

    for future in futures {
        assert_eq!(future.get(), Ok(()));
    }

    assert_eq!(total.load(Ordering::SeqCst), 64);
    assert!(lock.available());
}

#[test]
fn test_wait_resumes_only_on_final_check() {
    let lock = Lock::new();
    let checks = Arc::new(AtomicUsize::new(0));
    let slot: Arc<Mutex<Option<Notify>>> = Arc::new(Mutex::new(None));

    let counter = checks.clone();
    let handle = slot.clone();

    let future = spawn(synchronized(
        &lock,
        wait(&lock, move |notify: Notify| {
            *handle.lock().unwrap() = Some(notify);
            move |_: &()| counter.fetch_add(1, Ordering::SeqCst) < 2
        }),
    ));

    let notify = slot.lock().unwrap().clone().unwrap();

    assert_eq!(checks.load(Ordering::SeqCst), 1);
    assert!(!future.is_ready());
    assert!(lock.available());

    assert!(notify.notify());
    assert_eq!(checks.load(Ordering::SeqCst), 2);
    assert!(!future.is_ready());

    assert!(notify.notify());
    assert_eq!(checks.load(Ordering::SeqCst), 3);

    assert_eq!(future.get(), Ok(()));
    assert!(lock.available());

    // Nobody is parked anymore.
    assert!(!notify.notify());
}

#[test]
fn test_condition_variable_notify_one_at_a_time() {
    let lock = Lock::new();
    let condition = Arc::new(ConditionVariable::new(&lock));

    let first = spawn(synchronized(&lock, just(1) >> condition.wait()));
    let second = spawn(synchronized(&lock, just(2) >> condition.wait()));

    assert!(!first.is_ready());
    assert!(!second.is_ready());

    let notifier = condition.clone();
    run(synchronized(&lock, map(move |()| notifier.notify()))).unwrap();

    assert_eq!(first.get(), Ok(1));
    assert!(!second.is_ready());

    let notifier = condition.clone();
    run(synchronized(&lock, map(move |()| notifier.notify_all()))).unwrap();

    assert_eq!(second.get(), Ok(2));
}

#[test]
fn test_wait_until_checks_shared_state() {
    let lock = Lock::new();
    let condition = Arc::new(ConditionVariable::new(&lock));
    let ready = Arc::new(AtomicBool::new(false));

    let flag = ready.clone();
    let waiter = spawn(synchronized(
        &lock,
        just("go") >> condition.wait_until(move |_: &&str| flag.load(Ordering::SeqCst)),
    ));

    // A notification before the state changed parks the waiter again.
    let notifier = condition.clone();
    run(synchronized(&lock, map(move |()| notifier.notify()))).unwrap();
    assert!(!waiter.is_ready());

    let notifier = condition.clone();
    let flag = ready.clone();
    run(synchronized(
        &lock,
        map(move |()| {
            flag.store(true, Ordering::SeqCst);
            notifier.notify();
        }),
    ))
    .unwrap();

    assert_eq!(waiter.get(), Ok("go"));
}

#[test]
#[should_panic(expected = "requires owning the lock")]
fn test_notify_without_lock_panics() {
    let lock = Lock::new();
    ConditionVariable::new(&lock).notify();
}
