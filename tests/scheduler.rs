//! Timer ordering and cancellation (spec.md §8 S1, S2).

use cuti::{Callback, Duration, TimePoint};

mod util;
use util::init_with_scheduler;

#[test]
fn alarms_fire_in_deadline_order() {
    let mut scheduler = init_with_scheduler();
    let order = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));

    let t = TimePoint::now();
    for (label, delay) in [(30, 30), (10, 10), (20, 20)] {
        let order = order.clone();
        scheduler.call_alarm(
            t + Duration::from_millis(delay),
            Callback::new(move || order.lock().unwrap().push(label)),
        );
    }

    while let Some(cb) = scheduler.wait().unwrap() {
        cb.call();
    }

    assert_eq!(*order.lock().unwrap(), vec![10, 20, 30]);
}

#[test]
fn canceling_an_alarm_drops_it_from_the_sequence() {
    let mut scheduler = init_with_scheduler();
    let order = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));

    let t = TimePoint::now();
    let order_a = order.clone();
    let ticket_a = scheduler.call_alarm(
        t + Duration::from_millis(10),
        Callback::new(move || order_a.lock().unwrap().push('A')),
    );
    let order_b = order.clone();
    scheduler.call_alarm(
        t + Duration::from_millis(20),
        Callback::new(move || order_b.lock().unwrap().push('B')),
    );

    scheduler.cancel(ticket_a);

    while let Some(cb) = scheduler.wait().unwrap() {
        cb.call();
    }

    assert_eq!(*order.lock().unwrap(), vec!['B']);
}

#[test]
fn wait_returns_none_once_every_alarm_has_fired() {
    let mut scheduler = init_with_scheduler();
    scheduler.call_alarm(TimePoint::now(), Callback::new(|| {}));

    let cb = scheduler.wait().unwrap().expect("one alarm pending");
    cb.call();
    assert!(scheduler.wait().unwrap().is_none());
}
