//! Fairness under pressure: a perpetually-due alarm racing a
//! perpetually-ready socket must alternate roughly evenly rather than
//! starving one side (spec.md §8 S6, exercising the `poll_first`
//! alternation in `Scheduler::wait`).
#![cfg(unix)]

use cuti::{Callback, Scheduler, TimePoint};
use std::io::Write as _;
use std::os::fd::{AsRawFd as _, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

mod util;
use util::init_with_scheduler;

const TOTAL_DISPATCHES: usize = 1000;

/// Lets a raw `Scheduler` pointer cross `Callback`'s `Send` bound for
/// the self-rescheduling back-edge, the same trick the dispatcher uses
/// for its control-connection re-arm.
struct SchedulerPtr(*mut Scheduler);
unsafe impl Send for SchedulerPtr {}

fn arm_alarm(scheduler: &mut Scheduler, alarms: Arc<AtomicUsize>, total: Arc<AtomicUsize>) {
    let ptr = SchedulerPtr(scheduler as *mut Scheduler);
    scheduler.call_alarm(
        TimePoint::now(),
        Callback::new(move || {
            alarms.fetch_add(1, Ordering::SeqCst);
            if total.fetch_add(1, Ordering::SeqCst) + 1 < TOTAL_DISPATCHES {
                // SAFETY: the driving loop below holds `scheduler` on
                // its own stack frame for as long as any callback can
                // still be dispatched, so it's always live here.
                let scheduler = unsafe { &mut *ptr.0 };
                arm_alarm(scheduler, alarms.clone(), total.clone());
            }
        }),
    );
}

fn arm_readable(scheduler: &mut Scheduler, fd: RawFd, reads: Arc<AtomicUsize>, total: Arc<AtomicUsize>) {
    let ptr = SchedulerPtr(scheduler as *mut Scheduler);
    scheduler.call_when_readable(
        fd,
        Callback::new(move || {
            // Never actually drains the byte sitting in the socket, so
            // it stays readable on every subsequent re-arm.
            reads.fetch_add(1, Ordering::SeqCst);
            if total.fetch_add(1, Ordering::SeqCst) + 1 < TOTAL_DISPATCHES {
                let scheduler = unsafe { &mut *ptr.0 };
                arm_readable(scheduler, fd, reads.clone(), total.clone());
            }
        }),
    );
}

#[test]
fn alarm_and_readable_fires_alternate_within_ten_percent_over_a_thousand_dispatches() {
    let mut scheduler = init_with_scheduler();

    let (a, mut b) = UnixStream::pair().unwrap();
    a.set_nonblocking(true).unwrap();
    b.write_all(b"x").unwrap();

    let alarm_fires = Arc::new(AtomicUsize::new(0));
    let read_fires = Arc::new(AtomicUsize::new(0));
    let total = Arc::new(AtomicUsize::new(0));

    arm_alarm(&mut scheduler, alarm_fires.clone(), total.clone());
    arm_readable(&mut scheduler, a.as_raw_fd(), read_fires.clone(), total.clone());

    while total.load(Ordering::SeqCst) < TOTAL_DISPATCHES {
        match scheduler.wait().unwrap() {
            Some(cb) => cb.call(),
            None => break,
        }
    }

    let alarms = alarm_fires.load(Ordering::SeqCst) as f64;
    let reads = read_fires.load(Ordering::SeqCst) as f64;
    let dispatched = alarms + reads;

    assert_eq!(dispatched as usize, TOTAL_DISPATCHES);
    let fraction_alarms = alarms / dispatched;
    assert!(
        (0.4..=0.6).contains(&fraction_alarms),
        "alarm fraction {fraction_alarms} out of [0.4, 0.6] ({alarms} alarms, {reads} reads)"
    );
}
