//! Unifies alarm deadlines and I/O readiness behind a single `wait()`
//! call (spec.md §4.5).
//!
//! Ported from `original_source/cuti/cuti/default_scheduler.hpp`/`.cpp`.
//! The scheduler owns an [`IndexedHeap`] of pending alarms (a minheap,
//! since `IndexedHeap`'s comparator answers "is `a` lower priority than
//! `b`") and a platform [`Selector`]. A `poll_first_` flag alternates
//! which source wins a tie at an alarm's exact deadline, so a flood of
//! already-due alarms can never starve ready I/O and vice versa.

use crate::callback::Callback;
use crate::heap::IndexedHeap;
use crate::selector::{Descriptor, Selector};
use crate::ticket::Ticket;
use crate::time::{Duration, TimePoint};
use std::io;
use std::thread;

type AlarmCmp = fn(&TimePoint, &TimePoint) -> bool;

/// Owns the alarm heap and the platform selector, and drives both
/// through a single blocking `wait()`.
pub struct Scheduler {
    alarms: IndexedHeap<TimePoint, Callback, AlarmCmp>,
    selector: Selector,
    poll_first: bool,
}

impl Scheduler {
    pub fn new() -> io::Result<Self> {
        Ok(Scheduler {
            alarms: IndexedHeap::new(|a: &TimePoint, b: &TimePoint| a > b),
            selector: Selector::new()?,
            poll_first: false,
        })
    }

    /// Diagnostic name of the compiled-in selector backend.
    pub fn selector_name(&self) -> &'static str {
        self.selector.name()
    }

    /// Schedules `callback` to run at `time_point`.
    pub fn call_alarm(&mut self, time_point: TimePoint, callback: Callback) -> Ticket {
        Ticket::Alarm(self.alarms.add_element(time_point, callback))
    }

    pub fn call_when_writable(&mut self, fd: Descriptor, callback: Callback) -> Ticket {
        Ticket::Writable(self.selector.call_when_writable(fd, callback))
    }

    pub fn call_when_readable(&mut self, fd: Descriptor, callback: Callback) -> Ticket {
        Ticket::Readable(self.selector.call_when_readable(fd, callback))
    }

    /// Cancels a pending registration. A no-op on [`Ticket::Empty`].
    ///
    /// # Panics
    ///
    /// Panics if `ticket` names a registration that has already fired
    /// and had its id recycled for something unrelated — exactly the
    /// contract violation spec.md §4.4/§4.5 calls out as caller
    /// responsibility, not something this crate can detect in general.
    pub fn cancel(&mut self, ticket: Ticket) {
        match ticket {
            Ticket::Empty => {}
            Ticket::Alarm(id) => {
                self.alarms.remove_element(id);
            }
            Ticket::Writable(id) => {
                self.selector.cancel_when_writable(id);
            }
            Ticket::Readable(id) => {
                self.selector.cancel_when_readable(id);
            }
        }
    }

    /// Blocks until a registered alarm or I/O readiness fires, running
    /// neither itself — the caller invokes the returned [`Callback`].
    /// Returns `None` only when the scheduler has no pending alarms
    /// and no selector work at all.
    pub fn wait(&mut self) -> io::Result<Option<Callback>> {
        if !self.alarms.is_empty() {
            let alarm_id = self.alarms.front_element();
            let limit = *self.alarms.priority(alarm_id);

            loop {
                let now = TimePoint::now();

                if now >= limit {
                    if self.poll_first && self.selector.has_work() {
                        self.poll_first = false;
                        if let Some(cb) = self.selector.select(Duration::zero())? {
                            return Ok(Some(cb));
                        }
                    } else {
                        self.poll_first = true;
                        let cb = self.alarms.remove_element(alarm_id);
                        return Ok(Some(cb));
                    }
                } else if self.selector.has_work() {
                    if let Some(cb) = self.selector.select(limit - now)? {
                        return Ok(Some(cb));
                    }
                } else {
                    thread::sleep(std::time::Duration::from_nanos((limit - now).as_nanos() as u64));
                }
            }
        } else if self.selector.has_work() {
            loop {
                if let Some(cb) = self.selector.select(Duration::no_deadline())? {
                    return Ok(Some(cb));
                }
            }
        } else {
            Ok(None)
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("selector", &self.selector)
            .field("poll_first", &self.poll_first)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsRawFd as _;
    use std::os::unix::net::UnixStream;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn wait_returns_none_when_idle() {
        let mut scheduler = Scheduler::new().unwrap();
        assert!(scheduler.wait().unwrap().is_none());
    }

    #[test]
    fn alarm_fires_after_its_deadline() {
        let mut scheduler = Scheduler::new().unwrap();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        scheduler.call_alarm(
            TimePoint::now() + Duration::from_millis(1),
            Callback::new(move || fired2.store(true, Ordering::SeqCst)),
        );
        let cb = scheduler.wait().unwrap().expect("alarm should fire");
        cb.call();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn cancel_alarm_prevents_fire() {
        let mut scheduler = Scheduler::new().unwrap();
        let ticket = scheduler.call_alarm(
            TimePoint::now() + Duration::from_millis(50),
            Callback::new(|| panic!("should not fire")),
        );
        scheduler.cancel(ticket);
        // Nothing else pending: wait returns immediately with None.
        assert!(scheduler.wait().unwrap().is_none());
    }

    #[test]
    fn readable_io_wins_race_with_distant_alarm() {
        let mut scheduler = Scheduler::new().unwrap();
        let (a, mut b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();

        scheduler.call_alarm(
            TimePoint::now() + Duration::from_millis(5_000),
            Callback::new(|| panic!("alarm should not win")),
        );

        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        scheduler.call_when_readable(
            a.as_raw_fd(),
            Callback::new(move || fired2.store(true, Ordering::SeqCst)),
        );

        use std::io::Write;
        b.write_all(b"x").unwrap();

        let cb = scheduler.wait().unwrap().expect("readable should fire first");
        cb.call();
        assert!(fired.load(Ordering::SeqCst));
    }
}
