//! The BSD-family backend: a single `kqueue`, `EV_ADD | EV_ONESHOT`
//! per registration.
//!
//! Ported from `original_source/cuti/kqueue_selector.cpp`.

use super::Event;
use crate::callback::Callback;
use crate::list_arena::ListArena;
use crate::time::Duration;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

struct Registration {
    fd: RawFd,
    event: Event,
    callback: Callback,
}

pub struct KqueueSelector {
    registrations: ListArena<Registration>,
    watched_list: i32,
    pending_list: i32,
    kqueue_fd: OwnedFd,
}

fn make_kevent(fd: RawFd, filter: i16, flags: u16) -> libc::kevent {
    libc::kevent {
        ident: fd as libc::uintptr_t,
        filter,
        flags,
        fflags: 0,
        data: 0,
        udata: std::ptr::null_mut(),
    }
}

impl KqueueSelector {
    pub fn new() -> io::Result<Self> {
        let mut registrations = ListArena::new();
        let watched_list = registrations.add_list();
        let pending_list = registrations.add_list();
        let kqueue_fd = unsafe { OwnedFd::from_raw_fd(syscall!(kqueue())?) };
        Ok(KqueueSelector {
            registrations,
            watched_list,
            pending_list,
            kqueue_fd,
        })
    }

    pub fn name(&self) -> &'static str {
        "kqueue"
    }

    pub fn call_when_writable(&mut self, fd: RawFd, callback: Callback) -> i32 {
        self.make_ticket(fd, Event::Writable, callback)
    }

    pub fn cancel_when_writable(&mut self, ticket: i32) -> Callback {
        self.remove_registration(ticket)
    }

    pub fn call_when_readable(&mut self, fd: RawFd, callback: Callback) -> i32 {
        self.make_ticket(fd, Event::Readable, callback)
    }

    pub fn cancel_when_readable(&mut self, ticket: i32) -> Callback {
        self.remove_registration(ticket)
    }

    pub fn has_work(&self) -> bool {
        !self.registrations.list_empty(self.watched_list)
            || !self.registrations.list_empty(self.pending_list)
    }

    pub fn select(&mut self, timeout: Duration) -> io::Result<Option<Callback>> {
        assert!(self.has_work(), "Selector::select called with no work");

        if self.registrations.list_empty(self.pending_list) {
            let mut kevents = Vec::new();
            let mut ticket = self.registrations.first(self.watched_list);
            while ticket != self.registrations.last(self.watched_list) {
                let registration = self.registrations.value(ticket);
                let filter = match registration.event {
                    Event::Writable => libc::EVFILT_WRITE,
                    Event::Readable => libc::EVFILT_READ,
                };
                kevents.push(make_kevent(
                    registration.fd,
                    filter as i16,
                    (libc::EV_ADD | libc::EV_ONESHOT) as u16,
                ));
                ticket = self.registrations.next(ticket);
            }
            assert!(!kevents.is_empty());

            let ts = kevent_timeout(timeout);
            let ts_ptr = if timeout.is_negative() {
                std::ptr::null()
            } else {
                &ts as *const libc::timespec
            };

            let count = match syscall!(kevent(
                self.kqueue_fd.as_raw_fd(),
                kevents.as_ptr(),
                kevents.len() as i32,
                kevents.as_mut_ptr(),
                kevents.len() as i32,
                ts_ptr,
            )) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => 0,
                Err(e) => return Err(e),
            };
            kevents.truncate(count.max(0) as usize);

            let mut remaining = kevents.len();
            let mut ticket = self.registrations.first(self.watched_list);
            while remaining > 0 && ticket != self.registrations.last(self.watched_list) {
                let next = self.registrations.next(ticket);
                let registration = self.registrations.value(ticket);
                let filter = match registration.event {
                    Event::Writable => libc::EVFILT_WRITE,
                    Event::Readable => libc::EVFILT_READ,
                };
                let is_set = kevents
                    .iter()
                    .any(|ke| ke.ident == registration.fd as libc::uintptr_t && ke.filter == filter as i16);
                if is_set {
                    self.registrations
                        .move_element_before(self.registrations.last(self.pending_list), ticket);
                    remaining -= 1;
                }
                ticket = next;
            }
        }

        if self.registrations.list_empty(self.pending_list) {
            return Ok(None);
        }
        let ticket = self.registrations.first(self.pending_list);
        let callback = Callback::take(&mut self.registrations.value_mut(ticket).callback);
        self.registrations.remove_element(ticket);
        Ok(Some(callback))
    }

    fn make_ticket(&mut self, fd: RawFd, event: Event, callback: Callback) -> i32 {
        self.registrations.add_element_before(
            self.registrations.last(self.watched_list),
            Registration { fd, event, callback },
        )
    }

    fn remove_registration(&mut self, ticket: i32) -> Callback {
        let callback = Callback::take(&mut self.registrations.value_mut(ticket).callback);
        self.registrations.remove_element(ticket);
        callback
    }
}

/// Clamps `timeout` into a `timespec`, matching
/// `original_source/cuti/kqueue_selector.cpp`'s `kevent_timeout`: never
/// less than 1ns for a positive-but-sub-nanosecond timeout (to avoid a
/// spin loop) and never more than 30 seconds.
fn kevent_timeout(timeout: Duration) -> libc::timespec {
    const NANO: i64 = 1_000_000_000;
    const MAX: i64 = 30 * NANO;

    if timeout.is_negative() {
        return libc::timespec { tv_sec: 0, tv_nsec: 0 };
    }

    let mut nanos = timeout.as_nanos();
    if nanos < 1 {
        nanos = if timeout.as_nanos() > 0 { 1 } else { 0 };
    } else if nanos > MAX {
        nanos = MAX;
    }

    libc::timespec {
        tv_sec: (nanos / NANO) as libc::time_t,
        tv_nsec: (nanos % NANO) as libc::c_long,
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
    fn readable_fires_when_peer_writes() {
        let (a, mut b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        let mut selector = KqueueSelector::new().unwrap();

        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        selector.call_when_readable(a.as_raw_fd(), Callback::new(move || fired2.store(true, Ordering::SeqCst)));

        use std::io::Write;
        b.write_all(b"x").unwrap();

        let callback = selector.select(Duration::from_millis(1000)).unwrap().unwrap();
        callback.call();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn cancel_prevents_later_fire() {
        let (a, _b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        let mut selector = KqueueSelector::new().unwrap();
        let ticket = selector.call_when_writable(a.as_raw_fd(), Callback::new(|| panic!("should not fire")));
        let cb = selector.cancel_when_writable(ticket);
        assert!(cb.is_some());
        assert!(!selector.has_work());
    }
}
